//! The HTTP client.
//!
//! A client owns the transport (pools and connector policy), the dial and
//! TLS configuration, an optional cookie jar, the redirect policy, and the
//! middleware chains. Construction wires the defaults; `set_options`
//! applies a declarative [`Options`] value on top.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::header::{HeaderValue, CONTENT_TYPE, LOCATION, REFERER, USER_AGENT};
use http::{HeaderMap, Method};
use url::Url;

use crate::cookies::{Cookie, Cookies, Jar};
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, SharedHistory};
use crate::middleware::{
    request_mw, ClientMiddleware, RequestMiddleware, ResponseMiddleware,
};
use crate::multipart::MultipartForm;
use crate::options::{AppliedOptions, Options};
use crate::payload::Payload;
use crate::redirect::{RedirectAction, RedirectAttempt, RedirectPolicy};
use crate::request::{Request, UploadSpec};
use crate::tls::TlsInfo;
use crate::transport::{DialConfig, RawResponse, TlsConfig, Transport, TransportConfig, TransportRequest};

/// Default User-Agent header value.
pub const DEFAULT_USER_AGENT: &str = "hg-http-client/6.6.6 (+https://github.com/x0xO/hg)";

/// Default per-attempt wall-clock limit.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configurable HTTP client.
///
/// Safe for concurrent requests once configuration is finished; clones
/// share the connection pools, DNS cache, cookie jar, and history buffer.
pub struct Client {
    pub(crate) transport: Transport,
    pub(crate) dial: DialConfig,
    pub(crate) tls: TlsConfig,
    pub(crate) jar: Option<Arc<Jar>>,
    pub(crate) redirect: RedirectPolicy,
    pub(crate) req_mw: Vec<RequestMiddleware>,
    pub(crate) opt_req_mw: Vec<RequestMiddleware>,
    pub(crate) resp_mw: Vec<ResponseMiddleware>,
    pub(crate) history: SharedHistory,
    pub(crate) timeout: Duration,
    pub(crate) applied: AppliedOptions,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            dial: self.dial.clone(),
            tls: self.tls.clone(),
            jar: self.jar.clone(),
            redirect: self.redirect.clone(),
            req_mw: self.req_mw.clone(),
            opt_req_mw: self.opt_req_mw.clone(),
            resp_mw: self.resp_mw.clone(),
            history: Arc::clone(&self.history),
            timeout: self.timeout,
            applied: self.applied.clone(),
        }
    }
}

impl Client {
    /// Create a client with the default dialer, TLS policy, transport,
    /// bounded redirect policy, and User-Agent middleware.
    pub fn new() -> Self {
        let mut client = Self {
            transport: Transport::new(TransportConfig::default()),
            dial: DialConfig::default(),
            tls: TlsConfig::default(),
            jar: None,
            redirect: RedirectPolicy::default(),
            req_mw: Vec::new(),
            opt_req_mw: Vec::new(),
            resp_mw: Vec::new(),
            history: Arc::new(Mutex::new(Vec::new())),
            timeout: DEFAULT_TIMEOUT,
            applied: AppliedOptions::default(),
        };

        client.request_middleware(request_mw(|req: &mut Request<'_>| {
            if !req.headers().contains_key(USER_AGENT) {
                req.headers_mut()
                    .insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
            }
            Ok(())
        }));

        client
    }

    /// Apply a set of options: run its client middlewares in registration
    /// order and adopt its request middlewares and scalar flags.
    pub fn set_options(&mut self, options: Options) -> Result<&mut Self> {
        let Options {
            cli_mw,
            req_mw,
            applied,
        } = options;

        self.applied = applied;
        self.opt_req_mw.extend(req_mw);

        for mw in cli_mw {
            mw(self)?;
        }

        // Pool bounds may have changed.
        self.transport.rebuild_pool();

        Ok(self)
    }

    /// Run a client middleware immediately.
    pub fn client_middleware(&mut self, mw: ClientMiddleware) -> Result<&mut Self> {
        mw(self)?;
        Ok(self)
    }

    /// Register a middleware that runs before every request is sent.
    pub fn request_middleware(&mut self, mw: RequestMiddleware) -> &mut Self {
        self.req_mw.push(mw);
        self
    }

    /// Register a middleware that runs on every received response.
    pub fn response_middleware(&mut self, mw: ResponseMiddleware) -> &mut Self {
        self.resp_mw.push(mw);
        self
    }

    /// The transport (pools and transport-level configuration).
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The dial configuration (timeouts, resolver, DNS cache).
    pub fn dial_config(&self) -> &DialConfig {
        &self.dial
    }

    /// The TLS configuration.
    pub fn tls_config(&self) -> &TlsConfig {
        &self.tls
    }

    /// The session cookie jar, when sessions are enabled.
    pub fn cookie_jar(&self) -> Option<&Arc<Jar>> {
        self.jar.as_ref()
    }

    /// Create a GET request.
    pub fn get(&self, url: impl AsRef<str>) -> Request<'_> {
        self.build_request(url.as_ref(), Method::GET, Payload::Empty)
    }

    /// Create a GET request carrying a body.
    pub fn get_with(&self, url: impl AsRef<str>, data: impl Into<Payload>) -> Request<'_> {
        self.build_request(url.as_ref(), Method::GET, data.into())
    }

    /// Create a HEAD request.
    pub fn head(&self, url: impl AsRef<str>) -> Request<'_> {
        self.build_request(url.as_ref(), Method::HEAD, Payload::Empty)
    }

    /// Create a DELETE request.
    pub fn delete(&self, url: impl AsRef<str>) -> Request<'_> {
        self.build_request(url.as_ref(), Method::DELETE, Payload::Empty)
    }

    /// Create a DELETE request carrying a body.
    pub fn delete_with(&self, url: impl AsRef<str>, data: impl Into<Payload>) -> Request<'_> {
        self.build_request(url.as_ref(), Method::DELETE, data.into())
    }

    /// Create a POST request.
    pub fn post(&self, url: impl AsRef<str>, data: impl Into<Payload>) -> Request<'_> {
        self.build_request(url.as_ref(), Method::POST, data.into())
    }

    /// Create a PUT request.
    pub fn put(&self, url: impl AsRef<str>, data: impl Into<Payload>) -> Request<'_> {
        self.build_request(url.as_ref(), Method::PUT, data.into())
    }

    /// Create a PATCH request.
    pub fn patch(&self, url: impl AsRef<str>, data: impl Into<Payload>) -> Request<'_> {
        self.build_request(url.as_ref(), Method::PATCH, data.into())
    }

    /// Create a request with an explicit method.
    pub fn request(
        &self,
        method: Method,
        url: impl AsRef<str>,
        data: impl Into<Payload>,
    ) -> Request<'_> {
        self.build_request(url.as_ref(), method, data.into())
    }

    /// Create a multipart/form-data POST from key/value fields.
    pub fn multipart<'a>(
        &self,
        url: impl AsRef<str>,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Request<'_> {
        let url = format_url(url.as_ref());

        let mut form = match MultipartForm::new() {
            Ok(form) => form,
            Err(e) => return Request::failed(self, e),
        };
        for (name, value) in fields {
            form.text_field(name, value);
        }
        let (content_type, body) = form.finish();

        let parsed = match Url::parse(&url) {
            Ok(parsed) => parsed,
            Err(e) => return Request::failed(self, e.into()),
        };

        let mut request = Request::new(self, Method::POST, parsed);
        match HeaderValue::from_str(&content_type) {
            Ok(value) => {
                request.headers_mut().insert(CONTENT_TYPE, value);
            }
            Err(e) => return Request::failed(self, Error::config(e.to_string())),
        }
        request.set_body(body);
        request
    }

    /// Create a multipart file-upload POST.
    ///
    /// The file is read when the request is sent; `content` overrides the
    /// file's data while `file_path` still names the uploaded part. Extra
    /// fields become plain form values.
    pub fn file_upload<'a>(
        &self,
        url: impl AsRef<str>,
        field_name: impl Into<String>,
        file_path: impl Into<String>,
        content: Option<&str>,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Request<'_> {
        let url = format_url(url.as_ref());
        let parsed = match Url::parse(&url) {
            Ok(parsed) => parsed,
            Err(e) => return Request::failed(self, e.into()),
        };

        let mut request = Request::new(self, Method::POST, parsed);
        request.set_upload(UploadSpec {
            field_name: field_name.into(),
            file_path: file_path.into(),
            content: content.map(|c| c.to_string()),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        request
    }

    /// Cookies the jar would send to `url`.
    pub fn get_cookies(&self, url: impl AsRef<str>) -> Vec<Cookie> {
        let Some(jar) = &self.jar else {
            return Vec::new();
        };
        let Ok(url) = Url::parse(url.as_ref()) else {
            return Vec::new();
        };
        jar.cookies_for_url(&url)
    }

    /// Store cookies in the jar as if set by `url`.
    pub fn set_cookies(&self, url: impl AsRef<str>, cookies: Vec<Cookie>) -> Result<()> {
        let jar = self
            .jar
            .as_ref()
            .ok_or_else(|| Error::config("cookie jar is not available"))?;
        Url::parse(url.as_ref())?;
        for cookie in cookies {
            jar.store(cookie);
        }
        Ok(())
    }

    fn build_request(&self, raw_url: &str, method: Method, payload: Payload) -> Request<'_> {
        let url = format_url(raw_url);

        let parsed = match Url::parse(&url) {
            Ok(parsed) => parsed,
            Err(e) => return Request::failed(self, e.into()),
        };

        let (body, content_type) = match payload.into_parts() {
            Ok(parts) => parts,
            Err(e) => return Request::failed(self, e),
        };

        let mut request = Request::new(self, method, parsed);
        if let Some(content_type) = content_type {
            match HeaderValue::from_str(&content_type) {
                Ok(value) => {
                    request.headers_mut().insert(CONTENT_TYPE, value);
                }
                Err(e) => return Request::failed(self, Error::config(e.to_string())),
            }
        }
        if let Some(body) = body {
            request.set_body(body);
        }
        request
    }

    /// Execute one attempt end to end, following redirects per policy.
    pub(crate) async fn perform(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&bytes::Bytes>,
    ) -> Result<FinalExchange> {
        let original_url = url.clone();
        let original_headers = headers.clone();

        let mut current_method = method.clone();
        let mut current_url = url.clone();
        let mut current_headers = headers.clone();
        let mut current_body = body.cloned();
        let mut hops = 0usize;

        loop {
            let mut hop_headers = current_headers.clone();
            if let Some(jar) = &self.jar {
                if let Some(cookie_header) = jar.cookie_header(&current_url) {
                    if let Ok(value) = HeaderValue::from_str(&cookie_header) {
                        hop_headers.append(http::header::COOKIE, value);
                    }
                }
            }

            let exchange = self
                .transport
                .exchange(
                    &self.dial,
                    &self.tls,
                    TransportRequest {
                        method: &current_method,
                        url: &current_url,
                        headers: &hop_headers,
                        body: current_body.as_ref(),
                    },
                )
                .await?;

            if let Some(jar) = &self.jar {
                jar.store_from_headers(&exchange.response.headers, &current_url);
            }

            let status = exchange.response.status;
            let location = exchange
                .response
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());

            let referer = hop_headers
                .get(REFERER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());

            let (Some(location), true) = (location, (300..400).contains(&status)) else {
                return Ok(FinalExchange {
                    response: exchange.response,
                    url: current_url,
                    tls_info: exchange.tls_info,
                    remote_addr: exchange.remote_addr,
                    referer,
                });
            };

            let next_url = current_url.join(&location)?;
            let attempt = RedirectAttempt {
                status,
                next_url: &next_url,
                original_url: &original_url,
                hops,
            };

            if self.redirect.evaluate(&attempt) == RedirectAction::Stop {
                tracing::debug!(status, hops, "redirect policy stopped, using last response");
                return Ok(FinalExchange {
                    response: exchange.response,
                    url: current_url,
                    tls_info: exchange.tls_info,
                    remote_addr: exchange.remote_addr,
                    referer,
                });
            }

            if self.applied.history {
                let entry = HistoryEntry {
                    url: current_url.clone(),
                    status_code: status,
                    headers: exchange.response.headers.clone().into(),
                    cookies: Cookies::from_headers(&exchange.response.headers, &current_url),
                    referer: referer.clone(),
                };
                self.history
                    .lock()
                    .expect("history lock poisoned")
                    .push(entry);
            }

            hops += 1;
            tracing::debug!(from = %current_url, to = %next_url, status, "following redirect");

            // A 303 (and historically 301/302 for non-GET) switches the
            // next hop to a bodyless GET.
            if status == 303
                || (matches!(status, 301 | 302)
                    && !matches!(current_method, Method::GET | Method::HEAD))
            {
                current_method = Method::GET;
                current_body = None;
            }

            current_headers = if self.redirect.forward_headers {
                original_headers.clone()
            } else {
                let mut minimal = HeaderMap::new();
                if let Some(ua) = original_headers.get(USER_AGENT) {
                    minimal.insert(USER_AGENT, ua.clone());
                }
                // A body-preserving hop keeps its media type.
                if current_body.is_some() {
                    if let Some(ct) = original_headers.get(http::header::CONTENT_TYPE) {
                        minimal.insert(http::header::CONTENT_TYPE, ct.clone());
                    }
                }
                minimal
            };

            // Referer for the next hop, unless it would downgrade to http.
            if !(current_url.scheme() == "https" && next_url.scheme() == "http") {
                let mut referer_url = current_url.clone();
                let _ = referer_url.set_username("");
                let _ = referer_url.set_password(None);
                referer_url.set_fragment(None);
                if let Ok(value) = HeaderValue::from_str(referer_url.as_str()) {
                    current_headers.insert(REFERER, value);
                }
            }

            current_url = next_url;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("dial", &self.dial)
            .field("tls", &self.tls)
            .field("redirect", &self.redirect)
            .field("timeout", &self.timeout)
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

/// The terminal exchange of one attempt (after redirects).
pub(crate) struct FinalExchange {
    pub response: RawResponse,
    pub url: Url,
    pub tls_info: Option<TlsInfo>,
    pub remote_addr: Option<SocketAddr>,
    pub referer: Option<String>,
}

/// Normalize a raw URL: strip surrounding dots, default the scheme to
/// `http://`.
pub(crate) fn format_url(raw: &str) -> String {
    let trimmed = raw.trim_matches('.');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_url_adds_scheme() {
        assert_eq!(format_url("example.com"), "http://example.com");
        assert_eq!(format_url("http://example.com"), "http://example.com");
        assert_eq!(format_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_format_url_strips_dots() {
        assert_eq!(format_url("example.com."), "http://example.com");
        assert_eq!(format_url(".example.com"), "http://example.com");
        assert_eq!(format_url("example.com/path?q=1"), "http://example.com/path?q=1");
    }

    #[test]
    fn test_default_client_configuration() {
        let client = Client::new();
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(client.redirect.max_redirects, 10);
        assert!(client.jar.is_none());
        assert_eq!(client.req_mw.len(), 1, "default user-agent middleware");
        assert!(client.tls.verify);
    }

    #[test]
    fn test_bad_url_captured_into_request() {
        let client = Client::new();
        let request = client.get("http://exa mple.com/");
        assert!(request.construction_error().is_some());
    }
}
