//! A single outgoing request and its execution loop.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method};
use tokio::time::Instant;
use url::Url;

use crate::client::Client;
use crate::context::Context;
use crate::cookies::Cookie;
use crate::error::{Error, Result};
use crate::multipart::MultipartForm;
use crate::response::Response;

/// Statuses treated as transient and retried: 500 Internal Server Error,
/// 502 Bad Gateway, 503 Service Unavailable, 429 Too Many Requests.
/// The set is intentionally explicit.
pub const RETRIABLE_STATUS: [u16; 4] = [500, 502, 503, 429];

/// A deferred multipart file upload, materialized when the request is sent.
#[derive(Debug, Clone)]
pub(crate) struct UploadSpec {
    pub field_name: String,
    pub file_path: String,
    /// Literal content to upload instead of reading the file.
    pub content: Option<String>,
    pub fields: Vec<(String, String)>,
}

/// One outgoing HTTP exchange under construction.
///
/// Built by the client's verb methods, mutated by request middleware, and
/// consumed exactly once by [`send`](Request::send).
pub struct Request<'c> {
    client: &'c Client,
    method: Method,
    url: Option<Url>,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    body: Option<Bytes>,
    upload: Option<UploadSpec>,
    context: Option<Context>,
    error: Option<Error>,
}

impl<'c> Request<'c> {
    pub(crate) fn new(client: &'c Client, method: Method, url: Url) -> Self {
        Self {
            client,
            method,
            url: Some(url),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: None,
            upload: None,
            context: None,
            error: None,
        }
    }

    /// A request that failed during construction; the error surfaces at
    /// send time.
    pub(crate) fn failed(client: &'c Client, error: Error) -> Self {
        Self {
            client,
            method: Method::GET,
            url: None,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: None,
            upload: None,
            context: None,
            error: Some(error),
        }
    }

    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = Some(body);
    }

    pub(crate) fn set_upload(&mut self, upload: UploadSpec) {
        self.upload = Some(upload);
    }

    /// The construction error, if any.
    pub fn construction_error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL. `None` when construction failed.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set headers, replacing existing values of the same name.
    pub fn set_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_ref().as_bytes()),
                HeaderValue::from_str(value.as_ref()),
            ) {
                self.headers.insert(name, value);
            }
        }
        self
    }

    /// Add headers, appending to existing values of the same name.
    pub fn add_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_ref().as_bytes()),
                HeaderValue::from_str(value.as_ref()),
            ) {
                self.headers.append(name, value);
            }
        }
        self
    }

    /// Attach cookies to the request.
    pub fn add_cookies(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        self.cookies.extend(cookies);
        self
    }

    /// Associate a cancellable context with the request.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Perform the request.
    ///
    /// Runs the request middleware chains, dispatches with retries on
    /// transient failures, and builds the [`Response`] with the response
    /// middleware chain applied.
    pub async fn send(mut self) -> Result<Response> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        // Client chain first, then the options chain.
        let middlewares: Vec<_> = self
            .client
            .req_mw
            .iter()
            .chain(self.client.opt_req_mw.iter())
            .cloned()
            .collect();
        for mw in middlewares {
            mw(&mut self)?;
        }

        if let Some(upload) = self.upload.take() {
            self.materialize_upload(upload).await?;
        }

        if !self.cookies.is_empty() {
            let joined = self
                .cookies
                .iter()
                .map(Cookie::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            if let Ok(value) = HeaderValue::from_str(&joined) {
                self.headers.append(COOKIE, value);
            }
        }

        let url = self
            .url
            .clone()
            .ok_or_else(|| Error::config("request has no URL"))?;

        // Retained copy of the outgoing body; retries and the debug dump
        // both read from it.
        let drained_body = self.body.clone();

        let client = self.client;
        let applied = &client.applied;
        let start = Instant::now();
        let mut attempts: u32 = 0;

        let outcome = loop {
            let attempt = self.dispatch_once(&url, drained_body.as_ref());
            let outcome = match &self.context {
                Some(ctx) => {
                    tokio::select! {
                        result = attempt => result,
                        () = ctx.cancelled() => Err(Error::Cancelled),
                    }
                }
                None => attempt.await,
            };

            let retriable = match &outcome {
                Ok(exchange) => RETRIABLE_STATUS.contains(&exchange.response.status),
                Err(Error::Cancelled) => false,
                Err(_) => true,
            };

            if !retriable || applied.retry_max == 0 || attempts >= applied.retry_max {
                break outcome;
            }

            attempts += 1;
            tracing::debug!(attempt = attempts, wait = ?applied.retry_wait, "retrying request");
            tokio::time::sleep(applied.retry_wait).await;
        };

        let exchange = outcome?;

        let mut response = Response::build(
            client,
            exchange,
            self.headers
                .get(http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            self.method.clone(),
            self.headers.clone(),
            drained_body,
            start.elapsed(),
            attempts,
        );

        let response_middlewares: Vec<_> = client.resp_mw.to_vec();
        for mw in response_middlewares {
            mw(&mut response)?;
        }

        Ok(response)
    }

    /// One full attempt: redirect-following exchange under the client
    /// timeout.
    async fn dispatch_once(
        &self,
        url: &Url,
        body: Option<&Bytes>,
    ) -> Result<crate::client::FinalExchange> {
        let deadline = self.client.timeout;
        tokio::time::timeout(
            deadline,
            self.client
                .perform(&self.method, url, &self.headers, body),
        )
        .await
        .map_err(|_| Error::Timeout(deadline))?
    }

    /// Read the upload source and install the multipart body.
    async fn materialize_upload(&mut self, upload: UploadSpec) -> Result<()> {
        let file_name = std::path::Path::new(&upload.file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| upload.file_path.clone());

        let content = match upload.content {
            Some(content) => content.into_bytes(),
            None => tokio::fs::read(&upload.file_path).await?,
        };

        let mut form = MultipartForm::new()?;
        form.file_field(&upload.field_name, &file_name, &content);
        for (name, value) in &upload.fields {
            form.text_field(name, value);
        }
        let (content_type, body) = form.finish();

        let value = HeaderValue::from_str(&content_type)
            .map_err(|e| Error::config(e.to_string()))?;
        self.headers.insert(CONTENT_TYPE, value);
        self.body = Some(body);
        Ok(())
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_set() {
        for status in [500, 502, 503, 429] {
            assert!(RETRIABLE_STATUS.contains(&status));
        }
        for status in [200, 201, 301, 400, 404, 501, 504] {
            assert!(!RETRIABLE_STATUS.contains(&status));
        }
    }

    #[test]
    fn test_header_builders() {
        let client = Client::new();
        let request = client
            .get("http://example.com")
            .set_headers([("X-One", "1")])
            .add_headers([("X-One", "2"), ("X-Two", "b")]);

        let values: Vec<_> = request
            .headers()
            .get_all("x-one")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["1", "2"]);
        assert_eq!(request.headers().get("x-two").unwrap(), "b");
    }

    #[tokio::test]
    async fn test_construction_error_surfaces_at_send() {
        let client = Client::new();
        let result = client.get("http://exa mple.com/").send().await;
        assert!(matches!(result, Err(Error::UrlParse(_))));
    }
}
