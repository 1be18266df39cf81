//! The immutable result of a completed exchange.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::body::Body;
use crate::client::{Client, FinalExchange};
use crate::cookies::{Cookie, Cookies, Jar};
use crate::debug::DebugReport;
use crate::dns::DialStats;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::history::{self, History};
use crate::tls::TlsInfo;

/// Snapshot of the request that produced a response, kept for debugging.
#[derive(Debug, Clone)]
pub(crate) struct RequestSummary {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Copy of the outgoing body captured before dispatch.
    pub body: Option<Bytes>,
}

/// A completed HTTP exchange.
pub struct Response {
    /// Final URL after redirects.
    pub url: Url,
    /// Status line, e.g. `200 OK`.
    pub status: String,
    pub status_code: u16,
    /// Protocol of the final exchange, e.g. `HTTP/1.1`.
    pub proto: String,
    pub headers: Headers,
    /// Cookies set by the final response.
    pub cookies: Cookies,
    /// Declared content length; `-1` when unknown.
    pub content_length: i64,
    /// User-Agent header the request carried.
    pub user_agent: String,
    /// Wall time of the whole send, including retries.
    pub time: Duration,
    /// Extra attempts used by the retry loop.
    pub attempts: u32,
    /// Intermediate redirect responses, when history is enabled.
    pub history: History,
    pub body: Body,

    remote_addr: Option<SocketAddr>,
    tls_info: Option<TlsInfo>,
    jar: Option<Arc<Jar>>,
    referer: Option<String>,
    dns_stats: Option<Arc<DialStats>>,
    pub(crate) request: RequestSummary,
}

impl Response {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        client: &Client,
        exchange: FinalExchange,
        user_agent: String,
        request_method: Method,
        request_headers: HeaderMap,
        drained_body: Option<Bytes>,
        time: Duration,
        attempts: u32,
    ) -> Self {
        let FinalExchange {
            response,
            url,
            tls_info,
            remote_addr,
            referer,
        } = exchange;

        let status = StatusCode::from_u16(response.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .map(|reason| format!("{} {reason}", response.status))
            .unwrap_or_else(|| response.status.to_string());

        let content_length = response
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(-1);

        let content_type = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let encoding = response
            .headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let cookies = Cookies::from_headers(&response.headers, &url);
        let body = Body::new(
            response.body,
            content_type,
            encoding,
            client.applied.cache_body,
        );

        Self {
            request: RequestSummary {
                method: request_method,
                url: url.clone(),
                headers: request_headers,
                body: drained_body,
            },
            url,
            status,
            status_code: response.status,
            proto: response.proto,
            headers: Headers::new(response.headers),
            cookies,
            content_length,
            user_agent,
            time,
            attempts,
            history: history::snapshot(&client.history),
            body,
            remote_addr: client.applied.remote_address.then_some(remote_addr).flatten(),
            tls_info,
            jar: client.jar.clone(),
            referer,
            dns_stats: client.dial.dns_cache.as_ref().map(|cache| cache.stats()),
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Whether the status is 3xx.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// Referer header of the final request, when one was set.
    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }

    /// Remote peer address, captured when `get_remote_address` was enabled.
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// TLS session metadata, present for HTTPS exchanges.
    pub fn tls_grabber(&self) -> Option<&TlsInfo> {
        self.tls_info.as_ref()
    }

    /// Cookies the session jar would send to `url`.
    pub fn get_cookies(&self, url: impl AsRef<str>) -> Vec<Cookie> {
        let Some(jar) = &self.jar else {
            return Vec::new();
        };
        let Ok(url) = Url::parse(url.as_ref()) else {
            return Vec::new();
        };
        jar.cookies_for_url(&url)
    }

    /// Store cookies in the session jar as if set by `url`.
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

    /// Start a debug report over this response.
    pub fn debug(&self) -> DebugReport<'_> {
        DebugReport::new(self)
    }

    pub(crate) fn dns_stats(&self) -> Option<&Arc<DialStats>> {
        self.dns_stats.as_ref()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("proto", &self.proto)
            .field("content_length", &self.content_length)
            .field("time", &self.time)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
