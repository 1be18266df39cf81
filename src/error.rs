//! Error types for the swell crate.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or executing HTTP requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// HTTP protocol error (malformed response, framing violation).
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Connection error (dial failure, proxy refusal, pool failure).
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Host resolution produced no usable IPv4 addresses.
    #[error("no dns records for host {0}")]
    NoDnsRecords(String),

    /// Operation exceeded its wall-clock deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request context was cancelled.
    #[error("request context cancelled")]
    Cancelled,

    /// A middleware aborted the exchange.
    #[error("middleware error: {0}")]
    Middleware(String),

    /// Invalid client or options configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Body read or decode failure.
    #[error("body error: {0}")]
    Body(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML serialization/deserialization error.
    #[error("XML error: {0}")]
    Xml(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a middleware error.
    pub fn middleware(message: impl Into<String>) -> Self {
        Self::Middleware(message.into())
    }

    /// Create a body error.
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body(message.into())
    }
}
