//! # swell
//!
//! Asynchronous HTTP client with a rate-limited concurrent request engine,
//! DNS caching, pluggable middleware, redirect/retry policies, and TLS
//! introspection.
//!
//! ```rust,ignore
//! use swell::{Client, Options};
//! use std::time::Duration;
//!
//! let mut client = Client::new();
//! client.set_options(
//!     Options::new()
//!         .dns_cache(Duration::from_secs(30), 10)
//!         .retry(3, None)
//!         .session(),
//! )?;
//!
//! let response = client.get("example.com").send().await?;
//! println!("{}", response.body.string()?);
//! ```

// Core modules
pub mod body;
pub mod client;
pub mod context;
pub mod cookies;
pub mod debug;
pub mod error;
pub mod headers;
pub mod history;
pub mod middleware;
pub mod multipart;
pub mod options;
pub mod payload;
pub mod redirect;
pub mod request;
pub mod response;
pub mod sniff;
pub mod tls;

// Dial path
pub mod dns;
pub mod transport;

// Concurrent engine
pub mod batch;
pub mod ratelimit;

// Re-exports for convenient access
pub use batch::{Batch, BatchResponse, JobUrl};
pub use body::Body;
pub use client::{Client, DEFAULT_USER_AGENT};
pub use context::{CancelHandle, Context};
pub use cookies::{Cookie, Cookies, Jar};
pub use error::{Error, Result};
pub use headers::Headers;
pub use history::History;
pub use options::Options;
pub use payload::Payload;
pub use redirect::{RedirectAction, RedirectAttempt, RedirectPolicy};
pub use request::Request;
pub use response::Response;
pub use tls::TlsInfo;
