//! Middleware chains.
//!
//! Three hook points: client middlewares reshape the client once when
//! options are attached, request middlewares mutate every outgoing request,
//! response middlewares inspect every completed response. Each chain runs
//! in registration order and any error aborts the exchange.
//!
//! Chains must be finalized before the client is used concurrently; they
//! are treated as read-only once the first request is sent.

use std::sync::Arc;

use crate::client::Client;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// Runs once against the client when an options set is applied.
pub type ClientMiddleware = Box<dyn FnOnce(&mut Client) -> Result<()> + Send>;

/// Runs against every outgoing request before dispatch.
pub type RequestMiddleware =
    Arc<dyn for<'c> Fn(&mut Request<'c>) -> Result<()> + Send + Sync>;

/// Runs against every completed response.
pub type ResponseMiddleware = Arc<dyn Fn(&mut Response) -> Result<()> + Send + Sync>;

/// Box a client middleware closure.
pub fn client_mw(
    f: impl FnOnce(&mut Client) -> Result<()> + Send + 'static,
) -> ClientMiddleware {
    Box::new(f)
}

/// Wrap a request middleware closure.
pub fn request_mw(
    f: impl for<'c> Fn(&mut Request<'c>) -> Result<()> + Send + Sync + 'static,
) -> RequestMiddleware {
    Arc::new(f)
}

/// Wrap a response middleware closure.
pub fn response_mw(
    f: impl Fn(&mut Response) -> Result<()> + Send + Sync + 'static,
) -> ResponseMiddleware {
    Arc::new(f)
}
