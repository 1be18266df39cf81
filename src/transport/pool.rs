//! Idle connection pool for HTTP/1.1 keep-alive reuse.
//!
//! Connections are keyed by host/port/TLS. Checked-in connections expire
//! after the idle timeout and are bounded per host and in total.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use url::Url;

use crate::tls::TlsInfo;
use crate::transport::h1::H1Connection;

/// Identity of a poolable destination.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
    pub is_https: bool,
}

impl PoolKey {
    pub fn from_url(url: &Url) -> Self {
        let is_https = url.scheme() == "https";
        Self {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(if is_https { 443 } else { 80 }),
            is_https,
        }
    }
}

/// A reusable connection plus the dial-time metadata that travels with it.
pub struct PooledConn {
    pub conn: H1Connection,
    pub tls_info: Option<TlsInfo>,
    pub remote_addr: Option<SocketAddr>,
}

struct IdleConn {
    pooled: PooledConn,
    idle_since: Instant,
}

/// Keep-alive pool with idle-timeout and size bounds.
pub struct Pool {
    idle: Mutex<HashMap<PoolKey, VecDeque<IdleConn>>>,
    idle_timeout: Duration,
    max_idle: usize,
    max_idle_per_host: usize,
}

impl Pool {
    pub fn new(idle_timeout: Duration, max_idle: usize, max_idle_per_host: usize) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            idle_timeout,
            max_idle,
            max_idle_per_host,
        }
    }

    /// Take the most recently parked connection for `key`, discarding any
    /// that sat idle past the timeout.
    pub fn checkout(&self, key: &PoolKey) -> Option<PooledConn> {
        let mut idle = self.idle.lock().expect("pool lock poisoned");
        let queue = idle.get_mut(key)?;

        while let Some(entry) = queue.pop_back() {
            if entry.idle_since.elapsed() < self.idle_timeout {
                return Some(entry.pooled);
            }
            tracing::debug!(host = %key.host, "dropping idle-expired connection");
        }

        None
    }

    /// Park a connection for reuse. Connections marked for close and
    /// overflow beyond the caps are dropped.
    pub fn checkin(&self, key: PoolKey, pooled: PooledConn) {
        if pooled.conn.should_close() {
            return;
        }

        let mut idle = self.idle.lock().expect("pool lock poisoned");

        let total: usize = idle.values().map(VecDeque::len).sum();
        if total >= self.max_idle {
            return;
        }

        let queue = idle.entry(key).or_default();
        if queue.len() >= self.max_idle_per_host {
            return;
        }

        queue.push_back(IdleConn {
            pooled,
            idle_since: Instant::now(),
        });
    }

    /// Number of idle connections currently parked.
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .expect("pool lock poisoned")
            .values()
            .map(VecDeque::len)
            .sum()
    }
}
