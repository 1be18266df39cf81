//! Connection establishment and single-exchange execution.
//!
//! The transport owns the keep-alive pool and the HTTP/2 connection map,
//! and turns one prepared request into one raw response: dial (or reuse),
//! write, read, park the connection when reusable.

pub mod connector;
pub mod h1;
pub mod h2;
pub mod pool;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio::sync::RwLock;
use url::Url;

use crate::error::Result;
use crate::tls::TlsInfo;

pub use connector::{Connector, DialConfig, Established, MaybeTlsStream, TlsConfig};
pub use h1::H1Connection;
pub use h2::H2Connection;
pub use pool::{Pool, PoolKey, PooledConn};

/// Transport-level knobs, mutated only during client configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Force HTTP/2: offer `h2` in ALPN and use it when negotiated.
    pub http2: bool,
    /// Send `Connection: close` and never pool connections.
    pub disable_keep_alive: bool,
    /// Route requests through this HTTP proxy.
    pub proxy: Option<Url>,
    /// How long a parked connection stays reusable.
    pub idle_conn_timeout: Duration,
    /// Total parked-connection bound.
    pub max_idle_conns: usize,
    /// Per-host parked-connection bound.
    pub max_idle_conns_per_host: usize,
    /// Per-host connection bound (advisory; reported via config access).
    pub max_conns_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            http2: false,
            disable_keep_alive: false,
            proxy: None,
            idle_conn_timeout: Duration::from_secs(20),
            max_idle_conns: 512,
            max_idle_conns_per_host: 128,
            max_conns_per_host: 128,
        }
    }
}

/// One prepared outgoing exchange.
pub struct TransportRequest<'r> {
    pub method: &'r Method,
    pub url: &'r Url,
    pub headers: &'r HeaderMap,
    pub body: Option<&'r Bytes>,
}

/// The parsed response head and complete body of one exchange.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub proto: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, proto: String, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            proto,
            headers,
            body,
        }
    }
}

/// A raw response plus connection-level observations.
#[derive(Debug)]
pub struct ExchangeResult {
    pub response: RawResponse,
    pub tls_info: Option<TlsInfo>,
    pub remote_addr: Option<SocketAddr>,
}

/// Shared request executor: connector policy + pools.
pub struct Transport {
    pub config: TransportConfig,
    h1_pool: Arc<Pool>,
    h2_pool: Arc<RwLock<HashMap<PoolKey, H2Entry>>>,
}

#[derive(Clone)]
struct H2Entry {
    conn: H2Connection,
    tls_info: Option<TlsInfo>,
    remote_addr: Option<SocketAddr>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        let h1_pool = Arc::new(Pool::new(
            config.idle_conn_timeout,
            config.max_idle_conns,
            config.max_idle_conns_per_host,
        ));
        Self {
            config,
            h1_pool,
            h2_pool: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Rebuild the keep-alive pool after configuration changed its bounds.
    pub(crate) fn rebuild_pool(&mut self) {
        self.h1_pool = Arc::new(Pool::new(
            self.config.idle_conn_timeout,
            self.config.max_idle_conns,
            self.config.max_idle_conns_per_host,
        ));
    }

    /// Execute one exchange end to end.
    pub async fn exchange(
        &self,
        dial: &DialConfig,
        tls: &TlsConfig,
        request: TransportRequest<'_>,
    ) -> Result<ExchangeResult> {
        let key = PoolKey::from_url(request.url);
        let https = request.url.scheme() == "https";

        // Multiplex over an existing HTTP/2 connection when one is alive.
        if self.config.http2 && https {
            let entry = { self.h2_pool.read().await.get(&key).cloned() };
            if let Some(entry) = entry {
                match entry
                    .conn
                    .send_request(
                        request.method,
                        request.url,
                        request.headers,
                        request.body.cloned(),
                    )
                    .await
                {
                    Ok(response) => {
                        return Ok(ExchangeResult {
                            response,
                            tls_info: entry.tls_info,
                            remote_addr: entry.remote_addr,
                        });
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "pooled HTTP/2 connection failed");
                        self.h2_pool.write().await.remove(&key);
                    }
                }
            }
        }

        let poolable = self.poolable(dial);

        // Reuse a parked HTTP/1.1 connection; a stale one falls back to a
        // fresh dial (the request body lives in memory, so a resend is safe).
        if poolable {
            if let Some(mut pooled) = self.h1_pool.checkout(&key) {
                match pooled
                    .conn
                    .send_request(
                        request.method,
                        request.url,
                        request.headers,
                        request.body,
                        false,
                        false,
                    )
                    .await
                {
                    Ok(response) => {
                        let tls_info = pooled.tls_info.clone();
                        let remote_addr = pooled.remote_addr;
                        self.h1_pool.checkin(key, pooled);
                        return Ok(ExchangeResult {
                            response,
                            tls_info,
                            remote_addr,
                        });
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "pooled connection failed, redialing");
                    }
                }
            }
        }

        let established = Connector::connect(dial, tls, self.config.proxy.as_ref(), request.url)
            .await?;
        let Established {
            stream,
            remote_addr,
            tls_info,
            via_proxy,
        } = established;

        if stream.is_h2() {
            let conn = H2Connection::connect(stream).await?;
            self.h2_pool.write().await.insert(
                key,
                H2Entry {
                    conn: conn.clone(),
                    tls_info: tls_info.clone(),
                    remote_addr,
                },
            );
            let response = conn
                .send_request(
                    request.method,
                    request.url,
                    request.headers,
                    request.body.cloned(),
                )
                .await?;
            return Ok(ExchangeResult {
                response,
                tls_info,
                remote_addr,
            });
        }

        let mut conn = H1Connection::new(stream);
        let response = conn
            .send_request(
                request.method,
                request.url,
                request.headers,
                request.body,
                via_proxy,
                self.config.disable_keep_alive,
            )
            .await?;

        if poolable && !self.config.disable_keep_alive {
            self.h1_pool.checkin(
                key,
                PooledConn {
                    conn,
                    tls_info: tls_info.clone(),
                    remote_addr,
                },
            );
        }

        Ok(ExchangeResult {
            response,
            tls_info,
            remote_addr,
        })
    }

    /// Keep-alive reuse applies only to direct TCP connections.
    fn poolable(&self, dial: &DialConfig) -> bool {
        !self.config.disable_keep_alive
            && self.config.proxy.is_none()
            && dial.unix_socket.is_none()
    }

    /// Number of idle HTTP/1.1 connections currently parked.
    pub fn idle_connections(&self) -> usize {
        self.h1_pool.idle_count()
    }
}

impl Clone for Transport {
    /// Clones share the connection pools; configuration is copied.
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            h1_pool: Arc::clone(&self.h1_pool),
            h2_pool: Arc::clone(&self.h2_pool),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
