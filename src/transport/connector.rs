//! Stream establishment: TCP (optionally through an HTTP proxy or a Unix
//! domain socket) followed by an optional BoringSSL handshake.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use boring::ssl::{SslConnector, SslMethod, SslVerifyMode};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_boring::SslStream;
use url::Url;

use crate::dns::{CacheDialer, HostResolver};
use crate::error::{Error, Result};
use crate::tls::TlsInfo;

/// Dial policy: timeouts, local binding, and the resolution path.
#[derive(Debug, Clone)]
pub struct DialConfig {
    /// TCP connect deadline.
    pub connect_timeout: Duration,
    /// TCP keep-alive probe interval.
    pub keep_alive: Duration,
    /// Local address to bind outgoing sockets to.
    pub local_addr: Option<IpAddr>,
    /// Plain resolver used when no DNS cache is installed.
    pub resolver: Arc<HostResolver>,
    /// DNS cache in front of the resolver.
    pub dns_cache: Option<Arc<CacheDialer>>,
    /// Route every connection through a Unix domain socket instead of TCP.
    pub unix_socket: Option<PathBuf>,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(15),
            local_addr: None,
            resolver: Arc::new(HostResolver::System),
            dns_cache: None,
            unix_socket: None,
        }
    }
}

/// TLS policy for the connector.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Verify the peer certificate chain and hostname.
    pub verify: bool,
    /// Offer `h2` in ALPN alongside `http/1.1`.
    pub alpn_h2: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify: true,
            alpn_h2: false,
        }
    }
}

/// Stream that can be plain TCP, TLS over TCP, or a Unix domain socket.
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<SslStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl MaybeTlsStream {
    /// Whether ALPN selected HTTP/2.
    pub fn is_h2(&self) -> bool {
        match self {
            Self::Tls(stream) => stream.ssl().selected_alpn_protocol() == Some(b"h2"),
            _ => false,
        }
    }
}

/// An established connection plus the metadata captured while dialing.
pub struct Established {
    pub stream: MaybeTlsStream,
    /// Peer address of the TCP leg, when there is one.
    pub remote_addr: Option<SocketAddr>,
    /// TLS session metadata, when a handshake ran.
    pub tls_info: Option<TlsInfo>,
    /// The connection goes through an HTTP proxy without tunneling, so
    /// requests must use the absolute form.
    pub via_proxy: bool,
}

/// Dials streams according to the client's dial, TLS, and proxy policy.
pub struct Connector;

impl Connector {
    /// Establish a connection for `url`.
    pub async fn connect(
        dial: &DialConfig,
        tls: &TlsConfig,
        proxy: Option<&Url>,
        url: &Url,
    ) -> Result<Established> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::connection("missing host in URL"))?;
        let https = url.scheme() == "https";
        let port = url
            .port()
            .unwrap_or(if https { 443 } else { 80 });

        #[cfg(unix)]
        if let Some(path) = &dial.unix_socket {
            let stream = UnixStream::connect(path).await?;
            return Ok(Established {
                stream: MaybeTlsStream::Unix(stream),
                remote_addr: None,
                tls_info: None,
                via_proxy: false,
            });
        }

        if let Some(proxy) = proxy {
            return Self::connect_via_proxy(dial, tls, proxy, host, port, https).await;
        }

        let tcp = Self::dial_tcp(dial, host, port).await?;
        let remote_addr = tcp.peer_addr().ok();

        if https {
            let stream = Self::handshake(tls, host, tcp).await?;
            let tls_info = TlsInfo::from_ssl(stream.ssl(), host);
            Ok(Established {
                stream: MaybeTlsStream::Tls(Box::new(stream)),
                remote_addr,
                tls_info: Some(tls_info),
                via_proxy: false,
            })
        } else {
            Ok(Established {
                stream: MaybeTlsStream::Plain(tcp),
                remote_addr,
                tls_info: None,
                via_proxy: false,
            })
        }
    }

    /// Open a TCP connection, resolving the host through the DNS cache when
    /// one is installed.
    async fn dial_tcp(dial: &DialConfig, host: &str, port: u16) -> Result<TcpStream> {
        let ip: IpAddr = if let Some(cache) = &dial.dns_cache {
            cache.resolve(host).await?.into()
        } else if let Ok(literal) = host.parse::<IpAddr>() {
            literal
        } else {
            let ips = dial.resolver.lookup(host).await?;
            ips[0].into()
        };

        let addr = SocketAddr::new(ip, port);
        tracing::debug!(%addr, host, "dialing");

        let stream = tokio::time::timeout(dial.connect_timeout, async {
            match dial.local_addr {
                Some(local) => {
                    let socket = match local {
                        IpAddr::V4(_) => tokio::net::TcpSocket::new_v4()?,
                        IpAddr::V6(_) => tokio::net::TcpSocket::new_v6()?,
                    };
                    socket.bind(SocketAddr::new(local, 0))?;
                    socket.connect(addr).await
                }
                None => TcpStream::connect(addr).await,
            }
        })
        .await
        .map_err(|_| Error::Timeout(dial.connect_timeout))?
        .map_err(|e| Error::connection(format!("dial {addr} failed: {e}")))?;

        let keepalive = TcpKeepalive::new()
            .with_time(dial.keep_alive)
            .with_interval(dial.keep_alive);
        if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
            tracing::debug!(error = %e, "failed to enable TCP keep-alive");
        }

        Ok(stream)
    }

    /// Connect through an HTTP proxy. HTTPS targets are tunneled with
    /// CONNECT; plain HTTP targets reuse the proxy connection with
    /// absolute-form request targets.
    async fn connect_via_proxy(
        dial: &DialConfig,
        tls: &TlsConfig,
        proxy: &Url,
        host: &str,
        port: u16,
        https: bool,
    ) -> Result<Established> {
        let proxy_host = proxy
            .host_str()
            .ok_or_else(|| Error::config("proxy URL missing host"))?;
        let proxy_port = proxy.port().unwrap_or(if proxy.scheme() == "https" {
            443
        } else {
            80
        });

        let mut tcp = Self::dial_tcp(dial, proxy_host, proxy_port).await?;
        let remote_addr = tcp.peer_addr().ok();

        if !https {
            return Ok(Established {
                stream: MaybeTlsStream::Plain(tcp),
                remote_addr,
                tls_info: None,
                via_proxy: true,
            });
        }

        let connect = format!(
            "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n"
        );
        tcp.write_all(connect.as_bytes()).await?;
        tcp.flush().await?;

        Self::read_connect_response(&mut tcp).await?;

        let stream = Self::handshake(tls, host, tcp).await?;
        let tls_info = TlsInfo::from_ssl(stream.ssl(), host);

        Ok(Established {
            stream: MaybeTlsStream::Tls(Box::new(stream)),
            remote_addr,
            tls_info: Some(tls_info),
            via_proxy: false,
        })
    }

    /// Read the proxy's CONNECT response head and require a 2xx.
    async fn read_connect_response(tcp: &mut TcpStream) -> Result<()> {
        let mut buffer = Vec::with_capacity(256);
        let mut byte = [0u8; 1];
        while !buffer.ends_with(b"\r\n\r\n") {
            if buffer.len() > 8 * 1024 {
                return Err(Error::connection("proxy CONNECT response too large"));
            }
            let n = tcp.read(&mut byte).await?;
            if n == 0 {
                return Err(Error::connection("proxy closed during CONNECT"));
            }
            buffer.push(byte[0]);
        }

        let head = String::from_utf8_lossy(&buffer);
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| Error::connection("malformed proxy CONNECT response"))?;

        if !(200..300).contains(&status) {
            return Err(Error::connection(format!(
                "proxy CONNECT refused with status {status}"
            )));
        }

        Ok(())
    }

    /// Run the BoringSSL client handshake over an established TCP stream.
    async fn handshake(
        tls: &TlsConfig,
        host: &str,
        tcp: TcpStream,
    ) -> Result<SslStream<TcpStream>> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("SSL connector: {e}")))?;

        if !tls.verify {
            builder.set_verify(SslVerifyMode::NONE);
        }

        let alpn: &[u8] = if tls.alpn_h2 {
            b"\x02h2\x08http/1.1"
        } else {
            b"\x08http/1.1"
        };
        builder
            .set_alpn_protos(alpn)
            .map_err(|e| Error::tls(format!("ALPN: {e}")))?;

        let mut config = builder
            .build()
            .configure()
            .map_err(|e| Error::tls(format!("SSL configure: {e}")))?;
        if !tls.verify {
            config.set_verify_hostname(false);
        }

        tokio_boring::connect(config, host, tcp)
            .await
            .map_err(|e| Error::tls(format!("handshake with {host} failed: {e}")))
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for MaybeTlsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("MaybeTlsStream::Plain"),
            Self::Tls(_) => f.write_str("MaybeTlsStream::Tls"),
            #[cfg(unix)]
            Self::Unix(_) => f.write_str("MaybeTlsStream::Unix"),
        }
    }
}
