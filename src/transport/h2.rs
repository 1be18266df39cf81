//! HTTP/2 exchanges over the h2 crate.
//!
//! A connection is established once per origin after ALPN selects `h2`; the
//! `SendRequest` handle is cheaply cloneable, so a single connection
//! multiplexes concurrent requests. A background task drives connection I/O.

use bytes::Bytes;
use h2::client::SendRequest;
use http::{HeaderMap, Method, Request, Version};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::connector::MaybeTlsStream;
use crate::transport::RawResponse;

/// A multiplexed HTTP/2 connection.
#[derive(Clone)]
pub struct H2Connection {
    send_request: SendRequest<Bytes>,
}

impl H2Connection {
    /// Perform the HTTP/2 handshake and spawn the connection driver.
    pub async fn connect(stream: MaybeTlsStream) -> Result<Self> {
        let (send_request, connection) = h2::client::handshake(stream)
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/2 handshake failed: {e}")))?;

        // Without the driver no frames move.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "HTTP/2 connection terminated");
            }
        });

        Ok(Self { send_request })
    }

    /// Send one request over an existing stream slot.
    pub async fn send_request(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<RawResponse> {
        let mut handle = self
            .send_request
            .clone()
            .ready()
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/2 not ready: {e}")))?;

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .version(Version::HTTP_2);
        if let Some(request_headers) = builder.headers_mut() {
            for (name, value) in headers {
                // Connection-specific headers are illegal in HTTP/2.
                if name == &http::header::CONNECTION || name == &http::header::HOST {
                    continue;
                }
                request_headers.append(name.clone(), value.clone());
            }
        }
        let request = builder
            .body(())
            .map_err(|e| Error::http_protocol(format!("invalid HTTP/2 request: {e}")))?;

        let end_of_stream = body.is_none();
        let (response, mut send_stream) = handle
            .send_request(request, end_of_stream)
            .map_err(|e| Error::http_protocol(format!("HTTP/2 send failed: {e}")))?;

        if let Some(body) = body {
            send_stream
                .send_data(body, true)
                .map_err(|e| Error::http_protocol(format!("HTTP/2 body send failed: {e}")))?;
        }

        let response = response
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/2 response failed: {e}")))?;
        let (parts, mut recv_stream) = response.into_parts();

        let mut body = Vec::new();
        while let Some(chunk) = recv_stream.data().await {
            let chunk =
                chunk.map_err(|e| Error::http_protocol(format!("HTTP/2 body read: {e}")))?;
            body.extend_from_slice(&chunk);
            let _ = recv_stream.flow_control().release_capacity(chunk.len());
        }

        Ok(RawResponse::new(
            parts.status.as_u16(),
            "HTTP/2.0".to_string(),
            parts.headers,
            Bytes::from(body),
        ))
    }
}

impl std::fmt::Debug for H2Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("H2Connection")
    }
}
