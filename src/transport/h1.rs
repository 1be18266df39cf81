//! HTTP/1.1 request serialization and response parsing.
//!
//! Requests are written as raw bytes for full control over the wire format;
//! responses are parsed with httparse. Body framing follows RFC 9112:
//! chunked transfer coding, Content-Length, or close-delimited.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, Method};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::connector::MaybeTlsStream;
use crate::transport::RawResponse;

/// Maximum response head size (64KB).
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum number of response headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// One HTTP/1.1 connection.
pub struct H1Connection {
    stream: MaybeTlsStream,
    /// The connection must not be reused after the current response.
    should_close: bool,
}

impl H1Connection {
    pub fn new(stream: MaybeTlsStream) -> Self {
        Self {
            stream,
            should_close: false,
        }
    }

    /// Whether the connection is unusable for another exchange.
    pub fn should_close(&self) -> bool {
        self.should_close
    }

    /// Send one request and read the complete response.
    ///
    /// `absolute_form` switches the request target to the absolute URL for
    /// untunneled proxy traffic. `close` requests connection teardown.
    pub async fn send_request(
        &mut self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&Bytes>,
        absolute_form: bool,
        close: bool,
    ) -> Result<RawResponse> {
        let head = build_request_head(method, url, headers, body, absolute_form, close)?;

        self.stream.write_all(&head).await.map_err(|e| {
            Error::http_protocol(format!("failed to write request head: {e}"))
        })?;
        if let Some(body) = body {
            self.stream
                .write_all(body)
                .await
                .map_err(|e| Error::http_protocol(format!("failed to write body: {e}")))?;
        }
        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("failed to flush request: {e}")))?;

        if close {
            self.should_close = true;
        }

        self.read_response(method).await
    }

    /// Read and parse a response, consuming any 1xx interim responses.
    async fn read_response(&mut self, method: &Method) -> Result<RawResponse> {
        let mut buffer: Vec<u8> = Vec::with_capacity(8 * 1024);

        loop {
            while find_head_end(&buffer).is_none() {
                if buffer.len() >= MAX_HEAD_SIZE {
                    return Err(Error::http_protocol("response head too large"));
                }
                let mut read_buf = [0u8; 8192];
                let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                    Error::http_protocol(format!("failed to read response: {e}"))
                })?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "connection closed before response complete",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            let (response, consumed) = self.parse_response(&buffer, method).await?;
            buffer.drain(..consumed);

            // Interim responses carry no body and precede the final one.
            if (100..200).contains(&response.status) {
                continue;
            }

            return Ok(response);
        }
    }

    async fn parse_response(
        &mut self,
        buffer: &[u8],
        method: &Method,
    ) -> Result<(RawResponse, usize)> {
        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
        let mut parsed = httparse::Response::new(&mut header_storage);

        let head_len = match parsed
            .parse(buffer)
            .map_err(|e| Error::http_protocol(format!("failed to parse response: {e}")))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                return Err(Error::http_protocol("incomplete response head"));
            }
        };

        let status = parsed
            .code
            .ok_or_else(|| Error::http_protocol("missing status code"))?;
        let proto = format!("HTTP/1.{}", parsed.version.unwrap_or(1));

        let mut headers = HeaderMap::new();
        for header in parsed.headers.iter().filter(|h| !h.name.is_empty()) {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(header.name.as_bytes()),
                HeaderValue::from_bytes(header.value),
            ) {
                headers.append(name, value);
            }
        }

        if let Some(conn) = headers.get(CONNECTION).and_then(|v| v.to_str().ok()) {
            if conn.to_ascii_lowercase().contains("close") {
                self.should_close = true;
            }
        }

        // A HEAD response and 1xx/204/304 statuses never carry a body.
        let has_body =
            !matches!(status, 100..=199 | 204 | 304) && *method != Method::HEAD;
        if !has_body {
            let response = RawResponse::new(status, proto, headers, Bytes::new());
            return Ok((response, head_len));
        }

        let is_chunked = headers
            .get(TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                // chunked must be the final transfer coding
                v.split(',')
                    .next_back()
                    .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        let content_length = if headers.contains_key(TRANSFER_ENCODING) {
            None
        } else {
            match headers.get(CONTENT_LENGTH).and_then(|v| v.to_str().ok()) {
                Some(value) => Some(parse_content_length(value)?),
                None => None,
            }
        };

        let rest = &buffer[head_len..];
        let (body, consumed) = if is_chunked {
            let body = self.read_chunked_body(rest.to_vec()).await?;
            (body, buffer.len())
        } else if let Some(len) = content_length {
            let body = self.read_fixed_body(rest, len).await?;
            (body, head_len + rest.len().min(len))
        } else {
            // Close-delimited body per RFC 9112 §6.3.
            self.should_close = true;
            let body = self.read_until_close(rest).await?;
            (body, buffer.len())
        };

        let response = RawResponse::new(status, proto, headers, body);
        Ok((response, consumed))
    }

    async fn read_until_close(&mut self, initial: &[u8]) -> Result<Bytes> {
        let mut body = initial.to_vec();
        let mut read_buf = [0u8; 8192];
        loop {
            let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                Error::http_protocol(format!("failed to read close-delimited body: {e}"))
            })?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&read_buf[..n]);
        }
        Ok(Bytes::from(body))
    }

    async fn read_fixed_body(&mut self, initial: &[u8], content_length: usize) -> Result<Bytes> {
        let mut body = Vec::with_capacity(content_length);
        body.extend_from_slice(&initial[..initial.len().min(content_length)]);

        while body.len() < content_length {
            let remaining = content_length - body.len();
            let mut chunk = vec![0u8; remaining.min(8192)];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| Error::http_protocol(format!("failed to read body: {e}")))?;
            if n == 0 {
                return Err(Error::http_protocol(format!(
                    "connection closed after {} of {} body bytes",
                    body.len(),
                    content_length
                )));
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Ok(Bytes::from(body))
    }

    /// Read a chunked body per RFC 9112 §7.1, including the trailer section.
    async fn read_chunked_body(&mut self, initial: Vec<u8>) -> Result<Bytes> {
        let mut body = Vec::new();
        let mut buffer = initial;
        let mut read_buf = [0u8; 8192];

        loop {
            let (chunk_size, line_end) = loop {
                if let Some(found) = find_chunk_size(&buffer) {
                    break found;
                }
                let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                    Error::http_protocol(format!("failed to read chunk size: {e}"))
                })?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "connection closed while reading chunk size",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            };

            buffer.drain(..line_end);

            if chunk_size == 0 {
                self.consume_trailers(&mut buffer).await?;
                break;
            }

            let chunk_end = chunk_size + 2; // data + CRLF
            while buffer.len() < chunk_end {
                let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                    Error::http_protocol(format!("failed to read chunk data: {e}"))
                })?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "connection closed while reading chunk data",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            body.extend_from_slice(&buffer[..chunk_size]);
            buffer.drain(..chunk_end);
        }

        Ok(Bytes::from(body))
    }

    /// Skip trailer fields after the last chunk; ends at the empty line.
    async fn consume_trailers(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        let mut read_buf = [0u8; 4096];
        loop {
            if let Some(pos) = find_crlf(buffer) {
                if pos == 0 {
                    buffer.drain(..2);
                    return Ok(());
                }
                buffer.drain(..pos + 2);
                continue;
            }

            let n = self
                .stream
                .read(&mut read_buf)
                .await
                .map_err(|e| Error::http_protocol(format!("failed to read trailers: {e}")))?;
            if n == 0 {
                // Connection closed; absent trailers are acceptable.
                return Ok(());
            }
            buffer.extend_from_slice(&read_buf[..n]);
        }
    }
}

/// Serialize the request line and headers.
fn build_request_head(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    body: Option<&Bytes>,
    absolute_form: bool,
    close: bool,
) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(1024);

    head.extend_from_slice(method.as_str().as_bytes());
    head.push(b' ');
    if absolute_form {
        head.extend_from_slice(url.as_str().as_bytes());
    } else {
        head.extend_from_slice(url.path().as_bytes());
        if let Some(query) = url.query() {
            head.push(b'?');
            head.extend_from_slice(query.as_bytes());
        }
    }
    head.extend_from_slice(b" HTTP/1.1\r\n");

    if !headers.contains_key(HOST) {
        head.extend_from_slice(b"Host: ");
        if let Some(host) = url.host_str() {
            head.extend_from_slice(host.as_bytes());
            if let Some(port) = url.port() {
                head.extend_from_slice(format!(":{port}").as_bytes());
            }
        }
        head.extend_from_slice(b"\r\n");
    }

    for (name, value) in headers {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    if !headers.contains_key(CONNECTION) {
        if close {
            head.extend_from_slice(b"Connection: close\r\n");
        } else {
            head.extend_from_slice(b"Connection: keep-alive\r\n");
        }
    }

    if let Some(body) = body {
        let framed = headers.contains_key(CONTENT_LENGTH) || headers.contains_key(TRANSFER_ENCODING);
        if !framed {
            head.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
    }

    head.extend_from_slice(b"\r\n");
    Ok(head)
}

/// Position just past the `\r\n\r\n` terminating the head.
fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse a chunk-size line, returning (size, bytes consumed by the line).
fn find_chunk_size(buffer: &[u8]) -> Option<(usize, usize)> {
    let pos = find_crlf(buffer)?;
    let line = std::str::from_utf8(&buffer[..pos]).ok()?;
    let size_part = line.split(';').next()?;
    let size = usize::from_str_radix(size_part.trim(), 16).ok()?;
    Some((size, pos + 2))
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Parse Content-Length per RFC 9112 §6.2: non-negative, and when repeated
/// all values must agree.
fn parse_content_length(value: &str) -> Result<usize> {
    let mut parts = value.split(',').map(str::trim);
    let first = parts
        .next()
        .and_then(|v| v.parse::<usize>().ok())
        .ok_or_else(|| Error::http_protocol(format!("invalid Content-Length: {value}")))?;

    for part in parts {
        let parsed = part
            .parse::<usize>()
            .map_err(|_| Error::http_protocol(format!("invalid Content-Length: {value}")))?;
        if parsed != first {
            return Err(Error::http_protocol(format!(
                "conflicting Content-Length values: {value}"
            )));
        }
    }

    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_head_end() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(find_head_end(data), Some(38));
        assert_eq!(find_head_end(b"HTTP/1.1 200 OK\r\n"), None);
    }

    #[test]
    fn test_find_chunk_size() {
        assert_eq!(find_chunk_size(b"5\r\nhello"), Some((5, 3)));
        assert_eq!(find_chunk_size(b"a\r\n0123456789"), Some((10, 3)));
        assert_eq!(find_chunk_size(b"0\r\n"), Some((0, 3)));
        assert_eq!(find_chunk_size(b"5;ext=val\r\ndata"), Some((5, 11)));
        assert_eq!(find_chunk_size(b"zz\r\n"), None);
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length("42").unwrap(), 42);
        assert_eq!(parse_content_length("42, 42").unwrap(), 42);
        assert!(parse_content_length("-1").is_err());
        assert!(parse_content_length("42, 43").is_err());
        assert!(parse_content_length("abc").is_err());
    }

    #[test]
    fn test_build_request_head_origin_form() {
        let url = Url::parse("http://example.com:8080/path?q=1").unwrap();
        let head = build_request_head(&Method::GET, &url, &HeaderMap::new(), None, false, false)
            .unwrap();
        let text = String::from_utf8(head).unwrap();
        assert!(text.starts_with("GET /path?q=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com:8080\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_build_request_head_absolute_form() {
        let url = Url::parse("http://example.com/x").unwrap();
        let head = build_request_head(&Method::GET, &url, &HeaderMap::new(), None, true, false)
            .unwrap();
        let text = String::from_utf8(head).unwrap();
        assert!(text.starts_with("GET http://example.com/x HTTP/1.1\r\n"));
    }

    #[test]
    fn test_build_request_head_content_length_and_close() {
        let url = Url::parse("http://example.com/").unwrap();
        let body = Bytes::from_static(b"hello");
        let head =
            build_request_head(&Method::POST, &url, &HeaderMap::new(), Some(&body), false, true)
                .unwrap();
        let text = String::from_utf8(head).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.contains("Connection: close\r\n"));
    }
}
