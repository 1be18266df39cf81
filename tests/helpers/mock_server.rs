//! Minimal HTTP/1.1 mock server for integration tests.
//!
//! Accepts keep-alive connections, parses one request at a time, and
//! answers through a caller-supplied handler. Request counting is exposed
//! for assertions about retries and pooling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A parsed incoming request.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    /// First header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The canned reply a handler produces.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200).body(body)
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status)).as_bytes(),
        );
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

type Handler = dyn Fn(&ReceivedRequest) -> MockResponse + Send + Sync;

/// A running mock server.
pub struct MockServer {
    port: u16,
    requests: Arc<AtomicUsize>,
}

impl MockServer {
    /// Bind a random local port and serve with `handler`.
    pub async fn start(
        handler: impl Fn(&ReceivedRequest) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let port = listener.local_addr().expect("local addr").port();
        let requests = Arc::new(AtomicUsize::new(0));

        let handler: Arc<Handler> = Arc::new(handler);
        let counter = Arc::clone(&requests);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let handler = Arc::clone(&handler);
                let counter = Arc::clone(&counter);
                tokio::spawn(handle_connection(stream, handler, counter));
            }
        });

        Self { port, requests }
    }

    /// A server that always answers 200 with `body`.
    pub async fn echo(body: &'static str) -> Self {
        Self::start(move |_| MockResponse::ok(body)).await
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn url_path(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    /// Total requests served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    counter: Arc<AtomicUsize>,
) {
    let mut buffer: Vec<u8> = Vec::with_capacity(8 * 1024);

    loop {
        // Read one request head.
        let head_end = loop {
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let mut read_buf = [0u8; 4096];
            match stream.read(&mut read_buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buffer.extend_from_slice(&read_buf[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buffer[..head_end]).into_owned();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let target = parts.next().unwrap_or_default().to_string();

        let headers: Vec<(String, String)> = lines
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);

        while buffer.len() < head_end + content_length {
            let mut read_buf = [0u8; 4096];
            match stream.read(&mut read_buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buffer.extend_from_slice(&read_buf[..n]),
            }
        }

        let body = buffer[head_end..head_end + content_length].to_vec();
        buffer.drain(..head_end + content_length);

        let request = ReceivedRequest {
            method,
            target,
            headers,
            body,
        };

        counter.fetch_add(1, Ordering::SeqCst);
        let response = handler(&request);
        let close = request
            .header("connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false);

        if stream.write_all(&response.serialize()).await.is_err() {
            return;
        }
        let _ = stream.flush().await;

        if close {
            return;
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
