//! Body semantics over the wire: limits, caching, deflate, dumps.

mod helpers;

use std::io::Write;

use helpers::mock_server::{MockResponse, MockServer};
use swell::{Client, Options};

#[tokio::test]
async fn test_body_limit_over_wire() {
    let server = MockServer::echo("0123456789abcdef").await;
    let client = Client::new();

    let response = client.get(server.url()).send().await.unwrap();
    let bytes = response.body.limit(5).bytes().unwrap();
    assert_eq!(bytes.as_ref(), b"01234");
}

#[tokio::test]
async fn test_body_consumed_once_without_cache() {
    let server = MockServer::echo("read me").await;
    let client = Client::new();

    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(response.body.string().unwrap(), "read me");
    assert_eq!(response.body.string().unwrap(), "");
}

#[tokio::test]
async fn test_body_cache_rereads() {
    let server = MockServer::echo("cache me").await;

    let mut client = Client::new();
    client.set_options(Options::new().cache_body()).unwrap();

    let response = client.get(server.url()).send().await.unwrap();
    let first = response.body.bytes().unwrap();
    let second = response.body.bytes().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.as_ref(), b"cache me");
}

#[tokio::test]
async fn test_deflate_transparency() {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"the inflated payload").unwrap();
    let compressed = encoder.finish().unwrap();

    let server = MockServer::start(move |_| {
        MockResponse::new(200)
            .body(compressed.clone())
            .header("Content-Encoding", "deflate")
            .header("Content-Type", "text/plain")
    })
    .await;

    let client = Client::new();
    let response = client.get(server.url()).send().await.unwrap();

    assert!(response.body.deflate());
    assert_eq!(response.body.string().unwrap(), "the inflated payload");
}

#[tokio::test]
async fn test_gzip_decoding() {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"gzip payload").unwrap();
    let compressed = encoder.finish().unwrap();

    let server = MockServer::start(move |_| {
        MockResponse::new(200)
            .body(compressed.clone())
            .header("Content-Encoding", "gzip")
    })
    .await;

    let client = Client::new();
    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(response.body.string().unwrap(), "gzip payload");
}

#[tokio::test]
async fn test_body_json_over_wire() {
    #[derive(serde::Deserialize)]
    struct Answer {
        value: i32,
    }

    let server = MockServer::start(|_| {
        MockResponse::ok(r#"{"value": 42}"#).header("Content-Type", "application/json")
    })
    .await;

    let client = Client::new();
    let response = client.get(server.url()).send().await.unwrap();
    let answer: Answer = response.body.json().unwrap();
    assert_eq!(answer.value, 42);
}

#[tokio::test]
async fn test_body_md5() {
    let server = MockServer::echo("abc").await;
    let client = Client::new();

    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(
        response.body.md5().unwrap(),
        "900150983cd24fb0d6963f7d28e17f72"
    );
}

#[tokio::test]
async fn test_body_utf8_charset() {
    let (encoded, _, _) = encoding_rs::WINDOWS_1251.encode("привет мир");
    let body = encoded.into_owned();

    let server = MockServer::start(move |_| {
        MockResponse::new(200)
            .body(body.clone())
            .header("Content-Type", "text/plain; charset=windows-1251")
    })
    .await;

    let client = Client::new();
    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(response.body.utf8().unwrap(), "привет мир");
}

#[tokio::test]
async fn test_body_dump_to_file() {
    let server = MockServer::echo("dump contents").await;
    let client = Client::new();

    let response = client.get(server.url()).send().await.unwrap();

    let dir = std::env::temp_dir().join(format!("swell-dump-{}", std::process::id()));
    let path = dir.join("nested/body.txt");
    response.body.dump(&path).await.unwrap();

    let written = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(written, "dump contents");
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_body_stream() {
    use tokio::io::AsyncReadExt;

    let server = MockServer::echo("streamed body").await;
    let client = Client::new();

    let response = client.get(server.url()).send().await.unwrap();
    let mut reader = response.body.stream();
    let mut content = String::new();
    reader.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "streamed body");
}

#[tokio::test]
async fn test_content_length_field() {
    let server = MockServer::echo("12345").await;
    let client = Client::new();

    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(response.content_length, 5);
}

#[tokio::test]
async fn test_chunked_response() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Hand-rolled chunked response; the shared mock server always uses
    // Content-Length.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf).await;
        let reply = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                     5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let _ = stream.write_all(reply.as_bytes()).await;
    });

    let client = Client::new();
    let response = client
        .get(format!("http://127.0.0.1:{port}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.body.string().unwrap(), "hello world");
}
