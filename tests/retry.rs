//! Retry loop behavior: attempt bounds, wait spacing, status classification.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use helpers::mock_server::{MockResponse, MockServer};
use swell::{Client, Options};

#[tokio::test]
async fn test_retry_exhaustion() {
    let server = MockServer::start(|_| MockResponse::new(503).body("unavailable")).await;

    let mut client = Client::new();
    client
        .set_options(Options::new().retry(3, Some(Duration::from_millis(10))))
        .unwrap();

    let start = Instant::now();
    let response = client.get(server.url()).send().await.unwrap();

    assert_eq!(response.status_code, 503);
    assert_eq!(response.attempts, 3);
    // One initial attempt plus three retries reached the server.
    assert_eq!(server.request_count(), 4);
    // Each retry slept for the configured wait.
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_retry_until_success() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_handler = Arc::clone(&hits);
    let server = MockServer::start(move |_| {
        if hits_handler.fetch_add(1, Ordering::SeqCst) < 2 {
            MockResponse::new(500)
        } else {
            MockResponse::ok("recovered")
        }
    })
    .await;

    let mut client = Client::new();
    client
        .set_options(Options::new().retry(5, Some(Duration::from_millis(1))))
        .unwrap();

    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.attempts, 2);
    assert!(response.body.contains("recovered"));
}

#[tokio::test]
async fn test_no_retry_without_budget() {
    let server = MockServer::start(|_| MockResponse::new(503)).await;
    let client = Client::new();

    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(response.status_code, 503);
    assert_eq!(response.attempts, 0);
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_429_is_retried() {
    let server = MockServer::start(|_| MockResponse::new(429)).await;

    let mut client = Client::new();
    client
        .set_options(Options::new().retry(2, Some(Duration::from_millis(1))))
        .unwrap();

    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(response.attempts, 2);
    assert_eq!(server.request_count(), 3);
    assert_eq!(response.status_code, 429);
}

#[tokio::test]
async fn test_404_is_not_retried() {
    let server = MockServer::start(|_| MockResponse::new(404)).await;

    let mut client = Client::new();
    client
        .set_options(Options::new().retry(3, Some(Duration::from_millis(1))))
        .unwrap();

    let response = client.get(server.url()).send().await.unwrap();
    assert_eq!(response.attempts, 0);
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_post_body_resent_on_retry() {
    let bodies = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let bodies_handler = Arc::clone(&bodies);
    let server = MockServer::start(move |req| {
        let mut seen = bodies_handler.lock().unwrap();
        seen.push(String::from_utf8_lossy(&req.body).into_owned());
        if seen.len() < 3 {
            MockResponse::new(502)
        } else {
            MockResponse::ok("done")
        }
    })
    .await;

    let mut client = Client::new();
    client
        .set_options(Options::new().retry(5, Some(Duration::from_millis(1))))
        .unwrap();

    let response = client
        .post(server.url(), "payload=value")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);

    // Every attempt carried the identical body.
    let seen = bodies.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|b| b == "payload=value"));
}
