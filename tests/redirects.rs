//! Redirect policy: bounds, host restriction, header forwarding, history.

mod helpers;

use helpers::mock_server::{MockResponse, MockServer};
use swell::{Client, Options, RedirectAction};

/// A server redirecting `/hop/N` to `/hop/N+1` until `chain_len`, then
/// serving 200 at the last hop.
async fn redirect_chain(chain_len: usize) -> MockServer {
    MockServer::start(move |req| {
        let hop: usize = req
            .target
            .rsplit('/')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        if hop < chain_len {
            MockResponse::new(302).header("Location", format!("/hop/{}", hop + 1))
        } else {
            MockResponse::ok(format!("arrived at {hop}"))
        }
    })
    .await
}

#[tokio::test]
async fn test_follows_chain_to_final() {
    let server = redirect_chain(3).await;
    let client = Client::new();

    let response = client.get(server.url_path("/hop/0")).send().await.unwrap();

    assert_eq!(response.status_code, 200);
    assert!(response.body.contains("arrived at 3"));
    assert!(response.url.path().ends_with("/hop/3"));
}

#[tokio::test]
async fn test_max_redirects_uses_last_response() {
    let server = redirect_chain(6).await;

    let mut client = Client::new();
    client
        .set_options(Options::new().max_redirects(4).history())
        .unwrap();

    let response = client.get(server.url_path("/hop/0")).send().await.unwrap();

    // Four hops were followed; the fifth redirect is returned as-is.
    assert_eq!(response.status_code, 302);
    assert!(response.is_redirect());
    assert_eq!(response.history.len(), 4);
    assert_eq!(response.history.status_codes(), vec![302, 302, 302, 302]);
    // 1 original + 4 followed hops reached the server.
    assert_eq!(server.request_count(), 5);
}

#[tokio::test]
async fn test_history_disabled_by_default() {
    let server = redirect_chain(2).await;
    let client = Client::new();

    let response = client.get(server.url_path("/hop/0")).send().await.unwrap();
    assert!(response.history.is_empty());
}

#[tokio::test]
async fn test_host_only_redirects() {
    // The cross-host hop points at "localhost", which resolves to the same
    // listener but is a different host string than 127.0.0.1.
    let server = MockServer::start(|req| {
        if req.target == "/cross" {
            let host = req.header("host").unwrap_or_default().to_string();
            let port = host.rsplit(':').next().unwrap_or("80").to_string();
            MockResponse::new(302).header("Location", format!("http://localhost:{port}/final"))
        } else {
            MockResponse::ok("followed")
        }
    })
    .await;

    let mut client = Client::new();
    client
        .set_options(Options::new().follow_only_host_redirects())
        .unwrap();

    let response = client.get(server.url_path("/cross")).send().await.unwrap();

    // The cross-host hop terminates with the pre-hop response.
    assert_eq!(response.status_code, 302);
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_forward_headers_on_redirect() {
    let server = MockServer::start(|req| {
        if req.target == "/start" {
            MockResponse::new(302).header("Location", "/final")
        } else {
            MockResponse::ok(req.header("x-custom").unwrap_or_default().to_string())
        }
    })
    .await;

    let mut client = Client::new();
    client
        .set_options(Options::new().forward_headers_on_redirect())
        .unwrap();

    let response = client
        .get(server.url_path("/start"))
        .set_headers([("X-Custom", "carried")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.body.string().unwrap(), "carried");
}

#[tokio::test]
async fn test_headers_not_forwarded_by_default() {
    let server = MockServer::start(|req| {
        if req.target == "/start" {
            MockResponse::new(302).header("Location", "/final")
        } else {
            MockResponse::ok(req.header("x-custom").unwrap_or_default().to_string())
        }
    })
    .await;

    let client = Client::new();
    let response = client
        .get(server.url_path("/start"))
        .set_headers([("X-Custom", "carried")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.body.string().unwrap(), "");
}

#[tokio::test]
async fn test_custom_redirect_policy() {
    let server = redirect_chain(3).await;

    let mut client = Client::new();
    client
        .set_options(Options::new().redirect_policy(|_attempt| RedirectAction::Stop))
        .unwrap();

    let response = client.get(server.url_path("/hop/0")).send().await.unwrap();
    assert_eq!(response.status_code, 302);
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_referer_set_on_hops() {
    let server = MockServer::start(|req| {
        if req.target == "/start" {
            MockResponse::new(302).header("Location", "/final")
        } else {
            MockResponse::ok(req.header("referer").unwrap_or_default().to_string())
        }
    })
    .await;

    let client = Client::new();
    let response = client.get(server.url_path("/start")).send().await.unwrap();

    let echoed = response.body.string().unwrap();
    assert!(echoed.ends_with("/start"), "referer was {echoed:?}");
    assert_eq!(response.referer().unwrap(), echoed);
}

#[tokio::test]
async fn test_303_switches_to_get() {
    let server = MockServer::start(|req| {
        if req.target == "/submit" {
            MockResponse::new(303).header("Location", "/result")
        } else {
            MockResponse::ok(format!("{} len={}", req.method, req.body.len()))
        }
    })
    .await;

    let client = Client::new();
    let response = client
        .post(server.url_path("/submit"), "a=1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.body.string().unwrap(), "GET len=0");
}

#[tokio::test]
async fn test_cookies_stored_across_redirect() {
    let server = MockServer::start(|req| {
        if req.target == "/start" {
            MockResponse::new(302)
                .header("Location", "/final")
                .header("Set-Cookie", "hop=1; Path=/")
        } else {
            MockResponse::ok(req.header("cookie").unwrap_or_default().to_string())
        }
    })
    .await;

    let mut client = Client::new();
    client.set_options(Options::new().session()).unwrap();

    let response = client.get(server.url_path("/start")).send().await.unwrap();
    assert!(response.body.contains("hop=1"));
}
