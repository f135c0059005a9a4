//! Integration tests for the authorized forwarding path: credential
//! rewriting, the role gate, and relaying upstream bodies.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use reddit_forward_proxy::auth::{AuthError, AuthorizationGate, AuthorizationVerifier, Principal};
use reddit_forward_proxy::error::ErrorEnvelope;
use reddit_forward_proxy::events::{EventSink, ProxyEvent};
use reddit_forward_proxy::server::{self, AppState, REQUIRED_ROLE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Grants `REQUIRED_ROLE` to a fixed set of tokens and remembers every
/// token it was asked about.
#[derive(Default)]
struct FakeVerifier {
    seen: Mutex<Vec<String>>,
}

impl FakeVerifier {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorizationVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        self.seen.lock().unwrap().push(token.to_string());
        let roles = match token {
            "granted" | "secret123" | "queryToken" => vec![REQUIRED_ROLE, "viewer"],
            "headerToken" | "no-role" => vec!["viewer"],
            _ => return Err(AuthError::InvalidCredential("unknown token".into())),
        };
        Ok(Principal {
            subject: format!("user-{token}"),
            roles: roles.into_iter().map(String::from).collect(),
        })
    }
}

#[derive(Debug, Default)]
struct Recorder(Mutex<Vec<ProxyEvent>>);

impl EventSink for Recorder {
    fn record(&self, event: ProxyEvent) {
        self.0.lock().unwrap().push(event);
    }
}

impl Recorder {
    fn events(&self) -> Vec<ProxyEvent> {
        self.0.lock().unwrap().clone()
    }
}

struct TestProxy {
    addr: SocketAddr,
    verifier: Arc<FakeVerifier>,
    events: Arc<Recorder>,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestProxy {
    fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{path_and_query}", self.addr)
    }

    fn stop(self) {
        let _ = self.shutdown.send(());
    }
}

async fn start_proxy(upstream_timeout: Option<Duration>) -> TestProxy {
    let verifier = Arc::new(FakeVerifier::default());
    let events = Arc::new(Recorder::default());
    let gate = AuthorizationGate::new(REQUIRED_ROLE, verifier.clone(), events.clone());
    let state = Arc::new(AppState {
        http_client: server::build_http_client(),
        upstream_timeout,
        events: events.clone(),
    });

    let router = server::build_router(state, &gate);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    TestProxy {
        addr,
        verifier,
        events,
        shutdown,
    }
}

async fn count_hit(
    State(hits): State<Arc<AtomicUsize>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

/// Upstream origin with a hit counter.
async fn start_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/data",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    [("content-type", "text/x-upstream"), ("x-upstream", "1")],
                    "hello",
                )
            }),
        )
        .route(
            "/headers",
            get(|headers: HeaderMap| async move {
                let user_agent = headers
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let authorization = headers.contains_key("authorization");
                format!("{user_agent}|authorization={authorization}")
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .layer(axum::middleware::from_fn_with_state(hits.clone(), count_hit));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, hits)
}

/// Raw TCP origin that answers every request with `response` and then
/// closes the connection, whatever the advertised length.
async fn start_raw_upstream(response: impl Into<String>) -> SocketAddr {
    let response: String = response.into();
    let response: Arc<str> = Arc::from(response);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let response = Arc::clone(&response);
            tokio::spawn(async move {
                // Drain the request head so closing does not reset the connection.
                let mut buf = Vec::new();
                let mut chunk = [0_u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.flush().await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

fn encode(url: &str) -> String {
    url::form_urlencoded::byte_serialize(url.as_bytes()).collect()
}

#[tokio::test]
async fn missing_url_is_rejected_without_fetching() {
    let (_, hits) = start_upstream().await;
    let proxy = start_proxy(None).await;

    for path in ["/api/proxy", "/api/proxy?url="] {
        let resp = reqwest::Client::new()
            .get(proxy.url(path))
            .bearer_auth("granted")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(
            resp.text().await.unwrap(),
            r#"{"error":"missing url parameter"}"#
        );
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    proxy.stop();
}

#[tokio::test]
async fn caller_without_role_never_reaches_upstream() {
    let (upstream, hits) = start_upstream().await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/data"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("no-role")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 403);
    let body: ErrorEnvelope = resp.json().await.unwrap();
    assert_eq!(body, ErrorEnvelope::new("forbidden"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    proxy.stop();
}

#[tokio::test]
async fn caller_without_credential_is_unauthorized() {
    let (upstream, hits) = start_upstream().await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/data"));

    let resp = reqwest::get(proxy.url(&format!("/api/proxy?url={target}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers()["www-authenticate"], "Bearer");
    let body: ErrorEnvelope = resp.json().await.unwrap();
    assert_eq!(body, ErrorEnvelope::new("unauthorized"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(proxy.verifier.seen().is_empty());

    proxy.stop();
}

#[tokio::test]
async fn api_key_query_reaches_gate_as_bearer_header() {
    let (upstream, _) = start_upstream().await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/data"));

    let resp = reqwest::get(proxy.url(&format!("/api/proxy?apiKey=secret123&url={target}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(proxy.verifier.seen(), vec!["secret123".to_string()]);
    assert!(proxy.events.events().contains(&ProxyEvent::CredentialRewritten {
        path: "/api/proxy".into(),
    }));

    proxy.stop();
}

#[tokio::test]
async fn api_key_query_overrides_authorization_header() {
    let (upstream, _) = start_upstream().await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/data"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?apiKey=queryToken&url={target}")))
        .bearer_auth("headerToken")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(proxy.verifier.seen(), vec!["queryToken".to_string()]);

    proxy.stop();
}

#[tokio::test]
async fn upstream_body_is_relayed_with_fixed_200_and_no_upstream_headers() {
    let (upstream, hits) = start_upstream().await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/data"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("granted")
        .send()
        .await
        .unwrap();

    // Upstream answered 404; the caller still sees 200.
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("x-upstream").is_none());
    assert!(resp.headers().get("content-type").is_none());
    assert_eq!(resp.text().await.unwrap(), "hello");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    proxy.stop();
}

#[tokio::test]
async fn outbound_request_carries_only_the_proxy_identity() {
    let (upstream, _) = start_upstream().await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/headers"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("granted")
        .header("user-agent", "caller/1.0")
        .send()
        .await
        .unwrap();

    assert_eq!(
        resp.text().await.unwrap(),
        "reddit-forward-proxy/0.1|authorization=false"
    );

    proxy.stop();
}

#[tokio::test]
async fn identical_requests_fetch_twice() {
    let (upstream, hits) = start_upstream().await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/data"));
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .get(proxy.url(&format!("/api/proxy?url={target}")))
            .bearer_auth("granted")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), "hello");
    }

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(proxy.verifier.seen().len(), 2);

    proxy.stop();
}

#[tokio::test]
async fn transport_failure_is_a_500_envelope() {
    // Bind then drop to get a port nobody listens on.
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_addr = closed.local_addr().unwrap();
    drop(closed);

    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{closed_addr}/data"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("granted")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: ErrorEnvelope = resp.json().await.unwrap();
    assert!(!body.error.is_empty());
    assert!(proxy
        .events
        .events()
        .iter()
        .any(|e| matches!(e, ProxyEvent::ForwardFailed { .. })));

    proxy.stop();
}

#[tokio::test]
async fn malformed_url_is_a_500_without_fetching() {
    let (_, hits) = start_upstream().await;
    let proxy = start_proxy(None).await;

    let resp = reqwest::Client::new()
        .get(proxy.url("/api/proxy?url=not%20a%20url"))
        .bearer_auth("granted")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: ErrorEnvelope = resp.json().await.unwrap();
    assert!(body.error.contains("not a url"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    proxy.stop();
}

#[tokio::test]
async fn configured_upstream_timeout_is_a_500() {
    let (upstream, _) = start_upstream().await;
    let proxy = start_proxy(Some(Duration::from_millis(100))).await;
    let target = encode(&format!("http://{upstream}/slow"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("granted")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: ErrorEnvelope = resp.json().await.unwrap();
    assert_eq!(body.error, "upstream did not respond within 100ms");

    proxy.stop();
}

#[tokio::test]
async fn upstream_failing_before_first_byte_is_a_500() {
    let upstream =
        start_raw_upstream("HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n").await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("granted")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: ErrorEnvelope = resp.json().await.unwrap();
    assert!(!body.error.is_empty());

    proxy.stop();
}

#[tokio::test]
async fn upstream_failing_mid_body_truncates_the_response() {
    let upstream =
        start_raw_upstream("HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nhello").await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{upstream}/"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("granted")
        .send()
        .await
        .unwrap();

    // The head was already committed; the only signal left is a broken body.
    assert_eq!(resp.status(), 200);
    assert!(resp.bytes().await.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(proxy
        .events
        .events()
        .iter()
        .any(|e| matches!(e, ProxyEvent::StreamTruncated { bytes: 5, .. })));

    proxy.stop();
}

#[tokio::test]
async fn redirects_are_followed_with_the_proxy_user_agent() {
    let (upstream, hits) = start_upstream().await;
    let redirecting = start_raw_upstream(format!(
        "HTTP/1.1 301 Moved Permanently\r\nlocation: http://{upstream}/headers\r\nconnection: close\r\ncontent-length: 0\r\n\r\n"
    ))
    .await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{redirecting}/old"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("granted")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.text().await.unwrap(),
        "reddit-forward-proxy/0.1|authorization=false"
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    proxy.stop();
}

#[tokio::test]
async fn redirect_loop_stops_after_ten_hops() {
    let looping = start_raw_upstream(
        "HTTP/1.1 302 Found\r\nlocation: /again\r\nconnection: close\r\ncontent-length: 0\r\n\r\n",
    )
    .await;
    let proxy = start_proxy(None).await;
    let target = encode(&format!("http://{looping}/start"));

    let resp = reqwest::Client::new()
        .get(proxy.url(&format!("/api/proxy?url={target}")))
        .bearer_auth("granted")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: ErrorEnvelope = resp.json().await.unwrap();
    assert_eq!(body.error, "stopped after 10 redirects");

    proxy.stop();
}
