//! Integration tests for the HTTP server, health endpoint, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use reddit_forward_proxy::auth::{AuthError, AuthorizationGate, AuthorizationVerifier, Principal};
use reddit_forward_proxy::events::TracingSink;
use reddit_forward_proxy::server::{self, AppState, REQUIRED_ROLE};

/// Rejects every token; the health endpoint must not care.
struct DenyAll;

#[async_trait]
impl AuthorizationVerifier for DenyAll {
    async fn verify(&self, _token: &str) -> Result<Principal, AuthError> {
        Err(AuthError::InvalidCredential("denied".into()))
    }
}

async fn start_test_server() -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let events = Arc::new(TracingSink);
    let gate = AuthorizationGate::new(REQUIRED_ROLE, Arc::new(DenyAll), events.clone());
    let state = Arc::new(AppState {
        http_client: server::build_http_client(),
        upstream_timeout: None,
        events,
    });

    let router = server::build_router(state, &gate);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

#[tokio::test]
async fn health_endpoint_returns_ok_json_string() {
    let (addr, shutdown) = start_test_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/healthz")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert_eq!(resp.text().await.unwrap(), "\"OK\"");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn health_endpoint_ignores_credentials() {
    let (addr, shutdown) = start_test_server().await;
    let client = reqwest::Client::new();

    let with_header = client
        .get(format!("http://{addr}/api/healthz"))
        .header("authorization", "Bearer garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(with_header.status(), 200);
    assert_eq!(with_header.text().await.unwrap(), "\"OK\"");

    let with_api_key = client
        .get(format!("http://{addr}/api/healthz?apiKey=garbage"))
        .send()
        .await
        .unwrap();
    assert_eq!(with_api_key.status(), 200);
    assert_eq!(with_api_key.text().await.unwrap(), "\"OK\"");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unknown_path_returns_404() {
    let (addr, shutdown) = start_test_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/nonexistent")).await.unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn non_get_methods_are_not_routed() {
    let (addr, shutdown) = start_test_server().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/proxy?url=http://example.test/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let (addr, shutdown) = start_test_server().await;

    // Verify server is running
    let url = format!("http://{addr}/api/healthz");
    assert!(reqwest::get(&url).await.is_ok());

    // Send shutdown
    let _ = shutdown.send(());

    // Give it a moment to shut down
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Server should no longer accept connections
    let result = reqwest::get(&url).await;
    assert!(result.is_err());
}
