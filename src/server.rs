//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the HTTP client,
//! the upstream timeout, and the event sink), [`build_router`] for
//! wiring the routes behind the credential rewriter, [`build_http_client`]
//! for the hyper client shared by forwarding and token introspection, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::AuthorizationGate;
use crate::events::EventSink;
use crate::health::health_handler;
use crate::{middleware, proxy};

pub const HEALTH_PATH: &str = "/api/healthz";
pub const PROXY_PATH: &str = "/api/proxy";
pub const REQUIRED_ROLE: &str = "reddit-forward-proxy-access";

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub http_client: HttpClient,
    /// `None`: an unresponsive upstream holds its request indefinitely.
    pub upstream_timeout: Option<Duration>,
    pub events: Arc<dyn EventSink>,
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new()).build(https)
}

/// `/api/healthz` open, `/api/proxy` behind `gate`, anything else 404.
/// The `apiKey` rewrite runs before every one of them.
pub fn build_router(state: Arc<AppState>, gate: &AuthorizationGate) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(PROXY_PATH, gate.guard(get(proxy::forward_handler)))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(
                    Arc::clone(&state),
                    middleware::rewrite_api_key,
                )),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
