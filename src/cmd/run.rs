//! `reddit-forward-proxy run`: start the proxy server.
//!
//! Validates the configuration, loads the service key, initializes the
//! introspection verifier against the identity provider, and serves the
//! router until Ctrl+C / SIGTERM.

use std::sync::Arc;

use crate::auth::{AuthorizationGate, IntrospectionVerifier};
use crate::cli::RunArgs;
use crate::config::{ProxyConfig, ServiceKey};
use crate::error::ProxyError;
use crate::events::{EventSink, TracingSink};
use crate::logging;
use crate::server::{self, AppState, REQUIRED_ROLE};

pub async fn execute(args: RunArgs) -> Result<(), ProxyError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let config = ProxyConfig::from_args(&args)?;
    serve(&config).await
}

pub async fn serve(config: &ProxyConfig) -> Result<(), ProxyError> {
    let key = ServiceKey::load(&config.key_path).await?;
    let http_client = server::build_http_client();

    if config.upstream_timeout.is_none() {
        tracing::warn!("no upstream timeout configured; an unresponsive upstream holds its request indefinitely");
    }
    if config.verifier_timeout.is_none() {
        tracing::warn!("no verifier timeout configured; an unresponsive identity provider holds startup and requests indefinitely");
    }

    let verifier = IntrospectionVerifier::discover(
        http_client.clone(),
        &config.issuer,
        &key,
        config.verifier_timeout,
    )
    .await?;

    let events: Arc<dyn EventSink> = Arc::new(TracingSink);
    let gate = AuthorizationGate::new(REQUIRED_ROLE, Arc::new(verifier), Arc::clone(&events))
        .with_timeout(config.verifier_timeout);

    let state = Arc::new(AppState {
        http_client,
        upstream_timeout: config.upstream_timeout,
        events,
    });

    let router = server::build_router(state, &gate);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;

    tracing::info!(
        addr = %format!("http://{}", config.listen),
        issuer = %config.issuer,
        required_role = gate.required_role(),
        "server listening, press ctrl+c to stop"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
