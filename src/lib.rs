//! A role-gated HTTP forwarding proxy.
//!
//! Callers present a bearer token (in the `Authorization` header or as an
//! `apiKey` query parameter). When the token's holder carries the
//! `reddit-forward-proxy-access` role, the proxy issues one `GET` to the
//! `url` the caller named and streams the response body back, so clients
//! can reach third-party content without embedding its shared secret.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, health).
//! - [`config`] -- Immutable [`ProxyConfig`](config::ProxyConfig), validation,
//!   and the service key file.
//! - [`error`] -- Startup error types and the JSON error envelope.
//! - [`events`] -- Structured request events and the sink they go to.
//! - [`health`] -- `GET /api/healthz` liveness handler.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- The process-wide `apiKey` to `Authorization` rewrite.
//! - [`auth`] -- The verifier capability, the role gate, and the OAuth2
//!   introspection verifier.
//! - [`proxy`] -- The forwarding handler: outbound request and body relay.
//! - [`server`] -- Axum router, shared application state, HTTP client, and
//!   graceful shutdown.

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod server;
