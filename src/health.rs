//! `GET /api/healthz` endpoint handler.
//!
//! Liveness only: answers the JSON string `"OK"` without touching the
//! verifier or any upstream.

use axum::Json;

pub const HEALTHY: &str = "OK";

pub async fn health_handler() -> Json<&'static str> {
    Json(HEALTHY)
}
