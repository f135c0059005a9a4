//! Core HTTP forwarding handler.
//!
//! [`forward_handler`] serves `GET /api/proxy` once the authorization gate
//! has admitted the caller. It reads the `url` query parameter, issues
//! one logical outbound `GET` ([`upstream`], redirects included) and
//! streams the final upstream body back ([`stream`]).
//!
//! Two behaviours are deliberate and covered by tests:
//!
//! - The caller always gets status 200 on success, whatever the upstream
//!   answered, and none of the upstream headers.
//! - A target that cannot be turned into a request is reported as a 500
//!   and the handler stops there; no outbound call is attempted.

pub mod stream;
pub mod upstream;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::error::ErrorEnvelope;
use crate::events::ProxyEvent;
use crate::middleware::query_param;
use crate::server::AppState;

pub const TARGET_PARAM: &str = "url";

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ForwardError {
    #[error("missing url parameter")]
    MissingUrl,

    #[error("{0}")]
    InvalidTarget(String),

    #[error("{0}")]
    Transport(String),

    #[error("upstream did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Stream(String),
}

impl ForwardError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = self.status();
        ErrorEnvelope::new(self.to_string()).with_status(status)
    }
}

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    req_headers: HeaderMap,
) -> Response {
    let Some(target) = query_param(&uri, TARGET_PARAM).filter(|url| !url.is_empty()) else {
        return ForwardError::MissingUrl.into_response();
    };

    let correlation_id = req_headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    state.events.record(ProxyEvent::ForwardStarted {
        correlation_id: correlation_id.clone(),
        url: target.clone(),
    });

    let outcome = async {
        let url = upstream::parse_target(&target)?;
        let response = upstream::fetch(&state.http_client, url, state.upstream_timeout).await?;
        // Status and headers stay behind; only the body is relayed.
        stream::relay(
            response.into_body(),
            correlation_id.clone(),
            Arc::clone(&state.events),
        )
        .await
    }
    .await;

    match outcome {
        Ok(body) => {
            let mut response = Response::new(Body::new(body));
            if let Ok(value) = HeaderValue::from_str(&correlation_id) {
                response.headers_mut().insert(CORRELATION_HEADER, value);
            }
            response
        }
        Err(err) => {
            state.events.record(ProxyEvent::ForwardFailed {
                correlation_id,
                url: target,
                error: err.to_string(),
            });
            err.into_response()
        }
    }
}
