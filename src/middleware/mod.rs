//! Process-wide request middleware.
//!
//! [`rewrite_api_key`] moves an `apiKey` query credential into the
//! canonical `Authorization: Bearer` header before routing, so every later
//! stage only has to understand one credential transport.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Uri};
use axum::middleware::Next;
use axum::response::Response;

use crate::events::ProxyEvent;
use crate::server::AppState;

pub const API_KEY_PARAM: &str = "apiKey";

/// First value of query parameter `name`, if any.
#[must_use]
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Header value for a non-empty `apiKey`; `None` leaves the request as is.
#[must_use]
pub fn api_key_authorization(uri: &Uri) -> Option<HeaderValue> {
    let api_key = query_param(uri, API_KEY_PARAM).filter(|key| !key.is_empty())?;
    HeaderValue::from_str(&format!("Bearer {api_key}")).ok()
}

pub async fn rewrite_api_key(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(value) = api_key_authorization(request.uri()) {
        // insert() replaces every existing Authorization value
        request.headers_mut().insert(header::AUTHORIZATION, value);
        state.events.record(ProxyEvent::CredentialRewritten {
            path: request.uri().path().to_string(),
        });
    }
    next.run(request).await
}
