//! Request authorization.
//!
//! [`AuthorizationVerifier`] is the capability that turns a bearer token
//! into a [`Principal`]. The [`gate`] module wraps a route so it is only
//! reached when the principal carries a required role, and
//! [`introspection`] provides the verifier used in production, backed by
//! the identity provider's OAuth2 token introspection endpoint.

pub mod gate;
pub mod introspection;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::ErrorEnvelope;

pub use gate::AuthorizationGate;
pub use introspection::IntrospectionVerifier;

/// Identity resolved from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub roles: BTreeSet<String>,
}

/// Outcome of checking one request against a required role.
///
/// Built fresh for every request and attached to the request extensions
/// when granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub granted: bool,
    pub subject: String,
    pub roles: BTreeSet<String>,
}

impl AuthorizationDecision {
    #[must_use]
    pub fn for_role(principal: Principal, required_role: &str) -> Self {
        Self {
            granted: principal.roles.contains(required_role),
            subject: principal.subject,
            roles: principal.roles,
        }
    }
}

// async_trait is required here because the verifier is held as
// Arc<dyn AuthorizationVerifier> and native async fn in traits does not
// support dyn dispatch.
#[async_trait]
pub trait AuthorizationVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("no bearer credential presented")]
    MissingCredential,

    #[error("credential rejected: {0}")]
    InvalidCredential(String),

    #[error("authorization verifier unavailable: {source}")]
    Unavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("authorization verifier timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("missing required role '{role}'")]
    MissingRole { role: String },
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingRole { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Denials carry a fixed message; verifier detail stays in the logs.
        if matches!(self, Self::MissingRole { .. }) {
            return ErrorEnvelope::new("forbidden").with_status(self.status());
        }
        let mut response = ErrorEnvelope::new("unauthorized").with_status(self.status());
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
