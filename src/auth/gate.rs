//! Role-based gate in front of protected routes.
//!
//! An [`AuthorizationGate`] holds the role a caller must carry and the
//! verifier used to resolve callers. [`AuthorizationGate::guard`] wraps a
//! [`MethodRouter`] so the wrapped handler runs only after a granted
//! [`AuthorizationDecision`], exactly once, with the decision available as
//! an `Extension`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;

use super::{bearer_token, AuthError, AuthorizationDecision, AuthorizationVerifier};
use crate::events::{EventSink, ProxyEvent};

#[derive(Clone)]
pub struct AuthorizationGate {
    required_role: Arc<str>,
    verifier: Arc<dyn AuthorizationVerifier>,
    events: Arc<dyn EventSink>,
    timeout: Option<Duration>,
}

impl AuthorizationGate {
    pub fn new(
        required_role: &str,
        verifier: Arc<dyn AuthorizationVerifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            required_role: Arc::from(required_role),
            verifier,
            events,
            timeout: None,
        }
    }

    /// Bound the time spent waiting on the verifier. `None` waits forever.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn required_role(&self) -> &str {
        &self.required_role
    }

    /// Resolve the caller behind `headers` and check the required role.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<AuthorizationDecision, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingCredential)?;

        let principal = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.verifier.verify(token))
                .await
                .map_err(|_| AuthError::Timeout(limit))??,
            None => self.verifier.verify(token).await?,
        };

        let decision = AuthorizationDecision::for_role(principal, &self.required_role);
        if decision.granted {
            Ok(decision)
        } else {
            Err(AuthError::MissingRole {
                role: self.required_role.to_string(),
            })
        }
    }

    /// Wrap `route` so it is only reachable by callers holding the role.
    pub fn guard<S>(&self, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        route.route_layer(middleware::from_fn_with_state(self.clone(), require_role))
    }
}

async fn require_role(
    State(gate): State<AuthorizationGate>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.authorize(request.headers()).await {
        Ok(decision) => {
            gate.events.record(ProxyEvent::AccessGranted {
                subject: decision.subject.clone(),
            });
            request.extensions_mut().insert(decision);
            next.run(request).await
        }
        Err(err) => {
            if matches!(err, AuthError::Unavailable { .. } | AuthError::Timeout(_)) {
                tracing::error!(error = %err, "authorization verifier failed");
            }
            gate.events.record(ProxyEvent::AccessDenied {
                status: err.status().as_u16(),
                reason: err.to_string(),
            });
            err.into_response()
        }
    }
}
