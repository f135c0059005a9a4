//! Unified error types for the proxy.
//!
//! Defines [`ProxyError`] (startup and CLI failures), [`ValidationError`]
//! for config validation failures, and [`ErrorEnvelope`], the JSON shape
//! every non-success API reply uses. Per-request failures live next to
//! the code that produces them: [`AuthError`](crate::auth::AuthError) and
//! [`ForwardError`](crate::proxy::ForwardError).

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// `{"error": "<message>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    #[must_use]
    pub fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

/// Render an error together with its `source()` chain, `outer: inner: root`.
///
/// hyper's client errors carry the useful part (DNS, connect, TLS) in the
/// source chain while their own `Display` is generic.
#[must_use]
pub fn display_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(inner) = current {
        let text = inner.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        current = inner.source();
    }
    out
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Key file not found: {}", path.display())]
    KeyFileNotFound { path: PathBuf },

    #[error("Key file parse error in {}:\n  {source}", path.display())]
    KeyFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Key file {} has no credential: expected `keyId` and `key`, or `clientSecret`",
        path.display()
    )]
    KeyFileIncomplete { path: PathBuf },

    #[error("Authorization verifier could not initialize: {source}")]
    VerifierInit {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),

    #[error("Health check returned unexpected body: {0}")]
    HealthCheckBody(String),
}
