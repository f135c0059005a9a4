//! Structured request events.
//!
//! Handlers never call `tracing` directly for domain outcomes; they report a
//! [`ProxyEvent`] to the [`EventSink`] carried in their state. The default
//! [`TracingSink`] turns each event into a structured log record, and tests
//! swap in their own sink to assert on failure paths.

use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProxyEvent {
    /// An `apiKey` query value replaced the `Authorization` header.
    CredentialRewritten { path: String },
    AccessGranted { subject: String },
    AccessDenied { status: u16, reason: String },
    ForwardStarted { correlation_id: String, url: String },
    ForwardFailed {
        correlation_id: String,
        url: String,
        error: String,
    },
    StreamCompleted {
        correlation_id: String,
        bytes: u64,
    },
    /// The upstream body failed after the response head was sent.
    StreamTruncated {
        correlation_id: String,
        bytes: u64,
        error: String,
    },
    /// The client went away before the upstream body finished.
    StreamAbandoned {
        correlation_id: String,
        bytes: u64,
    },
}

pub trait EventSink: Send + Sync + Debug {
    fn record(&self, event: ProxyEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: ProxyEvent) {
        match event {
            ProxyEvent::CredentialRewritten { path } => {
                tracing::debug!(path = %path, "rewrote apiKey query parameter into authorization header");
            }
            ProxyEvent::AccessGranted { subject } => {
                tracing::debug!(subject = %subject, "access granted");
            }
            ProxyEvent::AccessDenied { status, reason } => {
                tracing::info!(status, reason = %reason, "access denied");
            }
            ProxyEvent::ForwardStarted {
                correlation_id,
                url,
            } => {
                tracing::info!(correlation_id = %correlation_id, url = %url, "proxying");
            }
            ProxyEvent::ForwardFailed {
                correlation_id,
                url,
                error,
            } => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    url = %url,
                    error = %error,
                    "upstream request failed"
                );
            }
            ProxyEvent::StreamCompleted {
                correlation_id,
                bytes,
            } => {
                tracing::info!(correlation_id = %correlation_id, bytes, "upstream body relayed");
            }
            ProxyEvent::StreamTruncated {
                correlation_id,
                bytes,
                error,
            } => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    bytes,
                    error = %error,
                    "upstream body failed mid-stream, response truncated"
                );
            }
            ProxyEvent::StreamAbandoned {
                correlation_id,
                bytes,
            } => {
                tracing::info!(correlation_id = %correlation_id, bytes, "client disconnected during relay");
            }
        }
    }
}
