//! Relaying the upstream body to the caller.
//!
//! [`relay`] waits for the first upstream frame before anything is sent, so
//! an upstream that fails immediately can still be reported as a 500. From
//! then on [`ForwardedBody`] hands frames to hyper one at a time as the
//! client connection asks for them: nothing is buffered beyond the frame in
//! flight, and a slow client slows the upstream read. A later upstream error
//! is passed to hyper, which aborts the connection and leaves the caller
//! with a truncated body. Dropping the body (client gone) drops the
//! upstream connection with it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame};
use http_body_util::BodyExt;

use super::ForwardError;
use crate::error::display_chain;
use crate::events::{EventSink, ProxyEvent};

pub struct ForwardedBody<B> {
    first: Option<Frame<Bytes>>,
    upstream: B,
    sent: u64,
    finished: bool,
    correlation_id: String,
    events: Arc<dyn EventSink>,
}

/// Wait for the first upstream frame and wrap the body for streaming.
pub async fn relay<B>(
    mut upstream: B,
    correlation_id: String,
    events: Arc<dyn EventSink>,
) -> Result<ForwardedBody<B>, ForwardError>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::error::Error + 'static,
{
    let first = match upstream.frame().await {
        Some(Ok(frame)) => Some(frame),
        Some(Err(e)) => return Err(ForwardError::Stream(display_chain(&e))),
        None => None,
    };

    let finished = first.is_none();
    if finished {
        events.record(ProxyEvent::StreamCompleted {
            correlation_id: correlation_id.clone(),
            bytes: 0,
        });
    }

    Ok(ForwardedBody {
        first,
        upstream,
        sent: 0,
        finished,
        correlation_id,
        events,
    })
}

impl<B> ForwardedBody<B> {
    #[must_use]
    pub const fn bytes_sent(&self) -> u64 {
        self.sent
    }

    fn count(&mut self, frame: &Frame<Bytes>) {
        if let Some(data) = frame.data_ref() {
            self.sent += data.len() as u64;
        }
    }
}

impl<B> Body for ForwardedBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::error::Error + 'static,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(frame) = this.first.take() {
            this.count(&frame);
            return Poll::Ready(Some(Ok(frame)));
        }
        if this.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.upstream).poll_frame(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(frame))) => {
                this.count(&frame);
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                this.events.record(ProxyEvent::StreamTruncated {
                    correlation_id: this.correlation_id.clone(),
                    bytes: this.sent,
                    error: display_chain(&e),
                });
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                this.events.record(ProxyEvent::StreamCompleted {
                    correlation_id: this.correlation_id.clone(),
                    bytes: this.sent,
                });
                Poll::Ready(None)
            }
        }
    }
}

impl<B> Drop for ForwardedBody<B> {
    fn drop(&mut self) {
        if !self.finished {
            self.events.record(ProxyEvent::StreamAbandoned {
                correlation_id: std::mem::take(&mut self.correlation_id),
                bytes: self.sent,
            });
        }
    }
}
