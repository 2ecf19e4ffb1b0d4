use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use crate::error::AttemptError;
use crate::state::Outcome;

/// Wraps an upstream byte stream so that reaching a clean end-of-stream
/// records success and any error partway through records failure — the
/// reference rule for streaming attempts: once the first chunk has been
/// handed to the client, there is no more failover, only an outcome to
/// record against the upstream that is already committed.
pub struct RecordingStream<S> {
    inner: Pin<Box<S>>,
    record: Option<Box<dyn FnOnce(Outcome) + Send>>,
}

impl<S> RecordingStream<S>
where
    S: Stream<Item = Result<Bytes, AttemptError>>,
{
    pub fn new(inner: S, record: impl FnOnce(Outcome) + Send + 'static) -> Self {
        Self {
            inner: Box::pin(inner),
            record: Some(Box::new(record)),
        }
    }
}

impl<S> Stream for RecordingStream<S>
where
    S: Stream<Item = Result<Bytes, AttemptError>>,
{
    type Item = Result<Bytes, AttemptError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                if let Some(record) = self.record.take() {
                    record(Outcome::Success);
                }
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                if let Some(record) = self.record.take() {
                    record(Outcome::Failure);
                }
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}

impl<S> Drop for RecordingStream<S> {
    /// A client disconnect drops this stream before `poll_next` ever
    /// reaches end-of-stream or an error — axum simply stops polling and
    /// lets the body go. That is still a mid-stream interruption, so the
    /// reference rule applies: record failure, same as any other
    /// incomplete stream.
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            tracing::info!("client disconnected mid-stream; upstream body cancelled");
            record(Outcome::Failure);
        }
    }
}
