//! The lazy, single-consumer chunk stream handed to the task loop.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use keel_core::{CanonicalChunk, ImageSource, UsageRecord};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{StreamError, StreamResult};

/// Terminal state of one request.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamOutcome {
    /// All content and the usage chunk were delivered.
    Completed(UsageRecord),
    /// Cancelled before completion. No usage chunk was emitted.
    Cancelled,
    /// The backend or transport failed. No usage chunk was emitted.
    Failed(StreamError),
}

/// Cancels one request. Cheap to clone and safe to trigger from any task.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Request cancellation. The stream stops forwarding content at its next
    /// suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A fully drained response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectedResponse {
    /// Concatenated text chunks.
    pub text: String,
    /// Image chunks in emission order.
    pub images: Vec<ImageSource>,
    /// Finalized usage.
    pub usage: UsageRecord,
}

pub(crate) type SharedOutcome = Arc<Mutex<Option<StreamOutcome>>>;

/// Lazy stream of [`CanonicalChunk`]s for one request.
///
/// Ends with exactly one `usage` chunk on completion, or with a single
/// `Err` item on cancellation ([`StreamError::Cancelled`]) or failure.
/// Not cloneable and not restartable; once it has ended it stays ended.
pub struct ResponseStream {
    request_id: Uuid,
    inner: Pin<Box<dyn Stream<Item = StreamResult<CanonicalChunk>> + Send>>,
    outcome: SharedOutcome,
    cancel: CancellationToken,
    finished: bool,
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("request_id", &self.request_id)
            .field("outcome", &*self.outcome.lock())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ResponseStream {
    pub(crate) fn new(
        request_id: Uuid,
        inner: Pin<Box<dyn Stream<Item = StreamResult<CanonicalChunk>> + Send>>,
        outcome: SharedOutcome,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request_id,
            inner,
            outcome,
            cancel,
            finished: false,
        }
    }

    /// Identifier of this request.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Handle that cancels this request.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.cancel.clone())
    }

    /// Terminal outcome, once reached.
    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome.lock().clone()
    }

    /// Drain the stream.
    ///
    /// Cancellation surfaces as `Err(StreamError::Cancelled)`, failures as
    /// their typed error.
    pub async fn collect(mut self) -> StreamResult<CollectedResponse> {
        let mut collected = CollectedResponse::default();
        let mut usage = None;

        while let Some(item) = self.next().await {
            match item? {
                CanonicalChunk::Text { content } => collected.text.push_str(&content),
                CanonicalChunk::Image {
                    content,
                    content_type,
                } => collected.images.push(ImageSource {
                    data: content,
                    mime_type: content_type,
                }),
                CanonicalChunk::Usage { .. } => {
                    usage = match self.outcome() {
                        Some(StreamOutcome::Completed(record)) => Some(record),
                        _ => None,
                    };
                }
            }
        }

        collected.usage = usage.ok_or_else(|| {
            StreamError::transport("stream ended without usage")
        })?;
        Ok(collected)
    }
}

impl Stream for ResponseStream {
    type Item = StreamResult<CanonicalChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        let polled = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = polled {
            this.finished = true;
        }
        polled
    }
}
