//! # Stream adapter
//!
//! One [`StreamAdapter`] per backend instance. It allows a single active
//! request at a time and drives each request through
//! `idle → requesting → streaming → completed | cancelled | failed`.
//!
//! Every request gets a fresh [`CancellationToken`], so cancelling one
//! request never leaks into the next. Input tokens are counted concurrently
//! with the backend call; the count is only awaited at the end, and only
//! when the backend did not report input usage itself.
//!
//! The stream a caller receives yields content chunks in backend order,
//! then exactly one `usage` chunk. A cancelled or failed request ends with
//! a single `Err` item instead and never produces usage.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use keel_core::{CanonicalChunk, Message, Model, UsageRecord, UsageSource};
use keel_tokens::{RoughEstimator, TokenAccountant, usage_cost};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Backend, BackendEvent, BackendRequest, BackendTransport, BackendUsage};
use crate::error::{StreamError, StreamResult};
use crate::response::{ResponseStream, SharedOutcome, StreamOutcome};

/// Request lifecycle phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamPhase {
    /// No request has been made yet.
    #[default]
    Idle,
    /// Request issued, no content received yet.
    Requesting,
    /// Content is arriving.
    Streaming,
    /// Usage chunk delivered.
    Completed,
    /// Cancelled before completion.
    Cancelled,
    /// Backend or transport failure.
    Failed,
}

impl StreamPhase {
    /// Whether a request in this phase has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Phase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct ActiveRequest {
    id: Uuid,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct RequestSlot {
    active: Option<ActiveRequest>,
    phase: StreamPhase,
}

impl RequestSlot {
    fn owns(&self, id: Uuid) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }

    /// Release the slot and record the terminal phase, unless the request
    /// was already released by the adapter.
    fn finish(&mut self, id: Uuid, phase: StreamPhase) {
        if self.owns(id) {
            self.active = None;
            self.phase = phase;
        }
    }
}

type SharedSlot = Arc<Mutex<RequestSlot>>;

/// Normalizes one backend's responses into [`CanonicalChunk`] streams.
///
/// Generic over the transport so tests can plug in their own; defaults to
/// the closed [`Backend`] set.
pub struct StreamAdapter<B = Backend> {
    backend: Arc<B>,
    accountant: Arc<TokenAccountant>,
    slot: SharedSlot,
}

impl<B: BackendTransport> std::fmt::Debug for StreamAdapter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdapter")
            .field("backend", &self.backend.name())
            .field("model", &self.backend.model().id)
            .field("phase", &self.slot.lock().phase)
            .finish_non_exhaustive()
    }
}

impl<B: BackendTransport + 'static> StreamAdapter<B> {
    /// Adapter whose accountant uses the backend's exact counter when it
    /// has one, and `estimator` otherwise.
    pub fn new(backend: B, estimator: RoughEstimator) -> Self {
        let accountant = match backend.token_counter() {
            Some(counter) => TokenAccountant::new(counter, estimator),
            None => TokenAccountant::estimating(estimator),
        };
        Self::with_accountant(backend, Arc::new(accountant))
    }

    /// Adapter sharing an existing accountant.
    pub fn with_accountant(backend: B, accountant: Arc<TokenAccountant>) -> Self {
        Self {
            backend: Arc::new(backend),
            accountant,
            slot: Arc::default(),
        }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend's model descriptor.
    pub fn model(&self) -> &Model {
        self.backend.model()
    }

    /// The accountant used for usage fallback.
    pub fn accountant(&self) -> &Arc<TokenAccountant> {
        &self.accountant
    }

    /// Phase of the most recent request.
    pub fn state(&self) -> StreamPhase {
        self.slot.lock().phase
    }

    /// Whether a request is active.
    pub fn is_busy(&self) -> bool {
        self.slot.lock().active.is_some()
    }

    /// Start a request and return its lazy chunk stream.
    ///
    /// Nothing is sent until the stream is first polled. Fails with
    /// [`StreamError::RequestInFlight`] while another request is active.
    pub fn create_response_stream(
        &self,
        system_prompt: impl Into<String>,
        messages: Vec<Message>,
    ) -> StreamResult<ResponseStream> {
        let id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        {
            let mut slot = self.slot.lock();
            if let Some(active) = &slot.active {
                warn!(active = %active.id, "rejecting request while another is in flight");
                return Err(StreamError::RequestInFlight);
            }
            slot.active = Some(ActiveRequest {
                id,
                cancel: cancel.clone(),
            });
            slot.phase = StreamPhase::Requesting;
        }

        let outcome: SharedOutcome = Arc::default();
        let guard = RequestGuard {
            id,
            slot: Arc::clone(&self.slot),
            outcome: Arc::clone(&outcome),
            cancel: cancel.clone(),
        };
        let request = BackendRequest {
            system_prompt: system_prompt.into(),
            messages,
        };
        let chunks = drive(
            Arc::clone(&self.backend),
            Arc::clone(&self.accountant),
            request,
            guard,
        );

        Ok(ResponseStream::new(id, Box::pin(chunks), outcome, cancel))
    }

    /// Cancel the active request, if any. Returns whether one was active.
    ///
    /// The slot is released immediately, so a new request may start before
    /// the cancelled stream has been polled to its end.
    pub fn cancel(&self) -> bool {
        let active = {
            let mut slot = self.slot.lock();
            let active = slot.active.take();
            if active.is_some() {
                slot.phase = StreamPhase::Cancelled;
            }
            active
        };

        match active {
            Some(active) => {
                active.cancel.cancel();
                info!(request_id = %active.id, backend = self.backend.name(), "request cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel any active request and clear the token cache.
    pub fn dispose(&self) {
        let _ = self.cancel();
        self.accountant.dispose();
    }
}

/// Terminal bookkeeping for one request. Dropping it before a terminal
/// outcome (the consumer dropped the stream) counts as cancellation.
struct RequestGuard {
    id: Uuid,
    slot: SharedSlot,
    outcome: SharedOutcome,
    cancel: CancellationToken,
}

impl RequestGuard {
    fn mark_streaming(&self) {
        let mut slot = self.slot.lock();
        if slot.owns(self.id) {
            slot.phase = StreamPhase::Streaming;
        }
    }

    fn conclude(&self, outcome: StreamOutcome) {
        let (phase, label) = match &outcome {
            StreamOutcome::Completed(_) => (StreamPhase::Completed, "completed"),
            StreamOutcome::Cancelled => (StreamPhase::Cancelled, "cancelled"),
            StreamOutcome::Failed(_) => (StreamPhase::Failed, "failed"),
        };
        {
            let mut current = self.outcome.lock();
            if current.is_some() {
                return;
            }
            *current = Some(outcome);
        }
        self.slot.lock().finish(self.id, phase);
        metrics::counter!("keel_streams_total", "outcome" => label).increment(1);
    }

    fn fail(&self, err: &StreamError) {
        if err.is_cancellation() {
            debug!(request_id = %self.id, "response stream cancelled");
            self.conclude(StreamOutcome::Cancelled);
        } else {
            warn!(
                request_id = %self.id,
                category = err.category(),
                retryable = err.is_retryable(),
                error = %err,
                "response stream failed"
            );
            self.conclude(StreamOutcome::Failed(err.clone()));
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let pending = self.outcome.lock().is_none();
        if pending {
            self.cancel.cancel();
            debug!(request_id = %self.id, "response stream dropped before completion");
            self.conclude(StreamOutcome::Cancelled);
        }
    }
}

/// Input-token count running alongside the backend call. Aborted on drop.
struct CountTask(Option<JoinHandle<u64>>);

impl CountTask {
    fn spawn(accountant: Arc<TokenAccountant>, request: &BackendRequest) -> Self {
        let system_prompt = request.system_prompt.clone();
        let messages = request.messages.clone();
        Self(Some(tokio::spawn(async move {
            accountant
                .calculate_input_tokens(&system_prompt, &messages)
                .await
        })))
    }

    async fn join(mut self) -> Option<u64> {
        let handle = self.0.take()?;
        handle.await.ok()
    }
}

impl Drop for CountTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

enum Step {
    Event(BackendEvent),
    Failed(StreamError),
    Cancelled,
    Ended,
}

fn drive<B: BackendTransport + 'static>(
    backend: Arc<B>,
    accountant: Arc<TokenAccountant>,
    request: BackendRequest,
    guard: RequestGuard,
) -> impl Stream<Item = StreamResult<CanonicalChunk>> + Send + 'static {
    async_stream::stream! {
        let cancel = guard.cancel.clone();
        debug!(
            request_id = %guard.id,
            backend = backend.name(),
            model = %backend.model().id,
            messages = request.messages.len(),
            "opening response stream"
        );
        let counting = CountTask::spawn(Arc::clone(&accountant), &request);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StreamError::Cancelled),
            result = backend.open(&request, &cancel) => result,
        };
        let mut events = match opened {
            Ok(events) => events,
            Err(err) => {
                guard.fail(&err);
                yield Err(err);
                return;
            }
        };

        let mut reported = BackendUsage::default();
        let mut output = String::new();
        let mut streaming = false;

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Cancelled,
                next = events.next() => match next {
                    Some(Ok(event)) => Step::Event(event),
                    Some(Err(err)) => Step::Failed(err),
                    None => Step::Ended,
                },
            };

            match step {
                Step::Event(event) => {
                    if !streaming {
                        streaming = true;
                        guard.mark_streaming();
                    }
                    match event {
                        BackendEvent::Text(text) => {
                            output.push_str(&text);
                            yield Ok(CanonicalChunk::Text { content: text });
                        }
                        BackendEvent::Image { data, mime_type } => {
                            yield Ok(CanonicalChunk::Image {
                                content: data,
                                content_type: mime_type,
                            });
                        }
                        BackendEvent::Usage(usage) => reported.merge(&usage),
                    }
                }
                Step::Failed(err) => {
                    guard.fail(&err);
                    yield Err(err);
                    return;
                }
                Step::Cancelled => {
                    guard.fail(&StreamError::Cancelled);
                    yield Err(StreamError::Cancelled);
                    return;
                }
                Step::Ended => break,
            }
        }

        let finalized = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            record = finalize_usage(
                reported,
                counting,
                &accountant,
                &request,
                &output,
                backend.model(),
            ) => Some(record),
        };
        let Some(record) = finalized else {
            guard.fail(&StreamError::Cancelled);
            yield Err(StreamError::Cancelled);
            return;
        };

        debug!(
            request_id = %guard.id,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost = record.cost,
            source = ?record.source,
            "response stream completed"
        );
        let chunk = record.to_chunk();
        guard.conclude(StreamOutcome::Completed(record));
        yield Ok(chunk);
    }
}

/// Fill gaps in backend-reported usage from the accountant and price it.
async fn finalize_usage(
    reported: BackendUsage,
    counting: CountTask,
    accountant: &TokenAccountant,
    request: &BackendRequest,
    output: &str,
    model: &Model,
) -> UsageRecord {
    let input_tokens = match reported.input_tokens {
        Some(n) => n,
        None => match counting.join().await {
            Some(n) => n,
            None => {
                warn!("input token count task did not finish, using rough estimate");
                estimate_input(accountant, request)
            }
        },
    };
    let output_tokens = match reported.output_tokens {
        Some(n) => n,
        None => accountant.count_tokens(output).await,
    };

    let source = match (reported.input_tokens, reported.output_tokens) {
        (Some(_), Some(_)) => UsageSource::Backend,
        (None, None) => UsageSource::Estimated,
        _ => UsageSource::Mixed,
    };

    let mut record = UsageRecord {
        input_tokens,
        output_tokens,
        cache_write_tokens: reported.cache_write_tokens,
        cache_read_tokens: reported.cache_read_tokens,
        cost: 0.0,
        source,
    };
    record.cost = usage_cost(&model.pricing, &record);
    record
}

fn estimate_input(accountant: &TokenAccountant, request: &BackendRequest) -> u64 {
    request
        .messages
        .iter()
        .map(|m| {
            m.content_token_count
                .unwrap_or_else(|| accountant.estimate(&m.text_content()))
        })
        .fold(accountant.estimate(&request.system_prompt), u64::saturating_add)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
