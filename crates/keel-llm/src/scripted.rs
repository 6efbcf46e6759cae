//! In-memory backend that replays a fixed script.
//!
//! Each `open` replays the same steps from the start. Useful for exercising
//! the adapter state machine without a network, and for demos.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keel_core::Model;
use keel_tokens::TokenCounter;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendEvent, BackendEventStream, BackendRequest, BackendTransport};
use crate::error::{StreamError, StreamResult};

/// One step of a script.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptStep {
    /// Emit an event.
    Event(BackendEvent),
    /// Sleep before the next step.
    Delay(Duration),
    /// Emit an error and end the stream.
    Fail(StreamError),
}

impl ScriptStep {
    /// Text event step.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Event(BackendEvent::Text(text.into()))
    }
}

/// Backend replaying [`ScriptStep`]s.
pub struct ScriptedTransport {
    model: Model,
    steps: Arc<Vec<ScriptStep>>,
    open_delay: Option<Duration>,
    open_error: Option<StreamError>,
    counter: Option<Arc<dyn TokenCounter>>,
    opens: AtomicUsize,
    last_request: parking_lot::Mutex<Option<BackendRequest>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("model", &self.model.id)
            .field("steps", &self.steps.len())
            .field("opens", &self.opens.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ScriptedTransport {
    /// Transport for `model` replaying `steps`.
    pub fn new(model: Model, steps: Vec<ScriptStep>) -> Self {
        Self {
            model,
            steps: Arc::new(steps),
            open_delay: None,
            open_error: None,
            counter: None,
            opens: AtomicUsize::new(0),
            last_request: parking_lot::Mutex::new(None),
        }
    }

    /// Wait this long before the stream opens.
    #[must_use]
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Fail every `open` with `error`.
    #[must_use]
    pub fn with_open_error(mut self, error: StreamError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Expose `counter` as the backend's exact token counter.
    #[must_use]
    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// How many times `open` was called.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The most recent request passed to `open`.
    pub fn last_request(&self) -> Option<BackendRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl BackendTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &Model {
        &self.model
    }

    async fn open(
        &self,
        request: &BackendRequest,
        _cancel: &CancellationToken,
    ) -> StreamResult<BackendEventStream> {
        let _ = self.opens.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());

        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }

        let steps = Arc::clone(&self.steps);
        Ok(Box::pin(async_stream::stream! {
            for step in steps.iter() {
                match step {
                    ScriptStep::Event(event) => yield Ok(event.clone()),
                    ScriptStep::Delay(delay) => tokio::time::sleep(*delay).await,
                    ScriptStep::Fail(err) => {
                        yield Err(err.clone());
                        return;
                    }
                }
            }
        }))
    }

    fn token_counter(&self) -> Option<Arc<dyn TokenCounter>> {
        self.counter.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn request() -> BackendRequest {
        BackendRequest {
            system_prompt: "sys".into(),
            messages: vec![keel_core::Message::user("hi")],
        }
    }

    #[tokio::test]
    async fn replays_steps_until_failure() {
        let transport = ScriptedTransport::new(
            Model::new("m"),
            vec![
                ScriptStep::text("a"),
                ScriptStep::Delay(Duration::from_millis(1)),
                ScriptStep::Fail(StreamError::transport("boom")),
                ScriptStep::text("never"),
            ],
        );
        let events: Vec<_> = transport
            .open(&request(), &CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                Ok(BackendEvent::Text("a".into())),
                Err(StreamError::transport("boom"))
            ]
        );
    }

    #[tokio::test]
    async fn open_error_and_bookkeeping() {
        let transport = ScriptedTransport::new(Model::new("m"), vec![])
            .with_open_error(StreamError::transport("refused"));
        let result = transport.open(&request(), &CancellationToken::new()).await;
        assert_eq!(result.err(), Some(StreamError::transport("refused")));
        assert_eq!(transport.opens(), 1);
        assert_eq!(transport.last_request(), Some(request()));
    }
}
