//! # Backend seam
//!
//! A backend turns a request into a raw event stream. The adapter owns
//! everything above that: the state machine, cancellation, usage
//! finalization and canonical chunk emission.
//!
//! Shipped backends form the closed set [`Backend`]; the adapter is generic
//! over [`BackendTransport`] so tests can plug in their own.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use keel_core::{Message, Model};
use keel_tokens::TokenCounter;
use tokio_util::sync::CancellationToken;

use crate::error::StreamResult;
use crate::gemini::GeminiTransport;
use crate::scripted::ScriptedTransport;

/// Boxed stream of [`BackendEvent`]s returned by [`BackendTransport::open`].
pub type BackendEventStream = Pin<Box<dyn Stream<Item = StreamResult<BackendEvent>> + Send>>;

/// Everything a backend needs to issue one request.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendRequest {
    /// System prompt, rebuilt by the caller per request.
    pub system_prompt: String,
    /// Conversation, already truncated by the caller.
    pub messages: Vec<Message>,
}

/// Token counts reported by a backend. Any field may be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendUsage {
    /// Input tokens.
    pub input_tokens: Option<u64>,
    /// Output tokens.
    pub output_tokens: Option<u64>,
    /// Tokens written to the prompt cache.
    pub cache_write_tokens: Option<u64>,
    /// Tokens read from the prompt cache.
    pub cache_read_tokens: Option<u64>,
}

impl BackendUsage {
    /// Overlay `newer` onto `self`; fields present in `newer` win.
    pub fn merge(&mut self, newer: &BackendUsage) {
        self.input_tokens = newer.input_tokens.or(self.input_tokens);
        self.output_tokens = newer.output_tokens.or(self.output_tokens);
        self.cache_write_tokens = newer.cache_write_tokens.or(self.cache_write_tokens);
        self.cache_read_tokens = newer.cache_read_tokens.or(self.cache_read_tokens);
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One raw event from a backend stream.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendEvent {
    /// Text delta.
    Text(String),
    /// Inline media.
    Image {
        /// Base64-encoded payload.
        data: String,
        /// MIME type.
        mime_type: String,
    },
    /// Usage counters. May arrive more than once; later values win.
    Usage(BackendUsage),
}

/// A backend capable of streaming a response.
///
/// Implementors must be `Send + Sync`; the adapter shares them with the
/// stream it hands out.
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Backend identifier for logs (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Capability and pricing descriptor of the configured model.
    fn model(&self) -> &Model;

    /// Open a raw event stream for `request`.
    ///
    /// `cancel` fires when the caller cancels; implementations may use it to
    /// abandon work early, but the adapter checks it regardless.
    async fn open(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> StreamResult<BackendEventStream>;

    /// Exact token counter exposed by the backend, if any.
    fn token_counter(&self) -> Option<Arc<dyn TokenCounter>> {
        None
    }
}

/// The shipped backends.
#[derive(Debug)]
pub enum Backend {
    /// Google Gemini over the Generative Language API.
    Gemini(GeminiTransport),
    /// In-memory scripted replay.
    Scripted(ScriptedTransport),
}

impl From<GeminiTransport> for Backend {
    fn from(transport: GeminiTransport) -> Self {
        Self::Gemini(transport)
    }
}

impl From<ScriptedTransport> for Backend {
    fn from(transport: ScriptedTransport) -> Self {
        Self::Scripted(transport)
    }
}

#[async_trait]
impl BackendTransport for Backend {
    fn name(&self) -> &str {
        match self {
            Self::Gemini(b) => b.name(),
            Self::Scripted(b) => b.name(),
        }
    }

    fn model(&self) -> &Model {
        match self {
            Self::Gemini(b) => b.model(),
            Self::Scripted(b) => b.model(),
        }
    }

    async fn open(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> StreamResult<BackendEventStream> {
        match self {
            Self::Gemini(b) => b.open(request, cancel).await,
            Self::Scripted(b) => b.open(request, cancel).await,
        }
    }

    fn token_counter(&self) -> Option<Arc<dyn TokenCounter>> {
        match self {
            Self::Gemini(b) => b.token_counter(),
            Self::Scripted(b) => b.token_counter(),
        }
    }
}
