//! # keel-llm
//!
//! Normalizes backend response streams into [`CanonicalChunk`]s.
//!
//! - [`StreamAdapter`]: one per backend instance. Owns the request state
//!   machine (`idle → requesting → streaming → completed | cancelled | failed`),
//!   a fresh cancellation handle per request, and the single terminal usage
//!   chunk
//! - [`BackendTransport`]: the seam a backend implements to open a raw event
//!   stream; [`Backend`] is the closed set of shipped backends
//! - [`gemini`]: the Gemini reference backend (SSE streaming, `countTokens`)
//! - [`scripted`]: an in-memory backend replaying a fixed script
//! - [`sse`]: shared Server-Sent Events line parser
//!
//! [`CanonicalChunk`]: keel_core::CanonicalChunk

#![deny(unsafe_code)]

pub mod adapter;
pub mod backend;
pub mod error;
pub mod gemini;
pub mod response;
pub mod scripted;
pub mod sse;

pub use adapter::{StreamAdapter, StreamPhase};
pub use backend::{
    Backend, BackendEvent, BackendEventStream, BackendRequest, BackendTransport, BackendUsage,
};
pub use error::{StreamError, StreamResult};
pub use gemini::{GeminiConfig, GeminiTokenCounter, GeminiTransport};
pub use response::{CancelHandle, CollectedResponse, ResponseStream, StreamOutcome};
pub use scripted::{ScriptStep, ScriptedTransport};
pub use sse::{SseParserOptions, parse_sse_lines};
