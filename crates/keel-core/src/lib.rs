//! # keel-core
//!
//! Foundation types shared by every keel crate:
//!
//! - **Model descriptors**: [`Model`] with context window, output limit, capability flags and [`ModelPricing`]
//! - **Messages**: [`Message`] turns with plain-text or block content and an optional precomputed token count
//! - **Canonical chunks**: [`CanonicalChunk`] (`text` / `image` / `usage`), the normalized stream unit
//! - **Usage**: [`UsageRecord`] for one response, [`TaskUsage`] for a whole task
//! - **Logging**: `tracing` subscriber bootstrap and log capture for tests

#![deny(unsafe_code)]

pub mod chunks;
pub mod logging;
pub mod messages;
pub mod model;
pub mod usage;

pub use chunks::CanonicalChunk;
pub use messages::{ContentBlock, ImageSource, Message, MessageContent, Role};
pub use model::{Model, ModelCapabilities, ModelPricing};
pub use usage::{TaskUsage, UsageRecord, UsageSource};
