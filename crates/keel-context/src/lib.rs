//! # keel-context
//!
//! Keeps a growing conversation inside a backend's context window.
//!
//! The task loop calls [`ContextWindowManager::apply_truncation`] before every
//! request. The manager picks a strategy from the shape of the message list:
//!
//! - [`StickyStrategy`] when messages carry token counts. Budgets whole
//!   user-led turn groups against the window and only re-evaluates every
//!   few calls so the visible prefix stays stable for prompt caching.
//! - [`FallbackStrategy`] when nothing is counted. Drops roughly half of the
//!   history in matched pairs.
//!
//! The first message (the task) is always retained, the source list is
//! never mutated, and a failing strategy never blocks the conversation.

#![deny(unsafe_code)]

pub mod errors;
pub mod fallback;
pub mod manager;
pub mod sticky;
pub mod strategy;

pub use errors::{Result, TruncationError};
pub use fallback::FallbackStrategy;
pub use manager::ContextWindowManager;
pub use sticky::{StickyStrategy, TruncationState};
pub use strategy::{StrategyKind, TruncationStrategy};
