//! # keel-tokens
//!
//! Token accounting for one task lifetime.
//!
//! - [`TokenAccountant`]: fingerprint-keyed count cache in front of a
//!   pluggable [`TokenCounter`], degrading to a [`RoughEstimator`] on failure
//! - [`pricing`]: message-list cost, usage cost and display formatting
//!
//! Counting never fails from the caller's point of view and cost calculation
//! never fails at all; absent prices contribute zero.

#![deny(unsafe_code)]

pub mod accountant;
pub mod counter;
pub mod errors;
pub mod estimate;
pub mod fingerprint;
pub mod pricing;

pub use accountant::{CacheStats, TokenAccountant};
pub use counter::TokenCounter;
pub use errors::{CountError, Result};
pub use estimate::RoughEstimator;
pub use fingerprint::fingerprint;
pub use pricing::{CostDirection, format_cost, format_tokens, message_cost, usage_cost};
