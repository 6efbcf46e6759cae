//! The truncation strategy contract.

use std::fmt;

use keel_core::{Message, Model};

use crate::errors::Result;

/// The closed set of truncation strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Token-budgeted, re-evaluated every few calls.
    Sticky,
    /// Count-free pair dropping.
    Fallback,
}

impl StrategyKind {
    /// Lowercase name for logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sticky => "sticky",
            Self::Fallback => "fallback",
        }
    }

    /// Pick the strategy for a message list.
    ///
    /// Any message with a defined, non-zero token count means the list can
    /// be budgeted, so [`StrategyKind::Sticky`] applies. A single counted
    /// message among uncounted ones is enough; uncounted messages then
    /// budget as zero.
    pub fn select(messages: &[&Message]) -> Self {
        if messages.iter().any(|m| m.has_token_count()) {
            Self::Sticky
        } else {
            Self::Fallback
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps `(model, messages)` to a possibly shorter projection of `messages`.
///
/// Implementations must keep `messages[0]`, return references into the
/// input only, and clear all local state on [`reset`](Self::reset).
pub trait TruncationStrategy {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Apply the strategy.
    fn apply<'a>(&mut self, model: &Model, messages: &[&'a Message]) -> Result<Vec<&'a Message>>;

    /// Discard local state.
    fn reset(&mut self);
}
