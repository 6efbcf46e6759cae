//! Token-budgeted truncation that holds its output steady between
//! re-evaluations.
//!
//! Messages after the task are grouped into turns: each group opens at a
//! user message and absorbs every following non-user message, so a request
//! and its replies and tool exchanges are kept or dropped together. Groups
//! are taken newest first while they fit in
//! `context_window - task_tokens`; the first group that does not fit ends
//! the walk. The walk also ends at the previous cut point, so within one
//! strategy lifetime a dropped group never comes back and the cut only moves
//! forward.
//!
//! Between re-evaluations the input is returned unchanged. A fresh or reset
//! strategy evaluates on its first call.

use std::ops::Range;

use keel_core::{Message, Model};
use tracing::debug;

use crate::errors::{Result, TruncationError};
use crate::strategy::{StrategyKind, TruncationStrategy};

/// Default number of calls between re-evaluations.
pub const DEFAULT_STICKINESS_FACTOR: usize = 5;

/// Strategy-local state for [`StickyStrategy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TruncationState {
    stickiness_factor: usize,
    calls_since_eval: usize,
    last_cut: Option<usize>,
}

impl TruncationState {
    /// Fresh state re-evaluating every `stickiness_factor` calls (minimum 1).
    pub fn new(stickiness_factor: usize) -> Self {
        Self {
            stickiness_factor: stickiness_factor.max(1),
            calls_since_eval: 0,
            last_cut: None,
        }
    }

    /// Calls between re-evaluations.
    pub fn stickiness_factor(&self) -> usize {
        self.stickiness_factor
    }

    /// Stale calls served since the last evaluation.
    pub fn calls_since_eval(&self) -> usize {
        self.calls_since_eval
    }

    /// Index where the kept tail started at the last evaluation. `None`
    /// before the first evaluation and after a reset.
    pub fn last_cut(&self) -> Option<usize> {
        self.last_cut
    }

    fn due(&self) -> bool {
        self.last_cut.is_none() || self.calls_since_eval >= self.stickiness_factor
    }

    fn reset(&mut self) {
        self.calls_since_eval = 0;
        self.last_cut = None;
    }
}

impl Default for TruncationState {
    fn default() -> Self {
        Self::new(DEFAULT_STICKINESS_FACTOR)
    }
}

/// Sticky truncation strategy.
#[derive(Clone, Debug, Default)]
pub struct StickyStrategy {
    state: TruncationState,
}

impl StickyStrategy {
    /// Strategy re-evaluating every `stickiness_factor` calls.
    pub fn new(stickiness_factor: usize) -> Self {
        Self {
            state: TruncationState::new(stickiness_factor),
        }
    }

    /// Current state.
    pub fn state(&self) -> &TruncationState {
        &self.state
    }
}

/// Index ranges of the turn groups in `messages[1..]`.
///
/// Non-user messages before the first user message form a leading group of
/// their own.
fn turn_groups(messages: &[&Message]) -> Vec<Range<usize>> {
    let mut groups: Vec<Range<usize>> = Vec::new();
    for (i, message) in messages.iter().enumerate().skip(1) {
        match groups.last_mut() {
            Some(group) if !message.is_user() => group.end = i + 1,
            _ => groups.push(i..i + 1),
        }
    }
    groups
}

/// Start index of the newest run of groups that fits in `budget`, never
/// reaching back before `floor`.
fn cut_point(messages: &[&Message], budget: u64, floor: usize) -> Result<usize> {
    let mut cut = messages.len();
    let mut used: u64 = 0;

    for group in turn_groups(messages).into_iter().rev() {
        if group.start < floor {
            break;
        }
        let mut group_tokens: u64 = 0;
        for message in &messages[group.clone()] {
            group_tokens = group_tokens
                .checked_add(message.budget_tokens())
                .ok_or(TruncationError::TokenOverflow)?;
        }
        let next = used
            .checked_add(group_tokens)
            .ok_or(TruncationError::TokenOverflow)?;
        if next > budget {
            break;
        }
        used = next;
        cut = group.start;
    }

    Ok(cut)
}

impl TruncationStrategy for StickyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sticky
    }

    fn apply<'a>(&mut self, model: &Model, messages: &[&'a Message]) -> Result<Vec<&'a Message>> {
        let (Some(window), Some(first)) = (model.context_window, messages.first()) else {
            return Ok(messages.to_vec());
        };

        if !self.state.due() {
            self.state.calls_since_eval += 1;
            return Ok(messages.to_vec());
        }
        self.state.calls_since_eval = 0;

        let budget = window.saturating_sub(first.budget_tokens());
        // A shorter list than last time is not a continuation of it.
        let floor = self
            .state
            .last_cut
            .filter(|&previous| previous <= messages.len())
            .unwrap_or(0);
        let cut = cut_point(messages, budget, floor)?;
        if cut > messages.len() {
            return Err(TruncationError::CutOutOfRange {
                cut,
                len: messages.len(),
            });
        }

        if self.state.last_cut != Some(cut) {
            debug!(
                previous = ?self.state.last_cut,
                cut,
                total = messages.len(),
                budget,
                "sticky cut point moved"
            );
        }
        self.state.last_cut = Some(cut);

        let mut kept = Vec::with_capacity(messages.len() - cut + 1);
        kept.push(*first);
        kept.extend_from_slice(&messages[cut..]);
        Ok(kept)
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
