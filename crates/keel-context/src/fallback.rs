//! Count-free truncation.
//!
//! Drops `floor((n - 1) / 4) * 2` messages after the task message, then
//! widens the kept tail backwards so it never opens on an assistant reply.

use keel_core::{Message, Model};
use tracing::debug;

use crate::errors::{Result, TruncationError};
use crate::strategy::{StrategyKind, TruncationStrategy};

/// Stateless pair-dropping strategy used when no token counts exist.
///
/// The boundary steps back over every consecutive assistant reply, not just
/// one, so the kept tail never opens on an assistant message even when
/// several replies are adjacent.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackStrategy;

impl FallbackStrategy {
    /// New strategy.
    pub fn new() -> Self {
        Self
    }

    /// Messages removed from a list of length `len`, always even.
    pub fn to_remove(len: usize) -> usize {
        (len.saturating_sub(1) / 4) * 2
    }
}

impl TruncationStrategy for FallbackStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fallback
    }

    fn apply<'a>(&mut self, _model: &Model, messages: &[&'a Message]) -> Result<Vec<&'a Message>> {
        let to_remove = Self::to_remove(messages.len());
        if to_remove == 0 {
            return Ok(messages.to_vec());
        }

        let mut boundary = 1 + to_remove;
        if boundary >= messages.len() {
            return Err(TruncationError::CutOutOfRange {
                cut: boundary,
                len: messages.len(),
            });
        }
        while boundary > 1 && messages[boundary].is_assistant() {
            boundary -= 1;
        }

        debug!(
            total = messages.len(),
            to_remove,
            boundary,
            "fallback truncation"
        );

        let mut kept = Vec::with_capacity(messages.len() - boundary + 1);
        kept.push(messages[0]);
        kept.extend_from_slice(&messages[boundary..]);
        Ok(kept)
    }

    fn reset(&mut self) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::Role;
    use proptest::prelude::*;

    /// Task message followed by alternating assistant/user turns.
    fn conversation(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i == 0 {
                    Message::user("task")
                } else if i % 2 == 1 {
                    Message::assistant(format!("a{i}"))
                } else {
                    Message::user(format!("u{i}"))
                }
            })
            .collect()
    }

    fn apply(messages: &[Message]) -> Vec<&Message> {
        let refs: Vec<&Message> = messages.iter().collect();
        FallbackStrategy::new()
            .apply(&Model::new("m"), &refs)
            .unwrap()
    }

    #[test]
    fn short_lists_are_unchanged() {
        for n in 0..5 {
            let messages = conversation(n);
            assert_eq!(apply(&messages).len(), n);
        }
    }

    #[test]
    fn nine_messages_boundary_on_user() {
        // index 5 is a user message: keep [0, 5..=8]
        let messages: Vec<Message> = (0..9)
            .map(|i| {
                if i % 2 == 0 {
                    Message::assistant(format!("m{i}"))
                } else {
                    Message::user(format!("m{i}"))
                }
            })
            .collect();
        let kept = apply(&messages);
        assert_eq!(kept.len(), 5);
        assert!(std::ptr::eq(kept[0], &messages[0]));
        assert!(std::ptr::eq(kept[1], &messages[5]));
        assert!(std::ptr::eq(kept[4], &messages[8]));
    }

    #[test]
    fn nine_messages_boundary_on_assistant_shifts_back() {
        // index 5 is an assistant message: keep [0, 4..=8]
        let messages = conversation(9);
        assert_eq!(messages[5].role, Role::Assistant);
        let kept = apply(&messages);
        assert_eq!(kept.len(), 6);
        assert!(std::ptr::eq(kept[1], &messages[4]));
        assert!(kept[1].is_user());
    }

    #[test]
    fn consecutive_assistants_shift_until_user() {
        let messages = vec![
            Message::user("task"),
            Message::assistant("a1"),
            Message::user("u2"),
            Message::user("u3"),
            Message::assistant("a4"),
            Message::assistant("a5"),
            Message::user("u6"),
            Message::assistant("a7"),
            Message::user("u8"),
        ];
        let kept = apply(&messages);
        assert!(std::ptr::eq(kept[1], &messages[3]));
    }

    #[test]
    fn reset_is_a_no_op_and_strategy_is_idempotent() {
        let messages = conversation(13);
        let refs: Vec<&Message> = messages.iter().collect();
        let model = Model::new("m");
        let mut strategy = FallbackStrategy::new();
        let first = strategy.apply(&model, &refs).unwrap();
        strategy.reset();
        let second = strategy.apply(&model, &refs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn to_remove_is_even() {
        assert_eq!(FallbackStrategy::to_remove(0), 0);
        assert_eq!(FallbackStrategy::to_remove(1), 0);
        assert_eq!(FallbackStrategy::to_remove(5), 2);
        assert_eq!(FallbackStrategy::to_remove(9), 4);
        assert_eq!(FallbackStrategy::to_remove(21), 10);
    }

    proptest! {
        #[test]
        fn alternating_lengths_and_tail(n in 1usize..200) {
            let messages = conversation(n);
            let kept = apply(&messages);
            let to_remove = FallbackStrategy::to_remove(n);
            let shifted = to_remove > 0 && messages[1 + to_remove].is_assistant();

            prop_assert_eq!(kept.len(), 1 + (n - 1 - to_remove) + usize::from(shifted));
            prop_assert!(std::ptr::eq(kept[0], &messages[0]));
            if to_remove > 0 {
                prop_assert!(kept[1].is_user());
            }
        }

        #[test]
        fn arbitrary_roles_keep_task_and_never_open_on_assistant(
            roles in proptest::collection::vec(any::<bool>(), 1..120)
        ) {
            let messages: Vec<Message> = roles
                .iter()
                .map(|&user| if user { Message::user("u") } else { Message::assistant("a") })
                .collect();
            let kept = apply(&messages);
            prop_assert!(std::ptr::eq(kept[0], &messages[0]));
            prop_assert!(kept.len() <= messages.len());
            if kept.len() < messages.len() && kept.len() > 1 {
                let tail_start = messages.len() - (kept.len() - 1);
                prop_assert!(tail_start == 1 || kept[1].is_user());
            }
        }
    }
}
