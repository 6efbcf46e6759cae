//! Per-task entry point for truncation.

use keel_core::{Message, Model};
use keel_settings::ContextSettings;
use tracing::{debug, error, warn};

use crate::fallback::FallbackStrategy;
use crate::sticky::StickyStrategy;
use crate::strategy::{StrategyKind, TruncationStrategy};

/// Default cap on messages accepted before strategy dispatch.
pub const DEFAULT_MAX_MESSAGE_HISTORY: usize = 1000;

/// Selects and drives the truncation strategy for one task.
///
/// Strategy instances are stateful; each task owns its own manager.
#[derive(Debug)]
pub struct ContextWindowManager {
    sticky: StickyStrategy,
    fallback: FallbackStrategy,
    active: Option<StrategyKind>,
    max_message_history: usize,
}

impl Default for ContextWindowManager {
    fn default() -> Self {
        Self::new(&ContextSettings::default())
    }
}

impl ContextWindowManager {
    /// Manager configured from the `context` settings section.
    pub fn new(settings: &ContextSettings) -> Self {
        Self {
            sticky: StickyStrategy::new(settings.stickiness_factor),
            fallback: FallbackStrategy::new(),
            active: None,
            max_message_history: settings.max_message_history.max(2),
        }
    }

    /// The strategy used by the most recent call, if any.
    pub fn active_strategy(&self) -> Option<StrategyKind> {
        self.active
    }

    /// The sticky strategy instance.
    pub fn sticky(&self) -> &StickyStrategy {
        &self.sticky
    }

    /// Bound `messages` to `model`'s context window.
    ///
    /// Returns references into `messages`; the source list is never
    /// modified. Without a context window the input comes back unchanged,
    /// and so does any list a strategy fails on.
    pub fn apply_truncation<'a>(&mut self, model: &Model, messages: &'a [Message]) -> Vec<&'a Message> {
        if model.context_window.is_none() {
            return messages.iter().collect();
        }

        let bounded = self.cap_history(messages);
        let kind = StrategyKind::select(&bounded);
        self.activate(kind);

        match self.strategy_mut(kind).apply(model, &bounded) {
            Ok(kept) => {
                if kept.len() < messages.len() {
                    metrics::counter!("keel_truncations_total", "strategy" => kind.as_str())
                        .increment(1);
                    debug!(
                        strategy = %kind,
                        before = messages.len(),
                        after = kept.len(),
                        "truncated conversation"
                    );
                }
                kept
            }
            Err(err) => {
                error!(
                    strategy = %kind,
                    model = %model.id,
                    error = %err,
                    "truncation failed, sending full history"
                );
                messages.iter().collect()
            }
        }
    }

    /// Reset every strategy and forget the active one. Call when the task
    /// ends.
    pub fn reset(&mut self) {
        self.sticky.reset();
        self.fallback.reset();
        self.active = None;
    }

    fn activate(&mut self, kind: StrategyKind) {
        match self.active {
            Some(current) if current == kind => {}
            Some(previous) => {
                debug!(from = %previous, to = %kind, "switching truncation strategy");
                self.strategy_mut(previous).reset();
                self.active = Some(kind);
            }
            None => self.active = Some(kind),
        }
    }

    fn strategy_mut(&mut self, kind: StrategyKind) -> &mut dyn TruncationStrategy {
        match kind {
            StrategyKind::Sticky => &mut self.sticky,
            StrategyKind::Fallback => &mut self.fallback,
        }
    }

    /// Keep the task message plus the newest `max_message_history - 1`.
    fn cap_history<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        let cap = self.max_message_history;
        if messages.len() <= cap {
            return messages.iter().collect();
        }
        warn!(
            total = messages.len(),
            cap, "message history over cap, dropping oldest"
        );
        let tail_start = messages.len() - (cap - 1);
        std::iter::once(&messages[0])
            .chain(&messages[tail_start..])
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sticky::DEFAULT_STICKINESS_FACTOR;
    use keel_core::logging::capture_logs;
    use proptest::prelude::*;
    use tracing::Level;

    fn counted_conversation(task: u64, pairs: usize, per_message: u64) -> Vec<Message> {
        let mut messages = vec![Message::user("task").with_token_count(task)];
        for i in 0..pairs {
            messages.push(Message::user(format!("u{i}")).with_token_count(per_message));
            messages.push(Message::assistant(format!("a{i}")).with_token_count(per_message));
        }
        messages
    }

    fn uncounted_conversation(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("u{i}"))
                } else {
                    Message::assistant(format!("a{i}"))
                }
            })
            .collect()
    }

    fn same(a: &[&Message], b: &[Message]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| std::ptr::eq(*x, y))
    }

    // ── pass-through ────────────────────────────────────────────────

    #[test]
    fn single_task_message_is_unchanged() {
        let messages = vec![Message::user("task").with_token_count(10)];
        let mut manager = ContextWindowManager::default();
        for model in [Model::new("a"), Model::new("b").with_context_window(1)] {
            assert!(same(&manager.apply_truncation(&model, &messages), &messages));
        }
    }

    #[test]
    fn missing_context_window_is_unchanged() {
        let messages = uncounted_conversation(40);
        let mut manager = ContextWindowManager::default();
        let kept = manager.apply_truncation(&Model::new("unbounded"), &messages);
        assert!(same(&kept, &messages));
        assert_eq!(manager.active_strategy(), None);
    }

    #[test]
    fn empty_list_is_unchanged() {
        let mut manager = ContextWindowManager::default();
        let kept = manager.apply_truncation(&Model::new("m").with_context_window(10), &[]);
        assert!(kept.is_empty());
    }

    // ── selection ───────────────────────────────────────────────────

    #[test]
    fn counted_lists_use_sticky() {
        let messages = counted_conversation(50, 10, 50);
        let model = Model::new("m").with_context_window(250);
        let mut manager = ContextWindowManager::default();

        let kept = manager.apply_truncation(&model, &messages);
        assert_eq!(manager.active_strategy(), Some(StrategyKind::Sticky));
        // task + 2 pairs
        assert_eq!(kept.len(), 5);
        assert!(std::ptr::eq(kept[0], &messages[0]));
        assert!(std::ptr::eq(kept[1], &messages[17]));
    }

    #[test]
    fn uncounted_lists_use_fallback() {
        let messages = uncounted_conversation(9);
        let model = Model::new("m").with_context_window(1_000);
        let mut manager = ContextWindowManager::default();

        let kept = manager.apply_truncation(&model, &messages);
        assert_eq!(manager.active_strategy(), Some(StrategyKind::Fallback));
        assert_eq!(kept.len(), 6);
        assert!(std::ptr::eq(kept[1], &messages[4]));
    }

    #[test]
    fn one_counted_message_among_uncounted_selects_sticky_and_keeps_all() {
        let mut messages = uncounted_conversation(30);
        messages[17].content_token_count = Some(5);
        let model = Model::new("m").with_context_window(100);
        let mut manager = ContextWindowManager::default();

        let kept = manager.apply_truncation(&model, &messages);
        assert_eq!(manager.active_strategy(), Some(StrategyKind::Sticky));
        assert!(same(&kept, &messages));
    }

    // ── strategy switching ──────────────────────────────────────────

    #[test]
    fn switching_strategies_resets_stickiness() {
        let model = Model::new("m").with_context_window(250);
        let counted = counted_conversation(50, 10, 50);
        let uncounted = uncounted_conversation(9);
        let mut manager = ContextWindowManager::default();

        // Evaluate, then serve two stale calls.
        assert_eq!(manager.apply_truncation(&model, &counted).len(), 5);
        assert_eq!(manager.apply_truncation(&model, &counted).len(), counted.len());
        assert_eq!(manager.apply_truncation(&model, &counted).len(), counted.len());
        assert_eq!(manager.sticky().state().calls_since_eval(), 2);

        // Switch away and back: the sticky state was reset on the switch,
        // so the next sticky call evaluates immediately.
        let _ = manager.apply_truncation(&model, &uncounted);
        assert_eq!(manager.active_strategy(), Some(StrategyKind::Fallback));
        assert_eq!(manager.sticky().state().calls_since_eval(), 0);
        assert_eq!(manager.sticky().state().last_cut(), None);

        let kept = manager.apply_truncation(&model, &counted);
        assert_eq!(manager.active_strategy(), Some(StrategyKind::Sticky));
        assert_eq!(kept.len(), 5);
    }

    #[test]
    fn sticky_output_is_stable_between_evaluations() {
        let model = Model::new("m").with_context_window(250);
        let messages = counted_conversation(50, 10, 50);
        let mut manager = ContextWindowManager::default();
        let _ = manager.apply_truncation(&model, &messages);

        let outputs: Vec<Vec<&Message>> = (0..DEFAULT_STICKINESS_FACTOR)
            .map(|_| manager.apply_truncation(&model, &messages))
            .collect();
        for window in outputs.windows(2) {
            assert_eq!(window[0], window[1]);
        }

        let refreshed = manager.apply_truncation(&model, &messages);
        assert_eq!(refreshed.len(), 5);
    }

    #[test]
    fn reset_forgets_active_strategy() {
        let model = Model::new("m").with_context_window(250);
        let messages = counted_conversation(50, 10, 50);
        let mut manager = ContextWindowManager::default();
        let _ = manager.apply_truncation(&model, &messages);
        let _ = manager.apply_truncation(&model, &messages);

        manager.reset();
        assert_eq!(manager.active_strategy(), None);
        assert_eq!(manager.apply_truncation(&model, &messages).len(), 5);
    }

    // ── failure and caps ────────────────────────────────────────────

    #[test]
    fn strategy_failure_returns_input_and_logs() {
        let (logs, _guard) = capture_logs();
        let messages = vec![
            Message::user("task").with_token_count(1),
            Message::user("a").with_token_count(u64::MAX),
            Message::assistant("b").with_token_count(u64::MAX),
        ];
        let mut manager = ContextWindowManager::default();
        let kept = manager.apply_truncation(&Model::new("m").with_context_window(10), &messages);

        assert!(same(&kept, &messages));
        assert!(logs.has_event(Level::ERROR, "truncation failed"));
    }

    #[test]
    fn history_over_cap_keeps_task_and_newest() {
        let (logs, _guard) = capture_logs();
        let settings = ContextSettings {
            stickiness_factor: 5,
            max_message_history: 10,
        };
        // Counted and tiny, so sticky keeps everything it is given.
        let messages: Vec<Message> = (0..25)
            .map(|i| {
                let m = if i % 2 == 0 { Message::user("u") } else { Message::assistant("a") };
                m.with_token_count(1)
            })
            .collect();
        let mut manager = ContextWindowManager::new(&settings);
        let kept = manager.apply_truncation(&Model::new("m").with_context_window(1_000), &messages);

        assert_eq!(kept.len(), 10);
        assert!(std::ptr::eq(kept[0], &messages[0]));
        assert!(std::ptr::eq(kept[1], &messages[16]));
        assert!(std::ptr::eq(kept[9], &messages[24]));
        assert!(logs.has_event(Level::WARN, "over cap"));
    }

    #[test]
    fn default_cap_is_one_thousand() {
        let messages: Vec<Message> = (0..1_200)
            .map(|i| {
                let m = if i % 2 == 0 { Message::user("u") } else { Message::assistant("a") };
                m.with_token_count(1)
            })
            .collect();
        let mut manager = ContextWindowManager::default();
        let kept = manager.apply_truncation(&Model::new("m").with_context_window(1_000_000), &messages);
        assert_eq!(kept.len(), DEFAULT_MAX_MESSAGE_HISTORY);
    }

    proptest! {
        #[test]
        fn first_message_always_survives(
            counts in proptest::collection::vec(proptest::option::of(0u64..400), 1..80),
            window in 1u64..4_000,
            calls in 1usize..8,
        ) {
            let messages: Vec<Message> = counts
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let m = if i % 2 == 0 { Message::user("u") } else { Message::assistant("a") };
                    match c {
                        Some(n) => m.with_token_count(*n),
                        None => m,
                    }
                })
                .collect();
            let model = Model::new("m").with_context_window(window);
            let mut manager = ContextWindowManager::default();
            for _ in 0..calls {
                let kept = manager.apply_truncation(&model, &messages);
                prop_assert!(std::ptr::eq(kept[0], &messages[0]));
                prop_assert!(kept.len() <= messages.len());
            }
        }

        #[test]
        fn counted_lists_within_window_are_unchanged(
            counts in proptest::collection::vec(1u64..200, 1..60),
            slack in 0u64..100,
        ) {
            let messages: Vec<Message> = counts
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let m = if i % 2 == 0 { Message::user("u") } else { Message::assistant("a") };
                    m.with_token_count(*c)
                })
                .collect();
            let total: u64 = counts.iter().sum();
            let model = Model::new("m").with_context_window(total + slack);
            let mut manager = ContextWindowManager::default();
            let kept = manager.apply_truncation(&model, &messages);
            prop_assert!(same(&kept, &messages));
        }
    }
}
