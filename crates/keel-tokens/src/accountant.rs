//! Fingerprint-cached token accounting.
//!
//! One [`TokenAccountant`] lives for one task / provider-instance lifetime.
//! It is shared by reference (usually `Arc`) between the task loop and the
//! stream pipeline that counts input tokens alongside the request, so all
//! methods take `&self`. The cache lock is never held across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use keel_core::{Message, Model};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::counter::TokenCounter;
use crate::estimate::RoughEstimator;
use crate::fingerprint::fingerprint;
use crate::pricing::{CostDirection, message_cost};

/// Snapshot of cache effectiveness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that reached the counter or estimator.
    pub misses: u64,
    /// Cached fingerprints.
    pub entries: usize,
}

/// Counts tokens through an optional exact counter, caching by content
/// fingerprint, and prices message lists.
pub struct TokenAccountant {
    counter: Option<Arc<dyn TokenCounter>>,
    estimator: RoughEstimator,
    cache: Mutex<HashMap<String, u64>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for TokenAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAccountant")
            .field("counter", &self.counter.as_ref().map(|c| c.name().to_owned()))
            .field("estimator", &self.estimator)
            .field("stats", &self.cache_stats())
            .finish()
    }
}

impl TokenAccountant {
    /// Accountant backed by an exact counter, falling back to `estimator`.
    pub fn new(counter: Arc<dyn TokenCounter>, estimator: RoughEstimator) -> Self {
        Self {
            counter: Some(counter),
            estimator,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Accountant with no exact counter; every miss is estimated.
    pub fn estimating(estimator: RoughEstimator) -> Self {
        Self {
            counter: None,
            estimator,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Token count of `text`.
    ///
    /// Cached by fingerprint. On a miss the exact counter is asked; if it is
    /// absent or fails, the rough estimate is used. Either way the result is
    /// cached, so identical text reaches the counter at most once per
    /// accountant lifetime.
    pub async fn count_tokens(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }

        let key = fingerprint(text);
        let cached = self.cache.lock().get(&key).copied();
        if let Some(cached) = cached {
            let _ = self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("keel_token_cache_hits_total").increment(1);
            return cached;
        }
        let _ = self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("keel_token_cache_misses_total").increment(1);

        let count = match &self.counter {
            Some(counter) => match counter.count(text).await {
                Ok(n) => n,
                Err(err) => {
                    warn!(
                        counter = counter.name(),
                        error = %err,
                        "token counting failed, using rough estimate"
                    );
                    self.estimator.estimate(text)
                }
            },
            None => self.estimator.estimate(text),
        };

        let _ = self.cache.lock().insert(key, count);
        count
    }

    /// Total input tokens for a request: the system prompt plus every
    /// message, preferring a message's precomputed count over counting its
    /// extracted text. Saturates at `u64::MAX`.
    pub async fn calculate_input_tokens(&self, system_prompt: &str, messages: &[Message]) -> u64 {
        let mut total = self.count_tokens(system_prompt).await;
        for message in messages {
            let count = match message.content_token_count {
                Some(n) => n,
                None => self.count_tokens(&message.text_content()).await,
            };
            total = total.saturating_add(count);
        }
        debug!(messages = messages.len(), total, "calculated input tokens");
        total
    }

    /// Cost of `messages` priced at `model`'s rate for `direction`, plus
    /// image and per-batch request surcharges. Never fails.
    pub fn calculate_cost(
        &self,
        model: &Model,
        messages: &[Message],
        direction: CostDirection,
        total_batches: u32,
    ) -> f64 {
        message_cost(&model.pricing, messages, direction, total_batches)
    }

    /// Uncached rough estimate.
    pub fn estimate(&self, text: &str) -> u64 {
        self.estimator.estimate(text)
    }

    /// Current cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.lock().len(),
        }
    }

    /// Clear the cache at the end of the owning lifetime.
    pub fn dispose(&self) {
        let entries = {
            let mut cache = self.cache.lock();
            let n = cache.len();
            cache.clear();
            n
        };
        debug!(entries, "token cache cleared");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
