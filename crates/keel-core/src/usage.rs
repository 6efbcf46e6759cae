//! Usage records for a single response and for a whole task.

use serde::{Deserialize, Serialize};

use crate::chunks::CanonicalChunk;

/// Where the counts in a [`UsageRecord`] came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    /// Every count was reported by the backend.
    Backend,
    /// Every count was computed locally.
    #[default]
    Estimated,
    /// Backend counts with locally computed gaps.
    Mixed,
}

/// Token counts and derived cost for one response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Input tokens.
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// Tokens written to the prompt cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    /// Tokens read from the prompt cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    /// Cost in USD.
    pub cost: f64,
    /// Provenance of the counts.
    pub source: UsageSource,
}

impl UsageRecord {
    /// The terminal chunk describing this record.
    pub fn to_chunk(&self) -> CanonicalChunk {
        CanonicalChunk::Usage {
            input_token_count: self.input_tokens,
            output_token_count: self.output_tokens,
            cache_write_token_count: self.cache_write_tokens,
            cache_read_token_count: self.cache_read_tokens,
        }
    }
}

/// Running totals across every request of one task.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUsage {
    /// Total input tokens.
    pub total_input_tokens: u64,
    /// Total output tokens.
    pub total_output_tokens: u64,
    /// Total cache-write tokens.
    pub total_cache_write_tokens: u64,
    /// Total cache-read tokens.
    pub total_cache_read_tokens: u64,
    /// Total cost in USD.
    pub total_cost: f64,
    /// Number of finalized responses.
    pub requests: u64,
}

impl TaskUsage {
    /// Fold one finalized response into the totals. Token totals saturate.
    pub fn record(&mut self, usage: &UsageRecord) {
        self.total_input_tokens = self.total_input_tokens.saturating_add(usage.input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(usage.output_tokens);
        self.total_cache_write_tokens = self
            .total_cache_write_tokens
            .saturating_add(usage.cache_write_tokens.unwrap_or(0));
        self.total_cache_read_tokens = self
            .total_cache_read_tokens
            .saturating_add(usage.cache_read_tokens.unwrap_or(0));
        self.total_cost += usage.cost;
        self.requests += 1;
    }

    /// Input plus output tokens.
    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens.saturating_add(self.total_output_tokens)
    }
}
