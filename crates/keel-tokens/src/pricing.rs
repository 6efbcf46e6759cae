//! Cost calculation and display formatting.
//!
//! Prices are per million tokens. Every price is optional and an absent
//! price contributes zero, so none of these functions can fail.

use keel_core::{Message, ModelPricing, UsageRecord};

/// Which per-token price applies to a message list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostDirection {
    /// Priced at the input rate.
    Input,
    /// Priced at the output rate.
    Output,
}

#[allow(clippy::cast_precision_loss)] // Token counts never approach 2^52
fn per_million(tokens: u64, price: f64) -> f64 {
    tokens as f64 / 1_000_000.0 * price
}

/// Cost of a message list.
///
/// Each message contributes its precomputed token count (zero when absent)
/// at the rate for `direction`, plus the per-image surcharge for each image
/// it carries. The per-request surcharge is added once per batch.
#[allow(clippy::cast_precision_loss)]
pub fn message_cost(
    pricing: &ModelPricing,
    messages: &[Message],
    direction: CostDirection,
    total_batches: u32,
) -> f64 {
    let rate = match direction {
        CostDirection::Input => pricing.input(),
        CostDirection::Output => pricing.output(),
    };

    let per_message: f64 = messages
        .iter()
        .map(|m| {
            per_million(m.budget_tokens(), rate) + pricing.image() * m.image_count() as f64
        })
        .sum();

    per_message + pricing.request() * f64::from(total_batches)
}

/// Token cost of one response: input, output, cache writes and cache reads
/// each at their own rate.
pub fn usage_cost(pricing: &ModelPricing, usage: &UsageRecord) -> f64 {
    per_million(usage.input_tokens, pricing.input())
        + per_million(usage.output_tokens, pricing.output())
        + per_million(usage.cache_write_tokens.unwrap_or(0), pricing.cache_write())
        + per_million(usage.cache_read_tokens.unwrap_or(0), pricing.cache_read())
}

/// Format a cost value for display.
///
/// Uses 4 decimal places for values under $0.01, 2 otherwise.
#[must_use]
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("${cost:.4}")
    } else {
        format!("${cost:.2}")
    }
}

/// Format a token count for display (e.g., `"1.5M"`, `"50K"`, `"500"`).
#[must_use]
#[allow(clippy::cast_precision_loss)] // Token counts never approach 2^52
pub fn format_tokens(n: u64) -> String {
    let scaled = |value: f64, suffix: &str| {
        if (value - value.round()).abs() < 0.05 {
            format!("{value:.0}{suffix}")
        } else {
            format!("{value:.1}{suffix}")
        }
    };
    if n >= 1_000_000 {
        scaled(n as f64 / 1_000_000.0, "M")
    } else if n >= 1_000 {
        scaled(n as f64 / 1_000.0, "K")
    } else {
        n.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
