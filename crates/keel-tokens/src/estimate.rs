//! Rough token estimation.

use keel_settings::{EstimatorKind, TokenSettings};

/// Cheap, local token estimate used when no exact counter is available or
/// the exact counter fails.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoughEstimator {
    kind: EstimatorKind,
    chars_per_token: f64,
}

impl Default for RoughEstimator {
    fn default() -> Self {
        Self::words()
    }
}

impl RoughEstimator {
    /// One token per whitespace-separated word.
    #[must_use]
    pub fn words() -> Self {
        Self {
            kind: EstimatorKind::Words,
            chars_per_token: 4.0,
        }
    }

    /// One token per `chars_per_token` characters, rounded up.
    ///
    /// Non-positive ratios fall back to 4.
    #[must_use]
    pub fn chars(chars_per_token: f64) -> Self {
        let ratio = if chars_per_token.is_finite() && chars_per_token > 0.0 {
            chars_per_token
        } else {
            4.0
        };
        Self {
            kind: EstimatorKind::Chars,
            chars_per_token: ratio,
        }
    }

    /// Build from the `tokens` settings section.
    #[must_use]
    pub fn from_settings(settings: &TokenSettings) -> Self {
        match settings.estimator {
            EstimatorKind::Words => Self::words(),
            EstimatorKind::Chars => Self::chars(settings.chars_per_token),
        }
    }

    /// Which estimator this is.
    pub fn kind(&self) -> EstimatorKind {
        self.kind
    }

    /// Estimate the token count of `text`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn estimate(&self, text: &str) -> u64 {
        match self.kind {
            EstimatorKind::Words => text.split_whitespace().count() as u64,
            EstimatorKind::Chars => {
                let chars = text.chars().count() as f64;
                (chars / self.chars_per_token).ceil() as u64
            }
        }
    }
}
