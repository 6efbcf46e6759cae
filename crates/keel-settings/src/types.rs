//! Settings types.
//!
//! Every section deserializes with `#[serde(default)]` so a partial user file
//! only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeelSettings {
    /// Context-window truncation.
    pub context: ContextSettings,
    /// Token counting.
    pub tokens: TokenSettings,
    /// Stream normalization.
    pub stream: StreamSettings,
    /// Gemini reference backend.
    pub gemini: GeminiSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl KeelSettings {
    /// Reject values the core cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.context.stickiness_factor == 0 {
            return Err(SettingsError::InvalidValue(
                "context.stickinessFactor must be at least 1".into(),
            ));
        }
        if self.context.max_message_history < 2 {
            return Err(SettingsError::InvalidValue(
                "context.maxMessageHistory must be at least 2".into(),
            ));
        }
        if !(self.tokens.chars_per_token.is_finite() && self.tokens.chars_per_token > 0.0) {
            return Err(SettingsError::InvalidValue(
                "tokens.charsPerToken must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

/// Context-window truncation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    /// Calls the sticky strategy waits between re-evaluations.
    pub stickiness_factor: usize,
    /// Hard cap on messages accepted before strategy dispatch.
    pub max_message_history: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            stickiness_factor: 5,
            max_message_history: 1000,
        }
    }
}

/// Rough estimator used when no exact counter is available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// One token per whitespace-separated word.
    #[default]
    Words,
    /// One token per `charsPerToken` characters.
    Chars,
}

/// Token counting settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenSettings {
    /// Fallback estimator.
    pub estimator: EstimatorKind,
    /// Characters per token for [`EstimatorKind::Chars`].
    pub chars_per_token: f64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            estimator: EstimatorKind::Words,
            chars_per_token: 4.0,
        }
    }
}

/// Stream normalization settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Parse a trailing SSE event that lacks its terminating blank line.
    pub sse_process_remaining_buffer: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            sse_process_remaining_buffer: true,
        }
    }
}

/// Gemini backend settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiSettings {
    /// API base URL.
    pub base_url: String,
    /// Model ID.
    pub model: String,
    /// API key. Usually supplied through `GEMINI_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Output token cap sent with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            api_key: None,
            max_output_tokens: None,
            temperature: None,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
