//! Backend capability and pricing descriptors.
//!
//! A [`Model`] is an immutable snapshot supplied by the caller for each
//! request. Nothing in keel mutates it. Every pricing field is optional
//! because backend pricing metadata is routinely incomplete; absent prices
//! price at zero.

use serde::{Deserialize, Serialize};

/// Per-million-token prices and flat surcharges for one model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    /// Price per million input tokens (USD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_per_million: Option<f64>,
    /// Price per million output tokens (USD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_per_million: Option<f64>,
    /// Price per million tokens written to the prompt cache (USD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_per_million: Option<f64>,
    /// Price per million tokens read from the prompt cache (USD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_per_million: Option<f64>,
    /// Flat surcharge per attached image (USD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_fee: Option<f64>,
    /// Flat surcharge per request (USD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_fee: Option<f64>,
}

impl ModelPricing {
    /// Input price, zero when unknown.
    #[must_use]
    pub fn input(&self) -> f64 {
        self.input_per_million.unwrap_or(0.0)
    }

    /// Output price, zero when unknown.
    #[must_use]
    pub fn output(&self) -> f64 {
        self.output_per_million.unwrap_or(0.0)
    }

    /// Cache-write price, zero when unknown.
    #[must_use]
    pub fn cache_write(&self) -> f64 {
        self.cache_write_per_million.unwrap_or(0.0)
    }

    /// Cache-read price, zero when unknown.
    #[must_use]
    pub fn cache_read(&self) -> f64 {
        self.cache_read_per_million.unwrap_or(0.0)
    }

    /// Per-image surcharge, zero when unknown.
    #[must_use]
    pub fn image(&self) -> f64 {
        self.image_fee.unwrap_or(0.0)
    }

    /// Per-request surcharge, zero when unknown.
    #[must_use]
    pub fn request(&self) -> f64 {
        self.request_fee.unwrap_or(0.0)
    }
}

/// Capability flags advertised by a backend model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCapabilities {
    /// Accepts image input.
    #[serde(default)]
    pub supports_images: bool,
    /// Supports prompt caching (cache read/write billing).
    #[serde(default)]
    pub supports_prompt_cache: bool,
    /// Supports extended tool actions (computer use and similar).
    #[serde(default)]
    pub supports_extended_tools: bool,
}

/// Capability and pricing descriptor for one backend model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Backend model identifier.
    pub id: String,
    /// Input token capacity. `None` means no limit can be assumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    /// Maximum output tokens per response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    /// Capability flags.
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    /// Pricing metadata.
    #[serde(default)]
    pub pricing: ModelPricing,
}

impl Model {
    /// A model with no known limits, capabilities or prices.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_window: None,
            max_output_tokens: None,
            capabilities: ModelCapabilities::default(),
            pricing: ModelPricing::default(),
        }
    }

    /// Set the context window.
    #[must_use]
    pub fn with_context_window(mut self, tokens: u64) -> Self {
        self.context_window = Some(tokens);
        self
    }

    /// Set the output-token limit.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u64) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Replace the capability flags.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the pricing metadata.
    #[must_use]
    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }
}
