//! Gemini model registry.

use std::collections::HashMap;
use std::sync::LazyLock;

use keel_core::{Model, ModelCapabilities, ModelPricing};

/// Catalog entry for a Gemini model. Prices are USD per million tokens.
#[derive(Clone, Debug)]
pub struct GeminiModelInfo {
    /// Context window size in tokens.
    pub context_window: u64,
    /// Maximum output tokens.
    pub max_output: u64,
    /// Input price.
    pub input_per_million: f64,
    /// Output price.
    pub output_per_million: f64,
    /// Context-cache read price.
    pub cache_read_per_million: f64,
}

impl GeminiModelInfo {
    /// Model descriptor for `id`.
    pub fn to_model(&self, id: &str) -> Model {
        Model::new(id)
            .with_context_window(self.context_window)
            .with_max_output_tokens(self.max_output)
            .with_capabilities(ModelCapabilities {
                supports_images: true,
                supports_prompt_cache: true,
                supports_extended_tools: false,
            })
            .with_pricing(ModelPricing {
                input_per_million: Some(self.input_per_million),
                output_per_million: Some(self.output_per_million),
                cache_read_per_million: Some(self.cache_read_per_million),
                ..ModelPricing::default()
            })
    }
}

/// Model registry mapping model IDs to their metadata.
#[allow(unused_results)]
pub static GEMINI_MODELS: LazyLock<HashMap<&'static str, GeminiModelInfo>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "gemini-2.5-pro",
        GeminiModelInfo {
            context_window: 1_048_576,
            max_output: 65_536,
            input_per_million: 1.25,
            output_per_million: 10.0,
            cache_read_per_million: 0.31,
        },
    );
    m.insert(
        "gemini-2.5-flash",
        GeminiModelInfo {
            context_window: 1_048_576,
            max_output: 65_536,
            input_per_million: 0.30,
            output_per_million: 2.50,
            cache_read_per_million: 0.075,
        },
    );
    m.insert(
        "gemini-2.5-flash-lite",
        GeminiModelInfo {
            context_window: 1_048_576,
            max_output: 65_536,
            input_per_million: 0.10,
            output_per_million: 0.40,
            cache_read_per_million: 0.025,
        },
    );
    m.insert(
        "gemini-2.0-flash",
        GeminiModelInfo {
            context_window: 1_048_576,
            max_output: 8_192,
            input_per_million: 0.10,
            output_per_million: 0.40,
            cache_read_per_million: 0.025,
        },
    );
    m
});

/// Look up a Gemini model by ID.
#[must_use]
pub fn gemini_model(model_id: &str) -> Option<Model> {
    GEMINI_MODELS.get(model_id).map(|info| info.to_model(model_id))
}

/// All known model IDs, sorted.
#[must_use]
pub fn gemini_model_ids() -> Vec<&'static str> {
    let mut ids: Vec<_> = GEMINI_MODELS.keys().copied().collect();
    ids.sort_unstable();
    ids
}
