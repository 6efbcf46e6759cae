//! Google Gemini reference backend.

pub mod convert;
pub mod models;
pub mod stream;
pub mod transport;
pub mod types;

pub use models::{GEMINI_MODELS, GeminiModelInfo, gemini_model, gemini_model_ids};
pub use transport::{GeminiConfig, GeminiTokenCounter, GeminiTransport};
