//! Gemini HTTP transport and exact token counter.
//!
//! Streams from `models/{model}:streamGenerateContent?alt=sse` and counts
//! through `models/{model}:countTokens`. The API key travels in the
//! `x-goog-api-key` header so it never appears in URLs or logs.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use keel_core::Model;
use keel_settings::{GeminiSettings, KeelSettings};
use keel_tokens::{CountError, TokenCounter};
use reqwest::header::RETRY_AFTER;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::convert::build_request;
use super::models::gemini_model;
use super::stream::process_line;
use super::types::{CountTokensRequest, CountTokensResponse, GeminiContent, GeminiPart, GenerationConfig};
use crate::backend::{BackendEventStream, BackendRequest, BackendTransport};
use crate::error::{StreamError, StreamResult};
use crate::sse::{SseParserOptions, parse_sse_lines};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini backend configuration.
#[derive(Clone)]
pub struct GeminiConfig {
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Model ID (e.g. `gemini-2.5-flash`).
    pub model: String,
    /// API key. Requests fail with a 401 rejection when absent.
    pub api_key: Option<String>,
    /// Output token cap.
    pub max_output_tokens: Option<u64>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// SSE parser options.
    pub sse: SseParserOptions,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("sse", &self.sse)
            .finish()
    }
}

impl GeminiConfig {
    /// Config for `model` with default endpoint and no overrides.
    pub fn new(model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key,
            ..Self::from_gemini_settings(&GeminiSettings::default(), SseParserOptions::default())
        }
    }

    /// Config from loaded settings.
    pub fn from_settings(settings: &KeelSettings) -> Self {
        Self::from_gemini_settings(&settings.gemini, SseParserOptions::from(&settings.stream))
    }

    fn from_gemini_settings(settings: &GeminiSettings, sse: SseParserOptions) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_output_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
            sse,
        }
    }

    /// Point at a different endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }

    fn api_url(&self, action: &str) -> String {
        format!("{}/models/{}:{action}", self.base_url, self.model)
    }
}

/// Gemini streaming backend.
pub struct GeminiTransport {
    config: GeminiConfig,
    client: reqwest::Client,
    model: Model,
    counter: Option<Arc<GeminiTokenCounter>>,
}

impl std::fmt::Debug for GeminiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTransport")
            .field("config", &self.config)
            .field("model", &self.model.id)
            .finish_non_exhaustive()
    }
}

impl GeminiTransport {
    /// Create a transport with its own HTTP client.
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create a transport sharing an HTTP client.
    ///
    /// The model descriptor comes from the built-in catalog; unknown models
    /// get a bare descriptor with no window or prices.
    #[must_use]
    pub fn with_client(config: GeminiConfig, client: reqwest::Client) -> Self {
        let model = gemini_model(&config.model).unwrap_or_else(|| {
            warn!(model = %config.model, "unknown Gemini model, no context window or pricing");
            Model::new(config.model.clone())
        });
        let counter = config
            .api_key
            .is_some()
            .then(|| Arc::new(GeminiTokenCounter::with_client(&config, client.clone())));

        info!(
            model = %config.model,
            base_url = %config.base_url,
            exact_counting = counter.is_some(),
            "Gemini transport initialized"
        );

        Self {
            config,
            client,
            model,
            counter,
        }
    }

    /// Replace the model descriptor (custom limits or prices).
    #[must_use]
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// The transport's configuration.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

#[async_trait]
impl BackendTransport for GeminiTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &Model {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn open(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> StreamResult<BackendEventStream> {
        let api_key = self.config.api_key.as_deref().ok_or_else(missing_api_key)?;
        let body = build_request(
            &request.system_prompt,
            &request.messages,
            &self.config.generation_config(),
        );

        debug!(
            content_count = body.contents.len(),
            max_tokens = ?self.config.max_output_tokens,
            "Starting Gemini stream"
        );

        let url = format!("{}?alt=sse", self.config.api_url("streamGenerateContent"));
        let send = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StreamError::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let header_retry = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after_header);
            let body_text = response.text().await.unwrap_or_default();
            let info = parse_api_error(&body_text, status.as_u16());
            error!(
                status = status.as_u16(),
                code = info.code.as_deref().unwrap_or("unknown"),
                retryable = info.retryable,
                "Gemini API error"
            );
            return Err(StreamError::BackendRejected {
                status: Some(status.as_u16()),
                message: info.message,
                code: info.code,
                retryable: info.retryable,
                retry_after_ms: header_retry.or(info.retry_after_ms),
            });
        }

        let events = parse_sse_lines(response.bytes_stream(), self.config.sse).flat_map(|line| {
            futures::stream::iter(match line {
                Ok(line) => process_line(&line),
                Err(err) => vec![Err(err)],
            })
        });
        Ok(Box::pin(events))
    }

    fn token_counter(&self) -> Option<Arc<dyn TokenCounter>> {
        self.counter
            .as_ref()
            .map(|c| Arc::clone(c) as Arc<dyn TokenCounter>)
    }
}

fn missing_api_key() -> StreamError {
    StreamError::BackendRejected {
        status: Some(401),
        message: "no Gemini API key configured".into(),
        code: Some("UNAUTHENTICATED".into()),
        retryable: false,
        retry_after_ms: None,
    }
}

/// Fields extracted from an HTTP error body.
#[derive(Debug, PartialEq)]
struct ApiErrorInfo {
    message: String,
    code: Option<String>,
    retryable: bool,
    retry_after_ms: Option<u64>,
}

/// Parse an API error response body.
fn parse_api_error(body: &str, status: u16) -> ApiErrorInfo {
    let retryable = status == 429 || status >= 500;
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &json["error"];
        let message = error["message"]
            .as_str()
            .unwrap_or("Unknown error")
            .to_string();
        let code = error["status"].as_str().map(String::from);
        let retry_after_ms = error["details"].as_array().and_then(|details| {
            details
                .iter()
                .filter_map(|d| d["retryDelay"].as_str())
                .find_map(parse_retry_delay)
        });
        ApiErrorInfo {
            message,
            code,
            retryable,
            retry_after_ms,
        }
    } else {
        ApiErrorInfo {
            message: format!("HTTP {status}: {body}"),
            code: None,
            retryable,
            retry_after_ms: None,
        }
    }
}

/// `Retry-After` as delay-seconds or an HTTP-date, in milliseconds. A date
/// in the past means no wait.
fn parse_retry_after_header(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delay_ms = date.signed_duration_since(chrono::Utc::now()).num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

/// `RetryInfo.retryDelay` duration string such as `"13s"` or `"1.5s"`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_retry_delay(value: &str) -> Option<u64> {
    let seconds: f64 = value.strip_suffix('s')?.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| (seconds * 1000.0).round() as u64)
}

/// Exact counter backed by `countTokens`.
pub struct GeminiTokenCounter {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for GeminiTokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTokenCounter")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl GeminiTokenCounter {
    /// Counter for `config`'s model with its own HTTP client.
    #[must_use]
    pub fn new(config: &GeminiConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Counter sharing an HTTP client.
    #[must_use]
    pub fn with_client(config: &GeminiConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            url: config.api_url("countTokens"),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl TokenCounter for GeminiTokenCounter {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn count(&self, text: &str) -> keel_tokens::Result<u64> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CountError::Unavailable {
                counter: "gemini".into(),
            })?;
        let body = CountTokensRequest {
            contents: vec![GeminiContent {
                role: "user".into(),
                parts: vec![GeminiPart::text(text)],
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CountError::Backend {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let info = parse_api_error(&body_text, status.as_u16());
            return Err(CountError::Backend {
                message: format!("HTTP {}: {}", status.as_u16(), info.message),
            });
        }

        let parsed: CountTokensResponse = response.json().await.map_err(|e| CountError::Backend {
            message: e.to_string(),
        })?;
        Ok(parsed.total_tokens)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
