//! Turns Gemini SSE payloads into [`BackendEvent`]s.
//!
//! Each payload is handled on its own; the adapter owns accumulation. Thought
//! parts and function calls are not part of the canonical chunk set and are
//! dropped here.

use tracing::{debug, warn};

use super::types::{GeminiApiError, GeminiPart, GeminiStreamChunk, UsageMetadata};
use crate::backend::{BackendEvent, BackendUsage};
use crate::error::{StreamError, StreamResult};

/// Finish reasons that mean the response was withheld.
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
    "IMAGE_SAFETY",
];

/// Events for one SSE `data` payload. Malformed payloads yield nothing.
pub fn process_line(line: &str) -> Vec<StreamResult<BackendEvent>> {
    match serde_json::from_str::<GeminiStreamChunk>(line) {
        Ok(chunk) => process_chunk(chunk),
        Err(e) => {
            warn!(line = %line, error = %e, "Failed to parse Gemini SSE chunk");
            Vec::new()
        }
    }
}

/// Events for one parsed chunk. A rejection is always the last item.
pub fn process_chunk(chunk: GeminiStreamChunk) -> Vec<StreamResult<BackendEvent>> {
    if let Some(error) = chunk.error {
        return vec![Err(api_error(error))];
    }

    let mut events = Vec::new();
    let mut blocked = None;

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        blocked = Some(reason);
    }

    for candidate in chunk.candidates.into_iter().flatten() {
        if let Some(content) = candidate.content {
            events.extend(content.parts.into_iter().filter_map(process_part).map(Ok));
        }
        if let Some(reason) = candidate.finish_reason {
            if BLOCKED_FINISH_REASONS.contains(&reason.as_str()) {
                blocked = Some(reason);
            } else {
                debug!(finish_reason = %reason, "Gemini candidate finished");
            }
        }
    }

    if let Some(usage) = chunk.usage_metadata {
        events.push(Ok(BackendEvent::Usage(convert_usage(&usage))));
    }

    if let Some(reason) = blocked {
        events.push(Err(StreamError::BackendRejected {
            status: None,
            message: format!("response blocked: {reason}"),
            code: Some(reason),
            retryable: false,
            retry_after_ms: None,
        }));
    }
    events
}

fn process_part(part: GeminiPart) -> Option<BackendEvent> {
    match part {
        GeminiPart::Text {
            thought: Some(true),
            ..
        } => None,
        GeminiPart::Text { text, .. } if text.is_empty() => None,
        GeminiPart::Text { text, .. } => Some(BackendEvent::Text(text)),
        GeminiPart::InlineData { inline_data } => Some(BackendEvent::Image {
            data: inline_data.data,
            mime_type: inline_data.mime_type,
        }),
        GeminiPart::FunctionCall { function_call } => {
            debug!(name = %function_call.name, "ignoring Gemini function call part");
            None
        }
        GeminiPart::FunctionResponse { .. } => None,
    }
}

/// Map usage metadata. Cached prompt tokens are reported as cache reads and
/// excluded from input; reasoning tokens count as output.
pub fn convert_usage(usage: &UsageMetadata) -> BackendUsage {
    let cached = usage.cached_content_token_count;
    let output_tokens = match (usage.candidates_token_count, usage.thoughts_token_count) {
        (None, None) => None,
        (candidates, thoughts) => {
            Some(candidates.unwrap_or(0).saturating_add(thoughts.unwrap_or(0)))
        }
    };
    BackendUsage {
        input_tokens: usage
            .prompt_token_count
            .map(|prompt| prompt.saturating_sub(cached.unwrap_or(0))),
        output_tokens,
        cache_write_tokens: None,
        cache_read_tokens: cached,
    }
}

/// Typed error for an API error object.
pub fn api_error(error: GeminiApiError) -> StreamError {
    let retryable = error.code.is_some_and(|c| c == 429 || c >= 500);
    StreamError::BackendRejected {
        status: error.code,
        message: error.message,
        code: error.status,
        retryable,
        retry_after_ms: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn text_and_usage() {
        let events = process_line(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}],
               "usageMetadata":{"promptTokenCount":8,"candidatesTokenCount":1}}"#,
        );
        assert_eq!(
            events,
            vec![
                Ok(BackendEvent::Text("Hello".into())),
                Ok(BackendEvent::Usage(BackendUsage {
                    input_tokens: Some(8),
                    output_tokens: Some(1),
                    ..BackendUsage::default()
                })),
            ]
        );
    }

    #[test]
    fn thoughts_and_function_calls_are_dropped() {
        let events = process_line(
            r#"{"candidates":[{"content":{"parts":[
                {"text":"thinking...","thought":true},
                {"functionCall":{"name":"read","args":{}}},
                {"text":""},
                {"text":"answer"}
            ]}}]}"#,
        );
        assert_eq!(events, vec![Ok(BackendEvent::Text("answer".into()))]);
    }

    #[test]
    fn inline_data_becomes_image() {
        let events = process_line(
            r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"image/png","data":"iVBOR"}}]}}]}"#,
        );
        assert_eq!(
            events,
            vec![Ok(BackendEvent::Image {
                data: "iVBOR".into(),
                mime_type: "image/png".into(),
            })]
        );
    }

    #[test]
    fn safety_finish_is_a_rejection_after_content() {
        let events = process_line(
            r#"{"candidates":[{"content":{"parts":[{"text":"par"}]},"finishReason":"SAFETY"}]}"#,
        );
        assert_eq!(events.len(), 2);
        assert_matches!(
            &events[1],
            Err(StreamError::BackendRejected { status: None, code: Some(code), retryable: false, .. })
                if code == "SAFETY"
        );
    }

    #[test]
    fn blocked_prompt_is_a_rejection() {
        let events = process_line(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#);
        assert_matches!(
            events.as_slice(),
            [Err(StreamError::BackendRejected { code: Some(code), .. })] if code == "OTHER"
        );
    }

    #[test]
    fn normal_finish_is_not_an_error() {
        let events = process_line(r#"{"candidates":[{"finishReason":"STOP"}]}"#);
        assert!(events.is_empty());
    }

    #[test]
    fn in_stream_error_is_typed() {
        let events = process_line(
            r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#,
        );
        assert_matches!(
            events.as_slice(),
            [Err(StreamError::BackendRejected { status: Some(503), retryable: true, .. })]
        );
    }

    #[test]
    fn malformed_payload_is_skipped() {
        assert!(process_line("{not json").is_empty());
    }

    #[test]
    fn usage_splits_cached_and_adds_thoughts() {
        let usage = convert_usage(&UsageMetadata {
            prompt_token_count: Some(100),
            candidates_token_count: Some(20),
            thoughts_token_count: Some(5),
            cached_content_token_count: Some(60),
            total_token_count: Some(125),
        });
        assert_eq!(
            usage,
            BackendUsage {
                input_tokens: Some(40),
                output_tokens: Some(25),
                cache_write_tokens: None,
                cache_read_tokens: Some(60),
            }
        );
    }

    #[test]
    fn usage_output_saturates() {
        let usage = convert_usage(&UsageMetadata {
            candidates_token_count: Some(u64::MAX),
            thoughts_token_count: Some(2),
            ..UsageMetadata::default()
        });
        assert_eq!(usage.output_tokens, Some(u64::MAX));
    }

    #[test]
    fn usage_without_counts_stays_empty() {
        assert!(convert_usage(&UsageMetadata::default()).is_empty());
    }
}
