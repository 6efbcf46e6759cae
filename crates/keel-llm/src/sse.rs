//! # SSE Parser
//!
//! Server-Sent Events line parser for backend response streams:
//! - Line buffering from chunked responses
//! - `data: ` prefix extraction
//! - `[DONE]` marker filtering
//! - Remaining buffer processing (configurable)
//!
//! Read errors are surfaced as [`StreamError::TransportFailure`] and end the
//! stream.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use keel_settings::StreamSettings;
use tracing::warn;

use crate::error::StreamError;

/// Options for the SSE parser.
#[derive(Clone, Copy, Debug)]
pub struct SseParserOptions {
    /// Parse a trailing event that lacks its terminating newline.
    pub process_remaining_buffer: bool,
}

impl Default for SseParserOptions {
    fn default() -> Self {
        Self {
            process_remaining_buffer: true,
        }
    }
}

impl From<&StreamSettings> for SseParserOptions {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            process_remaining_buffer: settings.sse_process_remaining_buffer,
        }
    }
}

/// Parse SSE lines from a byte stream and yield the `data` payloads.
pub fn parse_sse_lines<S, E>(
    byte_stream: S,
    options: SseParserOptions,
) -> impl Stream<Item = Result<String, StreamError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<StreamError> + std::fmt::Display,
{
    let process_remaining = options.process_remaining_buffer;

    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue;
                    };

                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!(error = %e, "SSE stream read error");
                        return Some((Err(e.into()), (stream, buffer, true)));
                    }
                    None => {
                        if process_remaining && !buffer.is_empty() {
                            let data = std::str::from_utf8(&buffer)
                                .ok()
                                .and_then(|s| extract_sse_data(s.trim()));
                            buffer.clear();
                            if let Some(data) = data {
                                return Some((Ok(data), (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract the data payload from an SSE line.
///
/// Returns `None` for comments, empty lines, non-data fields, empty data and
/// `[DONE]` markers.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(
        parts: Vec<Result<&'static str, StreamError>>,
    ) -> impl Stream<Item = Result<Bytes, StreamError>> + Send + Unpin + 'static {
        futures::stream::iter(
            parts
                .into_iter()
                .map(|p| p.map(|s| Bytes::from_static(s.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(
        parts: Vec<Result<&'static str, StreamError>>,
        options: SseParserOptions,
    ) -> Vec<Result<String, StreamError>> {
        parse_sse_lines(byte_stream(parts), options).collect().await
    }

    // ── extract_sse_data ─────────────────────────────────────────────────

    #[test]
    fn extract_data_line() {
        assert_eq!(extract_sse_data("data: {\"a\":1}"), Some("{\"a\":1}".into()));
        assert_eq!(extract_sse_data("data:{\"a\":1}"), Some("{\"a\":1}".into()));
    }

    #[test]
    fn extract_skips_markers_comments_and_other_fields() {
        assert_eq!(extract_sse_data("data: [DONE]"), None);
        assert_eq!(extract_sse_data("data: "), None);
        assert_eq!(extract_sse_data(": keepalive"), None);
        assert_eq!(extract_sse_data("event: message"), None);
        assert_eq!(extract_sse_data(""), None);
    }

    // ── parse_sse_lines ──────────────────────────────────────────────────

    #[tokio::test]
    async fn splits_events_across_chunks() {
        let out = collect(
            vec![Ok("data: {\"a\""), Ok(":1}\r\n\r\ndata: {\"b\":2}\n\n")],
            SseParserOptions::default(),
        )
        .await;
        assert_eq!(out, vec![Ok("{\"a\":1}".into()), Ok("{\"b\":2}".into())]);
    }

    #[tokio::test]
    async fn trailing_event_without_newline() {
        let parts = vec![Ok("data: {\"a\":1}\n\ndata: {\"tail\":true}")];
        let with = collect(parts.clone(), SseParserOptions::default()).await;
        assert_eq!(with.len(), 2);

        let without = collect(
            parts,
            SseParserOptions {
                process_remaining_buffer: false,
            },
        )
        .await;
        assert_eq!(without.len(), 1);
    }

    #[tokio::test]
    async fn read_error_is_surfaced_and_ends_stream() {
        let out = collect(
            vec![
                Ok("data: {\"a\":1}\n\n"),
                Err(StreamError::transport("connection reset")),
                Ok("data: {\"never\":1}\n\n"),
            ],
            SseParserOptions::default(),
        )
        .await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert_eq!(out[1], Err(StreamError::transport("connection reset")));
    }

    #[test]
    fn options_from_settings() {
        let options = SseParserOptions::from(&StreamSettings {
            sse_process_remaining_buffer: false,
        });
        assert!(!options.process_remaining_buffer);
    }
}
