//! Canonical stream chunks.
//!
//! Every backend stream is normalized to this one tagged union before it
//! reaches the task loop.

use serde::{Deserialize, Serialize};

/// One normalized unit of a backend response stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CanonicalChunk {
    /// Generated text.
    Text {
        /// Text delta.
        content: String,
    },
    /// Inline media produced by the backend.
    Image {
        /// Base64-encoded payload.
        content: String,
        /// MIME type.
        #[serde(rename = "contentType")]
        content_type: String,
    },
    /// Token usage for the whole response. Emitted once, after all content.
    #[serde(rename_all = "camelCase")]
    Usage {
        /// Input tokens.
        input_token_count: u64,
        /// Output tokens.
        output_token_count: u64,
        /// Tokens written to the prompt cache.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_write_token_count: Option<u64>,
        /// Tokens read from the prompt cache.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_read_token_count: Option<u64>,
    },
}

impl CanonicalChunk {
    /// Text chunk.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Whether this is the usage chunk.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }

    /// Text content, if this is a text chunk.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_serializes_with_camel_case_tag() {
        let chunk = CanonicalChunk::Usage {
            input_token_count: 10,
            output_token_count: 4,
            cache_write_token_count: None,
            cache_read_token_count: Some(2),
        };
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({
                "type": "usage",
                "inputTokenCount": 10,
                "outputTokenCount": 4,
                "cacheReadTokenCount": 2
            })
        );
    }

    #[test]
    fn image_round_trips_content_type() {
        let chunk: CanonicalChunk = serde_json::from_value(
            json!({"type": "image", "content": "AAAA", "contentType": "image/png"}),
        )
        .unwrap();
        assert_eq!(
            chunk,
            CanonicalChunk::Image {
                content: "AAAA".into(),
                content_type: "image/png".into()
            }
        );
    }

    #[test]
    fn accessors() {
        assert_eq!(CanonicalChunk::text("hi").as_text(), Some("hi"));
        assert!(!CanonicalChunk::text("hi").is_usage());
    }
}
