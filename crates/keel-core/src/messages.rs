//! Conversation turns.
//!
//! The task loop owns the authoritative message list. Keel only ever reads
//! it and hands back borrowed projections, so nothing here offers mutation
//! beyond plain builders.

use serde::{Deserialize, Serialize};

/// Speaker of a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human or tool-result turn.
    User,
    /// Model reply.
    Assistant,
}

/// An embedded image attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
    /// Base64-encoded image data.
    pub data: String,
    /// MIME type (e.g. `image/png`).
    pub mime_type: String,
}

/// Typed block inside structured message content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text.
        text: String,
    },
    /// Inline image.
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Tool invocation issued by the assistant.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments.
        input: serde_json::Value,
    },
    /// Result of a tool invocation.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// ID of the tool call this answers.
        #[serde(rename = "toolUseId")]
        tool_use_id: String,
        /// Result text.
        content: String,
        /// Whether the tool reported an error.
        #[serde(rename = "isError", default)]
        is_error: bool,
    },
}

/// Message body: a plain string or an ordered list of blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Structured blocks.
    Blocks(Vec<ContentBlock>),
}

/// One conversational turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Speaker.
    pub role: Role,
    /// Body.
    pub content: MessageContent,
    /// Precomputed token count of the content, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_token_count: Option<u64>,
    /// Images attached alongside the content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSource>,
}

impl Message {
    /// A plain-text user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// A plain-text assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// A plain-text turn for `role`.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            content_token_count: None,
            images: Vec::new(),
        }
    }

    /// A structured turn for `role`.
    pub fn blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: MessageContent::Blocks(blocks),
            content_token_count: None,
            images: Vec::new(),
        }
    }

    /// Attach a precomputed token count.
    #[must_use]
    pub fn with_token_count(mut self, tokens: u64) -> Self {
        self.content_token_count = Some(tokens);
        self
    }

    /// Attach an image.
    #[must_use]
    pub fn with_image(mut self, image: ImageSource) -> Self {
        self.images.push(image);
        self
    }

    /// Whether this is a user turn.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Whether this is an assistant turn.
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Whether the message carries a defined, non-zero token count.
    pub fn has_token_count(&self) -> bool {
        matches!(self.content_token_count, Some(n) if n != 0)
    }

    /// Token count for budgeting, treating a missing count as zero.
    pub fn budget_tokens(&self) -> u64 {
        self.content_token_count.unwrap_or(0)
    }

    /// Text used for token estimation.
    ///
    /// Text blocks contribute their text, tool calls contribute their name
    /// followed by the JSON arguments, tool results contribute their output.
    /// Images contribute nothing. Parts are joined with newlines.
    pub fn text_content(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.clone()),
                    ContentBlock::ToolUse { name, input, .. } => Some(format!("{name} {input}")),
                    ContentBlock::ToolResult { content, .. } => Some(content.clone()),
                    ContentBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Number of billable images: attachments plus inline image blocks.
    pub fn image_count(&self) -> usize {
        let inline = match &self.content {
            MessageContent::Text(_) => 0,
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::Image { .. }))
                .count(),
        };
        self.images.len() + inline
    }
}
