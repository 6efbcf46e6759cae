//! Converts keel [`Message`]s to Gemini API content.
//!
//! Assistant turns use the `model` role. Tool results are sent as
//! `functionResponse` parts named after the tool call they answer.
//! Attachments become `inlineData` parts after the message's own content.

use std::collections::HashMap;

use keel_core::{ContentBlock, Message, MessageContent, Role};
use serde_json::json;

use super::types::{
    FunctionCallData, FunctionResponseData, GeminiContent, GeminiPart, GenerateContentRequest,
    GenerationConfig, InlineDataContent, SystemInstruction, SystemPart,
};

/// Build a `streamGenerateContent` body.
pub fn build_request(
    system_prompt: &str,
    messages: &[Message],
    generation: &GenerationConfig,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: convert_messages(messages),
        system_instruction: build_system_instruction(system_prompt),
        generation_config: (!generation.is_empty()).then(|| generation.clone()),
    }
}

fn build_system_instruction(system_prompt: &str) -> Option<SystemInstruction> {
    if system_prompt.is_empty() {
        return None;
    }
    Some(SystemInstruction {
        parts: vec![SystemPart {
            text: system_prompt.to_owned(),
        }],
    })
}

/// Convert messages, dropping any that produce no parts.
pub fn convert_messages(messages: &[Message]) -> Vec<GeminiContent> {
    let tool_names = collect_tool_names(messages);

    messages
        .iter()
        .filter_map(|message| {
            let mut parts = match &message.content {
                MessageContent::Text(text) if text.is_empty() => Vec::new(),
                MessageContent::Text(text) => vec![GeminiPart::text(text.clone())],
                MessageContent::Blocks(blocks) => blocks
                    .iter()
                    .filter_map(|block| convert_block(block, &tool_names))
                    .collect(),
            };
            parts.extend(message.images.iter().map(|image| GeminiPart::InlineData {
                inline_data: InlineDataContent {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            }));

            if parts.is_empty() {
                return None;
            }
            Some(GeminiContent {
                role: gemini_role(message.role).into(),
                parts,
            })
        })
        .collect()
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

/// Map every tool call ID to its tool name.
fn collect_tool_names(messages: &[Message]) -> HashMap<&str, &str> {
    messages
        .iter()
        .filter_map(|m| match &m.content {
            MessageContent::Blocks(blocks) => Some(blocks),
            MessageContent::Text(_) => None,
        })
        .flatten()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, .. } => Some((id.as_str(), name.as_str())),
            _ => None,
        })
        .collect()
}

fn convert_block(block: &ContentBlock, tool_names: &HashMap<&str, &str>) -> Option<GeminiPart> {
    match block {
        ContentBlock::Text { text } if text.is_empty() => None,
        ContentBlock::Text { text } => Some(GeminiPart::text(text.clone())),
        ContentBlock::Image { data, mime_type } => Some(GeminiPart::InlineData {
            inline_data: InlineDataContent {
                mime_type: mime_type.clone(),
                data: data.clone(),
            },
        }),
        ContentBlock::ToolUse { name, input, .. } => Some(GeminiPart::FunctionCall {
            function_call: FunctionCallData {
                name: name.clone(),
                args: input.clone(),
            },
        }),
        ContentBlock::ToolResult { content, .. } if content.is_empty() => None,
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } => {
            // Unmatched IDs fall back to the `<name>-<suffix>` convention.
            let name = tool_names
                .get(tool_use_id.as_str())
                .copied()
                .or_else(|| tool_use_id.split('-').next())
                .unwrap_or(tool_use_id.as_str());
            Some(GeminiPart::FunctionResponse {
                function_response: FunctionResponseData {
                    name: name.to_owned(),
                    response: json!({ "name": name, "content": content }),
                },
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::ImageSource;

    fn tool_result(id: &str, content: &str) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    #[test]
    fn roles_map_to_user_and_model() {
        let contents = convert_messages(&[Message::user("q"), Message::assistant("a")]);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
    }

    #[test]
    fn empty_messages_are_dropped() {
        let contents = convert_messages(&[
            Message::user(""),
            Message::blocks(Role::Assistant, vec![ContentBlock::Text { text: String::new() }]),
            Message::user("kept"),
        ]);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].parts, vec![GeminiPart::text("kept")]);
    }

    #[test]
    fn attachments_follow_content() {
        let message = Message::user("see").with_image(ImageSource {
            data: "AAAA".into(),
            mime_type: "image/jpeg".into(),
        });
        let contents = convert_messages(&[message]);
        assert_eq!(contents[0].parts.len(), 2);
        assert_eq!(
            contents[0].parts[1],
            GeminiPart::InlineData {
                inline_data: InlineDataContent {
                    mime_type: "image/jpeg".into(),
                    data: "AAAA".into(),
                }
            }
        );
    }

    #[test]
    fn tool_round_trip_uses_call_name() {
        let messages = vec![
            Message::blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "call_1".into(),
                    name: "read_file".into(),
                    input: json!({"path": "a.rs"}),
                }],
            ),
            Message::blocks(Role::User, vec![tool_result("call_1", "fn main() {}")]),
        ];
        let contents = convert_messages(&messages);

        assert_eq!(
            contents[0].parts[0],
            GeminiPart::FunctionCall {
                function_call: FunctionCallData {
                    name: "read_file".into(),
                    args: json!({"path": "a.rs"}),
                }
            }
        );
        assert_eq!(
            contents[1].parts[0],
            GeminiPart::FunctionResponse {
                function_response: FunctionResponseData {
                    name: "read_file".into(),
                    response: json!({"name": "read_file", "content": "fn main() {}"}),
                }
            }
        );
    }

    #[test]
    fn unmatched_tool_result_uses_id_prefix() {
        let contents = convert_messages(&[Message::blocks(
            Role::User,
            vec![tool_result("search-42", "found")],
        )]);
        let part = &contents[0].parts[0];
        assert!(
            matches!(part, GeminiPart::FunctionResponse { function_response } if function_response.name == "search")
        );
    }

    #[test]
    fn empty_tool_result_is_skipped() {
        let contents =
            convert_messages(&[Message::blocks(Role::User, vec![tool_result("x-1", "")])]);
        assert!(contents.is_empty());
    }

    #[test]
    fn request_omits_empty_system_and_config() {
        let request = build_request("", &[Message::user("q")], &GenerationConfig::default());
        assert!(request.system_instruction.is_none());
        assert!(request.generation_config.is_none());

        let request = build_request(
            "sys",
            &[Message::user("q")],
            &GenerationConfig {
                max_output_tokens: Some(64),
                temperature: None,
            },
        );
        assert_eq!(request.system_instruction.unwrap().parts[0].text, "sys");
        assert_eq!(request.generation_config.unwrap().max_output_tokens, Some(64));
    }
}
