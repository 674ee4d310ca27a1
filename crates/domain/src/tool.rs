//! Chat message and tool-call vocabulary shared by LLM nodes, the tool
//! protocol, and the LLM proxy's dialect translation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// A tool definition as exposed to an LLM chat request. `owner_node_id`
/// is filled in when the definition is contributed by a tool-capable
/// node into a chat node's catalog (see `nerve_nodes::tool_catalog`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(default)]
    pub owner_node_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn text(s: impl Into<String>) -> Self {
        MessageContent::Text(s.into())
    }

    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn tool_uses(&self) -> Vec<&ToolCall> {
        match self {
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolUse(tc) => Some(tc),
                    _ => None,
                })
                .collect(),
            MessageContent::Text(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ToolUse(ToolCall),
    ToolResult { tool_call_id: String, content: String, is_error: bool },
    Image { mime_type: String, data: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::text(text),
            tool_call_id: None,
            tool_calls: Vec::new(),
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::text(text),
            tool_call_id: None,
            tool_calls: Vec::new(),
            name: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::text(text),
            tool_call_id: None,
            tool_calls: Vec::new(),
            name: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Parts(Vec::new()),
            tool_call_id: None,
            tool_calls: calls,
            name: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::text(content),
            tool_call_id: Some(call_id.into()),
            tool_calls: Vec::new(),
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_joins_text_parts_only() {
        let msg = Message {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "a".into() },
                ContentPart::ToolUse(ToolCall {
                    call_id: "1".into(),
                    tool_name: "x".into(),
                    arguments: Value::Null,
                }),
                ContentPart::Text { text: "b".into() },
            ]),
            tool_call_id: None,
            tool_calls: Vec::new(),
            name: None,
        };
        assert_eq!(msg.content.extract_all_text(), "ab");
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("call_1", "42");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.role, Role::Tool);
    }
}
