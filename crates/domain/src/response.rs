//! `ParsedResponse` and `Section` -- the structured shape a parser
//! produces from a terminal buffer (see `nerve-terminal::parser`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Text,
    Thinking,
    ToolCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: SectionType,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Section {
    pub fn text(content: impl Into<String>) -> Self {
        Self { kind: SectionType::Text, content: content.into(), metadata: Value::Null }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self { kind: SectionType::Thinking, content: content.into(), metadata: Value::Null }
    }

    pub fn tool_call(tool: &str, content: impl Into<String>) -> Self {
        Self {
            kind: SectionType::ToolCall,
            content: content.into(),
            metadata: serde_json::json!({ "tool": tool }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub raw: String,
    pub sections: Vec<Section>,
    pub is_complete: bool,
    pub is_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

impl ParsedResponse {
    /// The whole-buffer-as-one-text-section shape used by the `NONE`
    /// identity parser.
    pub fn whole_buffer(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            sections: vec![Section::text(raw.clone())],
            is_complete: true,
            is_ready: true,
            tokens: None,
            raw,
        }
    }

    pub fn text_only(&self) -> String {
        self.sections
            .iter()
            .filter(|s| s.kind == SectionType::Text)
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
