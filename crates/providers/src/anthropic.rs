//! Client-side Anthropic Messages API adapter.

use std::collections::HashMap;

use serde_json::{json, Value};

use nerve_domain::error::{Error, Result};
use nerve_domain::stream::{BoxStream, StreamEvent, Usage};
use nerve_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};

use crate::sse::sse_response_stream;
use crate::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    pub id: String,
    pub base_url: String,
    pub api_key: String,
    pub default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn build_messages_body(&self, req: &ChatRequest) -> Value {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.extract_all_text()),
                Role::User => messages.push(user_msg_to_anthropic(msg)),
                Role::Assistant => messages.push(assistant_msg_to_anthropic(msg)),
                Role::Tool => messages.push(tool_result_to_anthropic(msg)),
            }
        }

        let mut body = json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(4096),
        });
        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join(". "));
        }
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if !req.tools.is_empty() {
            body["tools"] = json!(req.tools.iter().map(tool_to_anthropic).collect::<Vec<_>>());
        }
        if req.stream {
            body["stream"] = json!(true);
        }
        body
    }
}

fn user_msg_to_anthropic(msg: &Message) -> Value {
    json!({ "role": "user", "content": msg.content.extract_all_text() })
}

fn assistant_msg_to_anthropic(msg: &Message) -> Value {
    let mut blocks = Vec::new();
    let text = msg.content.extract_all_text();
    if !text.is_empty() {
        blocks.push(json!({ "type": "text", "text": text }));
    }
    for tc in &msg.tool_calls {
        blocks.push(json!({
            "type": "tool_use",
            "id": tc.call_id,
            "name": tc.tool_name,
            "input": tc.arguments,
        }));
    }
    json!({ "role": "assistant", "content": blocks })
}

fn tool_result_to_anthropic(msg: &Message) -> Value {
    json!({
        "role": "user",
        "content": [{
            "type": "tool_result",
            "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content.extract_all_text(),
        }]
    })
}

fn tool_to_anthropic(def: &ToolDefinition) -> Value {
    json!({
        "name": def.name,
        "description": def.description,
        "input_schema": def.parameters,
    })
}

fn parse_anthropic_usage(body: &Value) -> Option<Usage> {
    let u = body.get("usage")?;
    let input = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
    let output = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
    Some(Usage { prompt_tokens: input, completion_tokens: output, total_tokens: input + output })
}

fn parse_anthropic_response(body: Value) -> ChatResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    if let Some(blocks) = body.get("content").and_then(Value::as_array) {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    content.push_str(block.get("text").and_then(Value::as_str).unwrap_or(""));
                }
                Some("tool_use") => {
                    tool_calls.push(ToolCall {
                        call_id: block.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                        tool_name: block.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                        arguments: block.get("input").cloned().unwrap_or(Value::Null),
                    });
                }
                _ => {}
            }
        }
    }
    ChatResponse {
        content,
        tool_calls,
        usage: parse_anthropic_usage(&body),
        model: body.get("model").and_then(Value::as_str).unwrap_or_default().to_string(),
        finish_reason: body.get("stop_reason").and_then(Value::as_str).map(str::to_string),
    }
}

#[derive(Default)]
struct StreamState {
    active_tool_calls: HashMap<u64, (String, String, String)>,
    usage: Option<Usage>,
}

fn parse_anthropic_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return vec![];
    };
    let Some(event_type) = value.get("type").and_then(Value::as_str) else {
        return vec![];
    };

    match event_type {
        "content_block_start" => {
            if let Some(block) = value.get("content_block") {
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let idx = value.get("index").and_then(Value::as_u64).unwrap_or(0);
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                    state.active_tool_calls.insert(idx, (id.clone(), name.clone(), String::new()));
                    return vec![Ok(StreamEvent::ToolCallStarted { index: idx, call_id: id, tool_name: name })];
                }
            }
            vec![]
        }
        "content_block_delta" => {
            let idx = value.get("index").and_then(Value::as_u64).unwrap_or(0);
            let Some(delta) = value.get("delta") else { return vec![] };
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => {
                    let text = delta.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
                    vec![Ok(StreamEvent::Token { text })]
                }
                Some("input_json_delta") => {
                    let partial = delta.get("partial_json").and_then(Value::as_str).unwrap_or_default().to_string();
                    if let Some(entry) = state.active_tool_calls.get_mut(&idx) {
                        entry.2.push_str(&partial);
                    }
                    vec![Ok(StreamEvent::ToolCallDelta { index: idx, arguments_delta: partial })]
                }
                _ => vec![],
            }
        }
        "content_block_stop" => {
            let idx = value.get("index").and_then(Value::as_u64).unwrap_or(0);
            if state.active_tool_calls.contains_key(&idx) {
                return vec![Ok(StreamEvent::ToolCallFinished { index: idx })];
            }
            vec![]
        }
        "message_delta" => {
            if let Some(usage) = value.get("usage") {
                let output = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
                let prompt = state.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0);
                state.usage = Some(Usage { prompt_tokens: prompt, completion_tokens: output, total_tokens: prompt + output });
            }
            vec![]
        }
        "message_start" => {
            if let Some(msg) = value.get("message") {
                if let Some(u) = parse_anthropic_usage(msg) {
                    state.usage = Some(u);
                }
            }
            vec![]
        }
        "message_stop" => {
            let finish_reason = None;
            vec![Ok(StreamEvent::Done { usage: state.usage.clone(), finish_reason })]
        }
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("anthropic stream error")
                .to_string();
            vec![Ok(StreamEvent::Error { message })]
        }
        _ => vec![],
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_messages_body(&req);
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body: Value = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("anthropic request failed")
                .to_string();
            return Err(Error::Upstream { status: status.as_u16(), message });
        }
        Ok(parse_anthropic_response(body))
    }

    async fn chat_stream(&self, mut req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        req.stream = true;
        let body = self.build_messages_body(&req);
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Upstream { status, message: text });
        }

        let mut state = StreamState::default();
        Ok(sse_response_stream(resp, move |data| parse_anthropic_sse(data, &mut state)))
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        Err(Error::invalid_input("anthropic has no embeddings API"))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_tool_use_response() {
        let body = json!({
            "model": "claude-3",
            "stop_reason": "tool_use",
            "content": [
                { "type": "text", "text": "looking it up" },
                { "type": "tool_use", "id": "toolu_1", "name": "search", "input": { "q": "rust" } }
            ],
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        });
        let resp = parse_anthropic_response(body);
        assert_eq!(resp.content, "looking it up");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].call_id, "toolu_1");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn sse_tool_call_sequence() {
        let mut state = StreamState::default();
        let start = parse_anthropic_sse(
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"search"}}"#,
            &mut state,
        );
        assert!(matches!(start[0], Ok(StreamEvent::ToolCallStarted { .. })));
        let delta = parse_anthropic_sse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"q\":1}"}}"#,
            &mut state,
        );
        assert!(matches!(delta[0], Ok(StreamEvent::ToolCallDelta { .. })));
        assert_eq!(state.active_tool_calls.get(&0).unwrap().2, "{\"q\":1}");
    }
}
