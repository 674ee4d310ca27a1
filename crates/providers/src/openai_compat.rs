//! Client-side OpenAI-compatible chat-completions adapter.

use std::collections::HashMap;

use serde_json::{json, Value};

use nerve_domain::error::{Error, Result};
use nerve_domain::stream::{BoxStream, StreamEvent, Usage};
use nerve_domain::tool::{Message, Role, ToolCall, ToolDefinition};

use crate::sse::sse_response_stream;
use crate::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};

pub struct OpenAiCompatProvider {
    pub id: String,
    pub base_url: String,
    pub api_key: String,
    pub default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let mut body = json!({
            "model": self.effective_model(req),
            "messages": messages,
        });
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = req.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if req.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        if !req.tools.is_empty() {
            body["tools"] = json!(req.tools.iter().map(tool_to_openai).collect::<Vec<_>>());
        }
        if req.stream {
            body["stream"] = json!(true);
        }
        body
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Assistant => assistant_to_openai(msg),
        Role::Tool => tool_result_to_openai(msg),
        _ => json!({ "role": role_to_str(msg.role), "content": msg.content.extract_all_text() }),
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut out = json!({ "role": "assistant", "content": msg.content.extract_all_text() });
    if !msg.tool_calls.is_empty() {
        out["tool_calls"] = json!(msg
            .tool_calls
            .iter()
            .map(|tc| json!({
                "id": tc.call_id,
                "type": "function",
                "function": { "name": tc.tool_name, "arguments": tc.arguments.to_string() },
            }))
            .collect::<Vec<_>>());
    }
    out
}

fn tool_result_to_openai(msg: &Message) -> Value {
    json!({
        "role": "tool",
        "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
        "content": msg.content.extract_all_text(),
    })
}

fn tool_to_openai(def: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": { "name": def.name, "description": def.description, "parameters": def.parameters },
    })
}

fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(calls) = message.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|c| {
            let func = c.get("function")?;
            let args = func.get("arguments").and_then(Value::as_str).unwrap_or("{}");
            Some(ToolCall {
                call_id: c.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                tool_name: func.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                arguments: serde_json::from_str(args).unwrap_or(Value::Null),
            })
        })
        .collect()
}

fn parse_openai_usage(body: &Value) -> Option<Usage> {
    let u = body.get("usage")?;
    let prompt = u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
    let completion = u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
    Some(Usage { prompt_tokens: prompt, completion_tokens: completion, total_tokens: prompt + completion })
}

fn parse_chat_response(body: Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| Error::Upstream { status: 502, message: "no choices in response".into() })?;
    let message = choice.get("message").cloned().unwrap_or(Value::Null);
    Ok(ChatResponse {
        content: message.get("content").and_then(Value::as_str).unwrap_or_default().to_string(),
        tool_calls: parse_openai_tool_calls(&message),
        usage: parse_openai_usage(&body),
        model: body.get("model").and_then(Value::as_str).unwrap_or_default().to_string(),
        finish_reason: choice.get("finish_reason").and_then(Value::as_str).map(str::to_string),
    })
}

#[derive(Default)]
struct StreamState {
    tool_calls: HashMap<u64, (String, String, String)>,
}

fn parse_sse_data(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done { usage: None, finish_reason: None })];
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return vec![];
    };
    let Some(choice) = value.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
        return vec![];
    };
    let Some(delta) = choice.get("delta") else { return vec![] };

    let mut events = Vec::new();
    if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
        events.push(Ok(StreamEvent::Thinking { text: text.to_string() }));
    }
    if let Some(text) = delta.get("content").and_then(Value::as_str) {
        events.push(Ok(StreamEvent::Token { text: text.to_string() }));
    }
    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let idx = call.get("index").and_then(Value::as_u64).unwrap_or(0);
            if let Some(func) = call.get("function") {
                let name = func.get("name").and_then(Value::as_str).map(str::to_string);
                let args_delta = func.get("arguments").and_then(Value::as_str).unwrap_or_default().to_string();
                if let Some(name) = name {
                    let id = call.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                    state.tool_calls.insert(idx, (id.clone(), name.clone(), String::new()));
                    events.push(Ok(StreamEvent::ToolCallStarted { index: idx, call_id: id, tool_name: name }));
                }
                if let Some(entry) = state.tool_calls.get_mut(&idx) {
                    entry.2.push_str(&args_delta);
                }
                events.push(Ok(StreamEvent::ToolCallDelta { index: idx, arguments_delta: args_delta }));
            }
        }
    }
    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        for idx in state.tool_calls.keys() {
            events.push(Ok(StreamEvent::ToolCallFinished { index: *idx }));
        }
        events.push(Ok(StreamEvent::Done { usage: parse_openai_usage(&value), finish_reason: Some(reason.to_string()) }));
    }
    events
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_chat_body(&req);
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
                .unwrap_or("openai-compatible request failed")
                .to_string();
            return Err(Error::Upstream { status: status.as_u16(), message });
        }
        parse_chat_response(body)
    }

    async fn chat_stream(&self, mut req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        req.stream = true;
        let body = self.build_chat_body(&req);
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
        Ok(sse_response_stream(resp, move |data| parse_sse_data(data, &mut state)))
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let body = json!({ "model": req.model.unwrap_or_else(|| self.default_model.clone()), "input": req.input });
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let body: Value = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        let embeddings = body
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("embedding").and_then(Value::as_array))
                    .map(|arr| arr.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())
                    .collect()
            })
            .unwrap_or_default();
        Ok(EmbeddingsResponse { embeddings })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_sentinel_parses() {
        let mut state = StreamState::default();
        let events = parse_sse_data("[DONE]", &mut state);
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn content_delta_becomes_token() {
        let mut state = StreamState::default();
        let events = parse_sse_data(r#"{"choices":[{"delta":{"content":"hi"}}]}"#, &mut state);
        assert!(matches!(&events[0], Ok(StreamEvent::Token { text }) if text == "hi"));
    }
}
