//! Bidirectional Anthropic Messages <-> OpenAI chat-completions
//! translation for the transform proxy kind (§4.13).

use serde_json::{json, Value};

use crate::tool_id_mapper::ToolIdMapper;

pub fn anthropic_request_to_openai(body: &Value, model_override: Option<&str>, mapper: &ToolIdMapper) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = body.get("system").and_then(Value::as_str) {
        messages.push(json!({ "role": "system", "content": system }));
    }
    if let Some(turns) = body.get("messages").and_then(Value::as_array) {
        for turn in turns {
            messages.extend(anthropic_turn_to_openai(turn, mapper));
        }
    }

    let model = model_override
        .map(str::to_string)
        .unwrap_or_else(|| body.get("model").and_then(Value::as_str).unwrap_or_default().to_string());

    let mut out = json!({
        "model": model,
        "messages": messages,
        "max_tokens": body.get("max_tokens").cloned().unwrap_or(json!(4096)),
    });
    if let Some(t) = body.get("temperature") {
        out["temperature"] = t.clone();
    }
    if let Some(tools) = body.get("tools").and_then(Value::as_array) {
        out["tools"] = json!(tools.iter().map(anthropic_tool_to_openai).collect::<Vec<_>>());
    }
    if body.get("stream").and_then(Value::as_bool).unwrap_or(false) {
        out["stream"] = json!(true);
    }
    out
}

fn anthropic_tool_to_openai(tool: &Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.get("name").cloned().unwrap_or(Value::Null),
            "description": tool.get("description").cloned().unwrap_or(Value::Null),
            "parameters": tool.get("input_schema").cloned().unwrap_or(json!({})),
        }
    })
}

fn anthropic_turn_to_openai(turn: &Value, mapper: &ToolIdMapper) -> Vec<Value> {
    let role = turn.get("role").and_then(Value::as_str).unwrap_or("user");
    match turn.get("content") {
        Some(Value::String(text)) => vec![json!({ "role": role, "content": text })],
        Some(Value::Array(blocks)) => {
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            let mut tool_results = Vec::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => text.push_str(block.get("text").and_then(Value::as_str).unwrap_or_default()),
                    Some("tool_use") => {
                        let anthropic_id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                        let upstream_id = mapper.to_upstream(anthropic_id);
                        tool_calls.push(json!({
                            "id": upstream_id,
                            "type": "function",
                            "function": {
                                "name": block.get("name").cloned().unwrap_or(Value::Null),
                                "arguments": block.get("input").cloned().unwrap_or(json!({})).to_string(),
                            }
                        }));
                    }
                    Some("tool_result") => {
                        let anthropic_id = block.get("tool_use_id").and_then(Value::as_str).unwrap_or_default();
                        let upstream_id = mapper.to_upstream(anthropic_id);
                        let body_text = match block.get("content") {
                            Some(Value::String(s)) => s.clone(),
                            Some(other) => other.to_string(),
                            None => String::new(),
                        };
                        tool_results.push(json!({ "role": "tool", "tool_call_id": upstream_id, "content": body_text }));
                    }
                    _ => {}
                }
            }
            if !tool_results.is_empty() {
                return tool_results;
            }
            let mut out = json!({ "role": role, "content": text });
            if !tool_calls.is_empty() {
                out["tool_calls"] = json!(tool_calls);
                out["content"] = Value::Null;
            }
            vec![out]
        }
        _ => vec![json!({ "role": role, "content": "" })],
    }
}

pub fn openai_response_to_anthropic(body: &Value, mapper: &ToolIdMapper) -> Value {
    let choice = body.get("choices").and_then(Value::as_array).and_then(|c| c.first()).cloned().unwrap_or(Value::Null);
    let message = choice.get("message").cloned().unwrap_or(Value::Null);
    let mut content = Vec::new();

    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            content.push(json!({ "type": "text", "text": text }));
        }
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let upstream_id = call.get("id").and_then(Value::as_str).unwrap_or_default();
            let anthropic_id = mapper.to_anthropic(upstream_id);
            let func = call.get("function").cloned().unwrap_or(Value::Null);
            let args: Value = func
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or(json!({}));
            content.push(json!({
                "type": "tool_use",
                "id": anthropic_id,
                "name": func.get("name").cloned().unwrap_or(Value::Null),
                "input": args,
            }));
        }
    }

    let stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
        Some("tool_calls") => "tool_use",
        Some("length") => "max_tokens",
        _ => "end_turn",
    };

    let usage = body
        .get("usage")
        .map(|u| {
            json!({
                "input_tokens": u.get("prompt_tokens").cloned().unwrap_or(json!(0)),
                "output_tokens": u.get("completion_tokens").cloned().unwrap_or(json!(0)),
            })
        })
        .unwrap_or(json!({ "input_tokens": 0, "output_tokens": 0 }));

    json!({
        "type": "message",
        "role": "assistant",
        "model": body.get("model").cloned().unwrap_or(Value::Null),
        "content": content,
        "stop_reason": stop_reason,
        "usage": usage,
    })
}

/// Turns an error response from the upstream (OpenAI-shaped or
/// otherwise) into the Anthropic error body shape, preserving the
/// upstream HTTP status via the caller.
pub fn upstream_error_to_anthropic(message: &str) -> Value {
    json!({ "type": "error", "error": { "type": "api_error", "message": message } })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

/// One Anthropic SSE event: the event name and its JSON data payload.
/// The HTTP layer is responsible for framing this as `event: ...\n
/// data: ...\n\n`.
pub struct SseFrame {
    pub event: &'static str,
    pub data: Value,
}

/// Stateful per-stream encoder turning OpenAI SSE deltas into the
/// Anthropic SSE event sequence: `message_start`, then one
/// `content_block_start/delta/stop` run per block, then
/// `message_delta` + `message_stop`.
#[derive(Default)]
pub struct AnthropicSseEncoder {
    started: bool,
    current_block: Option<(u64, BlockKind)>,
    next_index: u64,
}

impl AnthropicSseEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &str, mapper: &ToolIdMapper) -> Vec<SseFrame> {
        if data.trim() == "[DONE]" {
            return self.close();
        }
        let Ok(value) = serde_json::from_str::<Value>(data) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if !self.started {
            self.started = true;
            out.push(frame(
                "message_start",
                json!({
                    "type": "message_start",
                    "message": { "type": "message", "role": "assistant", "content": [], "model": value.get("model").cloned().unwrap_or(Value::Null) }
                }),
            ));
        }

        let Some(choice) = value.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
            return out;
        };
        let Some(delta) = choice.get("delta") else {
            return out;
        };

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !matches!(self.current_block, Some((_, BlockKind::Text))) {
                out.extend(self.open_block(BlockKind::Text, json!({ "type": "text", "text": "" })));
            }
            let idx = self.current_block.expect("just opened").0;
            out.push(frame(
                "content_block_delta",
                json!({ "type": "content_block_delta", "index": idx, "delta": { "type": "text_delta", "text": text } }),
            ));
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let func = call.get("function");
                if let Some(name) = func.and_then(|f| f.get("name")).and_then(Value::as_str) {
                    let upstream_id = call.get("id").and_then(Value::as_str).unwrap_or_default();
                    let anthropic_id = mapper.to_anthropic(upstream_id);
                    out.extend(self.open_block(
                        BlockKind::ToolUse,
                        json!({ "type": "tool_use", "id": anthropic_id, "name": name, "input": {} }),
                    ));
                }
                if let Some(args) = func.and_then(|f| f.get("arguments")).and_then(Value::as_str) {
                    if let Some((idx, BlockKind::ToolUse)) = self.current_block {
                        out.push(frame(
                            "content_block_delta",
                            json!({ "type": "content_block_delta", "index": idx, "delta": { "type": "input_json_delta", "partial_json": args } }),
                        ));
                    }
                }
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            out.extend(self.close_current_block());
            let stop_reason = match reason {
                "tool_calls" => "tool_use",
                "length" => "max_tokens",
                _ => "end_turn",
            };
            out.push(frame(
                "message_delta",
                json!({ "type": "message_delta", "delta": { "stop_reason": stop_reason }, "usage": { "output_tokens": 0 } }),
            ));
            out.push(frame("message_stop", json!({ "type": "message_stop" })));
        }

        out
    }

    fn open_block(&mut self, kind: BlockKind, content_block: Value) -> Vec<SseFrame> {
        let mut out = self.close_current_block();
        let idx = self.next_index;
        self.next_index += 1;
        self.current_block = Some((idx, kind));
        out.push(frame("content_block_start", json!({ "type": "content_block_start", "index": idx, "content_block": content_block })));
        out
    }

    fn close_current_block(&mut self) -> Vec<SseFrame> {
        if let Some((idx, _)) = self.current_block.take() {
            vec![frame("content_block_stop", json!({ "type": "content_block_stop", "index": idx }))]
        } else {
            Vec::new()
        }
    }

    fn close(&mut self) -> Vec<SseFrame> {
        let mut out = self.close_current_block();
        if self.started {
            out.push(frame("message_stop", json!({ "type": "message_stop" })));
        }
        out
    }
}

fn frame(event: &'static str, data: Value) -> SseFrame {
    SseFrame { event, data }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_anthropic_request_to_openai_shape() {
        let body = json!({
            "model": "claude-3",
            "system": "be terse",
            "messages": [{ "role": "user", "content": "hi" }],
        });
        let mapper = ToolIdMapper::new();
        let out = anthropic_request_to_openai(&body, Some("gpt-4o"), &mapper);
        assert_eq!(out["model"], "gpt-4o");
        assert_eq!(out["messages"][0]["role"], "system");
        assert_eq!(out["messages"][1]["content"], "hi");
    }

    #[test]
    fn translates_openai_response_to_anthropic_shape() {
        let body = json!({
            "model": "gpt-4o",
            "choices": [{ "finish_reason": "stop", "message": { "role": "assistant", "content": "hello" } }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 2 },
        });
        let mapper = ToolIdMapper::new();
        let out = openai_response_to_anthropic(&body, &mapper);
        assert_eq!(out["type"], "message");
        assert_eq!(out["content"][0]["text"], "hello");
        assert_eq!(out["stop_reason"], "end_turn");
        assert_eq!(out["usage"]["input_tokens"], 3);
    }

    #[test]
    fn sse_encoder_emits_events_in_order() {
        let mapper = ToolIdMapper::new();
        let mut encoder = AnthropicSseEncoder::new();
        let frames = encoder.feed(r#"{"model":"gpt-4o","choices":[{"delta":{"content":"hi"}}]}"#, &mapper);
        assert_eq!(frames[0].event, "message_start");
        assert!(frames.iter().any(|f| f.event == "content_block_start"));
        let finish = encoder.feed(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#, &mapper);
        assert!(finish.iter().any(|f| f.event == "content_block_stop"));
        assert!(finish.iter().any(|f| f.event == "message_stop"));
    }
}
