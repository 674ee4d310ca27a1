//! LLM single-shot and chat nodes (§4.6).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_domain::node::{NodeCapabilities, NodeDescriptor, NodeState, NodeVariant};
use nerve_domain::tool::{Message, MessageContent, Role, ToolCall, ToolDefinition};
use nerve_providers::{ChatRequest, LlmProvider};

use crate::node::{not_ready, Node, ToolCapable};
use crate::tool_catalog::ToolExecutor;

/// Ephemeral: performs one provider request from `ctx.input` (expected
/// to be a JSON array of `Message`, or a plain string treated as a
/// single user turn) and returns `{content, usage, finish_reason,
/// success, error?}`. Holds no conversation.
pub struct SingleShotLlmNode {
    descriptor: NodeDescriptor,
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl SingleShotLlmNode {
    pub fn new(id: impl Into<String>, provider: Arc<dyn LlmProvider>, model: Option<String>) -> Result<Self> {
        let mut descriptor = NodeDescriptor::new(id, NodeVariant::LlmSingleShot)?;
        descriptor.persistent = false;
        Ok(Self { descriptor, provider, model })
    }

    fn messages_from_input(input: &Value) -> Vec<Message> {
        if let Ok(messages) = serde_json::from_value::<Vec<Message>>(input.clone()) {
            return messages;
        }
        let text = input.as_str().map(str::to_string).unwrap_or_else(|| input.to_string());
        vec![Message::user(text)]
    }

    pub async fn complete(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> Result<nerve_providers::ChatResponse> {
        let req = ChatRequest { messages, tools, model: self.model.clone(), ..Default::default() };
        self.provider.chat(req).await
    }
}

#[async_trait]
impl Node for SingleShotLlmNode {
    fn descriptor(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    fn state(&self) -> NodeState {
        NodeState::Ready
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<Value> {
        let messages = Self::messages_from_input(&ctx.input);
        match self.complete(messages, Vec::new()).await {
            Ok(resp) => {
                ctx.usage.add_api_call();
                if let Some(u) = &resp.usage {
                    ctx.usage.add_tokens(u.total_tokens);
                }
                Ok(serde_json::json!({
                    "content": resp.content,
                    "usage": resp.usage,
                    "finish_reason": resp.finish_reason,
                    "success": true,
                }))
            }
            Err(e) => Ok(serde_json::json!({
                "content": Value::Null,
                "usage": Value::Null,
                "finish_reason": Value::Null,
                "success": false,
                "error": e.to_string(),
            })),
        }
    }

    async fn interrupt(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatLlmConfig {
    pub system_prompt: Option<String>,
    pub max_tool_rounds: u32,
    pub parallel_tool_calls: bool,
    pub tool_choice: Option<String>,
}

struct ChatState {
    messages: Vec<Message>,
    forked_from: Option<String>,
    forked_at_ms: Option<i64>,
}

/// Persistent: owns a conversation. Tool dispatch goes through a
/// `ToolExecutor` composed by the session from the set of tool-capable
/// nodes visible to this chat node (see `tool_catalog`).
pub struct ChatLlmNode {
    descriptor: NodeDescriptor,
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    config: ChatLlmConfig,
    tools: Vec<ToolDefinition>,
    executor: Option<Arc<dyn ToolExecutor>>,
    state: Mutex<ChatState>,
}

impl ChatLlmNode {
    pub fn new(
        id: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        model: Option<String>,
        config: ChatLlmConfig,
        tools: Vec<ToolDefinition>,
        executor: Option<Arc<dyn ToolExecutor>>,
    ) -> Result<Self> {
        let mut descriptor = NodeDescriptor::new(id, NodeVariant::LlmChat)?;
        descriptor.persistent = true;
        descriptor.capabilities = NodeCapabilities { tool_capable: false, multi_tool: false, forkable: true };
        let max_tool_rounds = if config.max_tool_rounds == 0 { 8 } else { config.max_tool_rounds };
        let config = ChatLlmConfig { max_tool_rounds, ..config };
        Ok(Self {
            descriptor,
            provider,
            model,
            config,
            tools,
            executor,
            state: Mutex::new(ChatState { messages: Vec::new(), forked_from: None, forked_at_ms: None }),
        })
    }

    pub fn clear(&self) {
        self.state.lock().messages.clear();
    }

    /// Deep-copies messages and tool-call structures into a new,
    /// independent chat node so later mutations on either side are
    /// isolated (§8 "Fork isolation").
    pub fn fork(&self, new_id: impl Into<String>) -> Result<Self> {
        let new_id = new_id.into();
        let mut descriptor = NodeDescriptor::new(&new_id, NodeVariant::LlmChat)?;
        descriptor.persistent = true;
        descriptor.capabilities = self.descriptor.capabilities;
        let source_messages = self.state.lock().messages.clone();
        Ok(Self {
            descriptor,
            provider: self.provider.clone(),
            model: self.model.clone(),
            config: self.config.clone(),
            tools: self.tools.clone(),
            executor: self.executor.clone(),
            state: Mutex::new(ChatState {
                messages: source_messages,
                forked_from: Some(self.descriptor.id.clone()),
                forked_at_ms: Some(Utc::now().timestamp_millis()),
            }),
        })
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    /// `(forked_from, forked_at_ms)`, both `None` for a node that was
    /// never produced by `fork()`.
    pub fn fork_info(&self) -> (Option<String>, Option<i64>) {
        let state = self.state.lock();
        (state.forked_from.clone(), state.forked_at_ms)
    }

    fn request_messages(&self) -> Vec<Message> {
        let state = self.state.lock();
        let mut out = Vec::with_capacity(state.messages.len() + 1);
        if let Some(sys) = &self.config.system_prompt {
            out.push(Message::system(sys.clone()));
        }
        out.extend(state.messages.iter().cloned());
        out
    }

    async fn dispatch_tool_calls(&self, calls: &[ToolCall], ctx: &ExecutionContext) -> Vec<Message> {
        let Some(executor) = &self.executor else {
            return calls
                .iter()
                .map(|c| Message::tool_result(c.call_id.clone(), "no tool executor is configured on this node"))
                .collect();
        };

        if self.config.parallel_tool_calls {
            let futs = calls.iter().map(|c| async {
                let result = executor.call(&c.tool_name, c.arguments.clone(), ctx).await;
                Message::tool_result(c.call_id.clone(), result.unwrap_or_else(|e| e.to_string()))
            });
            futures_util::future::join_all(futs).await
        } else {
            let mut out = Vec::with_capacity(calls.len());
            for c in calls {
                let result = executor.call(&c.tool_name, c.arguments.clone(), ctx).await;
                out.push(Message::tool_result(c.call_id.clone(), result.unwrap_or_else(|e| e.to_string())));
            }
            out
        }
    }
}

#[async_trait]
impl Node for ChatLlmNode {
    fn descriptor(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    fn state(&self) -> NodeState {
        NodeState::Ready
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<Value> {
        let user_text = ctx.input.as_str().map(str::to_string).unwrap_or_else(|| ctx.input.to_string());
        self.state.lock().messages.push(Message::user(user_text));

        for _ in 0..self.config.max_tool_rounds {
            let req = ChatRequest {
                messages: self.request_messages(),
                tools: self.tools.clone(),
                model: self.model.clone(),
                ..Default::default()
            };
            let resp = self.provider.chat(req).await?;
            ctx.usage.add_api_call();
            if let Some(u) = &resp.usage {
                ctx.usage.add_tokens(u.total_tokens);
            }
            ctx.check_budget()?;

            if resp.tool_calls.is_empty() {
                let messages_count = {
                    let mut state = self.state.lock();
                    state.messages.push(Message::assistant(resp.content.clone()));
                    state.messages.len()
                };
                return Ok(serde_json::json!({
                    "content": resp.content,
                    "usage": resp.usage,
                    "messages_count": messages_count,
                    "success": true,
                }));
            }

            self.state.lock().messages.push(Message::assistant_tool_calls(resp.tool_calls.clone()));
            let tool_messages = self.dispatch_tool_calls(&resp.tool_calls, &ctx).await;
            self.state.lock().messages.extend(tool_messages);
        }

        Err(Error::invalid_state(format!(
            "node {:?} exceeded max_tool_rounds ({}) without a final answer",
            self.descriptor.id, self.config.max_tool_rounds
        )))
    }

    async fn interrupt(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nerve_domain::tool::ContentPart;
    use nerve_providers::{ChatResponse, EmbeddingsRequest, EmbeddingsResponse};

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
            let last = req.messages.last().map(|m| m.content.extract_all_text()).unwrap_or_default();
            Ok(ChatResponse { content: last, tool_calls: Vec::new(), usage: None, model: "echo".into(), finish_reason: Some("stop".into()) })
        }

        async fn chat_stream(&self, _req: ChatRequest) -> Result<nerve_domain::stream::BoxStream<'static, Result<nerve_domain::stream::StreamEvent>>> {
            unimplemented!()
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!()
        }

        fn provider_id(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn fork_isolates_message_history() {
        let node = ChatLlmNode::new("chat-a", Arc::new(EchoProvider), None, ChatLlmConfig::default(), Vec::new(), None).unwrap();
        let ctx = ExecutionContext::new("default", Value::String("hi".into()));
        node.execute(ctx).await.unwrap();
        let forked = node.fork("chat-b").unwrap();

        let ctx2 = ExecutionContext::new("default", Value::String("more".into()));
        forked.execute(ctx2).await.unwrap();

        assert_eq!(node.messages().len(), 2);
        assert_eq!(forked.messages().len(), 4);
        assert_eq!(node.messages()[0].content.extract_all_text(), "hi");
        let _ = ContentPart::Text { text: String::new() };
    }
}
