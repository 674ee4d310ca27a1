//! Provider-agnostic chat request/response shapes and the `LlmProvider`
//! trait every dialect adapter implements.

use nerve_domain::error::Result;
use nerve_domain::stream::{BoxStream, StreamEvent, Usage};
use nerve_domain::tool::{Message, ToolCall, ToolDefinition};

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub model: Option<String>,
    pub stream: bool,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsRequest {
    pub input: Vec<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsResponse {
    pub embeddings: Vec<Vec<f32>>,
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let _ = req;
        Err(nerve_domain::error::Error::invalid_input(format!(
            "{} does not support embeddings",
            self.provider_id()
        )))
    }

    fn provider_id(&self) -> &str;
}
