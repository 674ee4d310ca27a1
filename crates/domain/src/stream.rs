//! Provider-agnostic streaming vocabulary, shared by LLM client
//! adapters (`nerve-providers`) and the proxy's SSE re-emission
//! (`nerve-proxy`).

use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { text: String },
    Thinking { text: String },
    ToolCallStarted { index: u64, call_id: String, tool_name: String },
    ToolCallDelta { index: u64, arguments_delta: String },
    ToolCallFinished { index: u64 },
    Done { usage: Option<Usage>, finish_reason: Option<String> },
    Error { message: String },
}

pub type StreamResult = Result<StreamEvent>;
