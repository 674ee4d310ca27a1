//! The command envelope (§6): transports decode this from JSON (or any
//! other framing) and hand it to the engine dispatcher unchanged.
//! `type` is a closed enumeration; `params` stays a free-form value
//! because each handler owns its own parameter shape (§4.12) rather
//! than this crate carrying every handler's parameter struct.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    // SessionHandler
    CreateSession,
    DeleteSession,
    ListSessions,
    GetSession,

    // NodeLifecycleHandler
    CreateNode,
    DeleteNode,
    ListNodes,
    GetNode,
    ForkNode,

    // NodeInteractionHandler
    RunCommand,
    ExecuteInput,
    SendInterrupt,
    WriteData,
    GetBuffer,
    GetHistory,

    // GraphHandler
    CreateGraph,
    DeleteGraph,
    ListGraphs,
    ExecuteGraph,

    // WorkflowHandler
    ExecuteWorkflow,
    ListWorkflowRuns,
    GetWorkflowRun,
    AnswerGate,
    CancelWorkflow,

    // ReplCommandHandler (read-only introspection)
    ReplShow,
    ReplDry,
    ReplValidate,
    ReplList,
    ReplRead,

    // ScriptHandler (operator debugging eval)
    ScriptEval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub r#type: CommandType,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Command {
    pub fn new(r#type: CommandType, params: Value) -> Self {
        Self { r#type, params, request_id: None }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Deserializes `params` into a handler-specific struct; handlers
    /// call this rather than this crate knowing every command's shape.
    pub fn params_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.params.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: nerve_domain::error::ErrorKind,
    pub message: String,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None, request_id: None }
    }

    pub fn err(error: &nerve_domain::error::Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorPayload { kind: error.kind(), message: error.to_string() }),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_round_trips_as_screaming_snake_case() {
        let json = serde_json::to_string(&CommandType::ExecuteInput).unwrap();
        assert_eq!(json, "\"EXECUTE_INPUT\"");
        let back: CommandType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CommandType::ExecuteInput);
    }

    #[test]
    fn params_as_extracts_handler_shape() {
        let cmd = Command::new(CommandType::CreateNode, serde_json::json!({"id": "b", "variant": "bash"}));
        #[derive(Deserialize)]
        struct Params {
            id: String,
        }
        let parsed: Params = cmd.params_as().unwrap();
        assert_eq!(parsed.id, "b");
    }
}
