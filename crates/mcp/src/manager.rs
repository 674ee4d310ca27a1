//! MCP manager: holds all MCP server connections and orchestrates tool
//! discovery and dispatch, as wrapped by the MCP node (§4.8).

use std::collections::HashMap;

use serde_json::Value;

use nerve_domain::config::{McpConfig, McpServerConfig, McpTransportKind};

use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{McpTransport, SseTransport, StdioTransport, TransportError};

pub struct McpServer {
    pub id: String,
    pub tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
}

impl McpServer {
    pub async fn initialize(config: &McpServerConfig) -> Result<Self, McpError> {
        let transport: Box<dyn McpTransport> = match config.transport {
            McpTransportKind::Stdio => {
                let t = StdioTransport::spawn(config).map_err(McpError::Transport)?;
                Box::new(t)
            }
            McpTransportKind::Sse => {
                tracing::warn!(server_id = %config.id, "SSE transport is not implemented, server will be non-functional");
                Box::new(SseTransport)
            }
        };

        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;
        let resp = transport.send_request("initialize", Some(params_value)).await.map_err(McpError::Transport)?;
        if resp.is_error() {
            return Err(McpError::Protocol(format!("initialize failed: {}", resp.error.unwrap())));
        }

        transport.send_notification("notifications/initialized").await.map_err(McpError::Transport)?;

        let tools_resp = transport.send_request("tools/list", None).await.map_err(McpError::Transport)?;
        let tools = if tools_resp.is_error() {
            tracing::warn!(server_id = %config.id, "tools/list returned error, server will have no tools");
            Vec::new()
        } else {
            let result_value = tools_resp.result.unwrap_or(Value::Null);
            match serde_json::from_value::<ToolsListResult>(result_value) {
                Ok(r) => r.tools,
                Err(e) => {
                    tracing::warn!(server_id = %config.id, error = %e, "failed to parse tools/list result");
                    Vec::new()
                }
            }
        };

        tracing::info!(server_id = %config.id, tool_count = tools.len(), "MCP server initialized");
        Ok(Self { id: config.id.clone(), tools, transport })
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Send `tools/call` with a monotonically increasing request id (the
    /// transport owns id allocation) and concatenate text content
    /// blocks into a single string.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.id.clone()));
        }
        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
        let resp = self.transport.send_request("tools/call", Some(params)).await.map_err(McpError::Transport)?;
        if resp.is_error() {
            return Err(McpError::Protocol(format!("tools/call failed: {}", resp.error.unwrap())));
        }
        let result_value = resp.result.unwrap_or(Value::Null);
        let result: ToolCallResult = serde_json::from_value(result_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))?;
        Ok(result.content.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(""))
    }

    pub async fn shutdown(&self) {
        tracing::info!(server_id = %self.id, "shutting down MCP server");
        self.transport.shutdown().await;
    }
}

pub struct McpManager {
    servers: HashMap<String, McpServer>,
}

impl McpManager {
    pub fn empty() -> Self {
        Self { servers: HashMap::new() }
    }

    pub async fn from_config(config: &McpConfig) -> Self {
        let mut servers = HashMap::new();
        for server_config in &config.servers {
            tracing::info!(server_id = %server_config.id, command = %server_config.command, "initializing MCP server");
            match McpServer::initialize(server_config).await {
                Ok(server) => {
                    servers.insert(server_config.id.clone(), server);
                }
                Err(e) => {
                    tracing::warn!(server_id = %server_config.id, error = %e, "failed to initialize MCP server, skipping");
                }
            }
        }
        Self { servers }
    }

    pub fn list_tools(&self, server_id: &str) -> Vec<McpToolDef> {
        self.servers.get(server_id).map(|s| s.tools.clone()).unwrap_or_default()
    }

    pub async fn call_tool(&self, server_id: &str, tool_name: &str, arguments: Value) -> Result<String, McpError> {
        let server = self.servers.get(server_id).ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
        server.call_tool(tool_name, arguments).await
    }

    pub fn is_alive(&self, server_id: &str) -> bool {
        self.servers.get(server_id).map(|s| s.is_alive()).unwrap_or(false)
    }

    pub async fn shutdown(&self) {
        let futs: Vec<_> = self.servers.values().map(|s| s.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("MCP protocol error: {0}")]
    Protocol(String),
    #[error("MCP server not found: {0}")]
    ServerNotFound(String),
    #[error("MCP server is down: {0}")]
    ServerDown(String),
}

impl From<McpError> for nerve_domain::error::Error {
    fn from(e: McpError) -> Self {
        match &e {
            McpError::ServerNotFound(_) => nerve_domain::error::Error::not_found(e.to_string()),
            McpError::ServerDown(_) => nerve_domain::error::Error::invalid_state(e.to_string()),
            _ => nerve_domain::error::Error::Backend(e.to_string()),
        }
    }
}
