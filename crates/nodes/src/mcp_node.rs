//! MCP node (§4.8): a persistent, tool-capable node wrapping one MCP
//! server subprocess.

use async_trait::async_trait;
use serde_json::Value;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_domain::node::{NodeCapabilities, NodeDescriptor, NodeState, NodeVariant};
use nerve_domain::tool::ToolDefinition;
use nerve_mcp::McpServer;

use crate::node::{not_ready, Node, ToolCapable};

pub struct McpNode {
    descriptor: NodeDescriptor,
    server: McpServer,
}

impl McpNode {
    pub fn new(id: impl Into<String>, server: McpServer) -> Result<Self> {
        let id = id.into();
        let mut descriptor = NodeDescriptor::new(&id, NodeVariant::Mcp)?;
        descriptor.persistent = true;
        descriptor.capabilities = NodeCapabilities {
            tool_capable: true,
            multi_tool: server.tools.len() >= 2,
            forkable: false,
        };
        Ok(Self { descriptor, server })
    }
}

#[async_trait]
impl Node for McpNode {
    fn descriptor(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    fn state(&self) -> NodeState {
        if self.server.is_alive() {
            NodeState::Ready
        } else {
            NodeState::Error
        }
    }

    /// `execute` is a thin convenience over `call_tool`: `ctx.input` is
    /// `{tool, arguments}`. Most callers reach MCP tools through a chat
    /// node's tool catalog instead.
    async fn execute(&self, ctx: ExecutionContext) -> Result<Value> {
        if !self.server.is_alive() {
            return Err(not_ready(&self.descriptor.id));
        }
        let tool = ctx
            .input
            .get("tool")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_input("mcp node input requires {tool, arguments}"))?;
        let arguments = ctx.input.get("arguments").cloned().unwrap_or(Value::Null);
        let result = self.call_tool(tool, arguments).await?;
        Ok(serde_json::json!({ "result": result }))
    }

    async fn interrupt(&self) -> Result<()> {
        // MCP tool calls are not individually cancellable at this
        // protocol version; interrupt is a no-op.
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.server.shutdown().await;
        Ok(())
    }
}

#[async_trait]
impl ToolCapable for McpNode {
    async fn list_tools(&self) -> Vec<ToolDefinition> {
        self.server
            .tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
                owner_node_id: Some(self.descriptor.id.clone()),
            })
            .collect()
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<String> {
        if !self.server.is_alive() {
            return Err(not_ready(&self.descriptor.id));
        }
        self.server.call_tool(name, args).await.map_err(Error::from)
    }
}
