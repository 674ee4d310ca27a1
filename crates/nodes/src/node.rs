//! The `Node` capability trait and the tagged-variant dispatch that
//! lets a session hold heterogeneous node kinds behind one type
//! (§9 "Protocol/duck-typed Node" re-architecting note).

use async_trait::async_trait;
use serde_json::Value;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_domain::node::{NodeDescriptor, NodeState};
use nerve_domain::tool::ToolDefinition;

use crate::bash::BashNode;
use crate::identity::IdentityNode;
use crate::llm::{ChatLlmNode, SingleShotLlmNode};
use crate::mcp_node::McpNode;
use crate::terminal_node::TerminalNode;

/// Every node variant implements this. `execute` is the one entry
/// point a session or graph step calls; its return shape differs by
/// variant (see §4.3-§4.6), so it is a raw `Value`.
#[async_trait]
pub trait Node: Send + Sync {
    fn descriptor(&self) -> NodeDescriptor;

    fn state(&self) -> NodeState;

    async fn execute(&self, ctx: ExecutionContext) -> Result<Value>;

    async fn interrupt(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// Tool-capable nodes additionally expose a catalog and a dispatcher.
/// Kept as a separate trait (rather than folded into `Node`) because
/// most variants never implement it.
#[async_trait]
pub trait ToolCapable: Send + Sync {
    async fn list_tools(&self) -> Vec<ToolDefinition>;

    async fn call_tool(&self, name: &str, args: Value) -> Result<String>;
}

/// The tagged variant a session actually stores. Dispatch to the
/// matching concrete type for every `Node` method, and exposes
/// `tool_capable()` for the subset of variants that implement
/// `ToolCapable`.
pub enum AnyNode {
    Function(crate::function::FunctionNode),
    TerminalPty(TerminalNode),
    TerminalAttached(TerminalNode),
    Bash(BashNode),
    LlmSingleShot(SingleShotLlmNode),
    LlmChat(ChatLlmNode),
    Mcp(McpNode),
    Identity(IdentityNode),
}

#[async_trait]
impl Node for AnyNode {
    fn descriptor(&self) -> NodeDescriptor {
        match self {
            AnyNode::Function(n) => n.descriptor(),
            AnyNode::TerminalPty(n) => n.descriptor(),
            AnyNode::TerminalAttached(n) => n.descriptor(),
            AnyNode::Bash(n) => n.descriptor(),
            AnyNode::LlmSingleShot(n) => n.descriptor(),
            AnyNode::LlmChat(n) => n.descriptor(),
            AnyNode::Mcp(n) => n.descriptor(),
            AnyNode::Identity(n) => n.descriptor(),
        }
    }

    fn state(&self) -> NodeState {
        match self {
            AnyNode::Function(n) => n.state(),
            AnyNode::TerminalPty(n) => n.state(),
            AnyNode::TerminalAttached(n) => n.state(),
            AnyNode::Bash(n) => n.state(),
            AnyNode::LlmSingleShot(n) => n.state(),
            AnyNode::LlmChat(n) => n.state(),
            AnyNode::Mcp(n) => n.state(),
            AnyNode::Identity(n) => n.state(),
        }
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<Value> {
        match self {
            AnyNode::Function(n) => n.execute(ctx).await,
            AnyNode::TerminalPty(n) => n.execute(ctx).await,
            AnyNode::TerminalAttached(n) => n.execute(ctx).await,
            AnyNode::Bash(n) => n.execute(ctx).await,
            AnyNode::LlmSingleShot(n) => n.execute(ctx).await,
            AnyNode::LlmChat(n) => n.execute(ctx).await,
            AnyNode::Mcp(n) => n.execute(ctx).await,
            AnyNode::Identity(n) => n.execute(ctx).await,
        }
    }

    async fn interrupt(&self) -> Result<()> {
        match self {
            AnyNode::Function(n) => n.interrupt().await,
            AnyNode::TerminalPty(n) => n.interrupt().await,
            AnyNode::TerminalAttached(n) => n.interrupt().await,
            AnyNode::Bash(n) => n.interrupt().await,
            AnyNode::LlmSingleShot(n) => n.interrupt().await,
            AnyNode::LlmChat(n) => n.interrupt().await,
            AnyNode::Mcp(n) => n.interrupt().await,
            AnyNode::Identity(n) => n.interrupt().await,
        }
    }

    async fn stop(&self) -> Result<()> {
        match self {
            AnyNode::Function(n) => n.stop().await,
            AnyNode::TerminalPty(n) => n.stop().await,
            AnyNode::TerminalAttached(n) => n.stop().await,
            AnyNode::Bash(n) => n.stop().await,
            AnyNode::LlmSingleShot(n) => n.stop().await,
            AnyNode::LlmChat(n) => n.stop().await,
            AnyNode::Mcp(n) => n.stop().await,
            AnyNode::Identity(n) => n.stop().await,
        }
    }
}

impl AnyNode {
    pub fn tool_capable(&self) -> Option<&dyn ToolCapableSync> {
        match self {
            AnyNode::Bash(n) => Some(n),
            AnyNode::Mcp(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.descriptor().persistent
    }

    /// Raw terminal buffer, for `GET_BUFFER`. `None` for non-terminal
    /// variants.
    pub async fn raw_buffer(&self) -> Option<String> {
        match self {
            AnyNode::TerminalPty(n) | AnyNode::TerminalAttached(n) => Some(n.buffer().await),
            _ => None,
        }
    }

    /// Writes bytes directly to a terminal backend without going
    /// through `execute`'s readiness wait, for `WRITE_DATA`.
    pub async fn write_raw(&self, data: &[u8]) -> Result<()> {
        match self {
            AnyNode::TerminalPty(n) | AnyNode::TerminalAttached(n) => n.write_raw(data).await,
            _ => Err(Error::invalid_state("node does not accept raw writes")),
        }
    }

    /// On-disk history path, for `GET_HISTORY`. `None` when the node
    /// has no history writer configured.
    pub fn history_path(&self) -> Option<&std::path::Path> {
        match self {
            AnyNode::TerminalPty(n) | AnyNode::TerminalAttached(n) => n.history_path(),
            _ => None,
        }
    }
}

/// `tool_capable()` needs to return a trait object whose methods are
/// async; `async_trait` desugars to a boxed future under the hood, so
/// the returned reference works through ordinary dynamic dispatch.
pub trait ToolCapableSync: ToolCapable {}
impl<T: ToolCapable> ToolCapableSync for T {}

pub fn not_ready(id: &str) -> Error {
    Error::invalid_state(format!("node {id:?} is not READY"))
}
