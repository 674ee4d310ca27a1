pub mod bash;
pub mod function;
pub mod identity;
pub mod llm;
pub mod mcp_node;
pub mod node;
pub mod terminal_node;
pub mod tool_catalog;

pub use bash::BashNode;
pub use function::{FunctionNode, NodeFn};
pub use identity::IdentityNode;
pub use llm::{ChatLlmConfig, ChatLlmNode, SingleShotLlmNode};
pub use mcp_node::McpNode;
pub use node::{AnyNode, Node, ToolCapable};
pub use terminal_node::{PollConfig, TerminalNode};
pub use tool_catalog::{ToolCatalog, ToolExecutor};
