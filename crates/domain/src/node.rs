//! Node identity, variant tag, state machine, and capability flags.
//!
//! The node *behavior* (executing, writing bytes, listing tools) lives
//! in `nerve-nodes`; this crate only carries the data model so that
//! sessions, the graph executor, and the dispatcher can reason about
//! nodes without depending on the (much heavier) execution crate.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name policy: lowercase alphanumerics and hyphens, 1-32 characters.
pub fn validate_node_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 32 {
        return Err(Error::invalid_input(format!(
            "node id must be 1-32 characters: {id:?}"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::invalid_input(format!(
            "node id must be lowercase alphanumerics and hyphens: {id:?}"
        )));
    }
    Ok(())
}

/// The reserved identity node id, auto-created on session creation.
pub const IDENTITY_NODE_ID: &str = "identity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeVariant {
    Function,
    TerminalPty,
    TerminalAttached,
    LlmSingleShot,
    LlmChat,
    Bash,
    Mcp,
    Identity,
}

impl NodeVariant {
    /// Variants that own a long-lived resource and default to `persistent`.
    pub fn defaults_persistent(self) -> bool {
        matches!(
            self,
            NodeVariant::TerminalPty
                | NodeVariant::TerminalAttached
                | NodeVariant::LlmChat
                | NodeVariant::Mcp
                | NodeVariant::Identity
        )
    }

    pub fn is_terminal_backed(self) -> bool {
        matches!(self, NodeVariant::TerminalPty | NodeVariant::TerminalAttached)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Created,
    Starting,
    Ready,
    Busy,
    Error,
    Stopping,
    Stopped,
}

impl NodeState {
    /// Transitions are monotonic except READY<->BUSY and ERROR->READY.
    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Created, Starting) => true,
            (Starting, Ready) => true,
            (Starting, Error) => true,
            (Ready, Busy) => true,
            (Busy, Ready) => true,
            (Busy, Error) => true,
            (Ready, Error) => true,
            (Error, Ready) => true,
            (_, Stopping) => true,
            (Stopping, Stopped) => true,
            (Error, Stopped) => true,
            _ => false,
        }
    }
}

/// Capability flags a node may declare, independent of its variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapabilities {
    /// May be called as a tool by chat nodes.
    pub tool_capable: bool,
    /// Exposes N>=2 tools.
    pub multi_tool: bool,
    /// Chat nodes only: supports `fork()`.
    pub forkable: bool,
}

/// Static metadata describing a node, independent of its runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub variant: NodeVariant,
    pub persistent: bool,
    pub capabilities: NodeCapabilities,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<String>, variant: NodeVariant) -> Result<Self> {
        let id = id.into();
        validate_node_id(&id)?;
        Ok(Self {
            id,
            persistent: variant.defaults_persistent(),
            capabilities: NodeCapabilities::default(),
            variant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_uppercase_and_underscore() {
        assert!(validate_node_id("Bad_Id").is_err());
        assert!(validate_node_id("fine-id-1").is_ok());
    }

    #[test]
    fn state_machine_forbids_skip() {
        assert!(!NodeState::Created.can_transition_to(NodeState::Ready));
        assert!(NodeState::Created.can_transition_to(NodeState::Starting));
        assert!(NodeState::Error.can_transition_to(NodeState::Ready));
    }
}
