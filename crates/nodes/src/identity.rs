//! The reserved `identity` node (§3 "Session"): echoes its input.
//! Useful for testing graphs and workflows without a real backend.

use async_trait::async_trait;
use serde_json::Value;

use nerve_domain::error::Result;
use nerve_domain::execution::ExecutionContext;
use nerve_domain::node::{NodeCapabilities, NodeDescriptor, NodeState, NodeVariant, IDENTITY_NODE_ID};

use crate::node::Node;

pub struct IdentityNode {
    descriptor: NodeDescriptor,
}

impl IdentityNode {
    pub fn new() -> Self {
        Self {
            descriptor: NodeDescriptor {
                id: IDENTITY_NODE_ID.to_string(),
                variant: NodeVariant::Identity,
                persistent: true,
                capabilities: NodeCapabilities::default(),
            },
        }
    }
}

impl Default for IdentityNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for IdentityNode {
    fn descriptor(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    fn state(&self) -> NodeState {
        NodeState::Ready
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<Value> {
        Ok(ctx.input)
    }

    async fn interrupt(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}
