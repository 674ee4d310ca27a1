//! Function node (§4.4): wraps a pure or async callback. Ephemeral by
//! default; `interrupt()` cancels the in-flight invocation
//! cooperatively via the execution context's own cancellation token.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use nerve_domain::error::Result;
use nerve_domain::execution::ExecutionContext;
use nerve_domain::node::{NodeDescriptor, NodeState, NodeVariant};

use crate::node::Node;

pub type NodeFn = Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub struct FunctionNode {
    descriptor: NodeDescriptor,
    func: NodeFn,
    state: Mutex<NodeState>,
    current_cancel: Mutex<Option<CancellationToken>>,
}

impl FunctionNode {
    pub fn new(id: impl Into<String>, func: NodeFn) -> Result<Self> {
        let mut descriptor = NodeDescriptor::new(id, NodeVariant::Function)?;
        descriptor.persistent = false;
        Ok(Self { descriptor, func, state: Mutex::new(NodeState::Ready), current_cancel: Mutex::new(None) })
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.descriptor.persistent = persistent;
        self
    }
}

#[async_trait]
impl Node for FunctionNode {
    fn descriptor(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    fn state(&self) -> NodeState {
        *self.state.lock()
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<Value> {
        *self.state.lock() = NodeState::Busy;
        *self.current_cancel.lock() = Some(ctx.cancellation_token.clone());
        let result = (self.func)(ctx).await;
        *self.current_cancel.lock() = None;
        *self.state.lock() = NodeState::Ready;
        result
    }

    async fn interrupt(&self) -> Result<()> {
        if let Some(token) = self.current_cancel.lock().clone() {
            token.cancel();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.state.lock() = NodeState::Stopped;
        Ok(())
    }
}
