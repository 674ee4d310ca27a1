//! Persistent terminal node (§4.3): a backend + a parser + an optional
//! history writer, implementing the readiness-polling execute loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_domain::history::{HistoryEntry, HistoryOp, HistoryWriter};
use nerve_domain::node::{NodeDescriptor, NodeState, NodeVariant};
use nerve_domain::response::ParsedResponse;
use nerve_terminal::backend::TerminalBackend;
use nerve_terminal::parser::Parser;

use crate::node::{not_ready, Node};

/// Readiness-polling tunables, mirroring `nerve_domain::config::TerminalConfig`.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub consecutive_checks: u32,
    pub settle_delay: Duration,
    pub default_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            consecutive_checks: 2,
            settle_delay: Duration::from_millis(150),
            default_timeout: Duration::from_secs(120),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

pub struct TerminalNode {
    descriptor: NodeDescriptor,
    backend: Arc<dyn TerminalBackend>,
    parser: Box<dyn Parser>,
    history: Option<HistoryWriter>,
    poll: PollConfig,
    state: Mutex<NodeState>,
}

impl TerminalNode {
    pub fn new(
        id: impl Into<String>,
        variant: NodeVariant,
        backend: Arc<dyn TerminalBackend>,
        parser: Box<dyn Parser>,
        history: Option<HistoryWriter>,
        poll: PollConfig,
    ) -> Result<Self> {
        let descriptor = NodeDescriptor::new(id, variant)?;
        Ok(Self { descriptor, backend, parser, history, poll, state: Mutex::new(NodeState::Ready) })
    }

    fn set_state(&self, next: NodeState) {
        let mut state = self.state.lock();
        if state.can_transition_to(next) {
            *state = next;
        }
    }

    async fn record(&self, op: HistoryOp, payload: Value) {
        if let Some(h) = &self.history {
            h.append(&HistoryEntry::new(op, payload)).await;
        }
    }

    /// Poll readiness every `interval` until `consecutive_checks` in a
    /// row report ready, then wait `settle_delay` once more before
    /// parsing -- absorbs transient idle-looking frames.
    async fn poll_until_ready(&self, deadline: tokio::time::Instant) -> Result<()> {
        let mut consecutive = 0u32;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(format!("node {:?} did not become ready in time", self.descriptor.id)));
            }
            let buffer = self.backend.buffer().await;
            if self.parser.is_ready(&buffer) {
                consecutive += 1;
                if consecutive >= self.poll.consecutive_checks {
                    tokio::time::sleep(self.poll.settle_delay).await;
                    return Ok(());
                }
            } else {
                consecutive = 0;
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Raw buffer snapshot, for `GET_BUFFER` -- bypasses the parser.
    pub async fn buffer(&self) -> String {
        self.backend.buffer().await
    }

    /// Writes bytes straight to the backend without waiting on
    /// readiness, for `WRITE_DATA` (distinct from `execute`, which
    /// submits input and blocks on the readiness poll).
    pub async fn write_raw(&self, data: &[u8]) -> Result<()> {
        self.record(HistoryOp::Command, Value::String(String::from_utf8_lossy(data).into_owned())).await;
        self.backend.write(data).await
    }

    pub fn history_path(&self) -> Option<&std::path::Path> {
        self.history.as_ref().map(|h| h.path())
    }
}

#[async_trait]
impl Node for TerminalNode {
    fn descriptor(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    fn state(&self) -> NodeState {
        *self.state.lock()
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<Value> {
        if self.state() != NodeState::Ready {
            return Err(not_ready(&self.descriptor.id));
        }
        if self.backend.is_closed() {
            self.set_state(NodeState::Stopped);
            return Err(Error::Backend(format!("node {:?} backend is closed", self.descriptor.id)));
        }

        let text = ctx
            .input
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| ctx.input.to_string());
        self.record(HistoryOp::Input, Value::String(text.clone())).await;

        self.set_state(NodeState::Busy);
        let mut payload = text.into_bytes();
        payload.extend_from_slice(self.parser.submit_sequence());
        if let Err(e) = self.backend.write(&payload).await {
            self.set_state(NodeState::Error);
            return Err(e);
        }

        let timeout = ctx.timeout.unwrap_or(self.poll.default_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let ready = tokio::select! {
            r = self.poll_until_ready(deadline) => r,
            _ = ctx.cancellation_token.cancelled() => Err(Error::Cancelled),
        };

        if let Err(e) = ready {
            if !matches!(e, Error::Timeout(_)) {
                self.set_state(NodeState::Error);
            }
            return Err(e);
        }

        let buffer = self.backend.buffer().await;
        let parsed: ParsedResponse = self.parser.parse(&buffer);
        self.record(HistoryOp::Output, serde_json::to_value(&parsed).unwrap_or(Value::Null)).await;
        self.set_state(NodeState::Ready);

        Ok(serde_json::to_value(&parsed).unwrap_or(Value::Null))
    }

    async fn interrupt(&self) -> Result<()> {
        self.record(HistoryOp::Interrupt, Value::Null).await;
        self.backend.interrupt().await
    }

    async fn stop(&self) -> Result<()> {
        self.set_state(NodeState::Stopping);
        self.backend.stop(self.poll.stop_timeout).await?;
        self.set_state(NodeState::Stopped);
        Ok(())
    }
}
