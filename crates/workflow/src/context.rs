//! `WorkflowContext` (§4.11): the four operations an imperative
//! workflow body sees. Suspension on `gate()` is implemented as an
//! ordinary `.await` on a reply channel -- the engine is what
//! actually changes the run's state, so the body just sees a blocking
//! call, matching the §9 re-architecting note.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;

use crate::run::{Gate, GateReply, RunState, WorkflowEvent, WorkflowRun};

/// Executes a node or a graph by id on behalf of a workflow body, and
/// runs nested workflows. Implemented by whatever owns the session
/// registry; kept as a trait so this crate has no dependency on
/// `nerve-sessions`.
#[async_trait]
pub trait WorkflowHost: Send + Sync {
    async fn run_executable(&self, id: &str, input: Value, ctx: &ExecutionContext) -> Result<Value>;

    async fn run_nested_workflow(&self, workflow_id: &str, input: Value, parent: &WorkflowContext) -> Result<Value>;
}

pub struct WorkflowContext {
    pub(crate) run: WorkflowRun,
    pub(crate) host: Arc<dyn WorkflowHost>,
    pub(crate) exec_ctx: ExecutionContext,
    pub params: Value,
    pub input: Value,
    state: Arc<Mutex<Value>>,
}

impl WorkflowContext {
    pub fn new(run: WorkflowRun, host: Arc<dyn WorkflowHost>, exec_ctx: ExecutionContext, params: Value, input: Value) -> Self {
        Self { run, host, exec_ctx, params, input, state: Arc::new(Mutex::new(serde_json::json!({}))) }
    }

    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    /// The execution context this run was started with; nested
    /// workflows derive their own child context from it.
    pub fn exec_ctx(&self) -> &ExecutionContext {
        &self.exec_ctx
    }

    pub fn state(&self) -> Value {
        self.state.lock().clone()
    }

    pub fn set_state(&self, key: &str, value: Value) {
        if let Some(obj) = self.state.lock().as_object_mut() {
            obj.insert(key.to_string(), value);
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.run.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Schedule and await one node or graph, preserving tracing and
    /// events the same way a one-step graph would.
    pub async fn run(&self, node_or_graph_id: &str, input: Value) -> Result<Value> {
        self.check_cancelled()?;
        if let Err(e) = self.exec_ctx.check_budget() {
            self.emit("node_error", serde_json::json!({ "id": node_or_graph_id, "error": e.to_string() }));
            return Err(e);
        }
        self.emit("node_started", serde_json::json!({ "id": node_or_graph_id }));
        let child_ctx = self.exec_ctx.child(input.clone());
        match self.host.run_executable(node_or_graph_id, input, &child_ctx).await {
            Ok(output) => {
                self.emit("node_completed", serde_json::json!({ "id": node_or_graph_id, "output": output }));
                Ok(output)
            }
            Err(e) => {
                let kind = if matches!(e, Error::Timeout(_)) { "node_timeout" } else { "node_error" };
                self.emit(kind, serde_json::json!({ "id": node_or_graph_id, "error": e.to_string() }));
                Err(e)
            }
        }
    }

    /// Run a nested workflow, inheriting cancellation and budget from
    /// this context.
    pub async fn run_workflow(&self, workflow_id: &str, input: Value) -> Result<Value> {
        self.check_cancelled()?;
        self.emit("nested_workflow_started", serde_json::json!({ "workflow_id": workflow_id }));
        let result = self.host.run_nested_workflow(workflow_id, input, self).await;
        match &result {
            Ok(output) => self.emit("nested_workflow_completed", serde_json::json!({ "workflow_id": workflow_id, "output": output })),
            Err(e) => self.emit("nested_workflow_failed", serde_json::json!({ "workflow_id": workflow_id, "error": e.to_string() })),
        }
        result
    }

    /// Suspend until an `ANSWER_GATE` command answers this gate, the
    /// run is cancelled, or `timeout` elapses.
    pub async fn gate(&self, prompt: impl Into<String>, choices: Option<Vec<String>>) -> Result<String> {
        self.gate_with_timeout(prompt, choices, None).await
    }

    pub async fn gate_with_timeout(
        &self,
        prompt: impl Into<String>,
        choices: Option<Vec<String>>,
        timeout: Option<Duration>,
    ) -> Result<String> {
        self.check_cancelled()?;
        let prompt = prompt.into();
        let (tx, rx) = oneshot::channel();
        *self.run.gate_reply_tx.lock() = Some(tx);
        self.run.set_pending_gate(Some(Gate { prompt: prompt.clone(), choices: choices.clone(), answer: None, timeout }));
        self.run.set_state(RunState::Waiting);
        self.emit("gate_waiting", serde_json::json!({ "prompt": prompt, "choices": choices }));

        let reply = if let Some(d) = timeout {
            match tokio::time::timeout(d, rx).await {
                Ok(r) => r,
                Err(_) => {
                    self.run.set_pending_gate(None);
                    self.run.set_state(RunState::Failed);
                    self.emit("gate_timeout", serde_json::json!({ "prompt": prompt }));
                    return Err(Error::Timeout(format!("gate {prompt:?} timed out")));
                }
            }
        } else {
            rx.await
        };

        self.run.set_pending_gate(None);
        match reply {
            Ok(GateReply::Answer(answer)) => {
                self.run.set_state(RunState::Running);
                self.emit("gate_answered", serde_json::json!({ "prompt": prompt, "answer": answer }));
                Ok(answer)
            }
            Ok(GateReply::Cancelled) | Err(_) => {
                self.emit("gate_cancelled", serde_json::json!({ "prompt": prompt }));
                Err(Error::Cancelled)
            }
        }
    }

    pub fn emit(&self, event_type: &str, data: Value) {
        let event = WorkflowEvent {
            run_id: self.run.run_id.clone(),
            workflow_id: self.run.workflow_id.clone(),
            event_type: event_type.to_string(),
            data,
        };
        self.run.push_event(event);
    }
}
