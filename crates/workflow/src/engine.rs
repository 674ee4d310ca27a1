//! Workflow execution engine: turns a workflow body + a freshly
//! allocated `WorkflowRun` into an independently scheduled task,
//! driving the run through `pending -> running -> (...) -> terminal`
//! and emitting the `workflow_*` event taxonomy (§4.11).

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;

use crate::context::{WorkflowContext, WorkflowHost};
use crate::run::{GateReply, RunState, WorkflowRun};

pub type WorkflowBody = Arc<dyn Fn(WorkflowContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Allocates a run and starts executing `body` as a detached task.
/// Returns immediately with the `WorkflowRun` handle; callers observe
/// progress through the handle's state/events or the installed event
/// callback.
pub fn start(
    workflow_id: impl Into<String>,
    body: WorkflowBody,
    host: Arc<dyn WorkflowHost>,
    exec_ctx: ExecutionContext,
    params: Value,
    input: Value,
) -> WorkflowRun {
    let workflow_id = workflow_id.into();
    let run = WorkflowRun::new(new_run_id(), workflow_id.clone());
    run.set_state(RunState::Running);
    let ctx = WorkflowContext::new(run.clone(), host, exec_ctx, params, input);
    let run_for_task = run.clone();

    run_for_task.push_event(crate::run::WorkflowEvent {
        run_id: run_for_task.run_id.clone(),
        workflow_id: workflow_id.clone(),
        event_type: "workflow_started".to_string(),
        data: Value::Null,
    });

    tokio::spawn(async move {
        let outcome = body(ctx).await;
        if run_for_task.is_cancelled() {
            run_for_task.set_state(RunState::Cancelled);
            run_for_task.push_event(crate::run::WorkflowEvent {
                run_id: run_for_task.run_id.clone(),
                workflow_id: workflow_id.clone(),
                event_type: "workflow_cancelled".to_string(),
                data: Value::Null,
            });
            return;
        }
        match outcome {
            Ok(result) => {
                run_for_task.set_result(result.clone());
                run_for_task.set_state(RunState::Completed);
                run_for_task.push_event(crate::run::WorkflowEvent {
                    run_id: run_for_task.run_id.clone(),
                    workflow_id: workflow_id.clone(),
                    event_type: "workflow_completed".to_string(),
                    data: result,
                });
            }
            Err(e) => {
                let is_cancel = matches!(e, Error::Cancelled);
                run_for_task.set_error(e.to_string());
                run_for_task.set_state(if is_cancel { RunState::Cancelled } else { RunState::Failed });
                let event_type = if is_cancel { "workflow_cancelled" } else { "workflow_failed" };
                run_for_task.push_event(crate::run::WorkflowEvent {
                    run_id: run_for_task.run_id.clone(),
                    workflow_id: workflow_id.clone(),
                    event_type: event_type.to_string(),
                    data: serde_json::json!({ "error": e.to_string() }),
                });
            }
        }
    });

    run
}

/// `ANSWER_GATE` is valid only in `waiting`; otherwise it fails with
/// a well-defined "no gate pending" error.
pub fn answer_gate(run: &WorkflowRun, answer: String) -> Result<()> {
    if run.state() != RunState::Waiting || run.pending_gate().is_none() {
        return Err(Error::invalid_state("no gate pending"));
    }
    let tx = run.gate_reply_tx.lock().take().ok_or_else(|| Error::invalid_state("no gate pending"))?;
    tx.send(GateReply::Answer(answer)).map_err(|_| Error::invalid_state("gate receiver already gone"))
}

/// Signals the run's cooperative cancellation token; `gate()` callers
/// (if any) see a cancellation error immediately.
pub fn cancel(run: &WorkflowRun) {
    run.cancel();
}
