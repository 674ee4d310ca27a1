//! `WorkflowHandler` (§4.12, §4.11): execute/list/get/answer/cancel
//! workflows. Bridges `WorkflowRun::set_event_callback` into the
//! injected `EventSink` so `workflow_*` events reach the same stream
//! as every other handler domain's events.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use nerve_domain::budget::Budget;
use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_protocol::{Event, EventSink};
use nerve_sessions::SessionRegistry;
use nerve_workflow::RunState;

#[derive(Deserialize)]
struct ExecuteWorkflowParams {
    #[serde(default)]
    session: Option<String>,
    workflow_id: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    budget: Option<Budget>,
}

#[derive(Deserialize)]
struct RunRefParams {
    #[serde(default)]
    session: Option<String>,
    run_id: String,
}

#[derive(Deserialize, Default)]
struct SessionOnlyParams {
    #[serde(default)]
    session: Option<String>,
}

#[derive(Deserialize)]
struct AnswerGateParams {
    #[serde(default)]
    session: Option<String>,
    run_id: String,
    answer: String,
}

fn run_summary(run: &nerve_workflow::WorkflowRun) -> Value {
    json!({
        "run_id": run.run_id,
        "workflow_id": run.workflow_id,
        "state": run.state(),
        "pending_gate": run.pending_gate(),
        "result": run.result(),
        "error": run.error(),
    })
}

pub async fn execute_workflow(registry: &SessionRegistry, params: Value, sink: Arc<dyn EventSink>) -> Result<Value> {
    let params: ExecuteWorkflowParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let mut ctx = ExecutionContext::new(session.name(), params.input.clone());
    ctx.budget = params.budget;
    let run = session.start_workflow(&params.workflow_id, ctx, params.params, params.input)?;

    let sink_for_events = sink.clone();
    run.set_event_callback(Arc::new(move |event| {
        sink_for_events.publish(
            Event::new(event.event_type.clone(), event.data.clone())
                .with_run(event.run_id.clone()),
        );
    }));

    Ok(run_summary(&run))
}

pub async fn list_workflow_runs(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: SessionOnlyParams = serde_json::from_value(params).unwrap_or_default();
    let session = registry.get(params.session.as_deref())?;
    let runs: Vec<Value> = session.list_runs().iter().map(run_summary).collect();
    Ok(json!({ "runs": runs }))
}

pub async fn get_workflow_run(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: RunRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let run = session.get_run(&params.run_id)?;
    Ok(run_summary(&run))
}

pub async fn answer_gate(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: AnswerGateParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let run = session.get_run(&params.run_id)?;
    if run.state() != RunState::Waiting {
        return Err(Error::invalid_state("no gate pending"));
    }
    session.answer_gate(&params.run_id, params.answer)?;
    Ok(json!({}))
}

pub async fn cancel_workflow(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: RunRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    session.cancel_run(&params.run_id)?;
    Ok(json!({}))
}
