//! `GraphHandler` (§4.12, §4.10): create/delete/list graphs and
//! execute them. Wire-level steps can only carry the two
//! JSON-representable `InputSpec` variants (`literal`, `template`);
//! `InputSpec::Function` is an in-process construction affordance and
//! has no wire shape.

use serde::Deserialize;
use serde_json::{json, Value};

use nerve_domain::budget::Budget;
use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_graph::{Graph, InputSpec, Step};
use nerve_protocol::event::event_type;
use nerve_protocol::{Event, EventSink};
use nerve_sessions::SessionRegistry;

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireInputSpec {
    Literal { value: Value },
    Template { value: String },
}

impl From<WireInputSpec> for InputSpec {
    fn from(spec: WireInputSpec) -> Self {
        match spec {
            WireInputSpec::Literal { value } => InputSpec::Literal(value),
            WireInputSpec::Template { value } => InputSpec::Template(value),
        }
    }
}

#[derive(Deserialize)]
struct WireStep {
    id: String,
    node_ref: String,
    input: WireInputSpec,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Deserialize)]
struct CreateGraphParams {
    #[serde(default)]
    session: Option<String>,
    id: String,
    steps: Vec<WireStep>,
    #[serde(default)]
    max_workers: Option<usize>,
}

#[derive(Deserialize)]
struct GraphRefParams {
    #[serde(default)]
    session: Option<String>,
    id: String,
}

#[derive(Deserialize, Default)]
struct SessionOnlyParams {
    #[serde(default)]
    session: Option<String>,
}

#[derive(Deserialize)]
struct ExecuteGraphParams {
    #[serde(default)]
    session: Option<String>,
    id: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    budget: Option<Budget>,
}

pub async fn create_graph(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: CreateGraphParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let steps: Vec<Step> = params
        .steps
        .into_iter()
        .map(|s| Step::new(s.id, s.node_ref, s.input.into()).depends_on(s.depends_on))
        .collect();
    let mut graph = Graph::new(params.id.clone(), steps);
    if let Some(n) = params.max_workers {
        graph = graph.max_workers(n);
    }
    graph.validate()?;
    session.add_graph(&params.id, graph)?;
    Ok(json!({ "id": params.id }))
}

pub async fn delete_graph(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: GraphRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    session.delete_graph(&params.id)?;
    Ok(json!({}))
}

pub async fn list_graphs(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: SessionOnlyParams = serde_json::from_value(params).unwrap_or_default();
    let session = registry.get(params.session.as_deref())?;
    let ids: Vec<String> = session.list_graphs().iter().map(|g| g.id.clone()).collect();
    Ok(json!({ "graphs": ids }))
}

pub async fn execute_graph(registry: &SessionRegistry, params: Value, sink: &dyn EventSink) -> Result<Value> {
    let params: ExecuteGraphParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let mut ctx = ExecutionContext::new(session.name(), params.input);
    ctx.budget = params.budget;
    sink.publish(Event::new(event_type::DAG_STARTED, json!({ "graph_id": params.id })));
    let results = session.execute_graph(&params.id, &ctx).await?;
    // The executor returns one final batch of results rather than
    // streaming per-step progress, so task events are synthesized here
    // after the fact instead of live during execution.
    for (step_id, result) in &results {
        let evt_type = match result.status {
            nerve_graph::TaskStatus::Completed => event_type::TASK_COMPLETED,
            nerve_graph::TaskStatus::Failed => event_type::TASK_FAILED,
            nerve_graph::TaskStatus::Skipped => event_type::TASK_FAILED,
        };
        sink.publish(Event::new(evt_type, serde_json::to_value(result).unwrap_or(Value::Null)).with_node(step_id.clone()));
    }
    sink.publish(Event::new(event_type::DAG_COMPLETED, json!({ "graph_id": params.id })));
    Ok(serde_json::to_value(results).unwrap_or(Value::Null))
}
