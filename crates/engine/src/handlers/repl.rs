//! `ReplCommandHandler` (§4.12): read-only graph introspection for an
//! interactive shell -- `show`/`dry`/`validate`/`list`/`read`. None of
//! these mutate a session; `dry` and `validate` both run the same
//! `Graph::topological_order`/`validate` the executor itself calls
//! before touching a node, just without resolving or executing steps.

use serde::Deserialize;
use serde_json::{json, Value};

use nerve_domain::error::{Error, Result};
use nerve_graph::{InputSpec, Step};
use nerve_sessions::SessionRegistry;

#[derive(Deserialize)]
struct GraphRefParams {
    #[serde(default)]
    session: Option<String>,
    graph_id: String,
}

#[derive(Deserialize, Default)]
struct SessionOnlyParams {
    #[serde(default)]
    session: Option<String>,
}

#[derive(Deserialize)]
struct ReadStepParams {
    #[serde(default)]
    session: Option<String>,
    graph_id: String,
    step_id: String,
}

fn input_kind(spec: &InputSpec) -> &'static str {
    match spec {
        InputSpec::Literal(_) => "literal",
        InputSpec::Template(_) => "template",
        InputSpec::Function(_) => "function",
    }
}

fn step_summary(step: &Step) -> Value {
    json!({
        "id": step.id,
        "node_ref": step.node_ref,
        "depends_on": step.depends_on,
        "input_kind": input_kind(&step.input_spec),
    })
}

pub async fn show(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: GraphRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let graph = session.get_graph(&params.graph_id)?;
    Ok(json!({
        "id": graph.id,
        "max_workers": graph.max_workers,
        "steps": graph.steps.iter().map(step_summary).collect::<Vec<_>>(),
    }))
}

pub async fn dry(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: GraphRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let graph = session.get_graph(&params.graph_id)?;
    let order = graph.topological_order()?;
    Ok(json!({ "order": order.iter().map(|s| s.id.clone()).collect::<Vec<_>>() }))
}

pub async fn validate(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: GraphRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let graph = session.get_graph(&params.graph_id)?;
    match graph.validate() {
        Ok(()) => Ok(json!({ "valid": true })),
        Err(e) => Ok(json!({ "valid": false, "error": e.to_string() })),
    }
}

pub async fn list(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: SessionOnlyParams = serde_json::from_value(params).unwrap_or_default();
    let session = registry.get(params.session.as_deref())?;
    let ids: Vec<String> = session.list_graphs().iter().map(|g| g.id.clone()).collect();
    Ok(json!({ "graphs": ids }))
}

pub async fn read(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: ReadStepParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let graph = session.get_graph(&params.graph_id)?;
    let step = graph
        .steps
        .iter()
        .find(|s| s.id == params.step_id)
        .ok_or_else(|| Error::not_found(format!("step {:?}", params.step_id)))?;
    Ok(step_summary(step))
}
