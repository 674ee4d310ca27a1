//! `SessionHandler` (§4.12): `CREATE_SESSION`, `DELETE_SESSION`,
//! `LIST_SESSIONS`, `GET_SESSION`. Session creation itself
//! auto-creates the `identity` node inside `Session::new`; this
//! handler only wires the registry call and the session-lifecycle
//! events.

use serde::Deserialize;
use serde_json::{json, Value};

use nerve_domain::error::Result;
use nerve_protocol::event::event_type;
use nerve_protocol::{Event, EventSink};
use nerve_sessions::SessionRegistry;

#[derive(Deserialize)]
struct NameParam {
    name: String,
}

#[derive(Deserialize, Default)]
struct OptionalNameParam {
    #[serde(default)]
    name: Option<String>,
}

pub async fn create_session(registry: &SessionRegistry, params: Value, sink: &dyn EventSink) -> Result<Value> {
    let params: NameParam = serde_json::from_value(params).map_err(|e| nerve_domain::error::Error::invalid_input(e.to_string()))?;
    registry.create_session(&params.name)?;
    sink.publish(Event::new(event_type::SESSION_CREATED, json!({ "name": params.name })));
    Ok(json!({ "name": params.name }))
}

pub async fn delete_session(registry: &SessionRegistry, params: Value, sink: &dyn EventSink) -> Result<Value> {
    let params: NameParam = serde_json::from_value(params).map_err(|e| nerve_domain::error::Error::invalid_input(e.to_string()))?;
    registry.delete_session(&params.name).await?;
    sink.publish(Event::new(event_type::SESSION_DELETED, json!({ "name": params.name })));
    Ok(json!({}))
}

pub async fn list_sessions(registry: &SessionRegistry) -> Result<Value> {
    Ok(json!({ "sessions": registry.list() }))
}

pub async fn get_session(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: OptionalNameParam = serde_json::from_value(params).unwrap_or_default();
    let session = registry.get(params.name.as_deref())?;
    let node_ids: Vec<String> = session.list_nodes().iter().map(|n| n.descriptor().id).collect();
    let graph_ids: Vec<String> = session.list_graphs().iter().map(|g| g.id.clone()).collect();
    let run_ids: Vec<String> = session.list_runs().iter().map(|r| r.run_id.clone()).collect();
    Ok(json!({
        "name": session.name(),
        "nodes": node_ids,
        "graphs": graph_ids,
        "runs": run_ids,
    }))
}
