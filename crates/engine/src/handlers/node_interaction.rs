//! `NodeInteractionHandler` (§4.12): `RUN_COMMAND`, `EXECUTE_INPUT`,
//! `SEND_INTERRUPT`, `WRITE_DATA`, `GET_BUFFER`, `GET_HISTORY`.
//!
//! `RUN_COMMAND` and `EXECUTE_INPUT` share one implementation: both
//! submit `input` to a node's `execute()` and wait for the result, the
//! only difference being which transport surfaces the command under
//! which name.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_nodes::Node;
use nerve_protocol::event::event_type;
use nerve_protocol::{Event, EventSink};
use nerve_sessions::SessionRegistry;

#[derive(Deserialize)]
struct ExecuteParams {
    #[serde(default)]
    session: Option<String>,
    id: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
struct NodeRefParams {
    #[serde(default)]
    session: Option<String>,
    id: String,
}

#[derive(Deserialize)]
struct WriteDataParams {
    #[serde(default)]
    session: Option<String>,
    id: String,
    data: String,
}

pub async fn execute_input(registry: &SessionRegistry, params: Value, sink: &dyn EventSink) -> Result<Value> {
    let params: ExecuteParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let mut ctx = ExecutionContext::new(session.name(), params.input);
    if let Some(secs) = params.timeout_secs {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    sink.publish(Event::new(event_type::NODE_BUSY, json!({})).with_node(params.id.clone()));
    let (result, autocleaned) = session.execute_node(&params.id, ctx).await?;
    sink.publish(Event::new(event_type::NODE_READY, json!({})).with_node(params.id.clone()));
    sink.publish(Event::new(event_type::OUTPUT_PARSED, result.clone()).with_node(params.id.clone()));
    if autocleaned {
        sink.publish(Event::new(event_type::NODE_DELETED, json!({ "id": params.id })).with_node(params.id.clone()));
    }
    Ok(result)
}

pub async fn send_interrupt(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: NodeRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let node = session.get_node(&params.id)?;
    node.interrupt().await?;
    Ok(json!({}))
}

pub async fn write_data(registry: &SessionRegistry, params: Value, sink: &dyn EventSink) -> Result<Value> {
    let params: WriteDataParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let node = session.get_node(&params.id)?;
    node.write_raw(params.data.as_bytes()).await?;
    sink.publish(Event::new(event_type::OUTPUT_CHUNK, json!({ "data": params.data })).with_node(params.id.clone()));
    Ok(json!({}))
}

pub async fn get_buffer(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: NodeRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let node = session.get_node(&params.id)?;
    let buffer = node
        .raw_buffer()
        .await
        .ok_or_else(|| Error::invalid_state(format!("node {:?} has no terminal buffer", params.id)))?;
    Ok(json!({ "buffer": buffer }))
}

pub async fn get_history(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: NodeRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let node = session.get_node(&params.id)?;
    let Some(path) = node.history_path() else {
        return Ok(json!({ "entries": [] }));
    };
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(json!({ "entries": [] })),
        Err(e) => return Err(Error::Io(e)),
    };
    let entries: Vec<Value> = raw.lines().filter(|l| !l.is_empty()).filter_map(|l| serde_json::from_str(l).ok()).collect();
    Ok(json!({ "entries": entries }))
}
