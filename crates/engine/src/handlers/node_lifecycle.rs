//! `NodeLifecycleHandler` (§4.12): `CREATE_NODE`, `DELETE_NODE`,
//! `LIST_NODES`, `GET_NODE`, `FORK_NODE`. Name validation and
//! duplicate detection live in `Session::add_node`/`fork_node`; this
//! handler wires command params to `node_factory::create_node` and
//! tears down a node's proxy (if any) on delete.

use serde::Deserialize;
use serde_json::{json, Value};

use nerve_domain::config::Config;
use nerve_domain::error::{Error, Result};
use nerve_nodes::Node;
use nerve_protocol::event::event_type;
use nerve_protocol::{Event, EventSink};
use nerve_sessions::SessionRegistry;

use crate::node_factory;
use crate::proxy_bridge::ProxyBridge;

/// Only the two fields this handler itself needs; the node-variant
/// fields are left in `params` and handed to `node_factory::create_node`
/// untouched, so the handler doesn't need to know every variant shape.
#[derive(Deserialize)]
struct CreateNodeEnvelope {
    #[serde(default)]
    session: Option<String>,
    id: String,
}

#[derive(Deserialize)]
struct NodeRefParams {
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
struct ForkNodeParams {
    #[serde(default)]
    session: Option<String>,
    source_id: String,
    new_id: String,
}

fn node_summary(node: &nerve_nodes::AnyNode) -> Value {
    let descriptor = node.descriptor();
    json!({
        "id": descriptor.id,
        "variant": descriptor.variant,
        "persistent": descriptor.persistent,
        "state": node.state(),
    })
}

pub async fn create_node(
    registry: &SessionRegistry,
    config: &Config,
    proxy_bridge: &ProxyBridge,
    params: Value,
    sink: &dyn EventSink,
) -> Result<Value> {
    let envelope: CreateNodeEnvelope =
        serde_json::from_value(params.clone()).map_err(|e| Error::invalid_input(format!("invalid create_node params: {e}")))?;
    let session = registry.get(envelope.session.as_deref())?;
    let node = node_factory::create_node(&session, &envelope.id, params, config, proxy_bridge).await?;
    let summary = node_summary(&node);
    session.add_node(&envelope.id, node)?;
    sink.publish(Event::new(event_type::NODE_CREATED, summary.clone()).with_node(envelope.id.clone()));
    Ok(summary)
}

pub async fn delete_node(registry: &SessionRegistry, proxy_bridge: &ProxyBridge, params: Value, sink: &dyn EventSink) -> Result<Value> {
    let params: NodeRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    session.delete_node(&params.id).await?;
    proxy_bridge.stop_for_node(&params.id).await;
    sink.publish(Event::new(event_type::NODE_DELETED, json!({ "id": params.id })).with_node(params.id.clone()));
    Ok(json!({}))
}

pub async fn list_nodes(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: SessionOnlyParams = serde_json::from_value(params).unwrap_or_default();
    let session = registry.get(params.session.as_deref())?;
    let nodes: Vec<Value> = session.list_nodes().iter().map(|n| node_summary(n)).collect();
    Ok(json!({ "nodes": nodes }))
}

pub async fn get_node(registry: &SessionRegistry, params: Value) -> Result<Value> {
    let params: NodeRefParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    let node = session.get_node(&params.id)?;
    Ok(node_summary(&node))
}

pub async fn fork_node(registry: &SessionRegistry, params: Value, sink: &dyn EventSink) -> Result<Value> {
    let params: ForkNodeParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
    let session = registry.get(params.session.as_deref())?;
    session.fork_node(&params.source_id, &params.new_id)?;
    let node = session.get_node(&params.new_id)?;
    let summary = node_summary(&node);
    sink.publish(Event::new(event_type::NODE_CREATED, summary.clone()).with_node(params.new_id.clone()));
    Ok(summary)
}
