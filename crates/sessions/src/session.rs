//! Session: owns named nodes, graphs, and in-flight workflow runs
//! (§4.9). Implements `NodeResolver` and `WorkflowHost` so the graph
//! executor and the workflow engine can reach into it without this
//! crate being a dependency of either.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_domain::node::{validate_node_id, IDENTITY_NODE_ID};
use nerve_graph::{Graph, GraphExecutor, NodeResolver, TaskResult};
use nerve_nodes::{AnyNode, IdentityNode, Node};
use nerve_workflow::{engine, RunState, WorkflowContext, WorkflowHost, WorkflowRegistry, WorkflowRun};

struct SessionInner {
    name: String,
    nodes: parking_lot::RwLock<HashMap<String, Arc<AnyNode>>>,
    graphs: parking_lot::RwLock<HashMap<String, Arc<Graph>>>,
    runs: parking_lot::RwLock<HashMap<String, WorkflowRun>>,
    registry: Arc<WorkflowRegistry>,
}

/// A cheaply-clonable handle shared by every caller addressing the
/// same session; all clones observe the same underlying tables.
#[derive(Clone)]
pub struct Session(Arc<SessionInner>);

impl Session {
    pub fn new(name: impl Into<String>, registry: Arc<WorkflowRegistry>) -> Self {
        let session = Self(Arc::new(SessionInner {
            name: name.into(),
            nodes: parking_lot::RwLock::new(HashMap::new()),
            graphs: parking_lot::RwLock::new(HashMap::new()),
            runs: parking_lot::RwLock::new(HashMap::new()),
            registry,
        }));
        session
            .0
            .nodes
            .write()
            .insert(IDENTITY_NODE_ID.to_string(), Arc::new(AnyNode::Identity(IdentityNode::new())));
        session
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.0.registry
    }

    pub fn add_node(&self, id: &str, node: AnyNode) -> Result<()> {
        validate_node_id(id)?;
        let mut nodes = self.0.nodes.write();
        if nodes.contains_key(id) {
            return Err(Error::conflict(format!("node {id:?} already exists")));
        }
        nodes.insert(id.to_string(), Arc::new(node));
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Result<Arc<AnyNode>> {
        self.0.nodes.read().get(id).cloned().ok_or_else(|| Error::not_found(format!("node {id:?}")))
    }

    pub fn list_nodes(&self) -> Vec<Arc<AnyNode>> {
        self.0.nodes.read().values().cloned().collect()
    }

    pub async fn delete_node(&self, id: &str) -> Result<()> {
        if id == IDENTITY_NODE_ID {
            return Err(Error::invalid_state("the identity node cannot be deleted"));
        }
        let node = self.0.nodes.write().remove(id).ok_or_else(|| Error::not_found(format!("node {id:?}")))?;
        let _ = node.stop().await;
        Ok(())
    }

    /// Deep-copies a forkable (chat) node under a new id. Other
    /// variants are not forkable and return `invalid_state`.
    pub fn fork_node(&self, source_id: &str, new_id: &str) -> Result<()> {
        validate_node_id(new_id)?;
        let mut nodes = self.0.nodes.write();
        if nodes.contains_key(new_id) {
            return Err(Error::conflict(format!("node {new_id:?} already exists")));
        }
        let source = nodes.get(source_id).ok_or_else(|| Error::not_found(format!("node {source_id:?}")))?;
        let forked = match source.as_ref() {
            AnyNode::LlmChat(chat) => AnyNode::LlmChat(chat.fork(new_id)?),
            _ => return Err(Error::invalid_state(format!("node {source_id:?} is not forkable"))),
        };
        nodes.insert(new_id.to_string(), Arc::new(forked));
        Ok(())
    }

    /// Executes a node and, if it is ephemeral, removes it from the
    /// session afterward regardless of success or failure (§8
    /// "Ephemeral autoclean"). The returned `bool` tells the caller
    /// whether that autoclean happened, so a `NODE_DELETED` event can
    /// be emitted where the caller has an `EventSink` (this crate
    /// does not).
    pub async fn execute_node(&self, id: &str, ctx: ExecutionContext) -> Result<(Value, bool)> {
        let node = self.get_node(id)?;
        let result = node.execute(ctx).await;
        let autocleaned = if !node.is_persistent() {
            self.0.nodes.write().remove(id);
            true
        } else {
            false
        };
        result.map(|value| (value, autocleaned))
    }

    pub fn add_graph(&self, id: &str, graph: Graph) -> Result<()> {
        let mut graphs = self.0.graphs.write();
        if graphs.contains_key(id) {
            return Err(Error::conflict(format!("graph {id:?} already exists")));
        }
        graphs.insert(id.to_string(), Arc::new(graph));
        Ok(())
    }

    pub fn get_graph(&self, id: &str) -> Result<Arc<Graph>> {
        self.0.graphs.read().get(id).cloned().ok_or_else(|| Error::not_found(format!("graph {id:?}")))
    }

    pub fn delete_graph(&self, id: &str) -> Result<()> {
        self.0.graphs.write().remove(id).map(|_| ()).ok_or_else(|| Error::not_found(format!("graph {id:?}")))
    }

    pub fn list_graphs(&self) -> Vec<Arc<Graph>> {
        self.0.graphs.read().values().cloned().collect()
    }

    pub async fn execute_graph(&self, id: &str, ctx: &ExecutionContext) -> Result<HashMap<String, TaskResult>> {
        let graph = self.get_graph(id)?;
        let executor = GraphExecutor::new(self);
        executor.execute(&graph, ctx).await
    }

    pub fn start_workflow(&self, workflow_id: &str, exec_ctx: ExecutionContext, params: Value, input: Value) -> Result<WorkflowRun> {
        let body = self.0.registry.get(workflow_id).ok_or_else(|| Error::not_found(format!("workflow {workflow_id:?}")))?;
        let host: Arc<dyn WorkflowHost> = Arc::new(self.clone());
        let run = engine::start(workflow_id, body, host, exec_ctx, params, input);
        self.0.runs.write().insert(run.run_id.clone(), run.clone());
        Ok(run)
    }

    pub fn get_run(&self, run_id: &str) -> Result<WorkflowRun> {
        self.0.runs.read().get(run_id).cloned().ok_or_else(|| Error::not_found(format!("run {run_id:?}")))
    }

    pub fn list_runs(&self) -> Vec<WorkflowRun> {
        self.0.runs.read().values().cloned().collect()
    }

    pub fn answer_gate(&self, run_id: &str, answer: String) -> Result<()> {
        let run = self.get_run(run_id)?;
        engine::answer_gate(&run, answer)
    }

    pub fn cancel_run(&self, run_id: &str) -> Result<()> {
        let run = self.get_run(run_id)?;
        engine::cancel(&run);
        Ok(())
    }

    /// Stops every persistent node and cancels every in-flight run
    /// (§3 Session lifecycle).
    pub async fn stop(&self) {
        for run in self.0.runs.read().values() {
            engine::cancel(run);
        }
        let nodes: Vec<Arc<AnyNode>> = self.0.nodes.read().values().cloned().collect();
        for node in nodes {
            if node.is_persistent() {
                let _ = node.stop().await;
            }
        }
    }
}

#[async_trait]
impl NodeResolver for Session {
    async fn resolve(&self, node_ref: &str) -> Result<Arc<dyn Node>> {
        let node: Arc<dyn Node> = self.get_node(node_ref)?;
        Ok(node)
    }
}

#[async_trait]
impl WorkflowHost for Session {
    async fn run_executable(&self, id: &str, input: Value, ctx: &ExecutionContext) -> Result<Value> {
        if self.0.nodes.read().contains_key(id) {
            let (value, _) = self.execute_node(id, ctx.clone()).await?;
            return Ok(value);
        }
        if self.0.graphs.read().contains_key(id) {
            let results = self.execute_graph(id, ctx).await?;
            return Ok(serde_json::to_value(results).unwrap_or(Value::Null));
        }
        let _ = input;
        Err(Error::not_found(format!("node or graph {id:?}")))
    }

    async fn run_nested_workflow(&self, workflow_id: &str, input: Value, parent: &WorkflowContext) -> Result<Value> {
        let body = self.0.registry.get(workflow_id).ok_or_else(|| Error::not_found(format!("workflow {workflow_id:?}")))?;
        let child_ctx = parent.exec_ctx().child(input.clone());
        let host: Arc<dyn WorkflowHost> = Arc::new(self.clone());
        let run = engine::start(workflow_id, body, host, child_ctx, Value::Null, input);
        self.0.runs.write().insert(run.run_id.clone(), run.clone());

        // Nested runs are driven by the same detached task the engine
        // spawned for them; poll for completion rather than threading
        // a completion channel through every `WorkflowHost` impl.
        loop {
            if run.state().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        match run.state() {
            RunState::Completed => Ok(run.result().unwrap_or(Value::Null)),
            RunState::Cancelled => Err(Error::Cancelled),
            _ => Err(Error::Backend(run.error().unwrap_or_else(|| format!("nested workflow {workflow_id:?} failed")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> Session {
        Session::new("default", Arc::new(WorkflowRegistry::new()))
    }

    #[test]
    fn identity_node_is_present_and_undeletable() {
        let session = new_session();
        assert!(session.get_node(IDENTITY_NODE_ID).is_ok());
    }

    #[tokio::test]
    async fn deleting_identity_is_rejected() {
        let session = new_session();
        assert!(session.delete_node(IDENTITY_NODE_ID).await.is_err());
    }

    #[test]
    fn duplicate_node_id_conflicts() {
        let session = new_session();
        session.add_node("echo", AnyNode::Identity(IdentityNode::new())).unwrap();
        let err = session.add_node("echo", AnyNode::Identity(IdentityNode::new())).unwrap_err();
        assert_eq!(err.kind(), nerve_domain::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn ephemeral_node_autocleans_after_execute() {
        let session = new_session();
        let func: nerve_nodes::NodeFn = Arc::new(|ctx: ExecutionContext| Box::pin(async move { Ok(ctx.input) }));
        let node = nerve_nodes::FunctionNode::new("once", func).unwrap();
        session.add_node("once", AnyNode::Function(node)).unwrap();
        let ctx = ExecutionContext::new("default", Value::String("hi".into()));
        let (_, autocleaned) = session.execute_node("once", ctx).await.unwrap();
        assert!(autocleaned);
        assert!(session.get_node("once").is_err());
    }
}
