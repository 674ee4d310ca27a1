//! `ScriptHandler` (§4.12 "PythonExecutor"): a security-isolated,
//! per-session eval namespace for operator debugging.
//!
//! The original namespace let an operator import and instantiate node
//! and graph classes directly inside the eval. Workflow registration
//! in this codebase is compile-time only (see `nerve_workflow::registry`'s
//! module doc) -- operators hand in `WorkflowBody` closures by name
//! rather than evaluating arbitrary code against a process-wide
//! namespace -- so constructing live nodes/graphs from script text is
//! out of scope here too; this handler keeps the part that still
//! makes sense standalone: a per-session persistent scope an operator
//! can poke at to inspect what the session currently holds. `rhai`
//! stands in for the embedded scripting language; its engine ships
//! the sandboxing knobs (`set_max_operations`, `set_max_expr_depth`,
//! ...) a debugging eval surface needs, and `on_print` gives the same
//! captured-stdout shape the original returned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use parking_lot::RwLock;
use rhai::{Array, Dynamic, Engine, Scope};
use serde_json::{json, Value};

use nerve_domain::error::{Error, Result};
use nerve_nodes::Node;
use nerve_sessions::Session;

const MAX_OPERATIONS: u64 = 50_000;
const MAX_EXPR_DEPTH: usize = 32;

fn build_engine(session: &Session, print_buf: Arc<Mutex<String>>) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
    engine.set_max_string_size(64 * 1024);
    engine.set_max_array_size(10_000);

    engine.on_print(move |s| {
        let mut buf = print_buf.lock().unwrap_or_else(|e| e.into_inner());
        buf.push_str(s);
        buf.push('\n');
    });

    let s = session.clone();
    engine.register_fn("session_name", move || s.name().to_string());

    let s = session.clone();
    engine.register_fn("node_ids", move || -> Array { s.list_nodes().iter().map(|n| Dynamic::from(n.descriptor().id.clone())).collect() });

    let s = session.clone();
    engine.register_fn("graph_ids", move || -> Array { s.list_graphs().iter().map(|g| Dynamic::from(g.id.clone())).collect() });

    let s = session.clone();
    engine.register_fn("workflow_run_ids", move || -> Array { s.list_runs().iter().map(|r| Dynamic::from(r.run_id.clone())).collect() });

    let s = session.clone();
    engine.register_fn("node_state", move |id: &str| -> String {
        s.get_node(id).map(|n| format!("{:?}", n.state())).unwrap_or_else(|_| "unknown".to_string())
    });

    engine
}

/// Owns one persistent `rhai::Scope` per session, mirroring the
/// original's per-session namespace dict -- variables an operator
/// assigns in one eval survive into the next, within the same
/// session.
#[derive(Default)]
pub struct ScriptHandler {
    namespaces: RwLock<HashMap<String, Scope<'static>>>,
}

impl ScriptHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eval(&self, session: &Session, code: &str) -> Result<Value> {
        let print_buf = Arc::new(Mutex::new(String::new()));
        let engine = build_engine(session, print_buf.clone());

        let mut namespaces = self.namespaces.write();
        let scope = namespaces.entry(session.name().to_string()).or_insert_with(Scope::new);

        let result: Dynamic = engine.eval_with_scope(scope, code).map_err(|e| Error::invalid_input(e.to_string()))?;

        let output = print_buf.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let result_json = if result.is_unit() {
            Value::Null
        } else {
            rhai::serde::from_dynamic(&result).map_err(|e| Error::invalid_input(format!("could not convert script result: {e}")))?
        };

        Ok(json!({ "output": output, "result": result_json }))
    }
}
