//! Structured trace events plus the graph-execution `Trace` aggregator.
//!
//! `TraceEvent` integrates with the `tracing` crate the way the rest of
//! the ambient stack does: each variant is emitted as one structured
//! log line. `Trace` is the separate, attachable object described in
//! §4.10 -- if a graph execution has one attached, every step appends
//! a `StepTrace` and the trace can later `explain()` itself as text.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved { session_key: String, session_id: String, is_new: bool },
    SessionReset { session_key: String, old_session_id: String, new_session_id: String, reason: String },
    NodeCreated { session: String, node_id: String, variant: String },
    NodeDeleted { session: String, node_id: String },
    NodeBusy { session: String, node_id: String },
    NodeReady { session: String, node_id: String },
    NodeError { session: String, node_id: String, message: String },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "nerve_trace_event");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepTrace {
    pub step_id: String,
    pub node_id: String,
    pub node_type: String,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub tokens_used: u64,
}

#[derive(Debug, Default)]
struct TraceInner {
    steps: Vec<StepTrace>,
}

/// A shared, cheaply-cloned handle attached to an `ExecutionContext`.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    inner: Arc<Mutex<TraceInner>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, step: StepTrace) {
        self.inner.lock().steps.push(step);
    }

    pub fn steps(&self) -> Vec<StepTrace> {
        self.inner.lock().steps.clone()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.inner.lock().steps.iter().map(|s| s.duration_ms).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.inner.lock().steps.iter().map(|s| s.tokens_used).sum()
    }

    /// A human-readable dump suitable for `dry`/`show` REPL commands.
    pub fn explain(&self) -> String {
        let steps = self.inner.lock();
        let mut out = String::new();
        for s in steps.steps.iter() {
            let status = if s.error.is_some() { "FAILED" } else { "ok" };
            out.push_str(&format!(
                "{:<16} node={:<16} {:>6}ms  tokens={:<6} {}\n",
                s.step_id, s.node_id, s.duration_ms, s.tokens_used, status
            ));
        }
        out.push_str(&format!(
            "total: {}ms, {} tokens, {} steps\n",
            self.total_duration_ms(),
            self.total_tokens(),
            steps.steps.len()
        ));
        out
    }
}
