//! `WorkflowRun`: the per-execution state machine (§3 "WorkflowRun",
//! §4.11 state diagram). The engine owns all state transitions; the
//! workflow body only ever sees the `WorkflowContext` it was handed.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub prompt: String,
    pub choices: Option<Vec<String>>,
    pub answer: Option<String>,
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvent {
    pub run_id: String,
    pub workflow_id: String,
    pub event_type: String,
    pub data: Value,
}

pub(crate) enum GateReply {
    Answer(String),
    Cancelled,
}

struct RunInner {
    state: RunState,
    pending_gate: Option<Gate>,
    events: Vec<WorkflowEvent>,
    result: Option<Value>,
    error: Option<String>,
    start: Instant,
    end: Option<Instant>,
}

pub type EventCallback = std::sync::Arc<dyn Fn(&WorkflowEvent) + Send + Sync>;

/// Shared handle to one workflow run. Clonable; every clone refers to
/// the same underlying state.
#[derive(Clone)]
pub struct WorkflowRun {
    pub run_id: String,
    pub workflow_id: String,
    inner: std::sync::Arc<Mutex<RunInner>>,
    pub(crate) cancellation_token: CancellationToken,
    pub(crate) gate_reply_tx: std::sync::Arc<Mutex<Option<oneshot::Sender<GateReply>>>>,
    on_event: std::sync::Arc<Mutex<Option<EventCallback>>>,
}

impl WorkflowRun {
    pub fn new(run_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            workflow_id: workflow_id.into(),
            inner: std::sync::Arc::new(Mutex::new(RunInner {
                state: RunState::Pending,
                pending_gate: None,
                events: Vec::new(),
                result: None,
                error: None,
                start: Instant::now(),
                end: None,
            })),
            cancellation_token: CancellationToken::new(),
            gate_reply_tx: std::sync::Arc::new(Mutex::new(None)),
            on_event: std::sync::Arc::new(Mutex::new(None)),
        }
    }

    /// Installs the callback the engine uses to convert
    /// `WorkflowEvent`s into protocol events as they happen.
    pub fn set_event_callback(&self, cb: EventCallback) {
        *self.on_event.lock() = Some(cb);
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().state
    }

    pub fn set_state(&self, state: RunState) {
        let mut inner = self.inner.lock();
        inner.state = state;
        if state.is_terminal() {
            inner.end = Some(Instant::now());
        }
    }

    pub fn pending_gate(&self) -> Option<Gate> {
        self.inner.lock().pending_gate.clone()
    }

    pub fn set_pending_gate(&self, gate: Option<Gate>) {
        self.inner.lock().pending_gate = gate;
    }

    pub fn push_event(&self, event: WorkflowEvent) {
        if let Some(cb) = self.on_event.lock().as_ref() {
            cb(&event);
        }
        self.inner.lock().events.push(event);
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.inner.lock().events.clone()
    }

    pub fn set_result(&self, result: Value) {
        self.inner.lock().result = Some(result);
    }

    pub fn result(&self) -> Option<Value> {
        self.inner.lock().result.clone()
    }

    pub fn set_error(&self, error: impl Into<String>) {
        self.inner.lock().error = Some(error.into());
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn elapsed(&self) -> Duration {
        let inner = self.inner.lock();
        inner.end.unwrap_or_else(Instant::now) - inner.start
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
        if let Some(tx) = self.gate_reply_tx.lock().take() {
            let _ = tx.send(GateReply::Cancelled);
        }
    }
}
