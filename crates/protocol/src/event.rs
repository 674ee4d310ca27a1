//! The event envelope and the minimum taxonomy (§6, §4.11). Event
//! types beyond the workflow taxonomy (already free-form strings in
//! `nerve-workflow`) are named here as constants rather than an enum,
//! since observers match on the string and new event kinds are added
//! without breaking wire compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod event_type {
    pub const SESSION_CREATED: &str = "SESSION_CREATED";
    pub const SESSION_DELETED: &str = "SESSION_DELETED";

    pub const NODE_CREATED: &str = "NODE_CREATED";
    pub const NODE_DELETED: &str = "NODE_DELETED";
    pub const NODE_BUSY: &str = "NODE_BUSY";
    pub const NODE_READY: &str = "NODE_READY";
    pub const OUTPUT_CHUNK: &str = "OUTPUT_CHUNK";
    pub const OUTPUT_PARSED: &str = "OUTPUT_PARSED";

    pub const DAG_STARTED: &str = "DAG_STARTED";
    pub const TASK_STARTED: &str = "TASK_STARTED";
    pub const TASK_COMPLETED: &str = "TASK_COMPLETED";
    pub const TASK_FAILED: &str = "TASK_FAILED";
    pub const DAG_COMPLETED: &str = "DAG_COMPLETED";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub r#type: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(r#type: impl Into<String>, data: Value) -> Self {
        Self { r#type: r#type.into(), data, node_id: None, run_id: None, timestamp: Utc::now() }
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// The broadcast frame `GET /api/events` wraps every event in.
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame {
    pub r#type: &'static str,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl From<Event> for EventFrame {
    fn from(e: Event) -> Self {
        Self { r#type: "event", event_type: e.r#type, node_id: e.node_id, run_id: e.run_id, data: e.data, timestamp: e.timestamp }
    }
}

/// Implemented by whatever owns the broadcast channel (the gateway);
/// handlers call this to publish an event without depending on the
/// transport layer.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_frame_carries_event_marker() {
        let event = Event::new(event_type::NODE_READY, serde_json::json!({})).with_node("b");
        let frame: EventFrame = event.into();
        assert_eq!(frame.r#type, "event");
        assert_eq!(frame.node_id.as_deref(), Some("b"));
    }
}
