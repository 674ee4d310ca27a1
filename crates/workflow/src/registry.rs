//! Static workflow registration (§9 "Global process-wide namespaces
//! for Python eval" -- the non-dynamic resolution: operators hand in
//! workflow bodies by name at compile time instead of evaluating
//! arbitrary code against a process-wide namespace).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::engine::WorkflowBody;

#[derive(Default)]
pub struct WorkflowRegistry {
    bodies: RwLock<HashMap<String, WorkflowBody>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, body: WorkflowBody) {
        self.bodies.write().insert(id.into(), body);
    }

    pub fn get(&self, id: &str) -> Option<WorkflowBody> {
        self.bodies.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bodies.read().contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<WorkflowBody> {
        self.bodies.write().remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.bodies.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn register_and_fetch_roundtrips() {
        let registry = WorkflowRegistry::new();
        let body: WorkflowBody = std::sync::Arc::new(|ctx| Box::pin(async move { Ok::<Value, nerve_domain::error::Error>(ctx.input) }));
        registry.register("echo", body);
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
        assert!(registry.get("echo").is_some());
    }
}
