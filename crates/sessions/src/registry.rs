//! Registry of sessions (§4.9): the `default` session is created
//! eagerly and can never be deleted; every other session is created
//! and torn down by command.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use nerve_domain::error::{Error, Result};
use nerve_workflow::WorkflowRegistry;

use crate::session::Session;

pub const DEFAULT_SESSION_NAME: &str = "default";

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    workflow_registry: Arc<WorkflowRegistry>,
}

impl SessionRegistry {
    pub fn new(workflow_registry: Arc<WorkflowRegistry>) -> Self {
        let registry = Self { sessions: RwLock::new(HashMap::new()), workflow_registry };
        registry
            .sessions
            .write()
            .insert(DEFAULT_SESSION_NAME.to_string(), Session::new(DEFAULT_SESSION_NAME, registry.workflow_registry.clone()));
        registry
    }

    pub fn workflows(&self) -> &Arc<WorkflowRegistry> {
        &self.workflow_registry
    }

    pub fn create_session(&self, name: &str) -> Result<Session> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(name) {
            return Err(Error::conflict(format!("session {name:?} already exists")));
        }
        let session = Session::new(name, self.workflow_registry.clone());
        sessions.insert(name.to_string(), session.clone());
        Ok(session)
    }

    /// Looks up a session by name, or the `default` session when
    /// `name` is `None`.
    pub fn get(&self, name: Option<&str>) -> Result<Session> {
        let name = name.unwrap_or(DEFAULT_SESSION_NAME);
        self.sessions.read().get(name).cloned().ok_or_else(|| Error::not_found(format!("session {name:?}")))
    }

    pub async fn delete_session(&self, name: &str) -> Result<()> {
        if name == DEFAULT_SESSION_NAME {
            return Err(Error::invalid_state("the default session cannot be deleted"));
        }
        let session = self.sessions.write().remove(name).ok_or_else(|| Error::not_found(format!("session {name:?}")))?;
        session.stop().await;
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub async fn stop_all(&self) {
        let sessions: Vec<Session> = self.sessions.read().values().cloned().collect();
        for session in sessions {
            session.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_exists_and_is_protected() {
        let registry = SessionRegistry::new(Arc::new(WorkflowRegistry::new()));
        assert!(registry.get(None).is_ok());
        assert!(registry.get(Some(DEFAULT_SESSION_NAME)).is_ok());
    }

    #[tokio::test]
    async fn default_session_cannot_be_deleted() {
        let registry = SessionRegistry::new(Arc::new(WorkflowRegistry::new()));
        let err = registry.delete_session(DEFAULT_SESSION_NAME).await.unwrap_err();
        assert_eq!(err.kind(), nerve_domain::error::ErrorKind::InvalidState);
    }

    #[test]
    fn empty_session_is_still_a_valid_session() {
        let registry = SessionRegistry::new(Arc::new(WorkflowRegistry::new()));
        let session = registry.create_session("empty").unwrap();
        assert!(session.list_nodes().len() == 1); // just the identity node
        assert!(session.list_graphs().is_empty());
    }

    #[test]
    fn duplicate_session_name_conflicts() {
        let registry = SessionRegistry::new(Arc::new(WorkflowRegistry::new()));
        registry.create_session("dup").unwrap();
        let err = registry.create_session("dup").unwrap_err();
        assert_eq!(err.kind(), nerve_domain::error::ErrorKind::Conflict);
    }
}
