//! Terminal session registry.
//!
//! Dev-server terminals outlive the loop that started them. The registry maps
//! a terminal id to what was launched there so callers can list and stop
//! them later. It is shared behind an `Arc` and injected, never global.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// A persistent, named terminal session started by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSession {
    /// Identifier assigned by the tool server.
    pub id: String,
    pub name: String,
    pub working_dir: PathBuf,
    /// The last command sent into the session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TerminalSession {
    pub fn new(id: impl Into<String>, name: impl Into<String>, working_dir: PathBuf) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            working_dir,
            command: None,
            created_at: Utc::now(),
        }
    }
}

/// Thread-safe map of live terminal sessions.
#[derive(Debug, Default)]
pub struct TerminalRegistry {
    sessions: RwLock<HashMap<String, TerminalSession>>,
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, replacing one with the same id.
    pub async fn insert(&self, session: TerminalSession) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    pub async fn get(&self, id: &str) -> Option<TerminalSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Record the command most recently sent into a session.
    pub async fn set_command(&self, id: &str, command: impl Into<String>) -> bool {
        match self.sessions.write().await.get_mut(id) {
            Some(session) => {
                session.command = Some(command.into());
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> Option<TerminalSession> {
        self.sessions.write().await.remove(id)
    }

    /// All sessions, oldest first.
    pub async fn list(&self) -> Vec<TerminalSession> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn insert_lookup_remove() {
        let registry = TerminalRegistry::new();
        registry
            .insert(TerminalSession::new("t1", "Agent Dev Server – dev", PathBuf::from("/ws")))
            .await;

        assert!(registry.set_command("t1", "vite").await);
        assert!(!registry.set_command("missing", "vite").await);

        let session = registry.get("t1").await.unwrap();
        assert_eq!(session.command.as_deref(), Some("vite"));
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove("t1").await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_inserts_are_all_visible() {
        let registry = Arc::new(TerminalRegistry::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .insert(TerminalSession::new(format!("t{i}"), "term", PathBuf::from("/ws")))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.list().await.len(), 16);
    }
}
