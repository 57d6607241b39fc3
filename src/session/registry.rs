//! Process-wide map from user identity to backend session.
//!
//! # Responsibilities
//! - Single source of truth for "does a session exist for X"
//! - Create-on-login; concurrent logins for one identity share one handshake
//! - Sessions deregister themselves when they close or fail
//!
//! # Design Decisions
//! - `DashMap::entry` makes check-and-insert atomic per identity
//! - Self-removal is conditional on the connection id so a dying session can
//!   never evict its replacement

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::config::BackendConfig;
use crate::session::backend::{BackendSession, SessionState};
use crate::session::connection::ConnectionId;

/// Admin view of one registered session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub username: String,
    pub connection_id: String,
    pub state: SessionState,
    pub pending: usize,
}

/// Registry of live backend sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, BackendSession>,
    backend: BackendConfig,
}

impl SessionRegistry {
    /// Create an empty registry dialing the given backend.
    pub fn new(backend: BackendConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            backend,
        })
    }

    /// Return the registered session for `username`, creating one if absent.
    ///
    /// A session that is still connecting is returned as-is; its callers
    /// share the handshake outcome.
    pub fn get_or_create(self: &Arc<Self>, username: &str) -> BackendSession {
        match self.sessions.entry(username.to_string()) {
            Entry::Occupied(entry) => {
                let session = entry.get().clone();
                tracing::debug!(
                    username = %username,
                    session_id = %session.id(),
                    state = ?session.state(),
                    "Reusing registered session"
                );
                session
            }
            Entry::Vacant(entry) => {
                let session = BackendSession::spawn(username, &self.backend, Arc::clone(self));
                tracing::debug!(
                    username = %username,
                    session_id = %session.id(),
                    "Session created"
                );
                entry.insert(session.clone());
                session
            }
        }
    }

    /// Look up the session for `username`.
    pub fn get(&self, username: &str) -> Option<BackendSession> {
        self.sessions.get(username).map(|entry| entry.value().clone())
    }

    /// Drop the mapping for `username`. Idempotent.
    ///
    /// The session itself shuts down once the last handle to it is gone.
    pub fn remove(&self, username: &str) -> Option<BackendSession> {
        self.sessions.remove(username).map(|(_, session)| session)
    }

    /// Drop the mapping only if it still points at connection `id`.
    pub(crate) fn release(&self, username: &str, id: ConnectionId) -> bool {
        let released = self
            .sessions
            .remove_if(username, |_, session| session.id() == id)
            .is_some();
        if released {
            tracing::debug!(username = %username, session_id = %id, "Session deregistered");
        }
        released
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Point-in-time listing for the admin API.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| {
                let status = entry.value().status();
                SessionSnapshot {
                    username: entry.key().clone(),
                    connection_id: entry.value().id().to_string(),
                    state: status.state,
                    pending: status.pending,
                }
            })
            .collect();
        sessions.sort_by(|a, b| a.username.cmp(&b.username));
        sessions
    }

    /// Close every session and wait for each to finish.
    pub async fn close_all(&self) {
        let sessions: Vec<BackendSession> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        if sessions.is_empty() {
            return;
        }

        tracing::info!(count = sessions.len(), "Closing backend sessions");
        for session in &sessions {
            session.close();
        }
        for session in sessions {
            session.closed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use tokio::net::TcpListener;

    fn backend_at(address: String) -> BackendConfig {
        BackendConfig {
            address,
            connect_timeout_secs: 1,
            reply_timeout_secs: None,
            ..BackendConfig::default()
        }
    }

    /// An address nothing listens on.
    async fn refused_backend() -> BackendConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        backend_at(address)
    }

    /// A backend that accepts connections and never answers.
    async fn silent_backend() -> BackendConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        backend_at(address)
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let registry = SessionRegistry::new(silent_backend().await);

        let first = registry.get_or_create("alice");
        let second = registry.get_or_create("alice");
        assert_eq!(first.id(), second.id());
        assert_eq!(registry.len(), 1);

        let other = registry.get_or_create("bob");
        assert_ne!(first.id(), other.id());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new(silent_backend().await);
        let session = registry.get_or_create("alice");

        let removed = registry.remove("alice").unwrap();
        assert_eq!(removed.id(), session.id());
        assert!(registry.remove("alice").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_release_ignores_replaced_session() {
        let registry = SessionRegistry::new(silent_backend().await);
        let old = registry.get_or_create("alice");
        registry.remove("alice");

        let new = registry.get_or_create("alice");
        assert!(!registry.release("alice", old.id()));
        assert_eq!(registry.get("alice").unwrap().id(), new.id());

        assert!(registry.release("alice", new.id()));
        assert!(registry.get("alice").is_none());
    }

    #[tokio::test]
    async fn test_failed_connect_deregisters() {
        let registry = SessionRegistry::new(refused_backend().await);
        let session = registry.get_or_create("alice");

        let err = session.wait_open().await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionFailed(_)));
        assert_eq!(session.state(), SessionState::Errored);
        assert!(registry.get("alice").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_lists_sessions_sorted() {
        let registry = SessionRegistry::new(silent_backend().await);
        registry.get_or_create("carol");
        registry.get_or_create("alice");

        let snapshot = registry.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol"]);
        assert!(snapshot.iter().all(|s| s.pending == 0));
    }
}
