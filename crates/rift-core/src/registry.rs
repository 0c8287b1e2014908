//! Session registry: the single source of truth for session status.
//!
//! The orchestrator never mutates a [`Session`] directly; every status change
//! goes through [`SessionRegistry::set_status`], which enforces the transition
//! rules of [`SessionStatus::can_transition_to`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{NewSession, Result, RiftError, Session, SessionId, SessionStatus};

/// Session bookkeeping for the lifetime of the process.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Register a new session. Rejects an explicit id that is already taken.
    async fn create(&self, new: NewSession) -> Result<Session>;

    /// Fetch a session by id. Returns `RiftError::SessionNotFound` if absent.
    async fn get(&self, id: &SessionId) -> Result<Session>;

    /// Move a session to `status` and return the updated record.
    async fn set_status(&self, id: &SessionId, status: SessionStatus) -> Result<Session>;

    /// Snapshot of all sessions, ordered by creation time.
    async fn list(&self) -> Result<Vec<Session>>;
}

/// In-memory registry backed by one table behind an async read/write lock.
///
/// Writers hold the lock exclusively, so two status updates for the same id
/// never interleave; readers proceed concurrently.
#[derive(Debug, Default)]
pub struct MemorySessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRegistry for MemorySessionRegistry {
    async fn create(&self, new: NewSession) -> Result<Session> {
        let mut sessions = self.sessions.write().await;

        let id = match new.session_id.clone() {
            Some(id) if sessions.contains_key(&id) => {
                return Err(RiftError::SessionAlreadyExists(id));
            }
            Some(id) => id,
            None => loop {
                let candidate = SessionId::generate();
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        let session = Session::from_new(id.clone(), new);
        sessions.insert(id, session.clone());
        debug!(session_id = %session.session_id, "session created");
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| RiftError::SessionNotFound(id.clone()))
    }

    async fn set_status(&self, id: &SessionId, status: SessionStatus) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| RiftError::SessionNotFound(id.clone()))?;

        if !session.status.can_transition_to(status) {
            return Err(RiftError::InvalidTransition {
                id: id.clone(),
                from: session.status,
                to: status,
            });
        }

        debug!(session_id = %id, from = %session.status, to = %status, "session status");
        session.status = status;
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}
