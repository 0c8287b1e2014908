//! Session identity, status machine and record.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Result, RiftError};
use super::language::Language;

const MAX_SESSION_ID_LEN: usize = 100;

/// Opaque session identifier.
///
/// Generated ids are UUID v4 strings. Caller-supplied ids are restricted to
/// `[A-Za-z0-9_-]{1,100}` because they name the checkout directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session id.
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied id.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_SESSION_ID_LEN {
            return Err(RiftError::InvalidConfig(format!(
                "session_id must be 1..={MAX_SESSION_ID_LEN} characters"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RiftError::InvalidConfig(format!(
                "session_id '{raw}' may only contain letters, digits, '-' and '_'"
            )));
        }
        Ok(SessionId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 8 chars), used in branch names and log lines.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Completed,
    Failed,
    Fixed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Fixed => "fixed",
            SessionStatus::Error => "error",
        }
    }

    /// Whether a run has finished with this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Error
        )
    }

    /// Transition rules.
    ///
    /// Within a run the status only moves forward, except `fixed -> running`
    /// when a patched checkout is retested. A terminal session may restart
    /// as `running` when a new run reuses it. Re-asserting the current status
    /// is always allowed.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::{Completed, Created, Error, Failed, Fixed, Running};

        if *self == next {
            return true;
        }
        match (self, next) {
            (Created, Running | Failed | Error) => true,
            (Running, Completed | Failed | Fixed | Error) => true,
            (Fixed, Running | Completed | Failed | Error) => true,
            (Completed | Failed | Error, Running) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked unit of work: one checkout, one language, one status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: SessionId,
    pub repo_url: String,
    pub language: Language,
    /// Host-visible path of the checkout.
    pub repo_path: PathBuf,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to `SessionRegistry::create`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    /// Explicit id; generated when `None`.
    pub session_id: Option<SessionId>,
    pub repo_url: String,
    pub language: Language,
    pub repo_path: PathBuf,
}

impl Session {
    /// Build a freshly created session record.
    pub fn from_new(id: SessionId, new: NewSession) -> Self {
        let now = Utc::now();
        Self {
            session_id: id,
            repo_url: new.repo_url,
            language: new.language,
            repo_path: new.repo_path,
            status: SessionStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}
