//! Domain-level error taxonomy for Rift.

use super::session::{SessionId, SessionStatus};

/// Coarse classification used by the orchestrator to decide how a failure
/// terminates a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unsupported language or malformed configuration. No container work happens.
    Configuration,
    /// Missing, duplicate or wrongly transitioned session.
    Session,
    /// Container backend unreachable or container missing.
    Container,
    /// Fix production or source-control write/push failure.
    FixApplication,
    /// Local io / serialization faults.
    Internal,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Session => "session",
            ErrorClass::Container => "container",
            ErrorClass::FixApplication => "fix_application",
            ErrorClass::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rift domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RiftError {
    #[error("Language '{language}' is not supported. Supported: {supported}")]
    UnsupportedLanguage { language: String, supported: String },

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session already exists: {0}")]
    SessionAlreadyExists(SessionId),

    #[error("session {id}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("container '{0}' is not running")]
    ContainerNotFound(String),

    #[error("container execution failed: {0}")]
    Container(String),

    #[error("fix producer error: {0}")]
    FixProducer(String),

    #[error("fix application failed: {0}")]
    FixApplication(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RiftError {
    /// Which part of the taxonomy this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            RiftError::UnsupportedLanguage { .. } | RiftError::InvalidConfig(_) => {
                ErrorClass::Configuration
            }
            RiftError::SessionNotFound(_)
            | RiftError::SessionAlreadyExists(_)
            | RiftError::InvalidTransition { .. } => ErrorClass::Session,
            RiftError::ContainerNotFound(_) | RiftError::Container(_) => ErrorClass::Container,
            RiftError::FixProducer(_) | RiftError::FixApplication(_) | RiftError::Git(_) => {
                ErrorClass::FixApplication
            }
            RiftError::Serialization(_) | RiftError::Io(_) => ErrorClass::Internal,
        }
    }
}

/// Result type for Rift domain operations.
pub type Result<T> = std::result::Result<T, RiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_language_message() {
        let err = RiftError::UnsupportedLanguage {
            language: "ruby".to_string(),
            supported: "python, nodejs".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Language 'ruby' is not supported. Supported: python, nodejs"
        );
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[test]
    fn test_error_classes() {
        let id = SessionId::generate();
        assert_eq!(
            RiftError::SessionNotFound(id.clone()).class(),
            ErrorClass::Session
        );
        assert_eq!(
            RiftError::SessionAlreadyExists(id).class(),
            ErrorClass::Session
        );
        assert_eq!(
            RiftError::ContainerNotFound("rift-python".into()).class(),
            ErrorClass::Container
        );
        assert_eq!(
            RiftError::Git("push rejected".into()).class(),
            ErrorClass::FixApplication
        );
        assert_eq!(ErrorClass::FixApplication.to_string(), "fix_application");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = RiftError::InvalidTransition {
            id: SessionId::parse("abc").unwrap(),
            from: SessionStatus::Completed,
            to: SessionStatus::Fixed,
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("completed -> fixed"));
    }
}
