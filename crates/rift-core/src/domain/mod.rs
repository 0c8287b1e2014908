//! Domain models for Rift.
//!
//! Canonical definitions for the core entities:
//! - `Session`: one checkout bound to a language and a status
//! - `PipelineRequest` / `PipelineConfig`: raw and validated run configuration
//! - `TestError`: one categorized test failure
//! - `IterationRecord` / `PipelineResult`: loop history and final verdict
//! - `PipelineEvent`: typed progress notifications

pub mod config;
pub mod error;
pub mod event;
pub mod language;
pub mod result;
pub mod session;
pub mod test_error;

// Re-export main types and errors
pub use config::{
    Credential, PipelineConfig, PipelineRequest, DEFAULT_MAX_ITERATIONS, MAX_ITERATIONS_CAP,
};
pub use error::{ErrorClass, Result, RiftError};
pub use event::{PipelineEvent, PipelineStep, StepStatus};
pub use language::Language;
pub use result::{
    FixOutcome, FixStatus, IterationRecord, IterationStatus, PipelineResult, TestCounts, Verdict,
};
pub use session::{NewSession, Session, SessionId, SessionStatus};
pub use test_error::{ErrorCategory, TestError};
