//! Rift Core Library
//!
//! Domain model, session registry, event stream, test-output diagnostics and
//! the collaborator seams shared by the pipeline and the `riftd` binary.

pub mod collaborators;
pub mod diagnostics;
pub mod domain;
pub mod events;
pub mod fakes;
pub mod git;
pub mod obs;
pub mod registry;
pub mod telemetry;

pub use domain::{
    Credential, ErrorCategory, ErrorClass, FixOutcome, FixStatus, IterationRecord,
    IterationStatus, Language, NewSession, PipelineConfig, PipelineEvent, PipelineRequest,
    PipelineResult, PipelineStep, Result, RiftError, Session, SessionId, SessionStatus,
    StepStatus, TestCounts, TestError, Verdict, DEFAULT_MAX_ITERATIONS, MAX_ITERATIONS_CAP,
};

pub use collaborators::{FixProducer, FixRequest, ProposedFix, SourceControl};
pub use diagnostics::{parse_test_counts, parse_test_output, primary_category, DiagnosticsConfig};
pub use events::{event_channel, ChannelSink, DeliveryStats, EventSink, EventStream, RunPublisher};
pub use git::GitCli;
pub use registry::{MemorySessionRegistry, SessionRegistry};

pub use obs::{
    emit_event_dropped, emit_fix_outcome, emit_iteration_finished, emit_pipeline_error,
    emit_pipeline_finished, emit_pipeline_started, PipelineSpan,
};
pub use telemetry::init_tracing;

/// Rift version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
