//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `PipelineSpan` RAII guard
//! - Emission functions for key lifecycle events: start, iteration, fix, finish
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::{info, warn};

use crate::domain::ErrorClass;

/// Guard holding a run-scoped span.
///
/// The span is not entered by the guard itself: pipelines run on async tasks,
/// so callers attach it with `tracing::Instrument::instrument(fut, guard.span())`.
pub struct PipelineSpan {
    span: tracing::Span,
}

impl PipelineSpan {
    /// Create a span tagged with the repository and language of the run.
    pub fn new(repo_url: &str, language: &str) -> Self {
        let span = tracing::info_span!(
            "rift.pipeline",
            repo_url = %repo_url,
            language = %language,
            session_id = tracing::field::Empty,
        );
        Self { span }
    }

    /// Record the session id once it is known.
    pub fn record_session(&self, session_id: &str) {
        self.span.record("session_id", session_id);
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

/// Emit event: pipeline started for a session.
pub fn emit_pipeline_started(session_id: &str, language: &str, max_iterations: u32) {
    info!(
        event = "pipeline.started",
        session_id = %session_id,
        language = %language,
        max_iterations = max_iterations,
    );
}

/// Emit event: one test iteration finished.
pub fn emit_iteration_finished(session_id: &str, iteration: u32, exit_code: i32, errors: usize) {
    info!(
        event = "pipeline.iteration",
        session_id = %session_id,
        iteration = iteration,
        exit_code = exit_code,
        errors = errors,
    );
}

/// Emit event: a fix attempt concluded.
pub fn emit_fix_outcome(session_id: &str, iteration: u32, status: &str, file: Option<&str>) {
    info!(
        event = "pipeline.fix",
        session_id = %session_id,
        iteration = iteration,
        status = %status,
        file = file.unwrap_or("-"),
    );
}

/// Emit event: pipeline finished with a verdict.
pub fn emit_pipeline_finished(session_id: &str, duration_ms: u64, iterations: u32, passed: bool) {
    info!(
        event = "pipeline.finished",
        session_id = %session_id,
        duration_ms = duration_ms,
        iterations = iterations,
        passed = passed,
    );
}

/// Emit event: the pipeline aborted with a fatal error (warning level).
pub fn emit_pipeline_error(session_id: &str, class: ErrorClass, error: &dyn std::fmt::Display) {
    warn!(event = "pipeline.error", session_id = %session_id, class = %class, error = %error);
}

/// Emit event: an event could not be delivered to the subscriber (warning level).
pub fn emit_event_dropped(run: &str, kind: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "event.dropped", run = %run, kind = %kind, reason = %reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_span_create() {
        let span = PipelineSpan::new("https://github.com/acme/app", "python");
        span.record_session("abc");
        let _entered = span.span().entered();
    }
}
