//! Clone → install → test → fix → retest orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rift_core::collaborators::{FixProducer, FixRequest, SourceControl};
use rift_core::diagnostics::{
    parse_test_counts, parse_test_output, primary_category, DiagnosticsConfig,
};
use rift_core::domain::{
    FixOutcome, FixStatus, IterationRecord, IterationStatus, NewSession, PipelineConfig,
    PipelineEvent, PipelineRequest, PipelineResult, PipelineStep, Result, RiftError, SessionId,
    SessionStatus, StepStatus, TestError, Verdict,
};
use rift_core::events::{EventSink, RunPublisher};
use rift_core::obs::{
    emit_fix_outcome, emit_iteration_finished, emit_pipeline_error, emit_pipeline_finished,
    emit_pipeline_started, PipelineSpan,
};
use rift_core::registry::SessionRegistry;
use tracing::{debug, info, warn, Instrument};

use crate::backend::{ContainerBackend, ExecutionResult};
use crate::command::{CommandResolver, CommandRole};
use crate::workspace::WorkspaceLayout;

const AGENT_COMMIT_PREFIX: &str = "[AI-AGENT]";

/// Prefix `message` with the agent marker unless it already carries it.
pub fn agent_commit_message(message: &str) -> String {
    let message = message.trim();
    if message.starts_with(AGENT_COMMIT_PREFIX) {
        message.to_string()
    } else if message.is_empty() {
        format!("{AGENT_COMMIT_PREFIX} Automated fix")
    } else {
        format!("{AGENT_COMMIT_PREFIX} {message}")
    }
}

/// Checkout a run operates on.
struct Checkout {
    session_id: SessionId,
    host_path: PathBuf,
    workdir: String,
}

/// Pipeline orchestrator.
///
/// One `run` call drives one session through install and the bounded
/// test/fix loop. Runs are independent; a `Pipeline` can serve many of them
/// concurrently.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<dyn SessionRegistry>,
    backend: Arc<dyn ContainerBackend>,
    source_control: Arc<dyn SourceControl>,
    fix_producer: Arc<dyn FixProducer>,
    layout: WorkspaceLayout,
    resolver: CommandResolver,
}

impl Pipeline {
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        backend: Arc<dyn ContainerBackend>,
        source_control: Arc<dyn SourceControl>,
        fix_producer: Arc<dyn FixProducer>,
        layout: WorkspaceLayout,
    ) -> Self {
        Self {
            registry,
            backend,
            source_control,
            fix_producer,
            layout,
            resolver: CommandResolver::new(),
        }
    }

    /// Execute a pipeline run, streaming its events to `sink`.
    ///
    /// The stream always ends with exactly one terminal event: `complete`
    /// when the run reaches a verdict (including install failure and
    /// exhausted iterations), `error` when it is aborted. An aborted run
    /// marks its session `error` and returns the error.
    pub async fn run(
        &self,
        request: PipelineRequest,
        sink: Arc<dyn EventSink>,
    ) -> Result<PipelineResult> {
        let span = PipelineSpan::new(&request.repo_url, &request.language);
        let mut publisher = RunPublisher::new(sink, "unassigned");
        let mut session: Option<SessionId> = None;

        let outcome = self
            .execute(request, &mut publisher, &mut session, &span)
            .instrument(span.span())
            .await;

        match outcome {
            Ok(result) => {
                let stats = publisher.complete(result.clone());
                debug!(session_id = %result.session_id, delivered = stats.delivered, dropped = stats.dropped, "run stream closed");
                Ok(result)
            }
            Err(err) => {
                let label = session
                    .as_ref()
                    .map(SessionId::to_string)
                    .unwrap_or_else(|| "-".to_string());
                if let Some(id) = &session {
                    if let Err(mark) = self.registry.set_status(id, SessionStatus::Error).await {
                        warn!(session_id = %id, error = %mark, "could not mark session as errored");
                    }
                }
                emit_pipeline_error(&label, err.class(), &err);
                publisher.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        request: PipelineRequest,
        publisher: &mut RunPublisher,
        session_slot: &mut Option<SessionId>,
        span: &PipelineSpan,
    ) -> Result<PipelineResult> {
        let start = Instant::now();
        let config = request.validate()?;

        let checkout = self.checkout(&config, publisher).await?;
        let id = checkout.session_id.clone();
        *session_slot = Some(id.clone());
        publisher.set_run_label(id.as_str());
        span.record_session(id.as_str());

        self.registry.set_status(&id, SessionStatus::Running).await?;
        emit_pipeline_started(id.as_str(), config.language.as_str(), config.max_iterations);

        let branch = config.fix_branch(&id);

        // Install
        publisher.emit(PipelineEvent::step(PipelineStep::Install, StepStatus::Running));
        let install = self.resolver.resolve(
            config.language,
            CommandRole::Install,
            config.install_command.as_deref(),
            &checkout.host_path,
        );
        let installed = self
            .stream_command(&config, &install, &checkout.workdir, publisher)
            .await?;

        if !installed.passed() {
            publisher.emit(PipelineEvent::step(PipelineStep::Install, StepStatus::Failed));
            self.registry.set_status(&id, SessionStatus::Failed).await?;
            let duration_ms = start.elapsed().as_millis() as u64;
            emit_pipeline_finished(id.as_str(), duration_ms, 0, false);
            return Ok(PipelineResult {
                session_id: id,
                status: Verdict::Failed,
                passed: false,
                iterations_used: 0,
                max_iterations: config.max_iterations,
                iterations: Vec::new(),
                errors: Vec::new(),
                fixes: Vec::new(),
                branch_name: branch,
                reason: Some(format!(
                    "install command exited with code {}",
                    installed.exit_code
                )),
                duration_ms,
            });
        }
        publisher.emit(PipelineEvent::step(PipelineStep::Install, StepStatus::Passed));

        // Test / fix loop
        let total = config.max_iterations;
        let diagnostics = DiagnosticsConfig::with_prefix(checkout.workdir.clone());
        let mut iterations: Vec<IterationRecord> = Vec::new();
        let mut fixes: Vec<FixOutcome> = Vec::new();
        let mut last_errors: Vec<TestError> = Vec::new();
        let mut passed = false;

        for iteration in 1..=total {
            publisher.emit(PipelineEvent::step(PipelineStep::Test, StepStatus::Running));
            let test = self.resolver.resolve(
                config.language,
                CommandRole::Test,
                config.test_command.as_deref(),
                &checkout.host_path,
            );
            let tested = self
                .stream_command(&config, &test, &checkout.workdir, publisher)
                .await?;
            let errors = parse_test_output(&tested.output, &diagnostics);
            let counts = parse_test_counts(&tested.output);
            emit_iteration_finished(id.as_str(), iteration, tested.exit_code, errors.len());

            if tested.passed() {
                self.registry.set_status(&id, SessionStatus::Completed).await?;
                publisher.emit(PipelineEvent::step(PipelineStep::Test, StepStatus::Passed));
                publisher.emit(PipelineEvent::Iteration {
                    iteration,
                    total,
                    status: IterationStatus::Passed,
                });
                iterations.push(IterationRecord {
                    iteration,
                    status: IterationStatus::Passed,
                    exit_code: tested.exit_code,
                    passed: counts.passed,
                    failed: counts.failed,
                    errors: Vec::new(),
                    fix: None,
                });
                last_errors.clear();
                passed = true;
                break;
            }

            publisher.emit(PipelineEvent::step(PipelineStep::Test, StepStatus::Failed));
            publisher.emit(PipelineEvent::Iteration {
                iteration,
                total,
                status: IterationStatus::Failed,
            });
            let mut record = IterationRecord {
                iteration,
                status: IterationStatus::Failed,
                exit_code: tested.exit_code,
                passed: counts.passed,
                failed: counts.failed,
                errors: errors.clone(),
                fix: None,
            };
            last_errors = errors;

            if iteration == total {
                self.registry.set_status(&id, SessionStatus::Failed).await?;
                iterations.push(record);
                break;
            }

            publisher.emit(PipelineEvent::step(PipelineStep::Fix, StepStatus::Running));
            let bug_type = primary_category(&last_errors);
            let fix = match self
                .produce_fix(&config, &checkout, iteration, &last_errors, &branch)
                .await
            {
                Ok(fix) => FixOutcome { bug_type, ..fix },
                Err(err) => {
                    let failed = FixOutcome {
                        error: Some(err.to_string()),
                        status: FixStatus::Failed,
                        bug_type,
                        branch: Some(branch.clone()),
                        ..FixOutcome::skipped(iteration)
                    };
                    emit_fix_outcome(id.as_str(), iteration, "failed", None);
                    publisher.emit(PipelineEvent::Fix { fix: failed });
                    return Err(err);
                }
            };

            let status = match fix.status {
                FixStatus::Applied => "applied",
                FixStatus::Skipped => "skipped",
                FixStatus::Failed => "failed",
            };
            emit_fix_outcome(id.as_str(), iteration, status, fix.file_path.as_deref());
            if fix.status == FixStatus::Applied {
                self.registry.set_status(&id, SessionStatus::Fixed).await?;
            }
            publisher.emit(PipelineEvent::Fix { fix: fix.clone() });
            record.fix = Some(fix.clone());
            fixes.push(fix);
            iterations.push(record);

            self.registry.set_status(&id, SessionStatus::Running).await?;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let iterations_used = iterations.len() as u32;
        emit_pipeline_finished(id.as_str(), duration_ms, iterations_used, passed);

        Ok(PipelineResult {
            session_id: id,
            status: if passed { Verdict::Success } else { Verdict::Failed },
            passed,
            iterations_used,
            max_iterations: total,
            iterations,
            errors: last_errors,
            fixes,
            branch_name: branch,
            reason: (!passed).then(|| format!("tests still failing after {total} iteration(s)")),
            duration_ms,
        })
    }

    /// Load the requested session, or clone a fresh checkout and register it.
    async fn checkout(
        &self,
        config: &PipelineConfig,
        publisher: &mut RunPublisher,
    ) -> Result<Checkout> {
        if let Some(id) = &config.session_id {
            let session = self.registry.get(id).await?;
            if session.language != config.language {
                return Err(RiftError::InvalidConfig(format!(
                    "session {id} is a {} checkout, not {}",
                    session.language, config.language
                )));
            }
            let workdir = self.layout.container_path(&session.repo_path);
            debug!(session_id = %id, repo_path = %session.repo_path.display(), "reusing session checkout");
            return Ok(Checkout {
                session_id: session.session_id,
                host_path: session.repo_path,
                workdir,
            });
        }

        let id = SessionId::generate();
        publisher.emit(PipelineEvent::step(PipelineStep::Clone, StepStatus::Running));
        let target = self.layout.host_path(&id);
        let host_path = match self
            .source_control
            .clone_repo(
                &config.repo_url,
                &config.branch,
                &target,
                config.github_token.as_ref(),
            )
            .await
        {
            Ok(path) => path,
            Err(err) => {
                publisher.emit(PipelineEvent::step(PipelineStep::Clone, StepStatus::Failed));
                return Err(err);
            }
        };

        let session = self
            .registry
            .create(NewSession {
                session_id: Some(id),
                repo_url: config.repo_url.clone(),
                language: config.language,
                repo_path: host_path.clone(),
            })
            .await?;
        publisher.emit(PipelineEvent::step(PipelineStep::Clone, StepStatus::Passed));
        info!(session_id = %session.session_id, repo_path = %host_path.display(), "repository cloned");

        Ok(Checkout {
            workdir: self.layout.container_path(&host_path),
            session_id: session.session_id,
            host_path,
        })
    }

    /// Stream `command` to the subscriber line by line and return its result.
    async fn stream_command(
        &self,
        config: &PipelineConfig,
        command: &str,
        workdir: &str,
        publisher: &mut RunPublisher,
    ) -> Result<ExecutionResult> {
        info!(language = %config.language, command = %command, workdir = %workdir, "running command");
        let mut execution = self
            .backend
            .run_streaming(config.language, command, workdir)
            .await?;
        while let Some(line) = execution.next_line().await {
            publisher.emit(PipelineEvent::log(line));
        }
        execution.finish().await
    }

    /// Ask the fix producer for a patch and apply it to the fix branch.
    async fn produce_fix(
        &self,
        config: &PipelineConfig,
        checkout: &Checkout,
        iteration: u32,
        errors: &[TestError],
        branch: &str,
    ) -> Result<FixOutcome> {
        let request = FixRequest {
            session_id: checkout.session_id.clone(),
            language: config.language,
            repo_path: checkout.host_path.clone(),
            iteration,
            errors: errors.to_vec(),
        };
        let Some(proposal) = self.fix_producer.propose(&request).await? else {
            debug!(session_id = %checkout.session_id, iteration, "no fix proposed");
            return Ok(FixOutcome::skipped(iteration));
        };

        let message = agent_commit_message(&proposal.commit_message);
        let repo: &Path = &checkout.host_path;
        self.source_control.create_branch(repo, branch).await?;
        self.source_control
            .write_file(repo, &proposal.file_path, &proposal.fix_content)
            .await?;
        let hash = self
            .source_control
            .commit_and_push(repo, &proposal.file_path, &message, branch)
            .await?;

        Ok(FixOutcome {
            iteration,
            status: FixStatus::Applied,
            bug_type: None,
            file_path: Some(proposal.file_path),
            commit_message: Some(message),
            commit_hash: Some(hash),
            branch: Some(branch.to_string()),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_commit_message() {
        assert_eq!(agent_commit_message("fix add"), "[AI-AGENT] fix add");
        assert_eq!(
            agent_commit_message("[AI-AGENT] fix add"),
            "[AI-AGENT] fix add"
        );
        assert_eq!(agent_commit_message("  "), "[AI-AGENT] Automated fix");
    }
}
