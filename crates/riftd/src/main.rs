//! Rift - iterative container test/fix pipeline
//!
//! The `riftd` command clones a repository, installs and tests it inside a
//! pre-provisioned language container, and asks a fix producer for patches
//! until the tests pass or the iteration budget runs out.
//!
//! ## Commands
//!
//! - `run`: execute a pipeline, streaming events as JSON lines on stdout
//! - `resolve`: print the exact install/test command a run would execute

mod config;
mod fix_client;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rift_core::collaborators::FixProducer;
use rift_core::domain::{ErrorClass, Language, PipelineEvent, PipelineRequest, RiftError};
use rift_core::events::{event_channel, EventStream};
use rift_core::git::GitCli;
use rift_core::registry::MemorySessionRegistry;
use rift_pipeline::{CommandResolver, CommandRole, DockerBackend, Pipeline};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, Level};

use crate::config::Settings;
use crate::fix_client::{HttpFixProducer, NoFixProducer};

#[derive(Parser)]
#[command(name = "riftd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Clone, install, test and fix repositories in containers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline and stream its events to stdout
    Run {
        /// Pipeline configuration file (JSON), or "-" for stdin
        #[arg(short, long, default_value = "-")]
        config: PathBuf,
    },

    /// Print the command a run would execute for a phase
    Resolve {
        /// Project language (python, nodejs)
        #[arg(short, long)]
        language: String,

        /// Pipeline phase
        #[arg(short, long, value_enum, default_value = "test")]
        role: Role,

        /// User-supplied command to normalize
        #[arg(short, long)]
        command: Option<String>,

        /// Checkout to read package.json from
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Install,
    Test,
}

impl From<Role> for CommandRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Install => CommandRole::Install,
            Role::Test => CommandRole::Test,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rift_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run { config } => cmd_run(&cli.settings, &config).await,
        Commands::Resolve {
            language,
            role,
            command,
            dir,
        } => cmd_resolve(&language, role.into(), command.as_deref(), &dir),
    }
}

async fn read_request(path: &Path) -> Result<PipelineRequest> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("Failed to read pipeline configuration from stdin")?;
        raw
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Invalid pipeline configuration")
}

fn build_pipeline(settings: &Settings) -> Result<Pipeline> {
    let backend = DockerBackend::new(settings.container_cli()?, settings.container_pool());
    let fix_producer: Arc<dyn FixProducer> = match settings.fix_endpoint() {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "using HTTP fix producer");
            Arc::new(HttpFixProducer::new(endpoint))
        }
        None => {
            info!("no fix endpoint configured; fixes will be skipped");
            Arc::new(NoFixProducer)
        }
    };

    Ok(Pipeline::new(
        Arc::new(MemorySessionRegistry::new()),
        Arc::new(backend),
        Arc::new(GitCli::new()),
        fix_producer,
        settings.layout(),
    ))
}

/// Write each event as one JSON line until the terminal event or stream end.
async fn forward_events<W: AsyncWrite + Unpin>(mut stream: EventStream, mut out: W) -> Result<()> {
    while let Some(event) = stream.recv().await {
        let terminal = event.is_terminal();
        write_event(&mut out, &event).await?;
        if terminal {
            break;
        }
    }
    Ok(())
}

async fn write_event<W: AsyncWrite + Unpin>(out: &mut W, event: &PipelineEvent) -> Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}

async fn cmd_run(settings: &Settings, config: &Path) -> Result<ExitCode> {
    let request = read_request(config).await?;
    let pipeline = build_pipeline(settings)?;

    let (sink, stream) = event_channel(settings.event_buffer);
    let writer = tokio::spawn(forward_events(stream, tokio::io::stdout()));

    let outcome = pipeline.run(request, Arc::new(sink)).await;
    writer.await.context("Event writer task failed")??;

    match outcome {
        Ok(result) if result.passed => Ok(ExitCode::SUCCESS),
        Ok(result) => {
            info!(
                session_id = %result.session_id,
                iterations = result.iterations_used,
                "pipeline finished with failing tests"
            );
            Ok(ExitCode::FAILURE)
        }
        Err(err) => match rejected_request_code(&err) {
            Some(code) => {
                error!(class = %err.class(), error = %err, "pipeline request rejected");
                Ok(ExitCode::from(code))
            }
            None => Err(err).context("Pipeline aborted"),
        },
    }
}

/// Exit code for a run refused before any work, `None` for other aborts.
fn rejected_request_code(err: &RiftError) -> Option<u8> {
    (err.class() == ErrorClass::Configuration).then_some(2)
}

fn cmd_resolve(
    language: &str,
    role: CommandRole,
    command: Option<&str>,
    dir: &Path,
) -> Result<ExitCode> {
    let language = Language::parse(language)?;
    let resolved = CommandResolver::new().resolve(language, role, command, dir);
    println!("{resolved}");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rift_core::domain::{PipelineStep, StepStatus};

    #[test]
    fn cli_parses_run_with_settings() {
        let cli = Cli::try_parse_from([
            "riftd",
            "--json",
            "run",
            "--config",
            "pipeline.json",
            "--event-buffer",
            "8",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.settings.event_buffer, 8);
        assert!(matches!(cli.command, Commands::Run { config } if config == PathBuf::from("pipeline.json")));
    }

    #[test]
    fn configuration_errors_exit_with_usage_code() {
        let unsupported = Language::parse("ruby").unwrap_err();
        assert_eq!(rejected_request_code(&unsupported), Some(2));
        assert_eq!(
            rejected_request_code(&RiftError::InvalidConfig("max_iterations".into())),
            Some(2)
        );
        assert_eq!(
            rejected_request_code(&RiftError::ContainerNotFound("rift-python".into())),
            None
        );
    }

    #[tokio::test]
    async fn read_request_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"repo_url":"https://github.com/acme/calc","language":"nodejs","max_iterations":2}"#,
        )
        .unwrap();

        let request = read_request(&path).await.unwrap();
        assert_eq!(request.language, "nodejs");
        assert_eq!(request.max_iterations, Some(2));
    }

    #[tokio::test]
    async fn events_are_written_as_json_lines() {
        let (sink, stream) = event_channel(8);
        let mut publisher = rift_core::RunPublisher::new(Arc::new(sink), "test");
        publisher.emit(PipelineEvent::step(PipelineStep::Install, StepStatus::Running));
        publisher.fail("boom");

        let mut out = Vec::new();
        forward_events(stream, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"type":"step","step":"install","status":"running"}"#
        );
        assert_eq!(lines[1], r#"{"type":"error","message":"boom"}"#);
    }
}
