//! Container command execution.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use rift_core::domain::{Language, Result, RiftError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::stream::{LineSplitter, StreamingExecution};

/// Outcome of one command. A non-zero exit is data, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Combined output.
    pub output: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands inside a language's container.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Run `command` in `workdir` (a container path) and wait for it.
    async fn run(&self, language: Language, command: &str, workdir: &str) -> Result<ExecutionResult>;

    /// Run `command`, yielding output lines as they are produced.
    async fn run_streaming(
        &self,
        language: Language,
        command: &str,
        workdir: &str,
    ) -> Result<StreamingExecution>;
}

/// Language to pre-provisioned container name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerPool {
    containers: HashMap<Language, String>,
}

impl ContainerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, language: Language, container: impl Into<String>) -> Self {
        self.containers.insert(language, container.into());
        self
    }

    /// Container serving `language`.
    pub fn container_for(&self, language: Language) -> Result<&str> {
        self.containers
            .get(&language)
            .map(String::as_str)
            .ok_or_else(|| RiftError::UnsupportedLanguage {
                language: language.to_string(),
                supported: self.supported(),
            })
    }

    fn supported(&self) -> String {
        Language::ALL
            .iter()
            .filter(|l| self.containers.contains_key(l))
            .map(Language::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Container CLI invocation, e.g. `docker`, `sudo docker` or `podman`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCli {
    program: String,
    args: Vec<String>,
}

impl Default for ContainerCli {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            args: Vec::new(),
        }
    }
}

impl ContainerCli {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated invocation.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| RiftError::InvalidConfig("container CLI must not be empty".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Backend that execs into long-running containers through the container CLI.
///
/// Containers are never created or removed here.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    cli: ContainerCli,
    pool: ContainerPool,
    line_buffer: usize,
}

impl DockerBackend {
    pub fn new(cli: ContainerCli, pool: ContainerPool) -> Self {
        Self {
            cli,
            pool,
            line_buffer: 256,
        }
    }

    /// Capacity of the streaming line channel.
    pub fn with_line_buffer(mut self, capacity: usize) -> Self {
        self.line_buffer = capacity.max(1);
        self
    }

    /// Confirm the container exists and is running.
    async fn ensure_running(&self, container: &str) -> Result<()> {
        let output = self
            .cli
            .command()
            .args(["inspect", "-f", "{{.State.Running}}", container])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RiftError::Container(format!("failed to run container CLI: {e}")))?;

        let running = output.status.success()
            && String::from_utf8_lossy(&output.stdout).trim() == "true";
        if !running {
            warn!(container = %container, "container is not running");
            return Err(RiftError::ContainerNotFound(container.to_string()));
        }
        Ok(())
    }

    async fn prepare(&self, language: Language, command: &str, workdir: &str) -> Result<Command> {
        let container = self.pool.container_for(language)?;
        self.ensure_running(container).await?;

        // One merged stream keeps stderr lines in order with stdout.
        let script = format!("{{ cd {} && {command}\n}} 2>&1", shell_quote(workdir));
        debug!(container = %container, workdir = %workdir, command = %command, "container exec");

        let mut cmd = self.cli.command();
        cmd.args(["exec", container, "bash", "-c", script.as_str()])
            .stdin(Stdio::null());
        Ok(cmd)
    }
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    async fn run(&self, language: Language, command: &str, workdir: &str) -> Result<ExecutionResult> {
        let start = Instant::now();
        let output = self
            .prepare(language, command, workdir)
            .await?
            .output()
            .await
            .map_err(|e| RiftError::Container(format!("exec failed: {e}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let result = ExecutionResult {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(language = %language, exit_code = result.exit_code, duration_ms = result.duration_ms, "command finished");
        Ok(result)
    }

    async fn run_streaming(
        &self,
        language: Language,
        command: &str,
        workdir: &str,
    ) -> Result<StreamingExecution> {
        let start = Instant::now();
        let mut child = self
            .prepare(language, command, workdir)
            .await?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RiftError::Container(format!("exec failed: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RiftError::Container("exec stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RiftError::Container("exec stderr not captured".into()))?;

        let (line_tx, line_rx) = mpsc::channel(self.line_buffer);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            // Only the container CLI's own diagnostics arrive on stderr.
            let stderr_task = tokio::spawn(read_all(stderr));

            let mut output = String::new();
            let mut pump = LinePump {
                tx: line_tx,
                output: &mut output,
            };
            let read = pump.drain(stdout).await;

            let stderr_bytes = stderr_task.await.unwrap_or_default();
            if !stderr_bytes.is_empty() {
                let mut splitter = LineSplitter::new();
                let mut lines = splitter.push(&stderr_bytes);
                lines.extend(splitter.finish());
                for line in lines {
                    pump.send(line).await;
                }
            }
            drop(pump);

            let result = match (read, child.wait().await) {
                (Err(e), _) | (_, Err(e)) => Err(RiftError::Container(format!("exec failed: {e}"))),
                (Ok(()), Ok(status)) => {
                    let result = ExecutionResult {
                        exit_code: status.code().unwrap_or(-1),
                        output,
                        duration_ms: start.elapsed().as_millis() as u64,
                    };
                    info!(language = %language, exit_code = result.exit_code, duration_ms = result.duration_ms, "command finished");
                    Ok(result)
                }
            };
            let _ = done_tx.send(result);
        });

        Ok(StreamingExecution::new(line_rx, done_rx))
    }
}

/// Forwards lines to the subscriber while keeping the full transcript.
struct LinePump<'a> {
    tx: mpsc::Sender<String>,
    output: &'a mut String,
}

impl LinePump<'_> {
    async fn send(&mut self, line: String) {
        if !self.output.is_empty() {
            self.output.push('\n');
        }
        self.output.push_str(&line);
        // A departed reader must not stop the command from draining.
        let _ = self.tx.send(line).await;
    }

    async fn drain<R: AsyncRead + Unpin>(&mut self, mut reader: R) -> std::io::Result<()> {
        let mut splitter = LineSplitter::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            for line in splitter.push(&chunk[..n]) {
                self.send(line).await;
            }
        }
        if let Some(line) = splitter.finish() {
            self.send(line).await;
        }
        Ok(())
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    buf
}
