//! Scripted container backend (testing only)

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use rift_core::domain::{Language, Result, RiftError};

use crate::backend::{ContainerBackend, ExecutionResult};
use crate::stream::StreamingExecution;

/// One recorded backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub language: Language,
    pub command: String,
    pub workdir: String,
}

#[derive(Debug)]
enum Step {
    Finish(ExecutionResult),
    Missing(String),
}

/// Backend that answers each call with the next scripted result.
///
/// Calls past the end of the script fail with a container error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Step>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next call exits with `exit_code` after printing `output`.
    pub fn then_exit(self, exit_code: i32, output: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Step::Finish(ExecutionResult {
                exit_code,
                output: output.into(),
                duration_ms: 1,
            }));
        self
    }

    pub fn then_ok(self, output: impl Into<String>) -> Self {
        self.then_exit(0, output)
    }

    /// Next call finds the container stopped.
    pub fn then_missing(self, container: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Step::Missing(container.into()));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn next(&self, language: Language, command: &str, workdir: &str) -> Result<ExecutionResult> {
        self.invocations.lock().unwrap().push(Invocation {
            language,
            command: command.to_string(),
            workdir: workdir.to_string(),
        });
        match self.script.lock().unwrap().pop_front() {
            Some(Step::Finish(result)) => Ok(result),
            Some(Step::Missing(container)) => Err(RiftError::ContainerNotFound(container)),
            None => Err(RiftError::Container(format!(
                "no scripted result for `{command}`"
            ))),
        }
    }
}

#[async_trait]
impl ContainerBackend for ScriptedBackend {
    async fn run(&self, language: Language, command: &str, workdir: &str) -> Result<ExecutionResult> {
        self.next(language, command, workdir)
    }

    async fn run_streaming(
        &self,
        language: Language,
        command: &str,
        workdir: &str,
    ) -> Result<StreamingExecution> {
        self.next(language, command, workdir)
            .map(StreamingExecution::completed)
    }
}
