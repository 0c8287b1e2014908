//! Typed progress events streamed to the subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{FixOutcome, IterationStatus, PipelineResult};

/// Named pipeline phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Clone,
    Install,
    Test,
    Fix,
}

/// Status of a pipeline phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Passed,
    Failed,
}

/// One event of a run's ordered stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Step {
        step: PipelineStep,
        status: StepStatus,
    },
    Log {
        line: String,
        ts: DateTime<Utc>,
    },
    Iteration {
        iteration: u32,
        total: u32,
        status: IterationStatus,
    },
    Fix {
        fix: FixOutcome,
    },
    Complete {
        result: Box<PipelineResult>,
    },
    Error {
        message: String,
    },
}

impl PipelineEvent {
    pub fn step(step: PipelineStep, status: StepStatus) -> Self {
        PipelineEvent::Step { step, status }
    }

    pub fn log(line: impl Into<String>) -> Self {
        PipelineEvent::Log {
            line: line.into(),
            ts: Utc::now(),
        }
    }

    /// Wire name of the variant (`"step"`, `"log"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Step { .. } => "step",
            PipelineEvent::Log { .. } => "log",
            PipelineEvent::Iteration { .. } => "iteration",
            PipelineEvent::Fix { .. } => "fix",
            PipelineEvent::Complete { .. } => "complete",
            PipelineEvent::Error { .. } => "error",
        }
    }

    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::Complete { .. } | PipelineEvent::Error { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_wire_shape() {
        let json = serde_json::to_value(PipelineEvent::step(
            PipelineStep::Install,
            StepStatus::Failed,
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "step", "step": "install", "status": "failed"})
        );
    }

    #[test]
    fn test_iteration_wire_shape() {
        let json = serde_json::to_value(PipelineEvent::Iteration {
            iteration: 1,
            total: 2,
            status: IterationStatus::Failed,
        })
        .unwrap();
        assert_eq!(json["type"], "iteration");
        assert_eq!(json["total"], 2);
        assert_eq!(json["status"], "failed");
    }

    #[test]
    fn test_log_carries_timestamp() {
        let json = serde_json::to_value(PipelineEvent::log("collected 3 items")).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["line"], "collected 3 items");
        assert!(json["ts"].is_string());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(PipelineEvent::Error {
            message: "boom".into()
        }
        .is_terminal());
        assert!(!PipelineEvent::log("x").is_terminal());
        assert_eq!(PipelineEvent::log("x").kind(), "log");
    }
}
