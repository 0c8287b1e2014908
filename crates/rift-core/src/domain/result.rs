//! Iteration records and the final pipeline result.

use serde::{Deserialize, Serialize};

use super::session::SessionId;
use super::test_error::{ErrorCategory, TestError};

/// Outcome of one test attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Passed,
    Failed,
}

/// Outcome of one fix attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    /// Patch written, committed and pushed.
    Applied,
    /// The fix producer had nothing to propose.
    Skipped,
    /// Writing, committing or pushing the patch failed.
    Failed,
}

/// Fix attempt details, emitted in `fix` events and kept on the iteration record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixOutcome {
    pub iteration: u32,
    pub status: FixStatus,
    /// Dominant category of the errors the fix was asked to address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_type: Option<ErrorCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixOutcome {
    pub fn skipped(iteration: u32) -> Self {
        Self {
            iteration,
            status: FixStatus::Skipped,
            bug_type: None,
            file_path: None,
            commit_message: None,
            commit_hash: None,
            branch: None,
            error: None,
        }
    }
}

/// Test totals from a runner's summary line.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCounts {
    pub passed: u32,
    pub failed: u32,
}

/// One test attempt within the retry loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationRecord {
    pub iteration: u32,
    pub status: IterationStatus,
    pub exit_code: i32,
    /// Zero when the output carried no recognizable summary.
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
    pub errors: Vec<TestError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixOutcome>,
}

/// Final verdict of a completed run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failed,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub session_id: SessionId,
    pub status: Verdict,
    pub passed: bool,
    pub iterations_used: u32,
    pub max_iterations: u32,
    pub iterations: Vec<IterationRecord>,
    /// Structured errors of the last iteration (empty on success).
    pub errors: Vec<TestError>,
    pub fixes: Vec<FixOutcome>,
    pub branch_name: String,
    /// Why the run failed (install exit code, iterations exhausted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Number of fixes that were committed and pushed.
    pub fn applied_fix_count(&self) -> usize {
        self.fixes
            .iter()
            .filter(|f| f.status == FixStatus::Applied)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_fix_omits_empty_fields() {
        let json = serde_json::to_value(FixOutcome::skipped(2)).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["iteration"], 2);
        assert!(json.get("commit_hash").is_none());
        assert!(json.get("bug_type").is_none());
    }

    #[test]
    fn test_fix_bug_type_wire_name() {
        let fix = FixOutcome {
            bug_type: Some(ErrorCategory::TypeError),
            ..FixOutcome::skipped(1)
        };
        assert_eq!(serde_json::to_value(fix).unwrap()["bug_type"], "TYPE_ERROR");
    }

    #[test]
    fn test_applied_fix_count() {
        let applied = FixOutcome {
            status: FixStatus::Applied,
            commit_hash: Some("abc".into()),
            ..FixOutcome::skipped(1)
        };
        let result = PipelineResult {
            session_id: SessionId::generate(),
            status: Verdict::Failed,
            passed: false,
            iterations_used: 3,
            max_iterations: 3,
            iterations: Vec::new(),
            errors: Vec::new(),
            fixes: vec![applied, FixOutcome::skipped(2)],
            branch_name: "rift/fix".into(),
            reason: None,
            duration_ms: 10,
        };
        assert_eq!(result.applied_fix_count(), 1);
        assert_eq!(serde_json::to_value(&result).unwrap()["status"], "failed");
    }
}
