//! Seams to the outside world used by the orchestrator.
//!
//! `SourceControl` owns checkouts and branches, `FixProducer` proposes code
//! changes. Both are injected as trait objects so runs can be driven by real
//! adapters in `riftd` or by the fakes in [`crate::fakes`].

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Credential, Language, Result, RiftError, SessionId, TestError};

/// Repository operations needed by a run.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clone `url` at `branch` into `target`, returning the checkout path.
    async fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        target: &Path,
        token: Option<&Credential>,
    ) -> Result<PathBuf>;

    /// Create `name` from the current HEAD, or check it out if it already exists.
    async fn create_branch(&self, repo: &Path, name: &str) -> Result<()>;

    /// Overwrite `rel_path` inside the checkout with `content`.
    async fn write_file(&self, repo: &Path, rel_path: &str, content: &str) -> Result<()>;

    /// Commit `rel_path` with `message` and push `branch`. Returns the commit hash.
    async fn commit_and_push(
        &self,
        repo: &Path,
        rel_path: &str,
        message: &str,
        branch: &str,
    ) -> Result<String>;
}

/// Everything a fix producer gets to look at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixRequest {
    pub session_id: SessionId,
    pub language: Language,
    pub repo_path: PathBuf,
    pub iteration: u32,
    pub errors: Vec<TestError>,
}

/// A single-file change proposed by a fix producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedFix {
    pub file_path: String,
    pub fix_content: String,
    pub commit_message: String,
}

/// Source of code fixes. `Ok(None)` means "nothing to propose this round".
#[async_trait]
pub trait FixProducer: Send + Sync {
    async fn propose(&self, request: &FixRequest) -> Result<Option<ProposedFix>>;
}

/// Resolve `rel_path` under `repo`, rejecting absolute paths and `..` segments.
pub fn checkout_path(repo: &Path, rel_path: &str) -> Result<PathBuf> {
    let rel = Path::new(rel_path);
    if rel_path.trim().is_empty() {
        return Err(RiftError::FixApplication("empty file path".into()));
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(RiftError::FixApplication(format!(
                    "file path '{rel_path}' escapes the checkout"
                )))
            }
        }
    }
    Ok(repo.join(rel))
}
