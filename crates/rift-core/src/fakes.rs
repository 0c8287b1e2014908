//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `RecordingSink`, `FakeSourceControl`, and `ScriptedFixProducer`
//! that satisfy the trait contracts without git, containers, or a network.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborators::{checkout_path, FixProducer, FixRequest, ProposedFix, SourceControl};
use crate::domain::{Credential, PipelineEvent, Result, RiftError};
use crate::events::{DeliveryError, EventSink};

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Event sink that keeps every event it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(PipelineEvent::kind).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: PipelineEvent) -> std::result::Result<(), DeliveryError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeSourceControl
// ---------------------------------------------------------------------------

/// One recorded source-control call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmCall {
    Clone {
        url: String,
        branch: String,
        target: PathBuf,
        authenticated: bool,
    },
    CreateBranch {
        name: String,
    },
    WriteFile {
        rel_path: String,
        content: String,
    },
    CommitAndPush {
        rel_path: String,
        message: String,
        branch: String,
    },
}

/// Source control that records calls and materializes checkouts as plain
/// directories seeded with configured files.
#[derive(Debug)]
pub struct FakeSourceControl {
    calls: Mutex<Vec<ScmCall>>,
    seed_files: Vec<(String, String)>,
    commit_hash: String,
    fail_clone: bool,
    fail_push: bool,
}

impl Default for FakeSourceControl {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            seed_files: Vec::new(),
            commit_hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
            fail_clone: false,
            fail_push: false,
        }
    }
}

impl FakeSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// File written into every cloned checkout.
    pub fn with_file(mut self, rel_path: impl Into<String>, content: impl Into<String>) -> Self {
        self.seed_files.push((rel_path.into(), content.into()));
        self
    }

    pub fn with_commit_hash(mut self, hash: impl Into<String>) -> Self {
        self.commit_hash = hash.into();
        self
    }

    pub fn failing_clone(mut self) -> Self {
        self.fail_clone = true;
        self
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn calls(&self) -> Vec<ScmCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ScmCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        target: &Path,
        token: Option<&Credential>,
    ) -> Result<PathBuf> {
        self.record(ScmCall::Clone {
            url: url.to_string(),
            branch: branch.to_string(),
            target: target.to_path_buf(),
            authenticated: token.is_some(),
        });
        if self.fail_clone {
            return Err(RiftError::Git(format!("clone of {url} refused")));
        }

        tokio::fs::create_dir_all(target).await?;
        for (rel_path, content) in &self.seed_files {
            let path = checkout_path(target, rel_path)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, content).await?;
        }
        Ok(target.to_path_buf())
    }

    async fn create_branch(&self, _repo: &Path, name: &str) -> Result<()> {
        self.record(ScmCall::CreateBranch {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn write_file(&self, repo: &Path, rel_path: &str, content: &str) -> Result<()> {
        checkout_path(repo, rel_path)?;
        self.record(ScmCall::WriteFile {
            rel_path: rel_path.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn commit_and_push(
        &self,
        _repo: &Path,
        rel_path: &str,
        message: &str,
        branch: &str,
    ) -> Result<String> {
        self.record(ScmCall::CommitAndPush {
            rel_path: rel_path.to_string(),
            message: message.to_string(),
            branch: branch.to_string(),
        });
        if self.fail_push {
            return Err(RiftError::Git(format!("push of {branch} rejected")));
        }
        Ok(self.commit_hash.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedFixProducer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Fix(ProposedFix),
    Nothing,
    Fail(String),
}

/// Fix producer that replays a script; an exhausted script proposes nothing.
#[derive(Debug, Default)]
pub struct ScriptedFixProducer {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<FixRequest>>,
}

impl ScriptedFixProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_fix(self, fix: ProposedFix) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Fix(fix));
        self
    }

    pub fn then_nothing(self) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Nothing);
        self
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.into()));
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<FixRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FixProducer for ScriptedFixProducer {
    async fn propose(&self, request: &FixRequest) -> Result<Option<ProposedFix>> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Fix(fix)) => Ok(Some(fix)),
            Some(Scripted::Nothing) | None => Ok(None),
            Some(Scripted::Fail(message)) => Err(RiftError::FixProducer(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Language, SessionId};

    fn request() -> FixRequest {
        FixRequest {
            session_id: SessionId::generate(),
            language: Language::Python,
            repo_path: PathBuf::from("/tmp/s"),
            iteration: 1,
            errors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn scripted_producer_replays_then_runs_dry() {
        let fix = ProposedFix {
            file_path: "a.py".into(),
            fix_content: "x = 1\n".into(),
            commit_message: "fix a".into(),
        };
        let producer = ScriptedFixProducer::new().then_nothing().then_fix(fix.clone());

        assert_eq!(producer.propose(&request()).await.unwrap(), None);
        assert_eq!(producer.propose(&request()).await.unwrap(), Some(fix));
        assert_eq!(producer.propose(&request()).await.unwrap(), None);
        assert_eq!(producer.requests().len(), 3);
    }

    #[tokio::test]
    async fn fake_clone_seeds_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("s1");
        let scm = FakeSourceControl::new().with_file("package.json", "{}");
        scm.clone_repo("https://example.com/r.git", "main", &target, None)
            .await
            .unwrap();
        assert!(target.join("package.json").exists());
        assert_eq!(scm.calls().len(), 1);
    }
}
