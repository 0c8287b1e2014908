//! `git` CLI adapter implementing [`SourceControl`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::collaborators::{checkout_path, SourceControl};
use crate::domain::{Credential, Result, RiftError};

/// Source control backed by the `git` binary on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    author_name: String,
    author_email: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            author_name: "Rift Agent".to_string(),
            author_email: "rift-agent@users.noreply.github.com".to_string(),
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity used for fix commits.
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    async fn git(&self, dir: Option<&Path>, args: &[&str], secret: Option<&str>) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| RiftError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let verb = args.first().copied().unwrap_or("git");
            return Err(RiftError::Git(redact(
                &format!("git {verb} failed: {}", stderr.trim()),
                secret,
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Embed `token` into an https URL. Other schemes are returned unchanged.
pub fn authenticated_url(url: &str, token: &Credential) -> String {
    match url.strip_prefix("https://") {
        Some(rest) if !rest.split('/').next().unwrap_or("").contains('@') => {
            format!("https://x-access-token:{}@{rest}", token.expose())
        }
        _ => url.to_string(),
    }
}

fn redact(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => text.replace(secret, "***"),
        _ => text.to_string(),
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        target: &Path,
        token: Option<&Credential>,
    ) -> Result<PathBuf> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let remote = match token {
            Some(token) => authenticated_url(url, token),
            None => url.to_string(),
        };
        let target_str = target.to_string_lossy();
        info!(repo_url = %url, branch = %branch, target = %target_str, "cloning repository");

        self.git(
            None,
            &["clone", "--branch", branch, remote.as_str(), target_str.as_ref()],
            token.map(Credential::expose),
        )
        .await?;
        Ok(target.to_path_buf())
    }

    async fn create_branch(&self, repo: &Path, name: &str) -> Result<()> {
        let reference = format!("refs/heads/{name}");
        let exists = self
            .git(Some(repo), &["rev-parse", "--verify", "--quiet", reference.as_str()], None)
            .await
            .is_ok();

        if exists {
            self.git(Some(repo), &["checkout", name], None).await?;
        } else {
            self.git(Some(repo), &["checkout", "-b", name], None).await?;
        }
        debug!(branch = %name, existed = exists, "fix branch checked out");
        Ok(())
    }

    async fn write_file(&self, repo: &Path, rel_path: &str, content: &str) -> Result<()> {
        let path = checkout_path(repo, rel_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    async fn commit_and_push(
        &self,
        repo: &Path,
        rel_path: &str,
        message: &str,
        branch: &str,
    ) -> Result<String> {
        checkout_path(repo, rel_path)?;
        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);

        self.git(Some(repo), &["add", "--", rel_path], None).await?;
        self.git(
            Some(repo),
            &["-c", name.as_str(), "-c", email.as_str(), "commit", "-m", message],
            None,
        )
        .await?;
        let hash = self.git(Some(repo), &["rev-parse", "HEAD"], None).await?;
        self.git(Some(repo), &["push", "-u", "origin", branch], None)
            .await?;

        info!(branch = %branch, commit = %hash, file = %rel_path, "fix pushed");
        Ok(hash)
    }
}
