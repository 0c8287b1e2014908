//! Pipeline configuration: raw wire request and its validated form.

use serde::{Deserialize, Serialize};

use super::error::{Result, RiftError};
use super::language::Language;
use super::session::SessionId;

/// Iterations used when the request does not specify a cap.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Upper bound accepted for `max_iterations`.
pub const MAX_ITERATIONS_CAP: u32 = 10;

/// Access token for private repositories. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

fn default_branch() -> String {
    "main".to_string()
}

/// Pipeline configuration exactly as a client submits it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRequest {
    pub repo_url: String,
    pub language: String,
    #[serde(default)]
    pub install_command: Option<String>,
    #[serde(default)]
    pub test_command: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub github_token: Option<Credential>,
}

impl PipelineRequest {
    /// Minimal request for a repository and language; everything else defaulted.
    pub fn new(repo_url: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            language: language.into(),
            install_command: None,
            test_command: None,
            branch: default_branch(),
            branch_name: None,
            max_iterations: None,
            session_id: None,
            github_token: None,
        }
    }

    /// Validate once at the boundary.
    ///
    /// Language is checked first so an unsupported language is always
    /// reported as such, whatever else is wrong with the request.
    pub fn validate(self) -> Result<PipelineConfig> {
        let language = Language::parse(&self.language)?;

        let repo_url = self.repo_url.trim().to_string();
        if repo_url.is_empty() {
            return Err(RiftError::InvalidConfig("repo_url must not be empty".into()));
        }

        let branch = self.branch.trim().to_string();
        if branch.is_empty() {
            return Err(RiftError::InvalidConfig("branch must not be empty".into()));
        }

        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if !(1..=MAX_ITERATIONS_CAP).contains(&max_iterations) {
            return Err(RiftError::InvalidConfig(format!(
                "max_iterations must be between 1 and {MAX_ITERATIONS_CAP}, got {max_iterations}"
            )));
        }

        let session_id = non_blank(self.session_id)
            .map(|raw| SessionId::parse(&raw))
            .transpose()?;

        let branch_name = non_blank(self.branch_name);
        if let Some(name) = &branch_name {
            validate_branch_name(name)?;
        }

        Ok(PipelineConfig {
            repo_url,
            language,
            install_command: non_blank(self.install_command),
            test_command: non_blank(self.test_command),
            branch,
            branch_name,
            max_iterations,
            session_id,
            github_token: self.github_token.filter(|t| !t.expose().trim().is_empty()),
        })
    }
}

/// Validated, immutable configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub repo_url: String,
    pub language: Language,
    pub install_command: Option<String>,
    pub test_command: Option<String>,
    pub branch: String,
    branch_name: Option<String>,
    pub max_iterations: u32,
    pub session_id: Option<SessionId>,
    pub github_token: Option<Credential>,
}

impl PipelineConfig {
    /// Branch that fixes are committed to.
    pub fn fix_branch(&self, session_id: &SessionId) -> String {
        self.branch_name
            .clone()
            .unwrap_or_else(|| format!("rift/fix-{}", session_id.short()))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_branch_name(name: &str) -> Result<()> {
    let bad = name.starts_with('-')
        || name.contains("..")
        || name.chars().any(|c| c.is_whitespace() || "~^:?*[\\".contains(c));
    if bad {
        return Err(RiftError::InvalidConfig(format!(
            "branch_name '{name}' is not a valid git branch name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let req: PipelineRequest = serde_json::from_str(
            r#"{"repo_url":"https://github.com/acme/app","language":"python"}"#,
        )
        .unwrap();
        assert_eq!(req.branch, "main");

        let config = req.validate().unwrap();
        assert_eq!(config.language, Language::Python);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert!(config.session_id.is_none());

        let id = SessionId::parse("abcdef123456").unwrap();
        assert_eq!(config.fix_branch(&id), "rift/fix-abcdef12");
    }

    #[test]
    fn test_unsupported_language_wins() {
        let mut req = PipelineRequest::new("", "ruby");
        req.max_iterations = Some(0);
        let err = req.validate().unwrap_err();
        assert!(matches!(err, RiftError::UnsupportedLanguage { .. }));
    }

    #[test]
    fn test_iteration_bounds() {
        let mut req = PipelineRequest::new("https://x/y", "nodejs");
        req.max_iterations = Some(0);
        assert!(req.clone().validate().is_err());
        req.max_iterations = Some(MAX_ITERATIONS_CAP + 1);
        assert!(req.clone().validate().is_err());
        req.max_iterations = Some(MAX_ITERATIONS_CAP);
        assert_eq!(req.validate().unwrap().max_iterations, MAX_ITERATIONS_CAP);
    }

    #[test]
    fn test_blank_optionals_are_absent() {
        let mut req = PipelineRequest::new("https://x/y", "python");
        req.test_command = Some("   ".into());
        req.session_id = Some("".into());
        req.branch_name = Some("feature/fix-1".into());
        let config = req.validate().unwrap();
        assert!(config.test_command.is_none());
        assert!(config.session_id.is_none());
        assert_eq!(
            config.fix_branch(&SessionId::generate()),
            "feature/fix-1"
        );
    }

    #[test]
    fn test_rejects_bad_branch_name() {
        let mut req = PipelineRequest::new("https://x/y", "python");
        req.branch_name = Some("bad name".into());
        assert!(req.clone().validate().is_err());
        req.branch_name = Some("--force".into());
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let token = Credential::new("ghp_secret");
        assert_eq!(format!("{token:?}"), "Credential(***)");
        let mut req = PipelineRequest::new("https://x/y", "python");
        req.github_token = Some(token);
        assert!(!format!("{req:?}").contains("ghp_secret"));
    }
}
