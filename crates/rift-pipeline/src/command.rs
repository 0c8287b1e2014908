//! Install/test command resolution.

use std::path::Path;

use rift_core::domain::Language;
use serde::{Deserialize, Serialize};

use crate::normalize::normalize;

/// Which phase a command belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandRole {
    Install,
    Test,
}

impl CommandRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandRole::Install => "install",
            CommandRole::Test => "test",
        }
    }
}

/// Built-in command for a language and role.
pub fn default_command(language: Language, role: CommandRole) -> &'static str {
    match (language, role) {
        (Language::Python, CommandRole::Install) => {
            "pip install -r requirements.txt 2>&1 && pip install pytest 2>&1"
        }
        (Language::Python, CommandRole::Test) => "python -m pytest -v --tb=short 2>&1",
        (Language::Nodejs, CommandRole::Install) => "npm install 2>&1",
        (Language::Nodejs, CommandRole::Test) => "npm test 2>&1",
    }
}

/// Produces the exact shell command for each phase of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandResolver;

impl CommandResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the command for `role`.
    ///
    /// Without a user command the language default is returned and the
    /// checkout is never inspected. A user command is normalized, reading
    /// `package.json` from `manifest_dir` when it has to.
    pub fn resolve(
        &self,
        language: Language,
        role: CommandRole,
        user_command: Option<&str>,
        manifest_dir: &Path,
    ) -> String {
        match user_command.map(str::trim).filter(|c| !c.is_empty()) {
            Some(command) => normalize(command, role, manifest_dir),
            None => default_command(language, role).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_need_no_manifest() {
        let nowhere = PathBuf::from("/nonexistent/checkout");
        let resolver = CommandResolver::new();
        for language in Language::ALL {
            for role in [CommandRole::Install, CommandRole::Test] {
                assert_eq!(
                    resolver.resolve(language, role, None, &nowhere),
                    default_command(language, role)
                );
            }
        }
        assert_eq!(
            resolver.resolve(Language::Python, CommandRole::Test, None, &nowhere),
            "python -m pytest -v --tb=short 2>&1"
        );
    }

    #[test]
    fn test_blank_user_command_uses_default() {
        let resolver = CommandResolver::new();
        assert_eq!(
            resolver.resolve(Language::Nodejs, CommandRole::Install, Some("   "), Path::new("/x")),
            "npm install 2>&1"
        );
    }

    #[test]
    fn test_user_command_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CommandResolver::new();
        assert_eq!(
            resolver.resolve(Language::Nodejs, CommandRole::Test, Some("npx vitest"), dir.path()),
            "npx vitest --run 2>&1"
        );
        assert_eq!(
            resolver.resolve(Language::Python, CommandRole::Install, Some("pip install ."), dir.path()),
            "pip install . 2>&1"
        );
    }
}
