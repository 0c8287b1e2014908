//! Rewrites user-supplied commands so they behave inside a non-interactive
//! container: no watch mode, no path arguments that defeat test discovery,
//! and stderr folded into stdout.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::command::CommandRole;

const REDIRECT: &str = "2>&1";
const VITEST_DELEGATE: &str = "npx vitest --run 2>&1";
const PYTEST_DIR_TOKENS: [&str; 4] = ["test", "tests", "test/", "tests/"];

fn npm_test_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^npm\s+(?:run\s+)?test(?:\s|$)").expect("valid regex"))
}

fn redirect_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)2>&1$").expect("valid regex"))
}

/// Normalize `command` for `role`. `manifest_dir` is the host-side checkout
/// used to inspect `package.json`. Applying this twice yields the same string.
pub fn normalize(command: &str, role: CommandRole, manifest_dir: &Path) -> String {
    let mut command = command.trim().to_string();

    if role == CommandRole::Test {
        if npm_test_prefix().is_match(&command) && manifest_uses_vitest(manifest_dir) {
            debug!(from = %command, "npm test delegates to vitest; running vitest directly");
            return VITEST_DELEGATE.to_string();
        }
        command = insert_vitest_run(&command);
        command = strip_pytest_dirs(&command);
    }

    ensure_redirect(&command)
}

fn is_program(token: &str, name: &str) -> bool {
    token == name || token.rsplit('/').next() == Some(name)
}

/// Insert `--run` after the first `vitest` token unless already in run mode.
pub fn insert_vitest_run(command: &str) -> String {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| is_program(t, "vitest")) else {
        return command.to_string();
    };
    if tokens.contains(&"--run") || tokens.get(pos + 1) == Some(&"run") {
        return command.to_string();
    }

    let mut out: Vec<&str> = Vec::with_capacity(tokens.len() + 1);
    out.extend_from_slice(&tokens[..=pos]);
    out.push("--run");
    out.extend_from_slice(&tokens[pos + 1..]);
    out.join(" ")
}

/// Drop bare test-directory arguments following a `pytest` token.
pub fn strip_pytest_dirs(command: &str) -> String {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| is_program(t, "pytest")) else {
        return command.to_string();
    };
    if !tokens[pos + 1..]
        .iter()
        .any(|t| PYTEST_DIR_TOKENS.contains(t))
    {
        return command.to_string();
    }

    let kept: Vec<&str> = tokens[..=pos]
        .iter()
        .copied()
        .chain(
            tokens[pos + 1..]
                .iter()
                .copied()
                .filter(|t| !PYTEST_DIR_TOKENS.contains(t)),
        )
        .collect();
    kept.join(" ")
}

/// Append `2>&1` unless the command already ends with it.
pub fn ensure_redirect(command: &str) -> String {
    let trimmed = command.trim_end();
    if redirect_suffix().is_match(trimmed) {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        REDIRECT.to_string()
    } else {
        format!("{trimmed} {REDIRECT}")
    }
}

/// Whether the checkout's `package.json` runs or depends on vitest.
///
/// Any read or parse failure counts as "no", leaving the command untouched.
pub fn manifest_uses_vitest(manifest_dir: &Path) -> bool {
    let path = manifest_dir.join("package.json");
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "package.json unreadable; command unchanged");
            return false;
        }
    };
    let manifest: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "package.json unparseable; command unchanged");
            return false;
        }
    };

    let script_mentions = manifest
        .pointer("/scripts/test")
        .and_then(|v| v.as_str())
        .is_some_and(|script| script.contains("vitest"));
    let declared = ["dependencies", "devDependencies"]
        .iter()
        .any(|section| manifest.get(section).and_then(|d| d.get("vitest")).is_some());

    script_mentions || declared
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_manifest() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn with_manifest(json: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), json).unwrap();
        dir
    }

    #[test]
    fn test_vitest_gets_run_once() {
        let dir = no_manifest();
        let once = normalize("npx vitest src/", CommandRole::Test, dir.path());
        assert_eq!(once, "npx vitest --run src/ 2>&1");
        assert_eq!(normalize(&once, CommandRole::Test, dir.path()), once);
    }

    #[test]
    fn test_vitest_run_subcommand_untouched() {
        let dir = no_manifest();
        assert_eq!(
            normalize("npx vitest run", CommandRole::Test, dir.path()),
            "npx vitest run 2>&1"
        );
        assert_eq!(
            normalize("./node_modules/.bin/vitest --run --reporter dot", CommandRole::Test, dir.path()),
            "./node_modules/.bin/vitest --run --reporter dot 2>&1"
        );
    }

    #[test]
    fn test_npm_test_delegates_to_vitest() {
        let dir = with_manifest(r#"{"scripts":{"test":"vitest"}}"#);
        assert_eq!(
            normalize("npm test", CommandRole::Test, dir.path()),
            "npx vitest --run 2>&1"
        );
        assert_eq!(
            normalize("npm run test -- --coverage", CommandRole::Test, dir.path()),
            "npx vitest --run 2>&1"
        );

        let dev_dep = with_manifest(r#"{"scripts":{"test":"node run.js"},"devDependencies":{"vitest":"^1.0.0"}}"#);
        assert_eq!(
            normalize("npm test", CommandRole::Test, dev_dep.path()),
            "npx vitest --run 2>&1"
        );
    }

    #[test]
    fn test_npm_test_without_vitest_keeps_command() {
        let dir = with_manifest(r#"{"scripts":{"test":"jest"}}"#);
        assert_eq!(normalize("npm test", CommandRole::Test, dir.path()), "npm test 2>&1");
    }

    #[test]
    fn test_unreadable_manifest_fails_open() {
        let missing = no_manifest();
        assert_eq!(normalize("npm test", CommandRole::Test, missing.path()), "npm test 2>&1");

        let broken = with_manifest("{ not json");
        assert_eq!(normalize("npm test", CommandRole::Test, broken.path()), "npm test 2>&1");
    }

    #[test]
    fn test_pytest_directory_arguments_stripped() {
        let dir = no_manifest();
        assert_eq!(
            normalize("python -m pytest tests/ -x", CommandRole::Test, dir.path()),
            "python -m pytest -x 2>&1"
        );
        assert_eq!(
            normalize("pytest test", CommandRole::Test, dir.path()),
            "pytest 2>&1"
        );
        assert_eq!(
            normalize("pytest tests/test_calc.py", CommandRole::Test, dir.path()),
            "pytest tests/test_calc.py 2>&1"
        );
    }

    #[test]
    fn test_install_role_only_redirects() {
        let dir = with_manifest(r#"{"scripts":{"test":"vitest"}}"#);
        assert_eq!(
            normalize("npx vitest", CommandRole::Install, dir.path()),
            "npx vitest 2>&1"
        );
        assert_eq!(
            normalize("pip install -e . 2>&1", CommandRole::Install, dir.path()),
            "pip install -e . 2>&1"
        );
    }

    #[test]
    fn test_redirect_detection() {
        assert_eq!(ensure_redirect("make test"), "make test 2>&1");
        assert_eq!(ensure_redirect("make test 2>&1"), "make test 2>&1");
        assert_eq!(ensure_redirect("echo x>2>&1"), "echo x>2>&1 2>&1");
    }
}
