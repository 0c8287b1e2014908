//! Test output parser.
//!
//! Turns raw test-runner output into ordered, categorized [`TestError`]
//! entries for the fix producer. Recognized shapes:
//! - pytest summary lines: `FAILED path::test - msg`, `ERROR path - msg`
//! - pytest locations: `path.py:12: AssertionError`, `path.py:12: in test_x` + `E   ...` detail
//! - flake8/eslint style: `path:line:col: CODE msg`
//! - TypeScript: `path.ts(line,col): error TS2322: msg`
//! - Python tracebacks: `File "path", line N` frames followed by an exception line
//! - vitest/jest suite headers: `FAIL path > test name`
//!
//! Output that matches none of these yields no entries, even when the run
//! failed.
//!
//! [`parse_test_counts`] separately reads the pytest or vitest summary line.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{ErrorCategory, TestCounts, TestError};

/// Configuration for the output parser.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    /// Maximum number of errors to retain.
    pub max_errors: usize,

    /// Path prefixes removed from reported files (e.g. the container workdir).
    pub strip_prefixes: Vec<String>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_errors: 50,
            strip_prefixes: Vec::new(),
        }
    }
}

impl DiagnosticsConfig {
    /// Default limits, stripping `prefix` from reported paths.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            strip_prefixes: vec![prefix.into()],
            ..Self::default()
        }
    }
}

struct Patterns {
    pytest_summary: Regex,
    typescript: Regex,
    lint: Regex,
    location: Regex,
    traceback_frame: Regex,
    exception: Regex,
    suite_fail: Regex,
    pytest_detail: Regex,
    ts_code: Regex,
    lint_code: Regex,
    vitest_totals: Regex,
    pytest_totals: Regex,
    count: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        pytest_summary: Regex::new(r"^(FAILED|ERROR)\s+([^\s:]+)(?:::(\S+))?(?:\s+-\s+(.*))?$")
            .expect("valid regex"),
        typescript: Regex::new(
            r"^(\S+\.(?:ts|tsx|js|jsx|mts|cts))\((\d+),\d+\):\s*error\s+(TS\d+:.*)$",
        )
        .expect("valid regex"),
        lint: Regex::new(r"^(\S+\.(?:py|js|jsx|ts|tsx|mjs|cjs)):(\d+):\d+:\s*(.+)$")
            .expect("valid regex"),
        location: Regex::new(r"^(\S+\.(?:py|js|jsx|ts|tsx|mjs|cjs)):(\d+):\s*(.+)$")
            .expect("valid regex"),
        traceback_frame: Regex::new(r#"^\s*(?:E\s+)?File "([^"]+)", line (\d+)"#)
            .expect("valid regex"),
        exception: Regex::new(r"^(?:E\s+)?([A-Za-z_][\w.]*(?:Error|Exception)):?\s*(.*)$")
            .expect("valid regex"),
        suite_fail: Regex::new(r"^\s*(?:FAIL|×|✗)\s+(\S+\.(?:js|jsx|ts|tsx|mjs|cjs))(?:\s+>\s+(.*))?$")
            .expect("valid regex"),
        pytest_detail: Regex::new(r"^E\s+(.+)$").expect("valid regex"),
        ts_code: Regex::new(r"\bTS\d{4}\b").expect("valid regex"),
        lint_code: Regex::new(r"^[EWFCN]\d{3}\b").expect("valid regex"),
        vitest_totals: Regex::new(r"^\s*Tests\s+\d").expect("valid regex"),
        pytest_totals: Regex::new(r"\d+ (?:passed|failed|errors?)\b.*\bin \d+(?:\.\d+)?s\b")
            .expect("valid regex"),
        count: Regex::new(r"(\d+) (passed|failed|errors?)\b").expect("valid regex"),
    })
}

/// Infer a category from an error message, if any marker is recognized.
pub fn infer_category(message: &str) -> Option<ErrorCategory> {
    let lower = message.to_ascii_lowercase();
    let p = patterns();

    if lower.contains("indentationerror")
        || lower.contains("taberror")
        || lower.contains("unexpected indent")
        || lower.contains("unindent does not match")
        || lower.contains("expected an indented block")
    {
        return Some(ErrorCategory::Indentation);
    }
    if lower.contains("syntaxerror")
        || lower.contains("invalid syntax")
        || lower.contains("unexpected token")
        || lower.contains("parse error")
        || lower.contains("parseerror")
    {
        return Some(ErrorCategory::Syntax);
    }
    if lower.contains("modulenotfounderror")
        || lower.contains("importerror")
        || lower.contains("no module named")
        || lower.contains("cannot find module")
        || lower.contains("failed to resolve import")
    {
        return Some(ErrorCategory::Import);
    }
    if lower.contains("typeerror")
        || lower.contains("incompatible type")
        || lower.contains("mypy")
        || p.ts_code.is_match(message)
    {
        return Some(ErrorCategory::TypeError);
    }
    if p.lint_code.is_match(message.trim_start())
        || lower.contains("eslint")
        || lower.contains("pylint")
        || lower.contains("flake8")
        || lower.contains("lint")
    {
        return Some(ErrorCategory::Linting);
    }
    if lower.contains("assert") || lower.contains("expected") {
        return Some(ErrorCategory::Logic);
    }
    None
}

fn is_third_party(path: &str) -> bool {
    path.contains("site-packages/")
        || path.contains("node_modules/")
        || path.starts_with('<')
        || path.starts_with("/usr/lib/")
}

struct OpenTrace {
    lines: Vec<String>,
    frame: Option<(String, u32)>,
}

struct Parser<'a> {
    config: &'a DiagnosticsConfig,
    errors: Vec<TestError>,
    seen: HashSet<(String, Option<u32>, String)>,
    trace: Option<OpenTrace>,
    /// Index of the last location-derived error, refined by following `E` lines.
    pending_detail: Option<usize>,
}

impl<'a> Parser<'a> {
    fn new(config: &'a DiagnosticsConfig) -> Self {
        Self {
            config,
            errors: Vec::new(),
            seen: HashSet::new(),
            trace: None,
            pending_detail: None,
        }
    }

    fn relativize(&self, path: &str) -> String {
        let mut rel = path;
        for prefix in &self.config.strip_prefixes {
            let prefix = prefix.trim_end_matches('/');
            if !prefix.is_empty() {
                if let Some(rest) = rel.strip_prefix(prefix) {
                    rel = rest.trim_start_matches('/');
                    break;
                }
            }
        }
        rel.trim_start_matches("./").to_string()
    }

    fn push(&mut self, error: TestError) -> Option<usize> {
        let key = (error.file.clone(), error.line, error.message.clone());
        if !self.seen.insert(key) {
            return None;
        }
        self.errors.push(error);
        Some(self.errors.len() - 1)
    }

    fn has_file(&self, file: &str) -> bool {
        self.errors.iter().any(|e| e.file == file)
    }

    fn line(&mut self, raw: &str) {
        let line = raw.trim_end();
        let p = patterns();

        if self.trace_line(line) {
            return;
        }

        if let Some(caps) = p.pytest_detail.captures(line) {
            if let Some(idx) = self.pending_detail {
                let detail = caps[1].trim().to_string();
                let error = &mut self.errors[idx];
                if error.message.starts_with("in ") || error.message.is_empty() {
                    error.message = detail.clone();
                }
                if let Some(category) = infer_category(&detail) {
                    error.category = category;
                }
                match &mut error.full_trace {
                    Some(trace) => {
                        trace.push('\n');
                        trace.push_str(line);
                    }
                    None => error.full_trace = Some(line.to_string()),
                }
                return;
            }
        } else if !line.starts_with(' ') {
            self.pending_detail = None;
        }

        if let Some(caps) = p.pytest_summary.captures(line) {
            let file = self.relativize(&caps[2]);
            if self.has_file(&file) {
                return;
            }
            let message = caps
                .get(4)
                .map(|m| m.as_str().to_string())
                .or_else(|| caps.get(3).map(|m| format!("{} failed", m.as_str())))
                .unwrap_or_else(|| format!("{} {}", &caps[1], file));
            let category = infer_category(&message).unwrap_or(ErrorCategory::Logic);
            self.push(TestError::new(file, category, message));
            return;
        }

        if let Some(caps) = p.typescript.captures(line) {
            let file = self.relativize(&caps[1]);
            let lineno = caps[2].parse().unwrap_or(0);
            let message = caps[3].to_string();
            let category = infer_category(&message).unwrap_or(ErrorCategory::TypeError);
            self.push(TestError::new(file, category, message).with_line(lineno));
            return;
        }

        if let Some(caps) = p.lint.captures(line) {
            if is_third_party(&caps[1]) {
                return;
            }
            let file = self.relativize(&caps[1]);
            let lineno = caps[2].parse().unwrap_or(0);
            let message = caps[3].trim().to_string();
            let category = infer_category(&message).unwrap_or(ErrorCategory::Linting);
            self.push(TestError::new(file, category, message).with_line(lineno));
            return;
        }

        if let Some(caps) = p.location.captures(line) {
            if is_third_party(&caps[1]) {
                return;
            }
            let file = self.relativize(&caps[1]);
            let lineno = caps[2].parse().unwrap_or(0);
            let message = caps[3].trim().to_string();
            let category = infer_category(&message).unwrap_or(ErrorCategory::Logic);
            self.pending_detail = self.push(TestError::new(file, category, message).with_line(lineno));
            return;
        }

        if let Some(caps) = p.suite_fail.captures(line) {
            let file = self.relativize(&caps[1]);
            let message = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| "test suite failed".to_string());
            let category = infer_category(&message).unwrap_or(ErrorCategory::Logic);
            self.push(TestError::new(file, category, message));
        }
    }

    /// Track Python traceback frames. Returns `true` when the line was consumed.
    fn trace_line(&mut self, line: &str) -> bool {
        let p = patterns();

        if line.starts_with("Traceback (most recent call last)") {
            self.trace = Some(OpenTrace {
                lines: vec![line.to_string()],
                frame: None,
            });
            return true;
        }

        if let Some(caps) = p.traceback_frame.captures(line) {
            let path = caps[1].to_string();
            let lineno: u32 = caps[2].parse().unwrap_or(0);
            let trace = self.trace.get_or_insert_with(|| OpenTrace {
                lines: Vec::new(),
                frame: None,
            });
            trace.lines.push(line.to_string());
            if !is_third_party(&path) {
                trace.frame = Some((path, lineno));
            }
            return true;
        }

        let Some(trace) = self.trace.as_mut() else {
            return false;
        };

        let indented = line.starts_with(' ') || line.starts_with('\t');
        if let Some(caps) = p.exception.captures(line).filter(|_| !indented) {
            trace.lines.push(line.to_string());
            let Some(trace) = self.trace.take() else {
                return true;
            };
            let message = if caps[2].is_empty() {
                caps[1].to_string()
            } else {
                format!("{}: {}", &caps[1], &caps[2])
            };
            let category = infer_category(&message).unwrap_or(ErrorCategory::Logic);
            if let Some((path, lineno)) = trace.frame {
                let file = self.relativize(&path);
                let error = TestError::new(file, category, message)
                    .with_line(lineno)
                    .with_trace(trace.lines.join("\n"));
                self.push(error);
            }
            return true;
        }

        if indented || line.starts_with("E ") {
            trace.lines.push(line.to_string());
            return true;
        }

        // Anything else at column 0 closes an unterminated trace.
        self.trace = None;
        false
    }
}

/// Parse raw test output into ordered, deduplicated test errors.
pub fn parse_test_output(output: &str, config: &DiagnosticsConfig) -> Vec<TestError> {
    let mut parser = Parser::new(config);
    for line in output.lines() {
        parser.line(line);
    }
    let mut errors = parser.errors;
    errors.truncate(config.max_errors);
    errors
}

/// Read passed/failed totals from the last pytest or vitest summary line.
///
/// pytest collection errors count as failures. Output without a summary
/// yields zero counts.
pub fn parse_test_counts(output: &str) -> TestCounts {
    let p = patterns();
    let Some(summary) = output
        .lines()
        .rev()
        .find(|line| p.vitest_totals.is_match(line) || p.pytest_totals.is_match(line))
    else {
        return TestCounts::default();
    };

    let mut counts = TestCounts::default();
    for caps in p.count.captures_iter(summary) {
        let n: u32 = caps[1].parse().unwrap_or(0);
        match &caps[2] {
            "passed" => counts.passed += n,
            _ => counts.failed += n,
        }
    }
    counts
}

/// Most frequent category among `errors`; ties go to the earliest.
pub fn primary_category(errors: &[TestError]) -> Option<ErrorCategory> {
    let mut tally: Vec<(ErrorCategory, usize)> = Vec::new();
    for error in errors {
        match tally.iter_mut().find(|(category, _)| *category == error.category) {
            Some((_, n)) => *n += 1,
            None => tally.push((error.category, 1)),
        }
    }
    let mut best: Option<(ErrorCategory, usize)> = None;
    for (category, n) in tally {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((category, n));
        }
    }
    best.map(|(category, _)| category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_output_yields_nothing() {
        assert!(parse_test_output("", &DiagnosticsConfig::default()).is_empty());
        assert!(parse_test_output("npm ERR! code 1\n", &DiagnosticsConfig::default()).is_empty());
    }

    #[test]
    fn test_pytest_short_traceback() {
        let output = "\
============================= FAILURES =============================
_____________________________ test_add _____________________________
tests/test_calc.py:5: in test_add
    assert add(1, 2) == 4
E   assert 3 == 4
====================== short test summary info ======================
FAILED tests/test_calc.py::test_add - assert 3 == 4
";
        let errors = parse_test_output(output, &DiagnosticsConfig::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file, "tests/test_calc.py");
        assert_eq!(errors[0].line, Some(5));
        assert_eq!(errors[0].message, "assert 3 == 4");
        assert_eq!(errors[0].category, ErrorCategory::Logic);
    }

    #[test]
    fn test_pytest_summary_only() {
        let output = "FAILED tests/test_api.py::TestApi::test_get - TypeError: unsupported operand\n\
ERROR tests/test_db.py - ModuleNotFoundError: No module named 'psycopg'\n";
        let errors = parse_test_output(output, &DiagnosticsConfig::default());
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].file, "tests/test_api.py");
        assert_eq!(errors[0].category, ErrorCategory::TypeError);
        assert_eq!(errors[1].file, "tests/test_db.py");
        assert_eq!(errors[1].category, ErrorCategory::Import);
    }

    #[test]
    fn test_python_syntax_error_traceback() {
        let output = r#"Traceback (most recent call last):
  File "/repos/s1/app/main.py", line 10, in <module>
    from app.calc import add
  File "/repos/s1/app/calc.py", line 3
    def add(a, b)
                 ^
SyntaxError: expected ':'
"#;
        let config = DiagnosticsConfig::with_prefix("/repos/s1");
        let errors = parse_test_output(output, &config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file, "app/calc.py");
        assert_eq!(errors[0].line, Some(3));
        assert_eq!(errors[0].category, ErrorCategory::Syntax);
        assert!(errors[0].full_trace.as_deref().unwrap().contains("def add(a, b)"));
    }

    #[test]
    fn test_indentation_beats_syntax() {
        let output = "  File \"app/util.py\", line 7\n    return x\nIndentationError: unexpected indent\n";
        let errors = parse_test_output(output, &DiagnosticsConfig::default());
        assert_eq!(errors[0].category, ErrorCategory::Indentation);
    }

    #[test]
    fn test_flake8_and_typescript() {
        let output = "app/views.py:14:80: E501 line too long (92 > 79 characters)\n\
src/index.ts(3,7): error TS2322: Type 'string' is not assignable to type 'number'.\n";
        let errors = parse_test_output(output, &DiagnosticsConfig::default());
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].category, ErrorCategory::Linting);
        assert_eq!(errors[0].line, Some(14));
        assert_eq!(errors[1].file, "src/index.ts");
        assert_eq!(errors[1].category, ErrorCategory::TypeError);
    }

    #[test]
    fn test_vitest_suite_failure() {
        let output = " FAIL  src/math.test.js > sum > adds numbers\n\
 FAIL  src/import.test.js > loads\nError: Failed to resolve import \"./missing\"\n";
        let errors = parse_test_output(output, &DiagnosticsConfig::default());
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].file, "src/math.test.js");
        assert_eq!(errors[0].message, "sum > adds numbers");
        assert_eq!(errors[0].category, ErrorCategory::Logic);
    }

    #[test]
    fn test_third_party_frames_ignored() {
        let output = "/usr/lib/python3/site-packages/pkg/mod.py:4: DeprecationWarning: old\n";
        assert!(parse_test_output(output, &DiagnosticsConfig::default()).is_empty());
    }

    #[test]
    fn test_duplicates_and_limit() {
        let line = "FAILED tests/test_a.py::test_x - assert False\n";
        let output = line.repeat(3);
        assert_eq!(parse_test_output(&output, &DiagnosticsConfig::default()).len(), 1);

        let many: String = (0..10)
            .map(|i| format!("app/m{i}.py:1:1: W291 trailing whitespace\n"))
            .collect();
        let config = DiagnosticsConfig {
            max_errors: 3,
            strip_prefixes: Vec::new(),
        };
        assert_eq!(parse_test_output(&many, &config).len(), 3);
    }

    #[test]
    fn test_infer_category_defaults() {
        assert_eq!(infer_category("something odd happened"), None);
        assert_eq!(
            infer_category("ImportError: cannot import name 'x'"),
            Some(ErrorCategory::Import)
        );
        assert_eq!(infer_category("W605 invalid escape"), Some(ErrorCategory::Linting));
        assert_eq!(
            infer_category("expected 2 to be 3"),
            Some(ErrorCategory::Logic)
        );
    }

    #[test]
    fn test_counts_from_pytest_summary() {
        let output = "\
tests/test_calc.py::test_add FAILED                                  [ 33%]
tests/test_calc.py::test_sub PASSED                                  [ 66%]
=========== 1 failed, 2 passed, 1 error, 3 warnings in 0.12s ===========
";
        assert_eq!(
            parse_test_counts(output),
            TestCounts {
                passed: 2,
                failed: 2
            }
        );
    }

    #[test]
    fn test_counts_from_vitest_summary() {
        let output = "\
 Test Files  1 failed | 2 passed (3)
      Tests  1 failed | 5 passed (6)
   Duration  412ms
";
        assert_eq!(
            parse_test_counts(output),
            TestCounts {
                passed: 5,
                failed: 1
            }
        );
    }

    #[test]
    fn test_counts_without_summary() {
        assert_eq!(parse_test_counts(""), TestCounts::default());
        assert_eq!(
            parse_test_counts("npm ERR! missing script: test\n"),
            TestCounts::default()
        );
    }

    #[test]
    fn test_primary_category() {
        let errors = vec![
            TestError::new("a.py", ErrorCategory::Import, "No module named 'x'"),
            TestError::new("b.py", ErrorCategory::Logic, "assert 1 == 2"),
            TestError::new("c.py", ErrorCategory::Logic, "assert 2 == 3"),
        ];
        assert_eq!(primary_category(&errors), Some(ErrorCategory::Logic));
        assert_eq!(primary_category(&errors[..2]), Some(ErrorCategory::Import));
        assert_eq!(primary_category(&[]), None);
    }
}
