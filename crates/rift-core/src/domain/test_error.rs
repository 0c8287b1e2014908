//! Structured test failures handed to the fix producer.

use serde::{Deserialize, Serialize};

/// Bug category of a parsed failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Linting,
    Syntax,
    Logic,
    TypeError,
    Import,
    Indentation,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Linting => "LINTING",
            ErrorCategory::Syntax => "SYNTAX",
            ErrorCategory::Logic => "LOGIC",
            ErrorCategory::TypeError => "TYPE_ERROR",
            ErrorCategory::Import => "IMPORT",
            ErrorCategory::Indentation => "INDENTATION",
        }
    }
}

/// One parsed test failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestError {
    /// File path as reported by the test runner (relative to the checkout).
    pub file: String,

    /// Line number (1-indexed), when the runner reports one.
    pub line: Option<u32>,

    #[serde(rename = "error_type")]
    pub category: ErrorCategory,

    pub message: String,

    /// Full traceback, when available.
    pub full_trace: Option<String>,
}

impl TestError {
    pub fn new(file: impl Into<String>, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            category,
            message: message.into(),
            full_trace: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_trace(mut self, trace: String) -> Self {
        self.full_trace = Some(trace);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let err = TestError::new("app/calc.py", ErrorCategory::TypeError, "bad operand")
            .with_line(12);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["file"], "app/calc.py");
        assert_eq!(json["line"], 12);
        assert_eq!(json["error_type"], "TYPE_ERROR");
        assert!(json["full_trace"].is_null());
    }

    #[test]
    fn test_category_names_match_serde() {
        for category in [
            ErrorCategory::Linting,
            ErrorCategory::Syntax,
            ErrorCategory::Logic,
            ErrorCategory::TypeError,
            ErrorCategory::Import,
            ErrorCategory::Indentation,
        ] {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }
}
