//! Target project languages.

use serde::{Deserialize, Serialize};

use super::error::{Result, RiftError};

/// A project language with a pre-provisioned container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Nodejs,
}

impl Language {
    /// Every supported language, in display order.
    pub const ALL: [Language; 2] = [Language::Python, Language::Nodejs];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Nodejs => "nodejs",
        }
    }

    /// Parse a client-supplied language name (case-insensitive).
    ///
    /// `node` is accepted as an alias for `nodejs`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "python" => Ok(Language::Python),
            "nodejs" | "node" => Ok(Language::Nodejs),
            _ => Err(RiftError::UnsupportedLanguage {
                language: raw.to_string(),
                supported: Self::supported_list(),
            }),
        }
    }

    /// Comma-separated list of supported language names.
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(Language::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_languages() {
        assert_eq!(Language::parse("python").unwrap(), Language::Python);
        assert_eq!(Language::parse("NodeJS").unwrap(), Language::Nodejs);
        assert_eq!(Language::parse(" node ").unwrap(), Language::Nodejs);
    }

    #[test]
    fn test_parse_unknown_language() {
        let err = Language::parse("ruby").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Language 'ruby' is not supported"));
        assert!(err.to_string().contains("python, nodejs"));
    }

    #[test]
    fn test_language_wire_name() {
        assert_eq!(serde_json::to_string(&Language::Nodejs).unwrap(), "\"nodejs\"");
        assert_eq!(Language::Python.to_string(), "python");
    }
}
