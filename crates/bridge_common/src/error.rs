//! Error types for the log/error pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Rule file {path}: {reason}")]
    RuleFile { path: String, reason: String },
}

impl BridgeError {
    pub fn invalid_regex(pattern: &str, err: &regex::Error) -> Self {
        BridgeError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn rule_file(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        BridgeError::RuleFile {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_invalid_regex_message_names_pattern() {
        let err = regex::Regex::new("[unclosed").unwrap_err();
        let bridge = BridgeError::invalid_regex("[unclosed", &err);
        let message = bridge.to_string();
        assert!(message.starts_with("Invalid regex pattern '[unclosed':"));
    }

    #[test]
    fn test_rule_file_message() {
        let bridge = BridgeError::rule_file(Path::new("patterns/a.json"), "expected value");
        assert_eq!(bridge.to_string(), "Rule file patterns/a.json: expected value");
    }
}
