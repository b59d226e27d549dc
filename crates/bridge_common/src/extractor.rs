//! Structured field extraction from reconstructed traceback records.
//!
//! Every field except kind and message is a best-effort heuristic. A field
//! that cannot be derived is left unset; extraction itself never fails.

use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

use crate::record::{ErrorOrigin, StructuredError};

/// `File "path", line N`
static FILE_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"File "([^"]+)", line (\d+)"#).unwrap());

/// Plugin segment inside a quoted path (may be a single-file plugin)
static PLUGIN_IN_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"custom_nodes[/\\]([^/\\]+)").unwrap());

/// Plugin segment inside free log text; stops at quotes and whitespace
static PLUGIN_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"custom_nodes[/\\]([^/\\"'\s:]+)"#).unwrap());

static EXECUTING_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Error occurred when executing (\w+)").unwrap());

/// Tried in order; first hit wins
static NODE_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"'node_id':\s*'(\d+)'",
        r#""node_id":\s*"(\d+)""#,
        r"(?i)executing node (\d+)",
        r"(?i)node (\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Stateless field extractor
pub struct ErrorExtractor;

impl ErrorExtractor {
    /// Structure a completed record. The last line is the terminating
    /// "Kind: message" line. Returns `None` only for an empty record.
    pub fn extract(lines: &[String]) -> Option<StructuredError> {
        let terminator = lines.last()?.trim();
        let (error_kind, message) = split_kind_message(terminator);
        let raw_text = lines.join("\n");

        let citation = last_citation(lines);
        let plugin_name =
            plugin_from_citations(lines).or_else(|| plugin_from_text(&raw_text));

        Some(StructuredError {
            timestamp: Utc::now(),
            error_kind,
            message,
            body_lines: lines.to_vec(),
            plugin_name,
            source_file: citation.as_ref().map(|(file, _)| file.clone()),
            source_line: citation.and_then(|(_, line)| line),
            node_class: node_class(&raw_text),
            node_id: node_id(&raw_text),
            raw_text,
            origin: ErrorOrigin::Traceback,
        })
    }

    /// Structure a pasted traceback. Blank lines around the text are
    /// ignored and the last non-empty line is taken as the terminator.
    pub fn parse_text(text: &str) -> Option<StructuredError> {
        let lines: Vec<String> = text
            .trim()
            .lines()
            .map(|l| l.trim_end().to_string())
            .collect();
        if lines.iter().all(|l| l.is_empty()) {
            return None;
        }
        Self::extract(&lines)
    }
}

/// Split "Kind: message" at the first colon. A line without a colon is all
/// kind and no message.
pub fn split_kind_message(line: &str) -> (String, String) {
    match line.split_once(':') {
        Some((kind, message)) => (kind.trim().to_string(), message.trim().to_string()),
        None => (line.trim().to_string(), String::new()),
    }
}

/// Last `File "...", line N` citation, closest to the point of failure
fn last_citation(lines: &[String]) -> Option<(String, Option<u32>)> {
    lines.iter().rev().find_map(|line| {
        FILE_CITATION.captures(line).map(|caps| {
            let file = caps[1].to_string();
            let line_no = caps[2].parse::<u32>().ok();
            (file, line_no)
        })
    })
}

/// Plugin from the last cited path that lives under the plugin directory
fn plugin_from_citations(lines: &[String]) -> Option<String> {
    lines.iter().rev().find_map(|line| {
        let caps = FILE_CITATION.captures(line)?;
        PLUGIN_IN_PATH
            .captures(&caps[1])
            .map(|p| p[1].to_string())
    })
}

/// Plugin from any mention of the plugin directory in free text
pub fn plugin_from_text(text: &str) -> Option<String> {
    PLUGIN_IN_TEXT
        .captures_iter(text)
        .last()
        .map(|caps| caps[1].to_string())
}

fn node_class(text: &str) -> Option<String> {
    EXECUTING_CLASS
        .captures(text)
        .map(|caps| caps[1].to_string())
}

fn node_id(text: &str) -> Option<String> {
    NODE_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(text).map(|caps| caps[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_standard_traceback() {
        let record = lines(&[
            "Traceback (most recent call last):",
            "  File \"custom_nodes/FooPack/node.py\", line 42, in run",
            "ValueError: bad shape",
        ]);
        let err = ErrorExtractor::extract(&record).unwrap();
        assert_eq!(err.error_kind, "ValueError");
        assert_eq!(err.message, "bad shape");
        assert!(err.source_file.as_deref().unwrap().contains("custom_nodes/FooPack/node.py"));
        assert_eq!(err.source_line, Some(42));
        assert_eq!(err.plugin_name.as_deref(), Some("FooPack"));
        assert_eq!(err.body_lines.len(), 3);
    }

    #[test]
    fn test_last_citation_wins() {
        let record = lines(&[
            "Traceback (most recent call last):",
            "  File \"/app/ComfyUI/execution.py\", line 151, in recursive_execute",
            "  File \"/app/ComfyUI/custom_nodes/BarNodes/nodes.py\", line 7, in go",
            "  File \"/usr/lib/python3.11/site-packages/torch/functional.py\", line 99, in stack",
            "RuntimeError: stack expects each tensor to be equal size",
        ]);
        let err = ErrorExtractor::extract(&record).unwrap();
        assert_eq!(
            err.source_file.as_deref(),
            Some("/usr/lib/python3.11/site-packages/torch/functional.py")
        );
        assert_eq!(err.source_line, Some(99));
        assert_eq!(err.plugin_name.as_deref(), Some("BarNodes"));
    }

    #[test]
    fn test_windows_paths() {
        let record = lines(&[
            "Traceback (most recent call last):",
            "  File \"C:\\ComfyUI\\custom_nodes\\WinPack\\nodes.py\", line 3, in f",
            "KeyError: 'model'",
        ]);
        let err = ErrorExtractor::extract(&record).unwrap();
        assert_eq!(err.plugin_name.as_deref(), Some("WinPack"));
    }

    #[test]
    fn test_missing_fields_left_unset() {
        let record = lines(&["Traceback (most recent call last):", "Exception: nope"]);
        let err = ErrorExtractor::extract(&record).unwrap();
        assert_eq!(err.error_kind, "Exception");
        assert_eq!(err.message, "nope");
        assert!(err.source_file.is_none());
        assert!(err.source_line.is_none());
        assert!(err.plugin_name.is_none());
    }

    #[test]
    fn test_message_keeps_later_colons() {
        let (kind, message) = split_kind_message("OSError: [Errno 2]: file: missing");
        assert_eq!(kind, "OSError");
        assert_eq!(message, "[Errno 2]: file: missing");
    }

    #[test]
    fn test_node_context() {
        let record = lines(&[
            "!!! Exception during processing !!! executing node 17",
            "Error occurred when executing KSampler:",
            "Traceback (most recent call last):",
            "TypeError: unsupported operand",
        ]);
        let err = ErrorExtractor::extract(&record).unwrap();
        assert_eq!(err.node_class.as_deref(), Some("KSampler"));
        assert_eq!(err.node_id.as_deref(), Some("17"));
    }

    #[test]
    fn test_plugin_from_text_ignores_quotes() {
        let text = "Cannot import /srv/ComfyUI/custom_nodes/comfy-pack module for custom nodes: boom";
        assert_eq!(plugin_from_text(text).as_deref(), Some("comfy-pack"));
        assert_eq!(plugin_from_text("nothing here"), None);
    }

    #[test]
    fn test_parse_text_trims_blank_lines() {
        let text = "\n\nTraceback (most recent call last):\n  File \"x.py\", line 1, in <module>\nNameError: name 'y' is not defined\n\n";
        let err = ErrorExtractor::parse_text(text).unwrap();
        assert_eq!(err.error_kind, "NameError");
        assert_eq!(err.source_file.as_deref(), Some("x.py"));
        assert!(ErrorExtractor::parse_text("   \n").is_none());
    }
}
