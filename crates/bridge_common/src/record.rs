//! Structured error records produced by the log pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of traceback lines shown by default when formatting for an agent
pub const DEFAULT_DISPLAY_BODY_LINES: usize = 20;

/// How an error record was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// Multi-line traceback closed by a "Kind: message" line
    Traceback,
    /// One-line error signature seen outside a traceback
    Standalone,
}

/// A single error extracted from the host log.
///
/// Built once by the extractor and never mutated afterwards; the history
/// hands out clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    pub timestamp: DateTime<Utc>,
    pub error_kind: String,
    pub message: String,
    /// Full record, start marker through terminating line
    pub body_lines: Vec<String>,
    pub plugin_name: Option<String>,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
    /// Node class named by "Error occurred when executing <Class>"
    pub node_class: Option<String>,
    pub node_id: Option<String>,
    pub raw_text: String,
    pub origin: ErrorOrigin,
}

impl StructuredError {
    /// Build a zero-body record for a one-line error signature
    pub fn standalone(error_kind: impl Into<String>, line: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            error_kind: error_kind.into(),
            message: line.to_string(),
            body_lines: Vec::new(),
            plugin_name: None,
            source_file: None,
            source_line: None,
            node_class: None,
            node_id: None,
            raw_text: line.to_string(),
            origin: ErrorOrigin::Standalone,
        }
    }

    /// "ValueError: bad shape"
    pub fn headline(&self) -> String {
        if self.message.is_empty() {
            self.error_kind.clone()
        } else {
            format!("{}: {}", self.error_kind, self.message)
        }
    }

    /// Format for consumption by a coding agent.
    ///
    /// Only the last `max_body_lines` traceback lines are shown; older
    /// frames are cut from the front.
    pub fn format_for_agent(&self, max_body_lines: usize) -> String {
        let mut lines = vec![format!("## Error: {}", self.error_kind)];
        lines.push(format!("**Time:** {}", self.timestamp.to_rfc3339()));
        if let Some(plugin) = &self.plugin_name {
            lines.push(format!("**Node:** {}", plugin));
        }
        if let Some(file) = &self.source_file {
            match self.source_line {
                Some(line) => lines.push(format!("**File:** {} (line {})", file, line)),
                None => lines.push(format!("**File:** {}", file)),
            }
        }
        if let Some(class) = &self.node_class {
            lines.push(format!("**Node Class:** {}", class));
        }
        if let Some(id) = &self.node_id {
            lines.push(format!("**Node ID:** {}", id));
        }
        lines.push(format!("**Message:** {}", self.message));

        if !self.body_lines.is_empty() {
            let skip = self.body_lines.len().saturating_sub(max_body_lines);
            lines.push(String::new());
            lines.push("**Traceback:**".to_string());
            lines.push("```python".to_string());
            if skip > 0 {
                lines.push(format!("... ({} earlier lines omitted)", skip));
            }
            lines.extend(self.body_lines.iter().skip(skip).cloned());
            lines.push("```".to_string());
        }

        lines.join("\n")
    }
}
