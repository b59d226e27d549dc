//! Recent log lines, kept for retrieval and regex search.

use regex::RegexBuilder;
use std::collections::VecDeque;

use crate::error::{BridgeError, Result};

/// Default number of log lines retained
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Last `n` lines, oldest first
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    /// Lines matching `pattern` (case-insensitive), oldest first, stopping
    /// after `max_results` hits. A pattern that does not compile is
    /// reported as `BridgeError::InvalidRegex`.
    pub fn search(&self, pattern: &str, max_results: usize) -> Result<Vec<String>> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| BridgeError::invalid_regex(pattern, &e))?;

        Ok(self
            .lines
            .iter()
            .filter(|line| regex.is_match(line))
            .take(max_results)
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl Extend<String> for LogBuffer {
    fn extend<T: IntoIterator<Item = String>>(&mut self, iter: T) {
        for line in iter {
            self.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(lines: &[&str], capacity: usize) -> LogBuffer {
        let mut buffer = LogBuffer::new(capacity);
        buffer.extend(lines.iter().map(|l| l.to_string()));
        buffer
    }

    #[test]
    fn test_eviction() {
        let buffer = buffer_with(&["a", "b", "c", "d"], 3);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.recent(10), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_recent_tail() {
        let buffer = buffer_with(&["a", "b", "c"], 10);
        assert_eq!(buffer.recent(2), vec!["b", "c"]);
        assert!(buffer.recent(0).is_empty());
    }

    #[test]
    fn test_search_case_insensitive_and_capped() {
        let buffer = buffer_with(
            &["Loading model", "ERROR: one", "ok", "error: two", "Error: three"],
            10,
        );
        let hits = buffer.search("error", 2).unwrap();
        assert_eq!(hits, vec!["ERROR: one", "error: two"]);
    }

    #[test]
    fn test_search_invalid_regex_is_reported() {
        let buffer = buffer_with(&["a"], 10);
        let err = buffer.search("[unclosed", 10).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRegex { .. }));
    }
}
