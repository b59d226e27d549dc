//! Traceback reconstruction.
//!
//! Groups consecutive log lines into one multi-line error record:
//! start marker, body, then a terminating "Kind: message" line. Outside a
//! record, single lines are checked against one-line error signatures.
//!
//! Standalone signatures are only checked while idle, so a "ValueError: x"
//! line that closes a traceback is never reported twice.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::extractor::{plugin_from_text, ErrorExtractor};
use crate::record::StructuredError;

/// Longest record kept while waiting for a terminating line
pub const MAX_PENDING_LINES: usize = 100;

static TRACEBACK_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Traceback \(most recent call last\):").unwrap());

static TERMINATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+Error|\w+Exception|Error|Exception):\s*(.+)$").unwrap()
});

/// One-line error signatures recognised outside a traceback
static STANDALONE_SIGNATURES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Cannot import (.+) custom node",
        r"Error loading custom node (.+):",
        r"Failed to validate prompt for output",
        r"Got an OOM|CUDA out of memory",
        r"RuntimeError: .+",
        r"ValueError: .+",
        r"TypeError: .+",
        r"AttributeError: .+",
        r"ModuleNotFoundError: .+",
        r"ImportError: .+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Accumulating(Vec<String>),
}

/// IDLE/ACCUMULATING state machine over raw log lines
#[derive(Debug, Clone)]
pub struct TracebackReconstructor {
    state: State,
    max_pending: usize,
    dropped: u64,
}

impl TracebackReconstructor {
    pub fn new() -> Self {
        Self::with_max_pending(MAX_PENDING_LINES)
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            state: State::Idle,
            max_pending: max_pending.max(1),
            dropped: 0,
        }
    }

    /// Feed one raw line. Returns an error when a record completes or a
    /// standalone signature matches.
    pub fn feed(&mut self, line: &str) -> Option<StructuredError> {
        let line = line.trim_end();

        // A fresh start marker also restarts an unfinished record
        if TRACEBACK_START.is_match(line) {
            self.state = State::Accumulating(vec![line.to_string()]);
            return None;
        }

        match &mut self.state {
            State::Accumulating(pending) => {
                pending.push(line.to_string());

                if TERMINATOR.is_match(line) {
                    let record = std::mem::take(pending);
                    self.state = State::Idle;
                    return ErrorExtractor::extract(&record);
                }

                if pending.len() > self.max_pending {
                    debug!(
                        "Dropping unterminated traceback after {} lines",
                        pending.len()
                    );
                    self.state = State::Idle;
                    self.dropped += 1;
                }

                None
            }
            State::Idle => standalone_error(line),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    pub fn pending_len(&self) -> usize {
        match &self.state {
            State::Idle => 0,
            State::Accumulating(pending) => pending.len(),
        }
    }

    /// Records discarded for exceeding the line cap
    pub fn dropped_records(&self) -> u64 {
        self.dropped
    }

    /// Forget any partial record
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}

impl Default for TracebackReconstructor {
    fn default() -> Self {
        Self::new()
    }
}

fn standalone_error(line: &str) -> Option<StructuredError> {
    let matched = STANDALONE_SIGNATURES
        .iter()
        .find_map(|re| re.find(line))?
        .as_str();

    let kind = match matched.split_once(':') {
        Some((kind, _)) => kind.to_string(),
        None => "Error".to_string(),
    };

    let mut error = StructuredError::standalone(kind, line);
    error.plugin_name = plugin_from_text(line);
    Some(error)
}
