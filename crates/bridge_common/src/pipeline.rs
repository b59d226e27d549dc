//! The log pipeline: tailer → buffer + reconstructor → history.
//!
//! One owned object holds the cursor, the line buffer, the in-progress
//! traceback and the error history. Callers that share it across tasks put
//! the whole pipeline behind a single lock.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::history::{ErrorHistory, DEFAULT_ERROR_CAPACITY};
use crate::log_buffer::{LogBuffer, DEFAULT_LOG_CAPACITY};
use crate::record::StructuredError;
use crate::tailer::{LogPosition, LogTailer};
use crate::traceback::{TracebackReconstructor, MAX_PENDING_LINES};

/// Sizing knobs for the pipeline buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineLimits {
    pub max_log_lines: usize,
    pub max_errors: usize,
    pub max_traceback_lines: usize,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_log_lines: DEFAULT_LOG_CAPACITY,
            max_errors: DEFAULT_ERROR_CAPACITY,
            max_traceback_lines: MAX_PENDING_LINES,
        }
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSummary {
    pub lines_read: usize,
    pub errors_detected: usize,
}

#[derive(Debug)]
pub struct LogPipeline {
    tailer: LogTailer,
    buffer: LogBuffer,
    reconstructor: TracebackReconstructor,
    history: ErrorHistory,
}

impl LogPipeline {
    pub fn new(tailer: LogTailer, limits: PipelineLimits) -> Self {
        Self {
            tailer,
            buffer: LogBuffer::new(limits.max_log_lines),
            reconstructor: TracebackReconstructor::with_max_pending(limits.max_traceback_lines),
            history: ErrorHistory::new(limits.max_errors),
        }
    }

    /// Read new lines from the log and run them through the pipeline
    pub fn poll(&mut self) -> PollSummary {
        let lines = self.tailer.poll();
        let lines_read = lines.len();
        let errors_detected = self.ingest(lines);

        if lines_read > 0 {
            debug!(
                "Poll read {} lines, {} new errors",
                lines_read, errors_detected
            );
        }

        PollSummary {
            lines_read,
            errors_detected,
        }
    }

    /// Push raw lines through buffer, reconstructor and history. Returns
    /// the number of errors detected.
    pub fn ingest<I>(&mut self, lines: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut detected = 0;
        for line in lines {
            if let Some(error) = self.reconstructor.feed(&line) {
                self.history.add(error);
                detected += 1;
            }
            self.buffer.push(line);
        }
        detected
    }

    /// Last `count` errors, oldest first. With `clear` the history is
    /// emptied after the snapshot is taken.
    pub fn recent_errors(&mut self, count: usize, clear: bool) -> Vec<StructuredError> {
        let errors = self.history.recent(count);
        if clear {
            self.history.clear();
        }
        errors
    }

    pub fn last_error(&self) -> Option<&StructuredError> {
        self.history.last()
    }

    pub fn recent_logs(&self, count: usize) -> Vec<String> {
        self.buffer.recent(count)
    }

    pub fn search_logs(&self, pattern: &str, max_results: usize) -> Result<Vec<String>> {
        self.buffer.search(pattern, max_results)
    }

    pub fn history(&self) -> &ErrorHistory {
        &self.history
    }

    pub fn error_count(&self) -> usize {
        self.history.len()
    }

    pub fn log_path(&self) -> &Path {
        self.tailer.path()
    }

    pub fn log_exists(&self) -> bool {
        self.tailer.exists()
    }

    pub fn position(&self) -> LogPosition {
        self.tailer.position()
    }

    pub fn dropped_tracebacks(&self) -> u64 {
        self.reconstructor.dropped_records()
    }
}
