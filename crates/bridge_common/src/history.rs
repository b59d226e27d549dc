//! Bounded error history (strict FIFO).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::record::StructuredError;

/// Default number of errors retained
pub const DEFAULT_ERROR_CAPACITY: usize = 50;

/// How often one error kind was seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCount {
    pub error_kind: String,
    pub count: usize,
}

/// Most recent errors in detection order. Oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    entries: VecDeque<StructuredError>,
    capacity: usize,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, error: StructuredError) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(error);
    }

    /// Last `n` errors, oldest first
    pub fn recent(&self, n: usize) -> Vec<StructuredError> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&StructuredError> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Distinct error kinds in first-seen order, with counts
    pub fn kind_summary(&self) -> Vec<KindCount> {
        let mut summary: Vec<KindCount> = Vec::new();
        for error in &self.entries {
            match summary.iter_mut().find(|k| k.error_kind == error.error_kind) {
                Some(existing) => existing.count += 1,
                None => summary.push(KindCount {
                    error_kind: error.error_kind.clone(),
                    count: 1,
                }),
            }
        }
        summary
    }
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_CAPACITY)
    }
}
