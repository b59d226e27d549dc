//! Record of plugin source files created or modified under the plugin root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Default number of changes retained
pub const DEFAULT_CHANGE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Modified => write!(f, "modified"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
    pub plugin_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileChangeLog {
    root: PathBuf,
    changes: VecDeque<FileChange>,
    capacity: usize,
}

impl FileChangeLog {
    pub fn new(root: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            root: root.into(),
            changes: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record a change notification. The plugin name is the first path
    /// component below the root, or unset for paths outside it.
    pub fn record(&mut self, path: &Path, kind: ChangeKind, timestamp: DateTime<Utc>) -> &FileChange {
        let change = FileChange {
            path: path.to_path_buf(),
            kind,
            timestamp,
            plugin_name: plugin_name_for(&self.root, path),
        };

        while self.changes.len() >= self.capacity {
            self.changes.pop_front();
        }
        self.changes.push_back(change);
        &self.changes[self.changes.len() - 1]
    }

    /// Last `n` changes, oldest first
    pub fn recent(&self, n: usize) -> Vec<FileChange> {
        let skip = self.changes.len().saturating_sub(n);
        self.changes.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// First component of `path` relative to `root`
pub fn plugin_name_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    match relative.components().next()? {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}
