//! Plugin Watcher - records Python source changes under `custom_nodes`

use anyhow::{Context, Result};
use bridge_common::file_changes::{ChangeKind, FileChangeLog};
use chrono::Utc;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Source files worth reporting
const PLUGIN_SOURCE_EXTENSION: &str = "py";

pub struct PluginWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl PluginWatcher {
    /// Watch `root` recursively, recording changes into `changes`. The
    /// notify callback runs on the watcher's own thread.
    pub fn start(root: &Path, changes: Arc<Mutex<FileChangeLog>>) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    record_event(&changes, &event);
                }
                Err(e) => warn!("Plugin watch error: {:?}", e),
            }
        })
        .context("Failed to create plugin watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        info!("Plugin watcher initialized on {}", root.display());

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map a notify event to a change kind. Metadata-only and access events
/// are not source changes.
pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        _ => None,
    }
}

/// Python files only; directories named `*.py` do not count
pub fn is_plugin_source(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(PLUGIN_SOURCE_EXTENSION)
        && !path.is_dir()
}

/// Record every relevant path of `event`. Returns the number recorded.
pub fn record_event(changes: &Mutex<FileChangeLog>, event: &Event) -> usize {
    let Some(kind) = classify(&event.kind) else {
        return 0;
    };

    let paths: Vec<&PathBuf> = event
        .paths
        .iter()
        .filter(|path| is_plugin_source(path))
        .collect();
    if paths.is_empty() {
        return 0;
    }

    let mut log = match changes.lock() {
        Ok(log) => log,
        Err(poisoned) => poisoned.into_inner(),
    };
    let now = Utc::now();
    for path in &paths {
        let change = log.record(path, kind, now);
        debug!(
            "Plugin file {}: {} ({})",
            change.kind,
            change.path.display(),
            change.plugin_name.as_deref().unwrap_or("-")
        );
    }
    paths.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};

    fn log() -> Mutex<FileChangeLog> {
        Mutex::new(FileChangeLog::new("/srv/ComfyUI/custom_nodes", 10))
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            None
        );
        assert_eq!(classify(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn test_only_python_sources_recorded() {
        let changes = log();
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/srv/ComfyUI/custom_nodes/FooPack/nodes.py"))
            .add_path(PathBuf::from("/srv/ComfyUI/custom_nodes/FooPack/README.md"));

        assert_eq!(record_event(&changes, &event), 1);
        let recorded = changes.lock().unwrap().recent(5);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].kind, ChangeKind::Modified);
        assert_eq!(recorded[0].plugin_name.as_deref(), Some("FooPack"));
    }

    #[test]
    fn test_removal_ignored() {
        let changes = log();
        let event = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/srv/ComfyUI/custom_nodes/FooPack/nodes.py"));
        assert_eq!(record_event(&changes, &event), 0);
        assert!(changes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_watcher_sees_new_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("custom_nodes");
        std::fs::create_dir_all(root.join("BarPack")).unwrap();

        let changes = Arc::new(Mutex::new(FileChangeLog::new(&root, 10)));
        let watcher = PluginWatcher::start(&root, Arc::clone(&changes)).unwrap();
        assert_eq!(watcher.root(), root.as_path());

        std::fs::write(root.join("BarPack").join("node.py"), "x = 1\n").unwrap();

        let mut seen = false;
        for _ in 0..50 {
            std::thread::sleep(std::time::Duration::from_millis(100));
            if !changes.lock().unwrap().is_empty() {
                seen = true;
                break;
            }
        }
        assert!(seen, "no change recorded for new plugin file");
        let recorded = changes.lock().unwrap().recent(1);
        assert_eq!(recorded[0].plugin_name.as_deref(), Some("BarPack"));
    }
}
