//! Shared daemon state handed to the server, the poller and the tools.

use bridge_common::file_changes::FileChangeLog;
use bridge_common::matcher::PatternMatcher;
use bridge_common::patterns::PatternCatalog;
use bridge_common::pipeline::{LogPipeline, PollSummary};
use bridge_common::tailer::LogTailer;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::host_client::HostClient;

pub struct BridgeState {
    pub config: BridgeConfig,
    /// Absent when no log file is configured
    pub pipeline: Option<Arc<Mutex<LogPipeline>>>,
    /// Absent when plugin watching is off or could not start
    pub file_changes: Option<Arc<StdMutex<FileChangeLog>>>,
    pub matcher: PatternMatcher,
    pub host: HostClient,
}

impl BridgeState {
    pub fn new(config: BridgeConfig) -> Self {
        let pipeline = match config.resolved_log_path() {
            Some(path) => {
                let parent_exists = path
                    .parent()
                    .map(|p| p.as_os_str().is_empty() || p.is_dir())
                    .unwrap_or(false);
                if !path.exists() && !parent_exists {
                    warn!(
                        "Log file {} not found and its directory is missing, log watching disabled",
                        path.display()
                    );
                    None
                } else {
                    info!("Watching log {}", path.display());
                    Some(Arc::new(Mutex::new(LogPipeline::new(
                        LogTailer::new(path),
                        config.limits(),
                    ))))
                }
            }
            None => {
                warn!("No log path configured (set COMFYUI_LOG or COMFYUI_PATH), log watching disabled");
                None
            }
        };

        let catalog = PatternCatalog::load(Some(&config.patterns_dir));
        info!(
            "Pattern catalog ready: {} rules ({} built-in)",
            catalog.len(),
            catalog.builtin_count()
        );

        let host = HostClient::new(config.api_url());

        Self {
            config,
            pipeline,
            file_changes: None,
            matcher: PatternMatcher::new(Arc::new(catalog)),
            host,
        }
    }

    pub fn with_file_changes(mut self, changes: Arc<StdMutex<FileChangeLog>>) -> Self {
        self.file_changes = Some(changes);
        self
    }

    /// Poll the log once. `None` when log watching is disabled.
    pub async fn poll_log(&self) -> Option<PollSummary> {
        self.refresh_log().await.map(|(_, summary)| summary)
    }

    /// Poll the log and hand back the still-locked pipeline, so callers
    /// read state that includes everything written so far. `None` when log
    /// watching is disabled.
    ///
    /// The file reads run on the blocking pool; the first poll may read a
    /// large existing log.
    pub async fn refresh_log(&self) -> Option<(OwnedMutexGuard<LogPipeline>, PollSummary)> {
        let pipeline = self.pipeline.as_ref()?;
        let mut guard = Arc::clone(pipeline).lock_owned().await;

        let polled = tokio::task::spawn_blocking(move || {
            let summary = guard.poll();
            (guard, summary)
        })
        .await;

        match polled {
            Ok(polled) => Some(polled),
            Err(e) => {
                warn!("Log poll failed: {}", e);
                let guard = Arc::clone(pipeline).lock_owned().await;
                Some((guard, PollSummary::default()))
            }
        }
    }
}
