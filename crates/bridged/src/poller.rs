//! Background log poller.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::state::BridgeState;

/// Poll the log at `interval` until the task is aborted. Does nothing
/// when log watching is disabled.
pub fn spawn(state: Arc<BridgeState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        if state.pipeline.is_none() {
            debug!("Log poller not started: no log configured");
            return;
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Some(summary) = state.poll_log().await {
                if summary.errors_detected > 0 {
                    info!("Detected {} new error(s) in log", summary.errors_detected);
                }
            }
        }
    })
}
