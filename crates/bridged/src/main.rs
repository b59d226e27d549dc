//! bridged - ComfyUI development bridge
//!
//! Serves log, error and host tools to a coding agent over stdio.

use anyhow::{Context, Result};
use bridge_common::file_changes::{FileChangeLog, DEFAULT_CHANGE_CAPACITY};
use bridged::config::BridgeConfig;
use bridged::plugin_watcher::PluginWatcher;
use bridged::state::BridgeState;
use bridged::{poller, server};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// ComfyUI development bridge
#[derive(Parser)]
#[command(name = "bridged")]
#[command(about = "Log, error and workflow tools for ComfyUI over JSON-RPC on stdio", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./bridge.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// ComfyUI log file (overrides config and COMFYUI_LOG)
    #[arg(long)]
    log: Option<PathBuf>,

    /// ComfyUI API base URL (overrides config and COMFYUI_API)
    #[arg(long)]
    api: Option<String>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config =
        BridgeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(log) = cli.log {
        config.log_path = Some(log);
    }
    if let Some(api) = cli.api {
        config.api_url = Some(api);
    }

    if cli.check {
        let rendered =
            toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("{}", rendered);
        return Ok(());
    }

    info!("bridged v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "  COMFYUI_PATH: {}",
        config
            .comfyui_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not set".to_string())
    );
    info!(
        "  COMFYUI_LOG: {}",
        config
            .resolved_log_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not set".to_string())
    );
    info!("  COMFYUI_API: {}", config.api_url());

    let mut state = BridgeState::new(config.clone());

    // Keep the watcher alive for the life of the process
    let mut _plugin_watcher = None;
    match config.plugin_root() {
        Some(root) if config.watch_plugins && root.is_dir() => {
            let changes = Arc::new(Mutex::new(FileChangeLog::new(&root, DEFAULT_CHANGE_CAPACITY)));
            match PluginWatcher::start(&root, Arc::clone(&changes)) {
                Ok(watcher) => {
                    _plugin_watcher = Some(watcher);
                    state = state.with_file_changes(changes);
                }
                Err(e) => warn!("Plugin watching disabled: {:#}", e),
            }
        }
        Some(root) if config.watch_plugins => {
            warn!("Plugin directory {} not found, plugin watching disabled", root.display());
        }
        _ => info!("Plugin watching disabled"),
    }

    let state = Arc::new(state);

    // Initial read so the first tool call sees existing errors
    if let Some(summary) = state.poll_log().await {
        info!(
            "Initial log read: {} lines, {} errors",
            summary.lines_read, summary.errors_detected
        );
    }

    let poller = poller::spawn(Arc::clone(&state), config.poll_interval());

    let result = server::serve_stdio(Arc::clone(&state)).await;

    poller.abort();
    info!("Shutting down");
    result
}
