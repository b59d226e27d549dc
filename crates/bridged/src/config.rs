//! Configuration management for bridged.
//!
//! Settings come from `bridge.toml` (or `--config`), then environment
//! variables, then the `.comfyui_url` file the host extension writes next
//! to the config. Command-line flags are applied last by `main`.

use anyhow::{Context, Result};
use bridge_common::pipeline::PipelineLimits;
use bridge_common::traceback::MAX_PENDING_LINES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "bridge.toml";

/// File written by the host-side extension with the live API URL
pub const URL_FILE_NAME: &str = ".comfyui_url";

/// Host API used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8188";

/// Log file name inside the ComfyUI directory
pub const DEFAULT_LOG_FILE: &str = "comfyui.log";

/// Plugin directory inside the ComfyUI directory
pub const PLUGIN_DIR: &str = "custom_nodes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// ComfyUI installation root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comfyui_path: Option<PathBuf>,

    /// Log file; defaults to `<comfyui_path>/comfyui.log`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,

    /// Host HTTP API base URL; unset means `.comfyui_url` or the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    #[serde(default = "default_max_errors")]
    pub max_errors: usize,

    /// Background log poll cadence
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Directory of extra diagnostic rule files (*.json)
    #[serde(default = "default_patterns_dir")]
    pub patterns_dir: PathBuf,

    /// Watch the plugin directory for source changes
    #[serde(default = "default_watch_plugins")]
    pub watch_plugins: bool,
}

fn default_max_log_lines() -> usize {
    1000
}

fn default_max_errors() -> usize {
    50
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_patterns_dir() -> PathBuf {
    PathBuf::from("patterns")
}

fn default_watch_plugins() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            comfyui_path: None,
            log_path: None,
            api_url: None,
            max_log_lines: default_max_log_lines(),
            max_errors: default_max_errors(),
            poll_interval_ms: default_poll_interval_ms(),
            patterns_dir: default_patterns_dir(),
            watch_plugins: default_watch_plugins(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `path`, or from `bridge.toml` in the working
    /// directory when no path is given, then apply the process environment
    /// and the `.comfyui_url` file.
    ///
    /// An explicit path that cannot be read or parsed is an error; a missing
    /// default file just means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (mut config, base_dir) = match path {
            Some(path) => {
                let config = Self::load_from_path(path)?;
                let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                (config, dir)
            }
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                let config = if default_path.is_file() {
                    Self::load_from_path(default_path)?
                } else {
                    info!("No {} found, using defaults", CONFIG_FILE_NAME);
                    Self::default()
                };
                (config, PathBuf::new())
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.apply_url_file(&base_dir);
        Ok(config)
    }

    /// Load config from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides. `lookup` returns the value of a
    /// variable, if set. Unparseable numbers are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = lookup("COMFYUI_PATH") {
            self.comfyui_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("COMFYUI_LOG") {
            self.log_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("COMFYUI_API") {
            self.api_url = Some(url);
        }
        if let Some(dir) = lookup("BRIDGE_PATTERNS_DIR") {
            self.patterns_dir = PathBuf::from(dir);
        }

        parse_into(&lookup, "MAX_LOG_LINES", &mut self.max_log_lines);
        parse_into(&lookup, "MAX_ERRORS", &mut self.max_errors);
        parse_into(&lookup, "BRIDGE_POLL_INTERVAL_MS", &mut self.poll_interval_ms);

        if let Some(value) = lookup("BRIDGE_WATCH_PLUGINS") {
            match parse_flag(&value) {
                Some(flag) => self.watch_plugins = flag,
                None => warn!("Ignoring BRIDGE_WATCH_PLUGINS={}: expected true/false", value),
            }
        }
    }

    /// Pick up the API URL from `<dir>/.comfyui_url` unless one is
    /// already configured.
    pub fn apply_url_file(&mut self, dir: &Path) {
        if self.api_url.is_some() {
            return;
        }

        let url_file = dir.join(URL_FILE_NAME);
        if let Ok(content) = fs::read_to_string(&url_file) {
            let url = content.trim();
            if !url.is_empty() {
                info!("Using host URL {} from {}", url, url_file.display());
                self.api_url = Some(url.to_string());
            }
        }
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Configured log file, else `comfyui.log` under the ComfyUI root
    pub fn resolved_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(|| {
            self.comfyui_path
                .as_ref()
                .map(|root| root.join(DEFAULT_LOG_FILE))
        })
    }

    pub fn plugin_root(&self) -> Option<PathBuf> {
        self.comfyui_path.as_ref().map(|root| root.join(PLUGIN_DIR))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }

    pub fn limits(&self) -> PipelineLimits {
        PipelineLimits {
            max_log_lines: self.max_log_lines,
            max_errors: self.max_errors,
            max_traceback_lines: MAX_PENDING_LINES,
        }
    }
}

fn parse_into<T, F>(lookup: &F, key: &str, target: &mut T)
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        match value.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("Ignoring {}={}: not a number", key, value),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
