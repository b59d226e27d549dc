//! Tool definitions and dispatch for the agent-facing tool server.
//!
//! Every tool answers with text. Conditions such as "no log configured"
//! or "host not running" are ordinary answers; only unknown tools and
//! malformed arguments are flagged as errors.

use bridge_common::error::BridgeError;
use bridge_common::extractor::ErrorExtractor;
use bridge_common::file_changes::FileChange;
use bridge_common::matcher::PatternMatcher;
use bridge_common::record::{StructuredError, DEFAULT_DISPLAY_BODY_LINES};
use bridge_common::workflow_health::check_workflow_health;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::state::BridgeState;

/// Node names listed before a search result is cut off
pub const MAX_NODE_LISTING: usize = 50;

/// Suggestions offered for an unknown node name
const MAX_NODE_SUGGESTIONS: usize = 20;

/// Error kinds named in the summary before the rest are counted
const MAX_SUMMARY_KINDS: usize = 5;

const NO_LOG_MESSAGE: &str =
    "Log watcher not initialized. Set COMFYUI_LOG or COMFYUI_PATH to the ComfyUI log.";

/// Tool definition as listed by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool call result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Concatenated text content
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error(transparent)]
    Pipeline(#[from] BridgeError),

    #[error("{0}")]
    Failed(String),
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        ToolResult::error(err.to_string())
    }
}

// Argument shapes

#[derive(Debug, Deserialize)]
struct ErrorsArgs {
    #[serde(default = "default_error_count")]
    count: usize,
    #[serde(default)]
    clear: bool,
}

fn default_error_count() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct LogsArgs {
    #[serde(default = "default_log_count")]
    count: usize,
    #[serde(default)]
    search: Option<String>,
}

fn default_log_count() -> usize {
    100
}

#[derive(Debug, Deserialize)]
struct MatchArgs {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChangesArgs {
    #[serde(default = "default_change_count")]
    count: usize,
}

fn default_change_count() -> usize {
    20
}

#[derive(Debug, Deserialize)]
struct QueueArgs {
    workflow: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodeInfoArgs {
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthArgs {
    #[serde(default)]
    workflow: Option<Value>,
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// All tools, in listing order
pub fn list_tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "get_comfy_errors".to_string(),
            description: "Get recent errors and tracebacks from ComfyUI. Returns parsed errors with file locations, node names, full tracebacks and fix suggestions.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "count": {
                        "type": "integer",
                        "description": "Number of recent errors to return (default: 5)",
                        "default": 5
                    },
                    "clear": {
                        "type": "boolean",
                        "description": "Clear error history after returning (default: false)",
                        "default": false
                    }
                }
            }),
        },
        ToolDef {
            name: "get_last_error".to_string(),
            description: "Get the most recent error with full context and fix suggestions.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDef {
            name: "get_error_summary".to_string(),
            description: "Summarize recent errors: how many were seen and which error types occurred.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDef {
            name: "get_comfy_logs".to_string(),
            description: "Get recent log output from ComfyUI, optionally filtered by a regex.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "count": {
                        "type": "integer",
                        "description": "Number of log lines to return (default: 100)",
                        "default": 100
                    },
                    "search": {
                        "type": "string",
                        "description": "Optional case-insensitive regex to filter logs"
                    }
                }
            }),
        },
        ToolDef {
            name: "match_error_pattern".to_string(),
            description: "Diagnose pasted error text or a traceback against the known error patterns.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Error message or full traceback"
                    }
                },
                "required": ["text"]
            }),
        },
        ToolDef {
            name: "get_file_changes".to_string(),
            description: "Get recent file changes in the custom_nodes directory.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "count": {
                        "type": "integer",
                        "description": "Number of recent changes to return (default: 20)",
                        "default": 20
                    }
                }
            }),
        },
        ToolDef {
            name: "get_comfy_status".to_string(),
            description: "Get ComfyUI server status: whether it is running, queue, system stats and log watcher state.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDef {
            name: "queue_workflow".to_string(),
            description: "Queue a ComfyUI workflow (API format) for execution.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workflow": {
                        "type": "object",
                        "description": "The workflow JSON; may also be wrapped as {\"prompt\": ...} or {\"workflow\": ...}"
                    }
                },
                "required": ["workflow"]
            }),
        },
        ToolDef {
            name: "interrupt_comfy".to_string(),
            description: "Interrupt the currently running ComfyUI execution.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDef {
            name: "get_node_info".to_string(),
            description: "Get details for one node type, search node types, or list node categories.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "node_name": {
                        "type": "string",
                        "description": "Exact node type name to describe"
                    },
                    "search": {
                        "type": "string",
                        "description": "Substring of the node name or display name"
                    },
                    "category": {
                        "type": "string",
                        "description": "Substring of the node category"
                    }
                }
            }),
        },
        ToolDef {
            name: "get_workflow".to_string(),
            description: "Get the workflow open in ComfyUI, or the most recently executed prompt with its outputs when none is published.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDef {
            name: "check_workflow_health".to_string(),
            description: "Analyze a workflow for disconnected nodes and missing inputs before running. Uses the workflow open in ComfyUI when none is given.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workflow": {
                        "type": "object",
                        "description": "Workflow JSON in UI or API format (optional)"
                    }
                }
            }),
        },
    ]
}

/// Call a tool by name
pub async fn call_tool(state: &BridgeState, name: &str, arguments: Value) -> ToolResult {
    debug!("Tool call: {}", name);
    let result = match name {
        "get_comfy_errors" => get_comfy_errors(state, arguments).await,
        "get_last_error" => get_last_error(state).await,
        "get_error_summary" => get_error_summary(state).await,
        "get_comfy_logs" => get_comfy_logs(state, arguments).await,
        "match_error_pattern" => match_error_pattern(state, arguments),
        "get_file_changes" => get_file_changes(state, arguments),
        "get_comfy_status" => get_comfy_status(state).await,
        "queue_workflow" => queue_workflow(state, arguments).await,
        "interrupt_comfy" => interrupt_comfy(state).await,
        "get_node_info" => get_node_info(state, arguments).await,
        "get_workflow" => get_workflow(state).await,
        "check_workflow_health" => check_health(state, arguments).await,
        _ => Err(ToolError::UnknownTool(name.to_string())),
    };

    result.unwrap_or_else(|e| {
        warn!("Tool {} failed: {}", name, e);
        e.into()
    })
}

async fn get_comfy_errors(state: &BridgeState, arguments: Value) -> Result<ToolResult, ToolError> {
    let args: ErrorsArgs = parse_args("get_comfy_errors", arguments)?;
    let Some((mut pipeline, _)) = state.refresh_log().await else {
        return Ok(ToolResult::text(NO_LOG_MESSAGE));
    };
    let errors = pipeline.recent_errors(args.count, args.clear);
    drop(pipeline);

    if errors.is_empty() {
        return Ok(ToolResult::text("No errors found in recent logs."));
    }

    let rendered: Vec<String> = errors
        .iter()
        .map(|e| render_error(e, &state.matcher))
        .collect();
    Ok(ToolResult::text(format!(
        "Found {} recent error(s):\n\n{}",
        errors.len(),
        rendered.join("\n\n---\n\n")
    )))
}

async fn get_last_error(state: &BridgeState) -> Result<ToolResult, ToolError> {
    let Some((pipeline, _)) = state.refresh_log().await else {
        return Ok(ToolResult::text(NO_LOG_MESSAGE));
    };
    let last = pipeline.last_error().cloned();
    drop(pipeline);

    Ok(match last {
        Some(error) => ToolResult::text(render_error(&error, &state.matcher)),
        None => ToolResult::text("No recent errors found in logs."),
    })
}

async fn get_error_summary(state: &BridgeState) -> Result<ToolResult, ToolError> {
    let Some((pipeline, _)) = state.refresh_log().await else {
        return Ok(ToolResult::text(NO_LOG_MESSAGE));
    };
    let (total, kinds) = (pipeline.error_count(), pipeline.history().kind_summary());
    drop(pipeline);

    if total == 0 {
        return Ok(ToolResult::text("No errors found in recent logs."));
    }

    let mut text = format!("Found {} error(s) in recent logs.\n", total);
    let named: Vec<String> = kinds
        .iter()
        .take(MAX_SUMMARY_KINDS)
        .map(|k| format!("{} ({})", k.error_kind, k.count))
        .collect();
    text.push_str(&format!("Error types: {}", named.join(", ")));
    if kinds.len() > MAX_SUMMARY_KINDS {
        text.push_str(&format!(" (+{} more)", kinds.len() - MAX_SUMMARY_KINDS));
    }
    text.push_str("\n\nUse `get_last_error` for detailed analysis of the most recent error.");
    Ok(ToolResult::text(text))
}

async fn get_comfy_logs(state: &BridgeState, arguments: Value) -> Result<ToolResult, ToolError> {
    let args: LogsArgs = parse_args("get_comfy_logs", arguments)?;
    let Some((pipeline, _)) = state.refresh_log().await else {
        return Ok(ToolResult::text(NO_LOG_MESSAGE));
    };
    let lines = match args.search.as_deref().filter(|s| !s.is_empty()) {
        Some(pattern) => pipeline.search_logs(pattern, args.count)?,
        None => pipeline.recent_logs(args.count),
    };
    drop(pipeline);

    if lines.is_empty() {
        return Ok(ToolResult::text("No log lines found."));
    }
    Ok(ToolResult::text(lines.join("\n")))
}

fn match_error_pattern(state: &BridgeState, arguments: Value) -> Result<ToolResult, ToolError> {
    let args: MatchArgs = parse_args("match_error_pattern", arguments)?;
    if args.text.trim().is_empty() {
        return Err(ToolError::InvalidArguments {
            tool: "match_error_pattern".to_string(),
            reason: "text is empty".to_string(),
        });
    }

    let mut lines = Vec::new();
    if let Some(parsed) = ErrorExtractor::parse_text(&args.text) {
        lines.push(format!("**Error:** {}", parsed.headline()));
        if let Some(plugin) = &parsed.plugin_name {
            lines.push(format!("**Node:** {}", plugin));
        }
        if let Some(file) = &parsed.source_file {
            match parsed.source_line {
                Some(line) => lines.push(format!("**File:** {} (line {})", file, line)),
                None => lines.push(format!("**File:** {}", file)),
            }
        }
        lines.push(String::new());
    }

    match state.matcher.match_text(&args.text) {
        Some(hit) => {
            lines.push(format!("**Matched:** {} ({})", hit.title, hit.rule_id));
            lines.push(format!("**Suggestion:** {}", hit.suggestion));
        }
        None => lines.push("No known error pattern matched.".to_string()),
    }

    Ok(ToolResult::text(lines.join("\n")))
}

fn get_file_changes(state: &BridgeState, arguments: Value) -> Result<ToolResult, ToolError> {
    let args: ChangesArgs = parse_args("get_file_changes", arguments)?;
    let Some(changes) = &state.file_changes else {
        return Ok(ToolResult::text(
            "File watcher not initialized. Set COMFYUI_PATH and enable plugin watching.",
        ));
    };

    let recent = match changes.lock() {
        Ok(log) => log.recent(args.count),
        Err(poisoned) => poisoned.into_inner().recent(args.count),
    };

    if recent.is_empty() {
        return Ok(ToolResult::text("No recent file changes detected."));
    }
    Ok(ToolResult::text(format_changes(&recent)))
}

/// One entry per change, oldest first
pub fn format_changes(changes: &[FileChange]) -> String {
    let mut text = String::from("Recent file changes:\n\n");
    for change in changes {
        text.push_str(&format!("- [{}] {}", change.kind, change.path.display()));
        if let Some(plugin) = &change.plugin_name {
            text.push_str(&format!(" (node: {})", plugin));
        }
        text.push_str(&format!("\n  at {}\n", change.timestamp.to_rfc3339()));
    }
    text
}

async fn get_comfy_status(state: &BridgeState) -> Result<ToolResult, ToolError> {
    let mut lines = Vec::new();

    let running = state.host.is_running().await;
    if running {
        lines.push(format!("ComfyUI: running at {}", state.host.base_url()));
        match state.host.queue().await {
            Ok(queue) => lines.push(describe_queue(&queue)),
            Err(e) => lines.push(format!("Queue Error: {}", e)),
        }
        match state.host.system_stats().await {
            Ok(stats) => lines.extend(describe_system_stats(&stats)),
            Err(e) => lines.push(format!("System Stats Error: {}", e)),
        }
    } else {
        lines.push(format!("ComfyUI: not running at {}", state.host.base_url()));
    }

    // Poll so the error count is current
    match state.refresh_log().await {
        Some((pipeline, _)) => {
            let presence = if pipeline.log_exists() { "" } else { " (missing)" };
            lines.push(format!(
                "Log: {}{} | {} error(s) recorded",
                pipeline.log_path().display(),
                presence,
                pipeline.error_count()
            ));
        }
        None => lines.push("Log: not configured".to_string()),
    }

    let watching = if state.file_changes.is_some() { "on" } else { "off" };
    lines.push(format!("Plugin watching: {}", watching));

    Ok(ToolResult::text(lines.join("\n")))
}

/// `Queue: N running, M pending` from a `/queue` response
pub fn describe_queue(queue: &Value) -> String {
    let len = |key: &str| queue.get(key).and_then(Value::as_array).map_or(0, Vec::len);
    format!(
        "Queue: {} running, {} pending",
        len("queue_running"),
        len("queue_pending")
    )
}

/// Host platform and per-device VRAM use from a `/system_stats` response
pub fn describe_system_stats(stats: &Value) -> Vec<String> {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    let system = stats.get("system");
    let field = |key: &str| {
        system
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
            .unwrap_or("?")
    };
    let mut lines = vec![format!(
        "System: {} Python {}",
        field("os"),
        field("python_version")
    )];

    let devices = stats.get("devices").and_then(Value::as_array);
    for device in devices.into_iter().flatten() {
        let bytes = |key: &str| device.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        let total = bytes("vram_total") / GIB;
        let free = bytes("vram_free") / GIB;
        let name = device.get("name").and_then(Value::as_str).unwrap_or("unknown");
        lines.push(format!(
            "GPU: {} | VRAM: {:.1}/{:.1} GB Used",
            name,
            total - free,
            total
        ));
    }
    lines
}

async fn queue_workflow(state: &BridgeState, arguments: Value) -> Result<ToolResult, ToolError> {
    let args: QueueArgs = parse_args("queue_workflow", arguments)?;
    let empty = match &args.workflow {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Ok(ToolResult::text("No workflow provided."));
    }

    match state.host.queue_prompt(args.workflow).await {
        Ok(resp) => Ok(ToolResult::text(describe_queue_response(&resp))),
        Err(e) => Ok(ToolResult::text(format!("Error queuing workflow: {}", e))),
    }
}

/// Summarize the host's answer to a prompt submission
pub fn describe_queue_response(resp: &Value) -> String {
    if let Some(error) = resp.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        let mut text = format!("Error queuing workflow: {}", message);
        if let Some(node_errors) = resp.get("node_errors").filter(|v| {
            v.as_object().map(|m| !m.is_empty()).unwrap_or(false)
        }) {
            let details = serde_json::to_string_pretty(node_errors).unwrap_or_default();
            text.push_str(&format!("\n\nNode errors:\n{}", details));
        }
        return text;
    }

    match resp.get("prompt_id").and_then(Value::as_str) {
        Some(id) => {
            let mut text = format!("Workflow queued. Prompt ID: {}", id);
            if let Some(number) = resp.get("number") {
                text.push_str(&format!(" (queue position {})", number));
            }
            text
        }
        None => format!("Workflow submitted. Host response: {}", resp),
    }
}

async fn interrupt_comfy(state: &BridgeState) -> Result<ToolResult, ToolError> {
    Ok(match state.host.interrupt().await {
        Ok(()) => ToolResult::text("Interrupt successful"),
        Err(e) => ToolResult::text(format!("Interrupt failed: {}", e)),
    })
}

async fn get_node_info(state: &BridgeState, arguments: Value) -> Result<ToolResult, ToolError> {
    let args: NodeInfoArgs = parse_args("get_node_info", arguments)?;
    match state.host.object_info().await {
        Ok(info) => Ok(ToolResult::text(describe_nodes(&info, &args))),
        Err(e) => Ok(ToolResult::text(format!(
            "Could not get node info. Is ComfyUI running? ({})",
            e
        ))),
    }
}

/// Answer a node query against an `/object_info` catalog
pub fn describe_nodes(info: &Value, args: &NodeInfoArgs) -> String {
    let Some(nodes) = info.as_object() else {
        return "Node catalog is empty.".to_string();
    };

    if let Some(name) = args.node_name.as_deref().filter(|n| !n.is_empty()) {
        if let Some(node) = nodes.get(name) {
            return serde_json::to_string_pretty(node).unwrap_or_else(|_| node.to_string());
        }

        let needle = name.to_lowercase();
        let mut similar: Vec<&String> = nodes
            .keys()
            .filter(|k| k.to_lowercase().contains(&needle))
            .collect();
        similar.sort();
        if similar.is_empty() {
            return format!("Node '{}' not found.", name);
        }
        let listed: Vec<&str> = similar
            .iter()
            .take(MAX_NODE_SUGGESTIONS)
            .map(|s| s.as_str())
            .collect();
        return format!("Node '{}' not found. Did you mean:\n{}", name, listed.join("\n"));
    }

    let search = args.search.as_deref().filter(|s| !s.is_empty());
    let category = args.category.as_deref().filter(|s| !s.is_empty());
    if search.is_some() || category.is_some() {
        return filtered_listing(nodes, search, category);
    }

    category_overview(nodes)
}

fn node_field<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str)
}

fn filtered_listing(nodes: &Map<String, Value>, search: Option<&str>, category: Option<&str>) -> String {
    let search = search.map(str::to_lowercase);
    let category = category.map(str::to_lowercase);

    let mut matches: Vec<(&String, &Value)> = nodes
        .iter()
        .filter(|(name, node)| {
            let search_ok = search.as_ref().map_or(true, |s| {
                name.to_lowercase().contains(s)
                    || node_field(node, "display_name")
                        .map(|d| d.to_lowercase().contains(s))
                        .unwrap_or(false)
            });
            let category_ok = category.as_ref().map_or(true, |c| {
                node_field(node, "category")
                    .map(|cat| cat.to_lowercase().contains(c))
                    .unwrap_or(false)
            });
            search_ok && category_ok
        })
        .collect();
    matches.sort_by(|a, b| a.0.cmp(b.0));

    let mut lines = vec![format!("Found {} nodes:", matches.len())];
    for (name, node) in matches.iter().take(MAX_NODE_LISTING) {
        let display = node_field(node, "display_name").unwrap_or(name.as_str());
        let cat = node_field(node, "category").unwrap_or("Uncategorized");
        lines.push(format!("- {} ({}) [{}]", name, display, cat));
    }
    if matches.len() > MAX_NODE_LISTING {
        lines.push(format!(
            "... and {} more. Refine your search.",
            matches.len() - MAX_NODE_LISTING
        ));
    }
    lines.join("\n")
}

fn category_overview(nodes: &Map<String, Value>) -> String {
    let mut categories: std::collections::BTreeMap<&str, usize> = Default::default();
    for node in nodes.values() {
        let cat = node_field(node, "category").unwrap_or("uncategorized");
        *categories.entry(cat).or_default() += 1;
    }

    let mut text = format!("Available nodes ({} total):\n\n", nodes.len());
    for (cat, count) in categories {
        text.push_str(&format!("**{}** ({})\n", cat, count));
    }
    text
}

const NO_WORKFLOW_MESSAGE: &str =
    "No workflow found. Open a workflow in ComfyUI or run a prompt first.";

async fn get_workflow(state: &BridgeState) -> Result<ToolResult, ToolError> {
    match state.host.find_workflow().await {
        Ok(Some(workflow)) => {
            let text = serde_json::to_string_pretty(&workflow)
                .map_err(|e| ToolError::Failed(e.to_string()))?;
            Ok(ToolResult::text(text))
        }
        Ok(None) => Ok(ToolResult::text(NO_WORKFLOW_MESSAGE)),
        Err(e) => Ok(ToolResult::text(format!("{} ({})", NO_WORKFLOW_MESSAGE, e))),
    }
}

async fn check_health(state: &BridgeState, arguments: Value) -> Result<ToolResult, ToolError> {
    let args: HealthArgs = parse_args("check_workflow_health", arguments)?;

    let workflow = match args.workflow.filter(|w| !w.is_null()) {
        Some(workflow) => workflow,
        None => match state.host.find_workflow().await {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(ToolResult::text(NO_WORKFLOW_MESSAGE)),
            Err(e) => {
                return Ok(ToolResult::text(format!("{} ({})", NO_WORKFLOW_MESSAGE, e)))
            }
        },
    };

    Ok(ToolResult::text(check_workflow_health(&workflow).format_report()))
}

/// Agent-facing error text with the first matching suggestion appended
pub fn render_error(error: &StructuredError, matcher: &PatternMatcher) -> String {
    let mut text = error.format_for_agent(DEFAULT_DISPLAY_BODY_LINES);
    if let Some(hit) = matcher.match_text(&error.raw_text) {
        text.push_str(&format!(
            "\n\n**Suggestion ({}):** {}",
            hit.title, hit.suggestion
        ));
    }
    text
}
