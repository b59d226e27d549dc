//! Workflow health check.
//!
//! Looks for common wiring problems in a workflow before it is queued.
//! Two shapes are understood:
//!
//! - UI format: `{ "nodes": [...], "links": [[id, src, slot, dst, slot, type], ...] }`
//! - API format: `{ "<id>": { "class_type": ..., "inputs": {...} }, ... }`
//!
//! Wrappers produced by the host extension (`{"workflow": ...}` and
//! `{"prompt": {...}}`) are unwrapped first.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Warnings shown by `format_report` before the rest are summarised
pub const MAX_REPORTED_WARNINGS: usize = 10;

/// Node classes that are legitimately unconnected in small graphs
const SOURCE_NODE_CLASSES: &[&str] = &[
    "LoadImage",
    "LoadCheckpoint",
    "CheckpointLoaderSimple",
    "EmptyLatentImage",
    "CLIPTextEncode",
    "KSampler",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    EmptyWorkflow,
    NoNodes,
    OrphanNode,
    NullInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFinding {
    pub kind: FindingKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_name: Option<String>,
}

impl HealthFinding {
    fn plain(kind: FindingKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
            node_id: None,
            node_class: None,
            input_name: None,
        }
    }

    fn orphan(node_id: &str, node_class: &str) -> Self {
        Self {
            kind: FindingKind::OrphanNode,
            message: format!("Node {} ({}) appears disconnected", node_id, node_class),
            node_id: Some(node_id.to_string()),
            node_class: Some(node_class.to_string()),
            input_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<HealthFinding>,
    pub warnings: Vec<HealthFinding>,
    pub node_count: usize,
    pub summary: String,
}

impl HealthReport {
    fn new() -> Self {
        Self {
            healthy: true,
            issues: Vec::new(),
            warnings: Vec::new(),
            node_count: 0,
            summary: String::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.healthy = self.issues.is_empty();
        self.summary = match (self.issues.len(), self.warnings.len()) {
            (0, 0) => format!("Workflow looks healthy ({} nodes)", self.node_count),
            (0, w) => format!("{} warning(s) found ({} nodes)", w, self.node_count),
            (i, w) => format!("{} issue(s), {} warning(s) ({} nodes)", i, w, self.node_count),
        };
        self
    }

    fn finish_with(mut self, summary: &str) -> Self {
        self.healthy = self.issues.is_empty();
        self.summary = summary.to_string();
        self
    }

    /// Readable report; at most `MAX_REPORTED_WARNINGS` warnings are listed
    pub fn format_report(&self) -> String {
        let mut lines = vec![self.summary.clone(), String::new()];

        if !self.issues.is_empty() {
            lines.push("**Issues:**".to_string());
            for issue in &self.issues {
                lines.push(format!("- {}", issue.message));
            }
            lines.push(String::new());
        }

        if !self.warnings.is_empty() {
            lines.push("**Warnings:**".to_string());
            for warning in self.warnings.iter().take(MAX_REPORTED_WARNINGS) {
                lines.push(format!("- {}", warning.message));
            }
            if self.warnings.len() > MAX_REPORTED_WARNINGS {
                lines.push(format!(
                    "- ... and {} more",
                    self.warnings.len() - MAX_REPORTED_WARNINGS
                ));
            }
        }

        lines.join("\n").trim_end().to_string()
    }
}

/// Analyse a workflow for potential issues
pub fn check_workflow_health(workflow: &Value) -> HealthReport {
    let is_empty = match workflow {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if is_empty {
        let mut report = HealthReport::new();
        report.issues.push(HealthFinding::plain(
            FindingKind::EmptyWorkflow,
            "Workflow is empty or not loaded",
        ));
        return report.finish_with("Workflow is empty or not loaded");
    }

    let workflow = unwrap_workflow(workflow);
    let Some(map) = workflow.as_object() else {
        return no_nodes(
            "Workflow contains no nodes (or unsupported format)",
            "No valid nodes found",
        );
    };

    match map.get("nodes").and_then(Value::as_array) {
        Some(nodes) => check_ui_format(map, nodes),
        None => check_api_format(map),
    }
}

fn no_nodes(message: &str, summary: &str) -> HealthReport {
    let mut report = HealthReport::new();
    report
        .warnings
        .push(HealthFinding::plain(FindingKind::NoNodes, message));
    report.finish_with(summary)
}

fn unwrap_workflow(workflow: &Value) -> &Value {
    let mut current = workflow;
    if let Some(inner) = current.get("workflow") {
        current = inner;
    }
    if let Some(prompt) = current.get("prompt").filter(|p| p.is_object()) {
        current = prompt;
    }
    current
}

/// Node ids appear as numbers in the UI format and strings in the API
/// format; compare them as strings.
fn id_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_ui_format(map: &Map<String, Value>, nodes: &[Value]) -> HealthReport {
    if nodes.is_empty() {
        return no_nodes("Workflow contains no nodes", "Workflow contains no nodes");
    }

    let mut report = HealthReport::new();
    report.node_count = nodes.len();

    let nodes_by_id: BTreeMap<String, &Value> = nodes
        .iter()
        .filter_map(|node| node.get("id").map(|id| (id_key(id), node)))
        .collect();

    // link = [link_id, source_node, source_slot, target_node, target_slot, type]
    let mut linked: BTreeSet<String> = BTreeSet::new();
    if let Some(links) = map.get("links").and_then(Value::as_array) {
        for link in links.iter().filter_map(Value::as_array) {
            if link.len() >= 4 {
                linked.insert(id_key(&link[1]));
                linked.insert(id_key(&link[3]));
            }
        }
    }

    for (id, node) in &nodes_by_id {
        if linked.contains(id) {
            continue;
        }
        let class = node.get("type").and_then(Value::as_str).unwrap_or("Unknown");
        if !SOURCE_NODE_CLASSES.contains(&class) {
            report.warnings.push(HealthFinding::orphan(id, class));
        }
    }

    report.finish()
}

fn check_api_format(map: &Map<String, Value>) -> HealthReport {
    let nodes: BTreeMap<&String, &Map<String, Value>> = map
        .iter()
        .filter_map(|(id, v)| {
            v.as_object()
                .filter(|node| node.contains_key("class_type"))
                .map(|node| (id, node))
        })
        .collect();

    if nodes.is_empty() {
        return no_nodes(
            "Workflow contains no nodes (or unsupported format)",
            "No valid nodes found",
        );
    }

    let mut report = HealthReport::new();
    report.node_count = nodes.len();
    let mut connected: BTreeSet<String> = BTreeSet::new();

    for (id, node) in &nodes {
        let class = node
            .get("class_type")
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        let Some(inputs) = node.get("inputs").and_then(Value::as_object) else {
            continue;
        };

        for (input_name, value) in inputs {
            if value.is_null() {
                report.warnings.push(HealthFinding {
                    kind: FindingKind::NullInput,
                    message: format!("Node {} ({}) has null input '{}'", id, class, input_name),
                    node_id: Some(id.to_string()),
                    node_class: Some(class.to_string()),
                    input_name: Some(input_name.clone()),
                });
            }

            // A link is [source_node_id, output_slot]
            if let Some(link) = value.as_array().filter(|l| l.len() == 2) {
                connected.insert(id_key(&link[0]));
                connected.insert(id.to_string());
            }
        }
    }

    for (id, node) in &nodes {
        if connected.contains(id.as_str()) {
            continue;
        }
        let class = node.get("class_type").and_then(Value::as_str).unwrap_or("");
        if !SOURCE_NODE_CLASSES.contains(&class) {
            report.warnings.push(HealthFinding::orphan(id, class));
        }
    }

    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_workflow_is_unhealthy() {
        let report = check_workflow_health(&json!({}));
        assert!(!report.healthy);
        assert_eq!(report.issues[0].kind, FindingKind::EmptyWorkflow);
    }

    #[test]
    fn test_api_format_connected_graph_is_healthy() {
        let workflow = json!({
            "3": {"class_type": "KSampler", "inputs": {"model": ["4", 0], "seed": 1}},
            "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "sd15.safetensors"}},
            "8": {"class_type": "VAEDecode", "inputs": {"samples": ["3", 0], "vae": ["4", 2]}}
        });
        let report = check_workflow_health(&workflow);
        assert!(report.healthy);
        assert_eq!(report.node_count, 3);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.summary, "Workflow looks healthy (3 nodes)");
    }

    #[test]
    fn test_api_format_null_input_and_orphan() {
        let workflow = json!({
            "prompt": {
                "1": {"class_type": "SaveImage", "inputs": {"images": null}},
                "2": {"class_type": "LoadImage", "inputs": {"image": "a.png"}}
            }
        });
        let report = check_workflow_health(&workflow);
        assert!(report.healthy);
        let kinds: Vec<FindingKind> = report.warnings.iter().map(|w| w.kind).collect();
        assert!(kinds.contains(&FindingKind::NullInput));
        // SaveImage is an orphan; LoadImage is exempt
        let orphans: Vec<&str> = report
            .warnings
            .iter()
            .filter(|w| w.kind == FindingKind::OrphanNode)
            .filter_map(|w| w.node_id.as_deref())
            .collect();
        assert_eq!(orphans, vec!["1"]);
    }

    #[test]
    fn test_ui_format_orphans() {
        let workflow = json!({
            "workflow": {
                "nodes": [
                    {"id": 1, "type": "CheckpointLoaderSimple"},
                    {"id": 2, "type": "PreviewImage"},
                    {"id": 3, "type": "VAEDecode"},
                    {"id": 9, "type": "Note"}
                ],
                "links": [[1, 1, 2, 3, 0, "VAE"]]
            }
        });
        let report = check_workflow_health(&workflow);
        assert_eq!(report.node_count, 4);
        let orphan_ids: Vec<&str> = report.warnings.iter().filter_map(|w| w.node_id.as_deref()).collect();
        assert_eq!(orphan_ids, vec!["2", "9"]);
        assert_eq!(report.summary, "2 warning(s) found (4 nodes)");
    }

    #[test]
    fn test_no_nodes() {
        let report = check_workflow_health(&json!({"nodes": [], "links": []}));
        assert_eq!(report.warnings[0].kind, FindingKind::NoNodes);
        assert_eq!(report.summary, "Workflow contains no nodes");
    }

    #[test]
    fn test_report_caps_warnings() {
        let mut nodes = serde_json::Map::new();
        for i in 0..12 {
            nodes.insert(i.to_string(), json!({"class_type": "PreviewImage", "inputs": {}}));
        }
        let report = check_workflow_health(&Value::Object(nodes));
        assert_eq!(report.warnings.len(), 12);
        let text = report.format_report();
        assert!(text.contains("... and 2 more"));
    }
}
