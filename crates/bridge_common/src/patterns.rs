//! Diagnostic rule catalog.
//!
//! Built-in rules come first, in declared order, followed by rules read
//! from `*.json` files in an optional rules directory. The order is the
//! match priority: the matcher returns the first rule that hits.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

/// Placeholder replaced by the first capture group of a matching rule
pub const MATCH_PLACEHOLDER: &str = "{match}";

/// Extension of external rule files
pub const RULE_FILE_EXTENSION: &str = "json";

/// Rule as written in an external rule file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default = "default_rule_id")]
    pub id: String,
    pub pattern: String,
    #[serde(default = "default_rule_title")]
    pub title: String,
    #[serde(default)]
    pub suggestion: String,
}

fn default_rule_id() -> String {
    "unknown".to_string()
}

fn default_rule_title() -> String {
    "Unknown Error".to_string()
}

/// Where a rule came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Builtin,
    External(PathBuf),
}

/// A compiled diagnostic rule
#[derive(Debug, Clone)]
pub struct DiagnosticRule {
    pub id: String,
    pub title: String,
    pub suggestion: String,
    pub source: RuleSource,
    regex: Regex,
}

impl DiagnosticRule {
    /// Compile a rule. Patterns always match case-insensitively.
    pub fn compile(spec: RuleSpec, source: RuleSource) -> Result<Self> {
        let regex = RegexBuilder::new(&spec.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| BridgeError::invalid_regex(&spec.pattern, &e))?;

        Ok(Self {
            id: spec.id,
            title: spec.title,
            suggestion: spec.suggestion,
            source,
            regex,
        })
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

struct BuiltinRule {
    id: &'static str,
    pattern: &'static str,
    title: &'static str,
    suggestion: &'static str,
}

const BUILTIN_RULES: &[BuiltinRule] = &[
    BuiltinRule {
        id: "cuda_oom",
        pattern: r"CUDA out of memory",
        title: "CUDA Out of Memory",
        suggestion: "Try reducing batch size, image resolution, or enable CPU offloading. You can also try `--lowvram` or `--cpu` flags when starting ComfyUI.",
    },
    BuiltinRule {
        id: "mps_oom",
        pattern: r"MPS backend out of memory",
        title: "MPS Out of Memory (Apple Silicon)",
        suggestion: "Reduce image resolution or batch size. Consider using `--force-fp16` to reduce memory usage.",
    },
    BuiltinRule {
        id: "module_not_found",
        pattern: r"ModuleNotFoundError: No module named '(\w+)'",
        title: "Missing Python Module",
        suggestion: "Install the missing module with: `pip install {match}`",
    },
    BuiltinRule {
        id: "type_mismatch_fp16",
        pattern: r"expected .*(Float|Half).*got.*(Half|Float)",
        title: "Float Type Mismatch (fp16/fp32)",
        suggestion: "There's a data type conflict between nodes. Try adding a 'Convert' node or check model compatibility. Some models require fp16 while others need fp32.",
    },
    BuiltinRule {
        id: "dimension_mismatch",
        pattern: r"size mismatch|shape mismatch|dimension",
        title: "Tensor Dimension Mismatch",
        suggestion: "The tensor shapes don't match between connected nodes. Check that image resolutions and batch sizes are compatible throughout your workflow.",
    },
    BuiltinRule {
        id: "safetensors_error",
        pattern: r"safetensors.*error|Error loading.*\.safetensors",
        title: "SafeTensors Loading Error",
        suggestion: "The model file may be corrupted or incompatible. Try re-downloading the model or check if it's the correct format for this node.",
    },
    BuiltinRule {
        id: "file_not_found",
        pattern: r"FileNotFoundError|No such file or directory",
        title: "File Not Found",
        suggestion: "Check that the file path is correct and the file exists. For models, ensure they're in the correct ComfyUI models subdirectory.",
    },
    BuiltinRule {
        id: "key_error",
        pattern: r"KeyError: '(\w+)'",
        title: "Missing Key Error",
        suggestion: "The workflow expects a key '{match}' that doesn't exist. This often happens with incompatible model versions or missing workflow components.",
    },
    BuiltinRule {
        id: "attribute_error",
        pattern: r"AttributeError: '(\w+)' object has no attribute '(\w+)'",
        title: "Attribute Error",
        suggestion: "An object doesn't have the expected attribute. This may indicate version incompatibility between custom nodes or outdated code.",
    },
    BuiltinRule {
        id: "cudnn_error",
        pattern: r"cuDNN error|CUDNN_STATUS",
        title: "cuDNN Error",
        suggestion: "CUDA/cuDNN configuration issue. Try updating your NVIDIA drivers or reinstalling PyTorch with the correct CUDA version.",
    },
    BuiltinRule {
        id: "insightface_missing",
        pattern: r"insightface|buffalo_l",
        title: "InsightFace Not Installed",
        suggestion: "Install InsightFace with: `pip install insightface`. For face-related nodes, you may also need to download the 'buffalo_l' model.",
    },
    BuiltinRule {
        id: "controlnet_mismatch",
        pattern: r"ControlNet.*mismatch|control.*dimension",
        title: "ControlNet Model Mismatch",
        suggestion: "The ControlNet model doesn't match the base model. Ensure you're using a ControlNet trained for your specific base model (SD1.5, SDXL, etc.).",
    },
    BuiltinRule {
        id: "lora_incompatible",
        pattern: r"LoRA.*incompatible|lora.*key.*missing",
        title: "LoRA Incompatibility",
        suggestion: "The LoRA was trained for a different base model. Check that the LoRA matches your checkpoint (SD1.5 LoRA for SD1.5 model, etc.).",
    },
    BuiltinRule {
        id: "vae_decode_error",
        pattern: r"VAE.*decode|vae.*error",
        title: "VAE Decode Error",
        suggestion: "Try using a different VAE or the built-in VAE. Some models require specific VAE files for proper decoding.",
    },
    BuiltinRule {
        id: "invalid_prompt",
        pattern: r"invalid prompt|prompt.*json.*error",
        title: "Invalid Prompt Format",
        suggestion: "The workflow JSON is malformed. Check for missing connections or invalid node configurations.",
    },
    BuiltinRule {
        id: "connection_refused",
        pattern: r"Connection refused|ConnectionRefusedError",
        title: "Connection Refused",
        suggestion: "A network connection failed. If using external APIs, check your internet connection and API endpoint.",
    },
    BuiltinRule {
        id: "permission_denied",
        pattern: r"PermissionError|Permission denied",
        title: "Permission Denied",
        suggestion: "ComfyUI doesn't have permission to access this file or directory. Check file permissions or run ComfyUI with appropriate privileges.",
    },
    BuiltinRule {
        id: "torch_no_grad",
        pattern: r"element 0 of tensors does not require grad",
        title: "Gradient Computation Error",
        suggestion: "A node is trying to compute gradients on a tensor that doesn't require them. This is usually a node implementation issue.",
    },
    BuiltinRule {
        id: "animatediff_error",
        pattern: r"AnimateDiff|motion.*module",
        title: "AnimateDiff Error",
        suggestion: "Check that you have the correct motion module installed and it's compatible with your base model.",
    },
    BuiltinRule {
        id: "ipadapter_error",
        pattern: r"IPAdapter|ip.*adapter",
        title: "IPAdapter Error",
        suggestion: "Ensure IPAdapter models are in the correct directory and match your base model version.",
    },
];

/// Built-in rules, compiled once per process
static BUILTIN_CATALOG: LazyLock<Vec<DiagnosticRule>> = LazyLock::new(|| {
    BUILTIN_RULES
        .iter()
        .filter_map(|rule| {
            let spec = RuleSpec {
                id: rule.id.to_string(),
                pattern: rule.pattern.to_string(),
                title: rule.title.to_string(),
                suggestion: rule.suggestion.to_string(),
            };
            match DiagnosticRule::compile(spec, RuleSource::Builtin) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!("Built-in rule {} failed to compile: {}", rule.id, e);
                    None
                }
            }
        })
        .collect()
});

/// Ordered, immutable set of diagnostic rules
#[derive(Debug, Clone)]
pub struct PatternCatalog {
    rules: Vec<DiagnosticRule>,
}

impl PatternCatalog {
    /// Built-in rules only
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_CATALOG.clone(),
        }
    }

    /// Built-in rules followed by every well-formed rule in `rules_dir`.
    ///
    /// A missing directory, an unreadable file, a malformed file or a rule
    /// whose pattern does not compile is skipped; the load itself never
    /// fails.
    pub fn load(rules_dir: Option<&Path>) -> Self {
        let mut catalog = Self::builtin();

        if let Some(dir) = rules_dir {
            let external = load_rules_dir(dir);
            if !external.is_empty() {
                info!("Loaded {} custom rules from {}", external.len(), dir.display());
            }
            catalog.rules.extend(external);
        }

        catalog
    }

    pub fn from_rules(rules: Vec<DiagnosticRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[DiagnosticRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&DiagnosticRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn builtin_count(&self) -> usize {
        self.rules
            .iter()
            .filter(|r| r.source == RuleSource::Builtin)
            .count()
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Read all rule files in a directory, sorted by file name
fn load_rules_dir(dir: &Path) -> Vec<DiagnosticRule> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No custom rules at {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(RULE_FILE_EXTENSION)
        })
        .collect();
    files.sort();

    let mut rules = Vec::new();
    for path in files {
        let specs = match read_rule_file(&path) {
            Ok(specs) => specs,
            Err(e) => {
                warn!("Skipping rule file: {}", e);
                continue;
            }
        };

        for spec in specs {
            let id = spec.id.clone();
            match DiagnosticRule::compile(spec, RuleSource::External(path.clone())) {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!("Skipping rule {} in {}: {}", id, path.display(), e),
            }
        }
    }

    rules
}

/// Parse one rule file. The file must hold a JSON array of rules.
pub fn read_rule_file(path: &Path) -> Result<Vec<RuleSpec>> {
    let content = fs::read_to_string(path).map_err(|e| BridgeError::rule_file(path, e))?;
    serde_json::from_str::<Vec<RuleSpec>>(&content).map_err(|e| BridgeError::rule_file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_rules_compile() {
        let catalog = PatternCatalog::builtin();
        assert_eq!(catalog.len(), BUILTIN_RULES.len());
        assert_eq!(catalog.builtin_count(), 20);
    }

    #[test]
    fn test_builtin_order_is_declared_order() {
        let catalog = PatternCatalog::builtin();
        let ids: Vec<&str> = catalog.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids[0], "cuda_oom");
        assert_eq!(ids[2], "module_not_found");
        assert_eq!(ids[19], "ipadapter_error");
    }

    #[test]
    fn test_compile_is_case_insensitive() {
        let spec = RuleSpec {
            id: "x".to_string(),
            pattern: "out of memory".to_string(),
            title: "t".to_string(),
            suggestion: "s".to_string(),
        };
        let rule = DiagnosticRule::compile(spec, RuleSource::Builtin).unwrap();
        assert!(rule.regex().is_match("CUDA OUT OF MEMORY"));
    }

    #[test]
    fn test_compile_rejects_bad_pattern() {
        let spec = RuleSpec {
            id: "bad".to_string(),
            pattern: "(unclosed".to_string(),
            title: "t".to_string(),
            suggestion: "s".to_string(),
        };
        let err = DiagnosticRule::compile(spec, RuleSource::Builtin).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRegex { .. }));
    }

    #[test]
    fn test_rule_spec_defaults() {
        let specs: Vec<RuleSpec> = serde_json::from_str(r#"[{"pattern": "boom"}]"#).unwrap();
        assert_eq!(specs[0].id, "unknown");
        assert_eq!(specs[0].title, "Unknown Error");
        assert_eq!(specs[0].suggestion, "");
    }

    #[test]
    fn test_missing_dir_yields_builtins() {
        let catalog = PatternCatalog::load(Some(Path::new("/nonexistent/bridge/patterns")));
        assert_eq!(catalog.len(), 20);
    }
}
