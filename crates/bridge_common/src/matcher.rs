//! First-match-wins pattern matching against the rule catalog.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::patterns::{DiagnosticRule, PatternCatalog, MATCH_PLACEHOLDER};

/// A rule hit with its rendered suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub rule_id: String,
    pub title: String,
    pub suggestion: String,
    pub matched_text: String,
}

/// Runs error text against a catalog in priority order
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    catalog: Arc<PatternCatalog>,
}

impl PatternMatcher {
    pub fn new(catalog: Arc<PatternCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Return the first rule (in catalog order) whose pattern occurs
    /// anywhere in `raw_text`.
    pub fn match_text(&self, raw_text: &str) -> Option<PatternMatch> {
        match_pattern(&self.catalog, raw_text)
    }
}

/// Match `raw_text` against `catalog`; first declared rule that hits wins
pub fn match_pattern(catalog: &PatternCatalog, raw_text: &str) -> Option<PatternMatch> {
    if raw_text.is_empty() {
        return None;
    }

    catalog
        .rules()
        .iter()
        .find_map(|rule| apply_rule(rule, raw_text))
}

fn apply_rule(rule: &DiagnosticRule, raw_text: &str) -> Option<PatternMatch> {
    let caps = rule.regex().captures(raw_text)?;
    let matched_text = caps.get(0).map(|m| m.as_str()).unwrap_or_default();

    let suggestion = match caps.get(1) {
        Some(group) if rule.suggestion.contains(MATCH_PLACEHOLDER) => {
            rule.suggestion.replace(MATCH_PLACEHOLDER, group.as_str())
        }
        _ => rule.suggestion.clone(),
    };

    Some(PatternMatch {
        rule_id: rule.id.clone(),
        title: rule.title.clone(),
        suggestion,
        matched_text: matched_text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{RuleSource, RuleSpec};

    fn rule(id: &str, pattern: &str, suggestion: &str) -> DiagnosticRule {
        DiagnosticRule::compile(
            RuleSpec {
                id: id.to_string(),
                pattern: pattern.to_string(),
                title: format!("{} title", id),
                suggestion: suggestion.to_string(),
            },
            RuleSource::Builtin,
        )
        .unwrap()
    }

    #[test]
    fn test_module_not_found_substitutes_module() {
        let catalog = PatternCatalog::builtin();
        let hit = match_pattern(&catalog, "ModuleNotFoundError: No module named 'cv2'").unwrap();
        assert_eq!(hit.rule_id, "module_not_found");
        assert!(hit.suggestion.contains("cv2"));
        assert_eq!(hit.suggestion, "Install the missing module with: `pip install cv2`");
        assert_eq!(hit.matched_text, "ModuleNotFoundError: No module named 'cv2'");
    }

    #[test]
    fn test_first_match_wins() {
        let catalog = PatternCatalog::from_rules(vec![
            rule("first", "boom", "first suggestion"),
            rule("second", "boom", "second suggestion"),
        ]);
        let hit = match_pattern(&catalog, "a boom happened").unwrap();
        assert_eq!(hit.rule_id, "first");
    }

    #[test]
    fn test_declared_order_beats_specificity() {
        // "dimension" is a broad rule declared before the ControlNet one
        let catalog = PatternCatalog::builtin();
        let hit = match_pattern(&catalog, "control hint dimension is wrong").unwrap();
        assert_eq!(hit.rule_id, "dimension_mismatch");
    }

    #[test]
    fn test_case_insensitive_match() {
        let catalog = PatternCatalog::builtin();
        let hit = match_pattern(&catalog, "RuntimeError: cuda OUT OF MEMORY. Tried to allocate").unwrap();
        assert_eq!(hit.rule_id, "cuda_oom");
    }

    #[test]
    fn test_template_without_placeholder_left_as_is() {
        let catalog = PatternCatalog::from_rules(vec![rule("grp", r"bad (\w+)", "plain advice")]);
        let hit = match_pattern(&catalog, "bad thing").unwrap();
        assert_eq!(hit.suggestion, "plain advice");
    }

    #[test]
    fn test_every_placeholder_substituted() {
        let catalog = PatternCatalog::from_rules(vec![rule(
            "pkg",
            r"missing package (\w+)",
            "Run `pip install {match}`, then check that {match} imports.",
        )]);
        let hit = match_pattern(&catalog, "missing package einops").unwrap();
        assert_eq!(
            hit.suggestion,
            "Run `pip install einops`, then check that einops imports."
        );
    }

    #[test]
    fn test_pattern_without_group_keeps_placeholder() {
        let catalog = PatternCatalog::from_rules(vec![rule("nogrp", r"bad thing", "fix {match}")]);
        let hit = match_pattern(&catalog, "bad thing").unwrap();
        assert_eq!(hit.suggestion, "fix {match}");
    }

    #[test]
    fn test_no_match_returns_none() {
        let catalog = PatternCatalog::builtin();
        assert!(match_pattern(&catalog, "Prompt executed in 2.31 seconds").is_none());
        assert!(match_pattern(&catalog, "").is_none());
    }

    #[test]
    fn test_matcher_wraps_catalog() {
        let matcher = PatternMatcher::new(Arc::new(PatternCatalog::builtin()));
        let hit = matcher.match_text("KeyError: 'clip_vision'").unwrap();
        assert_eq!(hit.rule_id, "key_error");
        assert!(hit.suggestion.contains("'clip_vision'"));
    }
}
