//! Tests for loading external diagnostic rules and matching against them.
//!
//! Tests verify:
//! - External rules follow the built-ins, file by file in name order
//! - Malformed files and bad patterns are skipped, not fatal
//! - Built-in rules keep priority over external ones

use bridge_common::matcher::PatternMatcher;
use bridge_common::patterns::{PatternCatalog, RuleSource};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn write_rules(dir: &TempDir, name: &str, content: &str) {
    fs::write(dir.path().join(name), content).unwrap();
}

#[test]
fn test_external_rules_appended_in_file_order() {
    let dir = TempDir::new().unwrap();
    write_rules(
        &dir,
        "b_rules.json",
        r#"[{"id": "from_b", "pattern": "sampler exploded", "title": "B", "suggestion": "b"}]"#,
    );
    write_rules(
        &dir,
        "a_rules.json",
        r#"[{"id": "from_a", "pattern": "sampler exploded", "title": "A", "suggestion": "a"}]"#,
    );

    let catalog = PatternCatalog::load(Some(dir.path()));
    assert_eq!(catalog.builtin_count(), 20);
    assert_eq!(catalog.len(), 22);
    assert_eq!(catalog.rules()[20].id, "from_a");
    assert_eq!(catalog.rules()[21].id, "from_b");
    assert_eq!(
        catalog.rules()[20].source,
        RuleSource::External(dir.path().join("a_rules.json"))
    );

    let matcher = PatternMatcher::new(Arc::new(catalog));
    let hit = matcher.match_text("KSampler: sampler exploded at step 3").unwrap();
    assert_eq!(hit.rule_id, "from_a");
}

#[test]
fn test_bad_files_and_patterns_skipped() {
    let dir = TempDir::new().unwrap();
    write_rules(&dir, "broken.json", "{ this is not json");
    write_rules(&dir, "object.json", r#"{"id": "x", "pattern": "y"}"#);
    write_rules(
        &dir,
        "mixed.json",
        r#"[
            {"id": "bad_regex", "pattern": "(unclosed", "title": "Bad"},
            {"pattern": "mystery failure"}
        ]"#,
    );
    write_rules(&dir, "notes.txt", r#"[{"id": "ignored", "pattern": "x"}]"#);

    let catalog = PatternCatalog::load(Some(dir.path()));
    assert_eq!(catalog.len(), 21);
    assert!(catalog.get("bad_regex").is_none());
    assert!(catalog.get("ignored").is_none());

    let defaulted = &catalog.rules()[20];
    assert_eq!(defaulted.id, "unknown");
    assert_eq!(defaulted.title, "Unknown Error");
    assert_eq!(defaulted.suggestion, "");
}

#[test]
fn test_missing_rules_dir_gives_builtins() {
    let dir = TempDir::new().unwrap();
    let catalog = PatternCatalog::load(Some(&dir.path().join("does-not-exist")));
    assert_eq!(catalog.len(), 20);
    assert_eq!(PatternCatalog::load(None).len(), 20);
}

#[test]
fn test_builtin_wins_over_external() {
    let dir = TempDir::new().unwrap();
    write_rules(
        &dir,
        "oom.json",
        r#"[{"id": "my_oom", "pattern": "out of memory", "title": "Mine", "suggestion": "buy a GPU"}]"#,
    );

    let matcher = PatternMatcher::new(Arc::new(PatternCatalog::load(Some(dir.path()))));
    let hit = matcher
        .match_text("torch.cuda.OutOfMemoryError: CUDA out of memory. Tried to allocate 2.00 GiB")
        .unwrap();
    assert_eq!(hit.rule_id, "cuda_oom");

    let hit = matcher.match_text("host ran out of memory").unwrap();
    assert_eq!(hit.rule_id, "my_oom");
    assert_eq!(hit.suggestion, "buy a GPU");
}
