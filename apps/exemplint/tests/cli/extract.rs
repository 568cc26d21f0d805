//! Extract subcommand tests

use super::FASTAPI_SKILL;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_extract_lists_exemplars() {
    let temp_dir = TempDir::new().unwrap();
    let doc = temp_dir.path().join("SKILL.md");
    fs::write(&doc, FASTAPI_SKILL).unwrap();

    cargo_bin_cmd!("exemplint")
        .args(["extract", doc.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("fastapi-expert\n"))
        .stdout(predicate::str::contains("#1 Bad python line 13 (Async Endpoints)"))
        .stdout(predicate::str::contains("#4 Good python"));
}

#[test]
fn test_extract_json_reports_unterminated_fence() {
    let temp_dir = TempDir::new().unwrap();
    let doc = temp_dir.path().join("broken.md");
    fs::write(&doc, "# Broken\n\n❌ BAD\n```python\nx = []\n").unwrap();

    let out = cargo_bin_cmd!("exemplint")
        .args(["extract", "--output", "json", doc.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["title"], "Broken");
    assert_eq!(v["examples"].as_array().unwrap().len(), 0);
    assert_eq!(v["diagnostics"][0]["kind"], "extraction_warning");
    assert_eq!(v["diagnostics"][0]["line"], 4);
}

#[test]
fn test_extract_missing_file_fails() {
    cargo_bin_cmd!("exemplint")
        .args(["extract", "does-not-exist.md"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot read"));
}
