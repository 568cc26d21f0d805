//! Rules and cache subcommand tests

use super::repo_with_skill;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_rules_lists_synthesized_rules() {
    let repo = repo_with_skill();
    cargo_bin_cmd!("exemplint")
        .args(["rules", "--repo-root", repo.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("python.blocking-call-in-async.time.sleep [warn]"))
        .stdout(predicate::str::contains("python.interpolated-sink.execute [error]"))
        .stderr(predicate::str::contains("2 rules"));
}

#[test]
fn test_rules_filtered_by_language() {
    let repo = repo_with_skill();
    cargo_bin_cmd!("exemplint")
        .args([
            "rules",
            "--language",
            "typescript",
            "--repo-root",
            repo.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("0 rules"));
}

#[test]
fn test_cache_prune() {
    let repo = repo_with_skill();
    let root = repo.path().to_str().unwrap();
    cargo_bin_cmd!("exemplint")
        .args(["rules", "--repo-root", root])
        .assert()
        .success();
    cargo_bin_cmd!("exemplint")
        .args(["cache", "prune", "--repo-root", root])
        .assert()
        .success()
        .stderr(predicate::str::contains("removed 1 cached registry"));
}
