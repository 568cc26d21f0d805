//! Cross-cutting CLI tests (help, version, error handling)

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help() {
    cargo_bin_cmd!("exemplint")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "synthesizes lint rules from the BAD ones",
        ))
        .stdout(predicate::str::contains("Configuration precedence"));
}

#[test]
fn test_short_help() {
    cargo_bin_cmd!("exemplint")
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("GOOD/BAD exemplars"));
}

#[test]
fn test_version() {
    cargo_bin_cmd!("exemplint")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_subcommand() {
    cargo_bin_cmd!("exemplint")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_subcommand() {
    cargo_bin_cmd!("exemplint")
        .arg("invalid")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
