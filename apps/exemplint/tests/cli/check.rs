//! Check subcommand tests

use super::{repo_with_skill, write};
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_check_reports_blocking_call() {
    let repo = repo_with_skill();
    let root = repo.path();
    write(
        root,
        "src/app.py",
        "import time\n\nasync def handler():\n    time.sleep(5)\n",
    );

    cargo_bin_cmd!("exemplint")
        .env("NO_COLOR", "1")
        .args(["check", "--no-cache", "--repo-root", root.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "src/app.py:4-4: [warn] python.blocking-call-in-async.time.sleep: blocking call inside async function: time.sleep (Async Endpoints: Never block the event loop inside async handlers.)",
        ))
        .stderr(predicate::str::contains("summary: errors=0 warnings=1"));
}

#[test]
fn test_check_error_finding_exits_one() {
    let repo = repo_with_skill();
    let root = repo.path();
    write(
        root,
        "src/db.py",
        "def find(cursor, uid):\n    q = f\"SELECT * FROM users WHERE id = {uid}\"\n    return cursor.execute(q)\n",
    );

    cargo_bin_cmd!("exemplint")
        .env("NO_COLOR", "1")
        .args(["check", "--no-cache", "--repo-root", root.to_str().unwrap()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "src/db.py:3-3: [error] python.interpolated-sink.execute",
        ));
}

#[test]
fn test_check_min_severity_filters_findings() {
    let repo = repo_with_skill();
    let root = repo.path();
    write(root, "src/app.py", "async def h():\n    time.sleep(5)\n");

    cargo_bin_cmd!("exemplint")
        .args([
            "check",
            "--no-cache",
            "--min-severity",
            "error",
            "--repo-root",
            root.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_check_json_output_and_cache() {
    let repo = repo_with_skill();
    let root = repo.path();
    write(root, "src/app.py", "async def h():\n    time.sleep(5)\n");

    let out = cargo_bin_cmd!("exemplint")
        .args(["check", "--output", "json", "--repo-root", root.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["summary"]["warnings"], 1);
    assert_eq!(v["findings"][0]["path"], "src/app.py");

    let cached: Vec<_> = std::fs::read_dir(root.join(".exemplint/cache"))
        .unwrap()
        .flatten()
        .collect();
    assert_eq!(cached.len(), 1);

    // A second run is served from the cache and reports the same thing.
    let again = cargo_bin_cmd!("exemplint")
        .args(["check", "--output", "json", "--repo-root", root.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(out, again);
}

#[test]
fn test_check_github_output() {
    let repo = repo_with_skill();
    let root = repo.path();
    write(root, "src/app.py", "async def h():\n    time.sleep(5)\n");

    cargo_bin_cmd!("exemplint")
        .args([
            "check",
            "--no-cache",
            "--output",
            "github",
            "--repo-root",
            root.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "::warning file=src/app.py,line=2,endLine=2,title=python.blocking-call-in-async.time.sleep::",
        ));
}

#[test]
fn test_check_custom_rule_from_config() {
    let repo = repo_with_skill();
    let root = repo.path();
    write(
        root,
        "exemplint.toml",
        "[[custom]]\nid = \"python.print\"\nlanguage = \"python\"\npattern = '\\bprint\\('\nmessage = \"use logging\"\nseverity = \"error\"\n",
    );
    write(root, "src/app.py", "x = 1\nprint(x)\n");

    cargo_bin_cmd!("exemplint")
        .env("NO_COLOR", "1")
        .args(["check", "--no-cache", "--repo-root", root.to_str().unwrap()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "src/app.py:2-2: [error] python.print: use logging",
        ));
}

#[test]
fn test_check_without_documents_is_tool_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".git")).unwrap();

    cargo_bin_cmd!("exemplint")
        .args(["check", "--repo-root", dir.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("registry build failed"));
}

#[test]
fn test_check_invalid_output_mode_is_tool_failure() {
    let repo = repo_with_skill();
    cargo_bin_cmd!("exemplint")
        .args([
            "check",
            "--output",
            "xml",
            "--repo-root",
            repo.path().to_str().unwrap(),
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown output mode"));
}

#[test]
fn test_check_skips_undecodable_document() {
    let repo = repo_with_skill();
    let root = repo.path();
    std::fs::write(root.join("skills/broken.md"), [0xffu8, 0xfe, 0x0a]).unwrap();
    write(root, "src/app.py", "async def h():\n    time.sleep(5)\n");

    cargo_bin_cmd!("exemplint")
        .env("NO_COLOR", "1")
        .args(["check", "--no-cache", "--repo-root", root.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "src/app.py:2-2: [warn] python.blocking-call-in-async.time.sleep",
        ))
        .stderr(predicate::str::contains(
            "warning: document skipped: skills/broken.md",
        ));
}
