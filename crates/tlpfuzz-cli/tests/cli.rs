//! Drives the `tlpfuzz` binary end to end.

#![allow(deprecated)] // Command::cargo_bin

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tlpfuzz(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tlpfuzz").unwrap();
    cmd.current_dir(project)
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "warn")
        .args(["--no-user-config", "--project"])
        .arg(project);
    cmd
}

// ============================================================================
// Informational commands
// ============================================================================

#[test]
fn version_command_succeeds() {
    let temp = TempDir::new().unwrap();
    tlpfuzz(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tlpfuzz"));
}

#[test]
fn help_describes_the_tool() {
    Command::cargo_bin("tlpfuzz")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ternary logic partitioning"));
}

#[test]
fn run_help_lists_overrides() {
    Command::cargo_bin("tlpfuzz")
        .unwrap()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--seed"))
        .stdout(predicate::str::contains("--oracle"))
        .stdout(predicate::str::contains("--target"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn config_init_writes_defaults_once() {
    let temp = TempDir::new().unwrap();
    tlpfuzz(temp.path())
        .args(["config", "init"])
        .assert()
        .success();
    let written = fs::read_to_string(temp.path().join("tlpfuzz.toml")).unwrap();
    assert!(written.contains("[session]"));
    assert!(written.contains("[oracle]"));

    tlpfuzz(temp.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    tlpfuzz(temp.path())
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn config_show_reflects_project_file() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("tlpfuzz.toml"),
        "[session]\nseed = 77\n\n[oracle]\noracles = [\"norec\"]\n",
    )
    .unwrap();

    tlpfuzz(temp.path())
        .args(["config", "show", "--format", "toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("seed = 77"));
    tlpfuzz(temp.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("norec"));

    let output = tlpfuzz(temp.path())
        .args(["config", "show", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["session"]["seed"], 77);
}

#[test]
fn config_show_rejects_unknown_format() {
    let temp = TempDir::new().unwrap();
    tlpfuzz(temp.path())
        .args(["config", "show", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format"));
}

#[test]
fn config_validate_names_the_bad_key() {
    let temp = TempDir::new().unwrap();
    tlpfuzz(temp.path())
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));

    fs::write(
        temp.path().join("tlpfuzz.toml"),
        "[oracle]\nmax_attempts = 0\n",
    )
    .unwrap();
    tlpfuzz(temp.path())
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("oracle.max_attempts"));
}

// ============================================================================
// Run
// ============================================================================

#[test]
fn run_writes_session_summary() {
    let temp = TempDir::new().unwrap();
    tlpfuzz(temp.path())
        .args(["run", "--seed", "5", "--steps", "8", "--oracle", "where,norec"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TLP_WHERE"))
        .stdout(predicate::str::contains("NOREC"));

    let summary = fs::read_to_string(temp.path().join("tlpfuzz-out/session.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&summary).unwrap();
    assert_eq!(json["stats"]["seed"], 5);
    assert_eq!(json["stats"]["steps"], 8);
}

#[test]
fn run_json_report_is_parseable() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("elsewhere");
    let output = tlpfuzz(temp.path())
        .args(["run", "--seed", "9", "--steps", "4", "--oracle", "distinct", "--json"])
        .arg("--output")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stats"]["seed"], 9);
    assert!(report["coverage"].is_null());
    assert!(out.join("session.json").exists());
}

#[test]
fn run_rejects_unknown_oracle() {
    let temp = TempDir::new().unwrap();
    tlpfuzz(temp.path())
        .args(["run", "--steps", "1", "--oracle", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown oracle"));
}

// ============================================================================
// Coverage
// ============================================================================

#[test]
fn coverage_summarizes_saved_map() {
    let temp = TempDir::new().unwrap();
    let mut bytes = vec![0u8; 256];
    bytes[3] = 5;
    bytes[200] = 9;
    let path = temp.path().join("coverage.map");
    fs::write(&path, &bytes).unwrap();

    tlpfuzz(temp.path())
        .arg("coverage")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Hit edges:    2/256"))
        .stdout(predicate::str::contains("200"));

    let output = tlpfuzz(temp.path())
        .arg("coverage")
        .arg(&path)
        .args(["--json", "--top", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["hit_edges"], 2);
    assert_eq!(json["top_edges"].as_array().unwrap().len(), 1);
    assert_eq!(json["top_edges"][0]["edge"], 200);
}

#[test]
fn coverage_rejects_missing_or_empty_map() {
    let temp = TempDir::new().unwrap();
    tlpfuzz(temp.path())
        .args(["coverage", "missing.map"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading coverage map"));

    fs::write(temp.path().join("empty.map"), b"").unwrap();
    tlpfuzz(temp.path())
        .args(["coverage", "empty.map"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is empty"));
}
