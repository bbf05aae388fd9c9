//! Integration tests for the Opgraph CLI
//!
//! These tests run the actual CLI binary and verify output. Each test
//! points storage and the config directory at its own temp dir.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the binary to test, isolated under `dir`
fn opgraph_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("opgraph").unwrap();
    cmd.env("OPGRAPH_STORAGE_ROOT", dir.path().join("history"))
        .env("XDG_CONFIG_HOME", dir.path().join("config"))
        .env("NO_COLOR", "1")
        .env_remove("OPGRAPH_TIMEZONE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_flag() {
    let dir = TempDir::new().unwrap();
    opgraph_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("typed operator graph runner"));
}

#[test]
fn test_validate_default_job() {
    let dir = TempDir::new().unwrap();
    opgraph_cmd(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Job 'clean_string' is valid"))
        .stdout(predicate::str::contains(
            "get_string → normalize_string → clean_string",
        ));
}

// ============================================================================
// run / inspect
// ============================================================================

#[test]
fn test_run_writes_artifacts_under_run_id() {
    let dir = TempDir::new().unwrap();
    opgraph_cmd(&dir)
        .args(["run", "--run-id", "cli-run-1", "--tag", "origin=test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SUCCEEDED"))
        .stdout(predicate::str::contains("clean_string.sent_clean"));

    let artifact = dir
        .path()
        .join("history")
        .join("cli-run-1")
        .join("clean_string.sent_clean.json");
    let content = fs::read_to_string(artifact).unwrap();
    assert_eq!(content, "\"A   OR      ALPHA\"");
}

#[test]
fn test_inspect_shows_stored_values_and_trace() {
    let dir = TempDir::new().unwrap();
    opgraph_cmd(&dir)
        .args(["run", "--run-id", "inspected", "--trace"])
        .assert()
        .success();

    opgraph_cmd(&dir)
        .args(["inspect", "inspected"])
        .assert()
        .success()
        .stdout(predicate::str::contains("normalize_string.sent_norm"))
        .stdout(predicate::str::contains("A#$.OR?>)(*@ALPHA"))
        .stdout(predicate::str::contains("run_succeeded"));
}

#[test]
fn test_inspect_unknown_run_fails_without_creating_it() {
    let dir = TempDir::new().unwrap();
    opgraph_cmd(&dir)
        .args(["inspect", "no-such-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPG-034"));

    assert!(!dir.path().join("history").join("no-such-run").exists());
}

#[test]
fn test_forced_error_exits_non_zero() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("run.yaml");
    fs::write(
        &config,
        format!(
            r#"
ops:
  get_string:
    config: {{ data_key: "1" }}
  normalize_string:
    config: {{ norm: upper, force_error: true }}
resources:
  connection:
    config: {{ credentials: HORRIBLE_PASSWORD }}
  paths:
    config: {{ basedir: "{}" }}
"#,
            dir.path().join("history").display()
        ),
    )
    .unwrap();

    opgraph_cmd(&dir)
        .args(["run", "--run-id", "broken", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stdout(predicate::str::contains("normalize_string"));

    assert!(!dir
        .path()
        .join("history")
        .join("broken")
        .join("clean_string.sent_clean.json")
        .exists());
}

#[test]
fn test_invalid_config_reports_fix() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.yaml");
    fs::write(&config, "ops:\n  get_string:\n    config: { data_key: 1 }\n").unwrap();

    opgraph_cmd(&dir)
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_bad_tag_is_rejected_by_parser() {
    let dir = TempDir::new().unwrap();
    opgraph_cmd(&dir)
        .args(["run", "--tag", "no-equals-sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

#[test]
fn test_schedule_rejects_unknown_timezone() {
    let dir = TempDir::new().unwrap();
    opgraph_cmd(&dir)
        .args(["schedule", "--timezone", "Mars/Olympus", "--max-runs", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown timezone"));
}
