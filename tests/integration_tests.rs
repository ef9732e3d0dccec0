//! Integration tests for the Scrutiny CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Test CLI binary exists and responds to --help
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("code analysis engine"));
}

/// Test CLI responds to --version
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scrutiny"));
}

/// Test invalid subcommand shows error
#[test]
fn test_invalid_subcommand() {
    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test routines listing includes the built-in set
#[test]
fn test_routines_listing() {
    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.arg("routines")
        .assert()
        .success()
        .stdout(predicate::str::contains("todo-markers"))
        .stdout(predicate::str::contains("conflict-markers"))
        .stdout(predicate::str::contains("hardcoded-secrets"));
}

/// Analyzing a workspace with leftover markers reports them as JSON
#[test]
fn test_analyze_finds_todo_markers() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("app.py"),
        "def handler():\n    # TODO: validate input\n    return 1\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.current_dir(temp_dir.path())
        .args(["analyze", "--format", "json", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("todo-markers"))
        .stdout(predicate::str::contains("'TODO' marker left in code"));
}

/// Unresolved conflict markers are errors and fail the run
#[test]
fn test_analyze_conflict_markers_fail_the_run() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("merged.rs"),
        "fn main() {}\n<<<<<<< HEAD\nlet a = 1;\n=======\nlet a = 2;\n>>>>>>> feature\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.current_dir(temp_dir.path())
        .args(["analyze", "."])
        .assert()
        .failure()
        .stdout(predicate::str::contains("merge-conflict"));
}

/// An empty workspace analyzes cleanly
#[test]
fn test_analyze_empty_workspace() {
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.current_dir(temp_dir.path())
        .args(["analyze", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("no findings"));
}

/// Configuration file restricts which routines run
#[test]
fn test_config_restricts_routines() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("scrutiny.toml"),
        "[engine]\nroutines = [\"long-lines\"]\n",
    )
    .unwrap();
    // Clean except for a TODO that the restricted run must ignore
    fs::write(
        temp_dir.path().join("lib.rs"),
        "// TODO: never reported under this config\nfn ok() {}\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.current_dir(temp_dir.path())
        .args([
            "analyze",
            "--format",
            "json",
            "--config",
            "scrutiny.toml",
            ".",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("todo-markers").not());
}

/// The inline execution strategy yields the same findings surface
#[test]
fn test_analyze_inline_mode() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.js"), "console.log('debug');\n").unwrap();

    let mut cmd = Command::cargo_bin("scrutiny").unwrap();
    cmd.current_dir(temp_dir.path())
        .args(["analyze", "--mode", "inline", "--format", "json", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("debug-prints"));
}
