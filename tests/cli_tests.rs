//! CLI-level tests for the lathe binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn lathe() -> Command {
    cargo_bin_cmd!("lathe")
}

#[test]
fn help_lists_subcommands() {
    lathe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn version_prints() {
    lathe().arg("--version").assert().success();
}

#[test]
fn status_without_runs_says_so() {
    let dir = TempDir::new().unwrap();
    lathe()
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs yet"));
}

#[test]
fn status_honors_project_dir_flag() {
    let dir = TempDir::new().unwrap();
    lathe()
        .args(["--project-dir", dir.path().to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs yet"));
}

#[test]
fn run_with_unreachable_oracle_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    // Point the oracle command at something that does not exist
    std::fs::write(
        dir.path().join("lathe.toml"),
        "[oracle]\ncommand = \"definitely-not-a-real-oracle-cmd\"\n",
    )
    .unwrap();

    lathe()
        .current_dir(dir.path())
        .args(["run", "a tree"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("lathe.toml"), "oracle = 3").unwrap();

    lathe()
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("lathe.toml"));
}
