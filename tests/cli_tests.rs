//! Integration tests for the CLI surface.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_commands() {
    let mut cmd = Command::cargo_bin("provender").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("billing"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn no_arguments_requires_a_subcommand() {
    let mut cmd = Command::cargo_bin("provender").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn provision_help_documents_flags() {
    let mut cmd = Command::cargo_bin("provender").unwrap();
    cmd.arg("provision")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--prefix"))
        .stdout(predicate::str::contains("--billing-account"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn invalid_subcommand_fails() {
    let mut cmd = Command::cargo_bin("provender").unwrap();
    cmd.arg("harvest")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn count_must_be_numeric() {
    let mut cmd = Command::cargo_bin("provender").unwrap();
    cmd.arg("provision")
        .arg("-n")
        .arg("several")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn version_flag_prints_version() {
    let mut cmd = Command::cargo_bin("provender").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("provender"));
}
