//! Smoke tests for the thin CLI surface.
//!
//! These only exercise argument parsing and the handful of commands that
//! don't require a live repo/LLM/QA stack (`status`, `--help`); the
//! orchestration core itself is covered by the unit tests colocated with
//! each module.

use assert_cmd::Command;
use predicates::prelude::*;

fn nexus() -> Command {
    Command::cargo_bin("nexus").expect("nexus binary builds")
}

#[test]
fn help_lists_subcommands() {
    nexus()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ralph loop orchestrator"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn status_text_output() {
    nexus()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nexus v"))
        .stdout(predicate::str::contains("Max loops"));
}

#[test]
fn status_json_output() {
    nexus()
        .args(["status", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_iterations\""));
}

#[test]
fn unknown_format_is_rejected() {
    nexus()
        .args(["status", "--format", "yaml"])
        .assert()
        .failure();
}

#[test]
fn desktop_surface_commands_defer_to_the_surrounding_app() {
    nexus()
        .arg("tui")
        .assert()
        .success()
        .stderr(predicate::str::contains("orchestration core"));
}

#[test]
fn no_subcommand_defaults_to_status() {
    nexus()
        .assert()
        .success()
        .stdout(predicate::str::contains("Nexus v"));
}
