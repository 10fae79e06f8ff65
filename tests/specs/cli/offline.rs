// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Rust specs for working against an unreachable remote.
//!
//! The remote points at a closed local port, so every call fails at the
//! transport level and the CLI falls back to the local store.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const UNREACHABLE: &str = "http://127.0.0.1:1/api/";

fn tether(state: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tether");
    cmd.env("TETHER_STATE_DIR", state.path())
        .env("TETHER_REMOTE_URL", UNREACHABLE)
        .env_remove("RUST_LOG");
    cmd
}

fn init_offline() -> TempDir {
    let state = TempDir::new().unwrap();
    tether(&state).arg("init").assert().success();
    state
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    serde_json::from_slice(&output.stdout).unwrap()
}

fn add_student(state: &TempDir, name: &str) -> String {
    let envelope = json_output(tether(state).args(["student", "add", name, "--fee", "40", "-o", "json"]));
    assert_eq!(envelope["success"], true);
    envelope["data"]["id"].as_str().unwrap().to_string()
}

#[test]
fn add_student_gets_temp_id() {
    let state = init_offline();

    let envelope = json_output(tether(&state).args(["student", "add", "Ana", "-o", "json"]));

    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["offline"], true);
    assert_eq!(envelope["data"]["name"], "Ana");
    assert!(envelope["data"]["id"].as_str().unwrap().starts_with("tmp_"));
}

#[test]
fn add_student_text_mentions_offline() {
    let state = init_offline();

    tether(&state)
        .args(["student", "add", "Ana", "--fee", "40"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created - [individual]"))
        .stdout(predicate::str::contains("(unsynced): Ana (fee 40)"))
        .stderr(predicate::str::contains("note: offline"));
}

#[test]
fn list_shows_local_records() {
    let state = init_offline();
    add_student(&state, "Ana");
    add_student(&state, "Ben");

    tether(&state)
        .args(["student", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ana"))
        .stdout(predicate::str::contains("Ben"));
}

#[test]
fn show_unknown_student_fails() {
    let state = init_offline();

    tether(&state)
        .args(["student", "show", "srv-404"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn edit_queues_update_and_merges_locally() {
    let state = init_offline();
    let id = add_student(&state, "Ana");

    let envelope = json_output(tether(&state).args(["student", "edit", &id, "fee=55", "-o", "json"]));

    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"]["feePerSession"], 55);
    assert_eq!(envelope["data"]["name"], "Ana");
}

#[test]
fn lesson_can_reference_unsynced_student() {
    let state = init_offline();
    let student = add_student(&state, "Ana");

    let envelope = json_output(tether(&state).args([
        "lesson",
        "add",
        &student,
        "--at",
        "2026-03-02T16:00:00Z",
        "-o",
        "json",
    ]));
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"]["studentId"], student.as_str());

    tether(&state)
        .args(["lesson", "list", "--student", &student])
        .assert()
        .success()
        .stdout(predicate::str::contains("2026-03-02 16:00"));
}

#[test]
fn lesson_rejects_bad_timestamp() {
    let state = init_offline();
    let student = add_student(&state, "Ana");

    tether(&state)
        .args(["lesson", "add", &student, "--at", "tomorrow"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid timestamp"));
}

#[test]
fn summary_of_unsynced_student_fails() {
    let state = init_offline();
    let id = add_student(&state, "Ana");

    tether(&state)
        .args(["student", "summary", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unavailable until"));
}

#[test]
fn summary_requires_network() {
    let state = init_offline();

    tether(&state)
        .args(["student", "summary", "srv-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a network connection"));
}

#[test]
fn remove_unsynced_student_leaves_it_inactive() {
    let state = init_offline();
    let id = add_student(&state, "Ana");

    tether(&state)
        .args(["student", "rm", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deactivated"));

    tether(&state)
        .args(["student", "list", "--inactive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inactive"))
        .stdout(predicate::str::contains("Ana"));
}
