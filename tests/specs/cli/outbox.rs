// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Rust specs for `tether outbox`, `tether sync` and `tether status`
//! against an unreachable remote.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;
use yare::parameterized;

const UNREACHABLE: &str = "http://127.0.0.1:1/api/";

fn tether(state: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tether");
    cmd.env("TETHER_STATE_DIR", state.path())
        .env("TETHER_REMOTE_URL", UNREACHABLE)
        .env_remove("RUST_LOG");
    cmd
}

fn init_with_students(names: &[&str]) -> TempDir {
    let state = TempDir::new().unwrap();
    tether(&state).arg("init").assert().success();
    for name in names {
        tether(&state).args(["student", "add", name]).assert().success();
    }
    state
}

fn outbox_json(state: &TempDir, dead: bool) -> Vec<Value> {
    let mut cmd = tether(state);
    cmd.args(["outbox", "-o", "json"]);
    if dead {
        cmd.arg("--dead");
    }
    let output = cmd.output().unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn empty_outbox() {
    let state = init_with_students(&[]);

    tether(&state)
        .arg("outbox")
        .assert()
        .success()
        .stdout(predicate::str::contains("Outbox is empty"));
    tether(&state)
        .args(["outbox", "--dead"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No dead entries"));
}

#[test]
fn offline_writes_are_queued_in_order() {
    let state = init_with_students(&["Ana", "Ben"]);

    let entries = outbox_json(&state, false);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["type"], "create");
    assert_eq!(entries[0]["entity"], "students");
    assert_eq!(entries[0]["payload"]["name"], "Ana");
    assert_eq!(entries[1]["payload"]["name"], "Ben");
    assert!(entries[0]["entryId"].as_i64().unwrap() < entries[1]["entryId"].as_i64().unwrap());
    assert!(entries[0]["recordId"].as_str().unwrap().starts_with("tmp_"));
}

#[test]
fn outbox_text_lists_entries() {
    let state = init_with_students(&["Ana"]);

    tether(&state)
        .arg("outbox")
        .assert()
        .success()
        .stdout(predicate::str::contains("create students/tmp_"));
}

#[test]
fn sync_keeps_entries_when_unreachable() {
    let state = init_with_students(&["Ana", "Ben"]);

    tether(&state)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 synced, 2 failed"))
        .stderr(predicate::str::contains("2 entries still queued"));

    let entries = outbox_json(&state, false);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["attempts"], 1);
    assert!(entries[0]["lastError"].is_string());
    assert!(entries[0]["nextAttemptAt"].is_string());
}

#[test]
fn sync_json_report() {
    let state = init_with_students(&["Ana"]);

    let output = tether(&state).args(["sync", "-o", "json"]).output().unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(report["trigger"], "manual");
    assert_eq!(report["synced"], 0);
    assert_eq!(report["failed"], 1);
}

#[test]
fn status_reflects_queue_and_last_sync() {
    let state = init_with_students(&["Ana", "Ben", "Cy"]);
    tether(&state).arg("sync").assert().success();

    let output = tether(&state).args(["status", "-o", "json"]).output().unwrap();
    assert!(output.status.success());
    let status: Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(status["pending"], 3);
    assert_eq!(status["dead"], 0);
    assert_eq!(status["remote"], UNREACHABLE);
    assert_eq!(status["lastSync"]["lastTrigger"], "manual");
    assert_eq!(status["lastSync"]["lastReport"]["failed"], 3);
}

#[parameterized(
    retry = { "retry" },
    discard = { "discard" },
)]
fn dead_letter_commands_need_a_dead_entry(action: &str) {
    let state = init_with_students(&["Ana"]);
    let entries = outbox_json(&state, false);
    let live = entries[0]["entryId"].as_i64().unwrap().to_string();

    tether(&state)
        .args(["outbox", action, &live])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outbox entry not found"));

    assert_eq!(outbox_json(&state, false).len(), 1);
}

#[test]
fn outbox_subcommand_conflicts_with_dead_flag() {
    let state = init_with_students(&[]);

    tether(&state)
        .args(["outbox", "--dead", "retry", "1"])
        .assert()
        .failure();
}
