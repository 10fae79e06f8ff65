// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Rust specs for `tether init` and commands that require it.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use yare::parameterized;

fn tether(state: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tether");
    cmd.env("TETHER_STATE_DIR", state.path())
        .env_remove("TETHER_REMOTE_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn creates_config_and_store() {
    let state = TempDir::new().unwrap();

    tether(&state)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized tether at"));

    assert!(state.path().join("config.toml").exists());
    let config = std::fs::read_to_string(state.path().join("config.toml")).unwrap();
    assert!(config.contains("[remote]"));
}

#[test]
fn remote_flag_is_saved() {
    let state = TempDir::new().unwrap();

    tether(&state)
        .args(["init", "--remote", "https://api.example.test/v1/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Remote: https://api.example.test/v1/"));

    let config = std::fs::read_to_string(state.path().join("config.toml")).unwrap();
    assert!(config.contains("https://api.example.test/v1/"));
}

#[test]
fn fails_if_already_initialized() {
    let state = TempDir::new().unwrap();
    tether(&state).arg("init").assert().success();

    tether(&state)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn rejects_invalid_remote() {
    let state = TempDir::new().unwrap();

    tether(&state)
        .args(["init", "--remote", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid remote URL"));
    assert!(!state.path().join("config.toml").exists());
}

#[parameterized(
    status = { &["status"] },
    sync = { &["sync"] },
    outbox = { &["outbox"] },
    student_list = { &["student", "list"] },
    lesson_list = { &["lesson", "list"] },
)]
fn commands_require_init(args: &[&str]) {
    let state = TempDir::new().unwrap();

    tether(&state)
        .args(args)
        .assert()
        .failure()
        .stderr(predicate::str::contains("run 'tether init' first"));
}

#[test]
fn status_after_init() {
    let state = TempDir::new().unwrap();
    tether(&state).arg("init").assert().success();

    tether(&state)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pending: 0"))
        .stdout(predicate::str::contains("Last sync: never"))
        .stdout(predicate::str::contains("Worker: not running"));
}
