// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

#[test]
fn test_error_not_initialized_display() {
    let err = Error::NotInitialized;
    assert!(err.to_string().contains("not initialized"));
    assert!(err.to_string().contains("tether init"));
}

#[test]
fn test_error_already_initialized_display() {
    let err = Error::AlreadyInitialized("/state/tether".to_string());
    assert!(err.to_string().contains("already initialized"));
    assert!(err.to_string().contains("/state/tether"));
}

#[test]
fn test_error_failed_is_verbatim() {
    let err = Error::Failed("not found".to_string());
    assert_eq!(err.to_string(), "not found");
}

#[test]
fn test_error_invalid_assignment_has_hint() {
    let msg = Error::InvalidAssignment("name".to_string()).to_string();
    assert!(msg.contains("'name'"));
    assert!(msg.contains("hint: use key=value"));
}

#[test]
fn test_error_from_core() {
    let core = tether_core::Error::EntryNotFound(7);
    let err: Error = core.into();
    assert!(matches!(err, Error::Store(_)));
    assert!(err.to_string().contains("outbox entry not found: 7"));
}

#[test]
fn test_error_worker_not_running_has_hint() {
    let msg = Error::WorkerNotRunning.to_string();
    assert!(msg.contains("worker is not running"));
    assert!(msg.contains("tether worker start"));
}
