// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// All possible errors that can occur in the tether CLI library.
///
/// Errors provide user-friendly messages with hints for common issues.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not initialized: run 'tether init' first")]
    NotInitialized,

    #[error("already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("{0}")]
    Failed(String),

    #[error("invalid field assignment '{0}'\n  hint: use key=value, where value is JSON or plain text")]
    InvalidAssignment(String),

    #[error("nothing to update\n  hint: pass at least one field to change")]
    EmptyUpdate,

    #[error("invalid remote URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid student type: '{0}'\n  hint: valid types are: individual, group")]
    InvalidStudentType(String),

    #[error("invalid lesson status: '{0}'\n  hint: valid statuses are: scheduled, completed, cancelled")]
    InvalidLessonStatus(String),

    #[error("invalid timestamp '{0}'\n  hint: use RFC 3339, e.g. 2026-03-01T09:00:00Z")]
    InvalidTimestamp(String),

    #[error("{0}")]
    Remote(#[from] crate::remote::RemoteError),

    #[error("store error: {0}")]
    Store(#[from] tether_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("worker is not running\n  hint: run 'tether worker start'")]
    WorkerNotRunning,

    #[error("worker timeout: {0}")]
    WorkerTimeout(String),
}

/// A specialized Result type for tether operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
