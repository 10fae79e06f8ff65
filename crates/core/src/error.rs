// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tether-core operations.

use thiserror::Error;

/// All possible errors that can occur in tether-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("record not found: {collection}/{id}")]
    RecordNotFound { collection: String, id: String },

    #[error("outbox entry not found: {0}")]
    EntryNotFound(i64),

    #[error("local store unavailable: {0}\n  hint: check that the state directory is writable and has free space")]
    StoreUnavailable(String),

    #[error("invalid mutation kind: '{0}'\n  hint: valid kinds are: create, update, delete")]
    InvalidMutationKind(String),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

/// A specialized Result type for tether-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
