// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the cache worker.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cache storage error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("config error: {0}\n  hint: check the worker config file syntax")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
