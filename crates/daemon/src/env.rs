// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variable access for the worker.

use std::path::PathBuf;

/// Generated environment variable name constants.
pub mod names {
    include!(concat!(env!("OUT_DIR"), "/env_names.rs"));
}

/// Returns the value of `TETHER_STATE_DIR` if set.
pub fn state_dir() -> Option<PathBuf> {
    std::env::var(names::TETHER_STATE_DIR).ok().map(PathBuf::from)
}

/// Returns the value of `XDG_STATE_HOME` if set.
pub fn xdg_state_home() -> Option<PathBuf> {
    std::env::var(names::XDG_STATE_HOME).ok().map(PathBuf::from)
}

/// Returns the value of `TETHER_WORKER_CONFIG` if set.
pub fn worker_config() -> Option<PathBuf> {
    std::env::var(names::TETHER_WORKER_CONFIG)
        .ok()
        .map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
