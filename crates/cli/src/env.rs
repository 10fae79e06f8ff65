// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.
//!
//! All runtime environment variables used by the CLI are defined here
//! with typed accessor functions. The variable name constants are generated
//! by `build.rs` and live in the [`vars`] submodule.

use std::path::PathBuf;

/// Generated environment variable name constants.
pub mod vars {
    include!(concat!(env!("OUT_DIR"), "/env_vars.rs"));
}

/// Returns the value of `TETHER_STATE_DIR` if set.
pub fn state_dir() -> Option<PathBuf> {
    std::env::var(vars::TETHER_STATE_DIR).ok().map(PathBuf::from)
}

/// Returns the value of `XDG_STATE_HOME` if set.
pub fn xdg_state_home() -> Option<PathBuf> {
    std::env::var(vars::XDG_STATE_HOME).ok().map(PathBuf::from)
}

/// Returns the value of `TETHER_REMOTE_URL` if set and non-empty.
pub fn remote_url() -> Option<String> {
    std::env::var(vars::TETHER_REMOTE_URL)
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// Returns the value of `TETHER_WORKER_BINARY` if set.
pub fn worker_binary() -> Option<PathBuf> {
    std::env::var(vars::TETHER_WORKER_BINARY)
        .ok()
        .map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
