// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use crate::config::{self, init_state_dir};
use crate::error::Result;

pub fn run(remote: Option<String>) -> Result<()> {
    run_impl(&config::state_dir(), remote)
}

pub(crate) fn run_impl(state_dir: &Path, remote: Option<String>) -> Result<()> {
    let config = init_state_dir(state_dir, remote)?;
    println!("Initialized tether at {}", state_dir.display());
    println!("Remote: {}", config.remote.url);
    Ok(())
}

#[cfg(test)]
#[path = "init_tests.rs"]
mod tests;
