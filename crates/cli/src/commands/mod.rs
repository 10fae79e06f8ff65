// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod init;
pub mod lesson;
pub mod outbox;
pub mod status;
pub mod student;
pub mod sync;
pub mod watch;
pub mod worker;

use serde::Serialize;
use tether_core::Envelope;

use crate::app::App;
use crate::cli::OutputFormat;
use crate::config;
use crate::error::{Error, Result};

/// Shown on stderr when a result came from local data.
const OFFLINE_NOTE: &str = "note: offline, using local data (changes sync when the remote is back)";

/// Helper to open the app for the resolved state directory.
pub async fn open_app() -> Result<App> {
    App::open(&config::state_dir()).await
}

/// Print a gateway result and turn a failure into an error.
///
/// JSON output prints the whole envelope, including failures.
pub(crate) fn emit<T: Serialize>(
    envelope: Envelope<T>,
    output: OutputFormat,
    text: impl FnOnce(&T) -> String,
) -> Result<()> {
    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string(&envelope)?);
    }
    let offline = envelope.offline;
    let data = envelope.into_result().map_err(Error::Failed)?;
    if output == OutputFormat::Text {
        if let Some(data) = &data {
            println!("{}", text(data));
        }
        if offline {
            eprintln!("{}", OFFLINE_NOTE);
        }
    }
    Ok(())
}

/// Print a value as JSON.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
