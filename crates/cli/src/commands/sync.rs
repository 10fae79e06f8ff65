// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use crate::cli::OutputFormat;
use crate::display::format_report;
use crate::error::Result;
use crate::sync::Trigger;

use super::{open_app, print_json};

/// Drain the outbox once, retrying entries that are still backing off.
pub async fn run(output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    let report = app.sync(Trigger::Manual).await?;

    if output == OutputFormat::Json {
        return print_json(&report);
    }
    println!("{}", format_report(&report));
    for (from, to) in &report.remapped {
        println!("  {} -> {}", from, to);
    }
    if report.failed > 0 {
        eprintln!(
            "note: remote unreachable, {} entries still queued",
            report.remaining()
        );
    }
    if report.dead_lettered > 0 {
        eprintln!("note: see 'tether outbox --dead' for rejected entries");
    }
    Ok(())
}
