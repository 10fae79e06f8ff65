// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outbox inspection and dead-letter management.

use crate::app::App;
use crate::cli::OutputFormat;
use crate::display::format_mutation_line;
use crate::error::Result;

use super::{open_app, print_json};

pub async fn list(dead: bool, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    list_impl(&app, dead, output).await
}

pub(crate) async fn list_impl(app: &App, dead: bool, output: OutputFormat) -> Result<()> {
    let entries = if dead {
        app.ctx.outbox.dead_letters().await?
    } else {
        app.ctx.outbox.snapshot().await?
    };

    match output {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("{}", if dead { "No dead entries" } else { "Outbox is empty" });
            }
            for entry in &entries {
                println!("{}", format_mutation_line(entry));
            }
            Ok(())
        }
    }
}

pub async fn retry(entry_id: i64) -> Result<()> {
    let app = open_app().await?;
    app.ctx.outbox.retry(entry_id).await?;
    println!("Requeued #{}", entry_id);
    Ok(())
}

pub async fn discard(entry_id: i64) -> Result<()> {
    let app = open_app().await?;
    let entry = app.ctx.outbox.discard(entry_id).await?;
    println!(
        "Discarded #{} {} {}/{}",
        entry.entry_id, entry.kind, entry.entity, entry.record_id
    );
    Ok(())
}
