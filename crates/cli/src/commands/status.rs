// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

use crate::app::{App, SyncStatus};
use crate::cli::OutputFormat;
use crate::display::format_last_sync;
use crate::error::Result;
use crate::worker::{detect_worker, WorkerInfo};

use super::{open_app, print_json};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    state_dir: String,
    remote: String,
    pending: usize,
    dead: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_sync: Option<SyncStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker: Option<WorkerStatus>,
}

#[derive(Debug, Serialize)]
struct WorkerStatus {
    pid: u32,
    version: String,
}

impl From<WorkerInfo> for WorkerStatus {
    fn from(info: WorkerInfo) -> Self {
        WorkerStatus {
            pid: info.pid,
            version: info.version,
        }
    }
}

pub async fn run(output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    let state_dir = app.state_dir.clone();
    let worker = tokio::task::spawn_blocking(move || detect_worker(&state_dir))
        .await
        .ok()
        .flatten();
    let report = build(&app, worker).await?;

    if output == OutputFormat::Json {
        return print_json(&report);
    }
    println!("State: {}", report.state_dir);
    println!("Remote: {}", report.remote);
    println!("Pending: {}", report.pending);
    if report.dead > 0 {
        println!("Dead-lettered: {} (see 'tether outbox --dead')", report.dead);
    }
    println!("{}", format_last_sync(report.last_sync.as_ref()));
    match &report.worker {
        Some(w) => println!("Worker: running (pid {}, version {})", w.pid, w.version),
        None => println!("Worker: not running"),
    }
    Ok(())
}

async fn build(app: &App, worker: Option<WorkerInfo>) -> Result<StatusReport> {
    let (pending, dead) = app.pending().await?;
    Ok(StatusReport {
        state_dir: app.state_dir.display().to_string(),
        remote: app.config.remote.url.clone(),
        pending,
        dead,
        last_sync: app.status.get().await?,
        worker: worker.map(WorkerStatus::from),
    })
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
