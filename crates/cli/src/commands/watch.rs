// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Long-running main context.
//!
//! Drains the outbox on connectivity changes, on worker `SYNC_REQUESTED`
//! broadcasts and on a fixed schedule, until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tether_ipc::{WorkerMessage, SYNC_TAG};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::app::connect_worker;
use crate::display::format_report;
use crate::error::Result;
use crate::sync::{self, Trigger};
use crate::worker::WorkerClient;

use super::open_app;

pub async fn run(interval: Option<u64>) -> Result<()> {
    let app = open_app().await?;
    let every = interval.unwrap_or(app.config.sync.interval_secs);
    let interval = (every > 0).then(|| Duration::from_secs(every));

    let (trigger_tx, trigger_rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = watch::channel(false);
    let (report_tx, mut report_rx) = mpsc::channel(16);

    let worker = match app.worker.clone() {
        Some(client) => Ok(client),
        None => connect_worker(&app.state_dir, &app.config).await,
    };
    let relay = match worker {
        Ok(client) => {
            client.register_sync(SYNC_TAG).await?;
            info!("registered for worker sync broadcasts");
            Some(tokio::spawn(relay_sync_requests(client, trigger_tx.clone())))
        }
        Err(e) => {
            warn!("worker unavailable, syncing on schedule only: {}", e);
            None
        }
    };

    let engine_loop = tokio::spawn(sync::watch(
        Arc::clone(&app.engine),
        Arc::clone(&app.ctx.connectivity),
        trigger_rx,
        interval,
        stop_rx,
        Some(report_tx),
    ));

    // Catch up on anything queued before we started.
    let _ = trigger_tx.send(Trigger::Scheduled).await;
    println!("Watching {} (ctrl-c to stop)", app.config.remote.url);

    loop {
        tokio::select! {
            report = report_rx.recv() => {
                let Some(report) = report else { break };
                if report.synced + report.failed + report.dead_lettered > 0 {
                    println!("{}", format_report(&report));
                }
                if let Err(e) = app.record(&report).await {
                    warn!("failed to record sync status: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = stop_tx.send(true);
    let _ = engine_loop.await;
    if let Some(relay) = relay {
        relay.abort();
    }
    Ok(())
}

/// Turn worker `SYNC_REQUESTED` broadcasts into drain triggers.
async fn relay_sync_requests(client: WorkerClient, triggers: mpsc::Sender<Trigger>) {
    let mut events = client.subscribe();
    loop {
        match events.recv().await {
            Ok(WorkerMessage::SyncRequested { tag }) if tag == SYNC_TAG => {
                debug!("worker requested sync");
                if triggers.send(Trigger::WorkerRequested).await.is_err() {
                    break;
                }
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                warn!("worker connection closed");
                break;
            }
        }
    }
}
