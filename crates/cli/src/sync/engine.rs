// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outbox drain.
//!
//! A drain takes the live outbox in FIFO order and replays entries one at a
//! time. Only one drain runs at once; a trigger that arrives mid-drain is
//! dropped, not queued.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{ClockSource, Connectivity, FailureOutcome, Mutation, MutationKind, Outbox, RetryPolicy};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::{Reconciled, Replayer};

/// Why a drain was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The connectivity oracle went from offline to online.
    ConnectivityRestored,
    /// The user asked for a sync.
    Manual,
    /// The background cache worker relayed a reconnection.
    WorkerRequested,
    /// Periodic drain from the watch loop.
    Scheduled,
}

impl Trigger {
    /// Manual syncs retry entries that are still backing off.
    pub fn ignores_backoff(&self) -> bool {
        matches!(self, Trigger::Manual)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::ConnectivityRestored => "connectivity_restored",
            Trigger::Manual => "manual",
            Trigger::WorkerRequested => "worker_requested",
            Trigger::Scheduled => "scheduled",
        };
        write!(f, "{}", name)
    }
}

/// What one drain pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    /// Entries replayed successfully and removed.
    pub synced: usize,
    /// Entries that failed in transport and stay queued.
    pub failed: usize,
    /// Entries skipped this pass (backing off or behind a blocked record).
    pub deferred: usize,
    /// Entries moved to the dead-letter set.
    pub dead_lettered: usize,
    /// Temp ids replaced by server ids.
    pub remapped: Vec<(String, String)>,
    /// True if another drain, in this process or another, was already running.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DrainReport {
    /// Entries still live in the outbox after this pass.
    pub fn remaining(&self) -> usize {
        self.failed + self.deferred
    }
}

/// Clears the draining flag when dropped.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Replays the outbox against the remote API.
pub struct SyncEngine {
    outbox: Arc<Outbox>,
    connectivity: Arc<Connectivity>,
    clock: Arc<dyn ClockSource>,
    policy: RetryPolicy,
    replayers: HashMap<&'static str, Arc<dyn Replayer>>,
    draining: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        outbox: Arc<Outbox>,
        connectivity: Arc<Connectivity>,
        clock: Arc<dyn ClockSource>,
        policy: RetryPolicy,
    ) -> Self {
        SyncEngine {
            outbox,
            connectivity,
            clock,
            policy,
            replayers: HashMap::new(),
            draining: AtomicBool::new(false),
        }
    }

    /// Register the replayer for one collection.
    pub fn register(&mut self, replayer: Arc<dyn Replayer>) {
        self.replayers.insert(replayer.entity(), replayer);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Process the whole live outbox once.
    ///
    /// Entries run strictly in order and never in parallel. A failing entry
    /// does not stop the pass, but every later entry touching the same record
    /// (or a record created by it) is deferred.
    pub async fn drain(&self, trigger: Trigger) -> tether_core::Result<DrainReport> {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            debug!(%trigger, "drain already running");
            return Ok(DrainReport {
                trigger: Some(trigger),
                skipped: true,
                ..DrainReport::default()
            });
        };

        // Another process (a `watch` loop or a manual `sync`) may share the outbox.
        let Some(_lease) = self.outbox.try_drain_lease()? else {
            debug!(%trigger, "outbox is being drained elsewhere");
            return Ok(DrainReport {
                trigger: Some(trigger),
                skipped: true,
                ..DrainReport::default()
            });
        };

        let mut report = DrainReport {
            trigger: Some(trigger),
            ..DrainReport::default()
        };
        let snapshot = self.outbox.snapshot().await?;
        if snapshot.is_empty() {
            debug!(%trigger, "outbox empty");
            report.finished_at = Some(self.clock.now());
            return Ok(report);
        }
        info!(%trigger, entries = snapshot.len(), "drain started");

        let mut blocked = self.dead_creates().await?;
        for queued in snapshot {
            // Earlier replays may have remapped or removed this entry.
            let Some(entry) = self.outbox.get(queued.entry_id).await? else {
                continue;
            };
            if entry.dead {
                continue;
            }

            if entry.references_any(&blocked) {
                debug!(entry_id = entry.entry_id, record_id = %entry.record_id, "deferred behind blocked record");
                report.deferred += 1;
                blocked.insert(entry.record_key());
                continue;
            }
            if !trigger.ignores_backoff() && entry.is_backing_off(self.clock.now()) {
                debug!(entry_id = entry.entry_id, "backing off");
                report.deferred += 1;
                blocked.insert(entry.record_key());
                continue;
            }

            let Some(replayer) = self.replayers.get(entry.entity.as_str()) else {
                warn!(entry_id = entry.entry_id, entity = %entry.entity, "no replayer for entity");
                self.outbox
                    .dead_letter(entry.entry_id, &format!("unknown entity: {}", entry.entity))
                    .await?;
                report.dead_lettered += 1;
                blocked.insert(entry.record_key());
                continue;
            };

            match replayer.replay(&entry).await {
                Ok(server) => {
                    self.connectivity.set_online(true);
                    self.outbox.remove(entry.entry_id).await?;
                    report.synced += 1;
                    match replayer.reconcile(&entry, server).await {
                        Ok(Reconciled::Remapped { from, to }) => report.remapped.push((from, to)),
                        Ok(_) => {}
                        Err(e) => warn!(
                            entry_id = entry.entry_id,
                            record_id = %entry.record_id,
                            "synced but local reconciliation failed: {}", e
                        ),
                    }
                }
                Err(e) if e.is_transport() => {
                    self.connectivity.set_online(false);
                    match self
                        .outbox
                        .record_failure(entry.entry_id, &e.to_string(), &self.policy)
                        .await?
                    {
                        FailureOutcome::Retrying { attempts, retry_at } => {
                            warn!(entry_id = entry.entry_id, attempts, %retry_at, "replay failed: {}", e);
                            report.failed += 1;
                        }
                        FailureOutcome::DeadLettered { attempts } => {
                            warn!(entry_id = entry.entry_id, attempts, "giving up: {}", e);
                            report.dead_lettered += 1;
                        }
                    }
                    blocked.insert(entry.record_key());
                }
                Err(e) => {
                    warn!(entry_id = entry.entry_id, "rejected, dead-lettering: {}", e);
                    self.outbox.dead_letter(entry.entry_id, &e.to_string()).await?;
                    report.dead_lettered += 1;
                    blocked.insert(entry.record_key());
                }
            }
        }

        report.finished_at = Some(self.clock.now());
        info!(
            %trigger,
            synced = report.synced,
            failed = report.failed,
            deferred = report.deferred,
            dead_lettered = report.dead_lettered,
            "drain finished"
        );
        Ok(report)
    }

    /// Records whose create is dead. Nothing referencing them can succeed.
    async fn dead_creates(&self) -> tether_core::Result<HashSet<(String, String)>> {
        Ok(self
            .outbox
            .dead_letters()
            .await?
            .into_iter()
            .filter(|m: &Mutation| m.kind == MutationKind::Create)
            .map(|m| m.record_key())
            .collect())
    }
}

/// Run drains for incoming triggers until `stop` flips.
///
/// Each drain runs in its own task so that triggers arriving mid-drain reach
/// the engine and are dropped there. Offline→online transitions of the
/// oracle become [`Trigger::ConnectivityRestored`]; a non-zero `interval`
/// adds [`Trigger::Scheduled`] ticks.
pub async fn watch(
    engine: Arc<SyncEngine>,
    connectivity: Arc<Connectivity>,
    mut triggers: mpsc::Receiver<Trigger>,
    interval: Option<Duration>,
    mut stop: watch::Receiver<bool>,
    reports: Option<mpsc::Sender<DrainReport>>,
) {
    let mut online = connectivity.subscribe();
    let mut was_online = *online.borrow_and_update();
    let mut ticker = interval.map(|every| {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let trigger = tokio::select! {
            received = triggers.recv() => match received {
                Some(trigger) => trigger,
                None => break,
            },
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_online = *online.borrow_and_update();
                let restored = now_online && !was_online;
                was_online = now_online;
                if !restored {
                    continue;
                }
                Trigger::ConnectivityRestored
            }
            _ = tick(&mut ticker) => Trigger::Scheduled,
            _ = stop.changed() => break,
        };

        let engine = Arc::clone(&engine);
        let reports = reports.clone();
        tokio::spawn(async move {
            match engine.drain(trigger).await {
                Ok(report) if report.skipped => {}
                Ok(report) => {
                    if let Some(reports) = reports {
                        let _ = reports.send(report).await;
                    }
                }
                Err(e) => warn!(%trigger, "drain failed: {}", e),
            }
        });
    }
    debug!("sync watch stopped");
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
