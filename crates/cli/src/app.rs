// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring for one `tether` invocation.
//!
//! [`App`] opens the local store, builds one gateway per entity over the
//! configured remote route and registers each with the sync engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{Connectivity, LocalStore, MetaSlot};

use crate::config::{store_path, Config};
use crate::entities::{Lesson, Student};
use crate::error::{Error, Result};
use crate::gateway::{Context, Gateway};
use crate::remote::{HttpResource, Resource, Via};
use crate::sync::{DrainReport, SyncEngine, Trigger};
use crate::worker::WorkerClient;

/// Metadata key of the persisted [`SyncStatus`].
pub const SYNC_STATUS_KEY: &str = "sync_status";

/// Outcome of the last completed drain, kept across invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_report: Option<DrainReport>,
}

pub struct App {
    pub state_dir: PathBuf,
    pub config: Config,
    pub ctx: Context,
    pub students: Arc<Gateway<Student>>,
    pub lessons: Arc<Gateway<Lesson>>,
    pub engine: Arc<SyncEngine>,
    pub status: MetaSlot<SyncStatus>,
    /// Set when API calls are proxied through the worker.
    pub worker: Option<WorkerClient>,
}

impl App {
    /// Open an initialized state directory.
    pub async fn open(state_dir: &Path) -> Result<App> {
        let config = Config::load(state_dir)?;
        let store = Arc::new(LocalStore::open(&store_path(state_dir)));
        store.init().await?;

        let worker = if config.worker.proxy {
            Some(connect_worker(state_dir, &config).await?)
        } else {
            None
        };
        let via = match &worker {
            Some(client) => Via::Worker(client.clone()),
            None => Via::direct(config.remote.timeout())?,
        };
        let base = config.remote.base_url()?;

        let ctx = Context::new(store, Arc::new(Connectivity::new(true)));
        Ok(Self::assemble(
            state_dir.to_path_buf(),
            config,
            ctx,
            Arc::new(HttpResource::new(via.clone(), base.clone())),
            Arc::new(HttpResource::new(via, base)),
            worker,
        ))
    }

    /// Build an app around explicit remotes.
    pub(crate) fn assemble(
        state_dir: PathBuf,
        config: Config,
        ctx: Context,
        student_remote: Arc<dyn Resource<Student>>,
        lesson_remote: Arc<dyn Resource<Lesson>>,
        worker: Option<WorkerClient>,
    ) -> App {
        let students = Arc::new(Gateway::new(ctx.clone(), student_remote));
        let lessons = Arc::new(Gateway::new(ctx.clone(), lesson_remote));

        let mut engine = SyncEngine::new(
            Arc::clone(&ctx.outbox),
            Arc::clone(&ctx.connectivity),
            Arc::clone(&ctx.clock),
            config.sync.retry_policy(),
        );
        engine.register(students.clone());
        engine.register(lessons.clone());

        let status = MetaSlot::new(Arc::clone(&ctx.store), SYNC_STATUS_KEY);
        App {
            state_dir,
            config,
            ctx,
            students,
            lessons,
            engine: Arc::new(engine),
            status,
            worker,
        }
    }

    /// Drain the outbox and remember the outcome.
    pub async fn sync(&self, trigger: Trigger) -> Result<DrainReport> {
        let report = self.engine.drain(trigger).await?;
        self.record(&report).await?;
        Ok(report)
    }

    /// Persist a drain outcome. Skipped drains are ignored.
    pub async fn record(&self, report: &DrainReport) -> Result<()> {
        if report.skipped {
            return Ok(());
        }
        self.status
            .replace(SyncStatus {
                last_sync_at: report.finished_at,
                last_trigger: report.trigger,
                last_report: Some(report.clone()),
            })
            .await?;
        Ok(())
    }

    /// Live and dead-lettered outbox sizes.
    pub async fn pending(&self) -> Result<(usize, usize)> {
        let live = self.ctx.outbox.len().await?;
        let dead = self.ctx.outbox.dead_len().await?;
        Ok((live, dead))
    }
}

/// Connect to the worker socket named by the config.
pub async fn connect_worker(state_dir: &Path, config: &Config) -> Result<WorkerClient> {
    let socket = config.worker_socket(state_dir);
    if !socket.exists() {
        return Err(Error::WorkerNotRunning);
    }
    WorkerClient::connect(&socket, config.remote.timeout()).await
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
