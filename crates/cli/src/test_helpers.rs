// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for tether tests.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tether_core::{
    merge_patch, ClockSource, Connectivity, DeletePolicy, Entity, LocalStore, ManualClock, Patch,
    RetryPolicy,
};

use crate::app::App;
use crate::config::{store_path, Config};
use crate::entities::{Lesson, LessonDraft, Student, StudentDraft};
use crate::gateway::{Context, Gateway};
use crate::remote::{RemoteError, RemoteFuture, Resource};
use crate::sync::SyncEngine;

/// Fixed point in time used across tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

/// In-memory stand-in for the remote API.
///
/// Assigns `srv-N` ids, applies the same draft defaults the entity applies
/// locally, and records every call it receives.
pub struct MockResource<E: Entity> {
    records: Mutex<Vec<E>>,
    calls: Arc<Mutex<Vec<String>>>,
    next_id: Arc<AtomicU64>,
    offline: AtomicBool,
    reject: Mutex<Option<(u16, String)>>,
    latency: Mutex<Option<std::time::Duration>>,
}

impl<E: Entity> MockResource<E> {
    /// A mock sharing a call log with other mocks, numbering ids from `next_id`.
    pub fn shared(calls: Arc<Mutex<Vec<String>>>, next_id: Arc<AtomicU64>) -> Self {
        MockResource {
            records: Mutex::new(Vec::new()),
            calls,
            next_id,
            offline: AtomicBool::new(false),
            reject: Mutex::new(None),
            latency: Mutex::new(None),
        }
    }

    /// Make every call fail in transport.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every call fail with a server rejection.
    pub fn reject_with(&self, status: u16, message: &str) {
        *self.reject.lock().unwrap() = Some((status, message.to_string()));
    }

    /// Delay every write call, as a slow server would.
    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn accept(&self) {
        *self.reject.lock().unwrap() = None;
    }

    pub fn records(&self) -> Vec<E> {
        self.records.lock().unwrap().clone()
    }

    pub fn find(&self, id: &str) -> Option<E> {
        self.records().into_iter().find(|r| r.id() == id)
    }

    /// Seed a record directly on the server.
    pub fn insert(&self, record: E) {
        self.records.lock().unwrap().push(record);
    }

    fn log(&self, call: String) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_string()));
        }
        if let Some((status, message)) = self.reject.lock().unwrap().clone() {
            return Err(RemoteError::Rejected { status, message });
        }
        Ok(())
    }

    fn missing(id: &str) -> RemoteError {
        RemoteError::Rejected {
            status: 404,
            message: format!("{id} not found"),
        }
    }

    fn do_create(&self, draft: Value) -> Result<E, RemoteError> {
        self.log(format!("create {}", E::COLLECTION))?;
        let draft: E::Draft = serde_json::from_value(draft).map_err(|e| RemoteError::Rejected {
            status: 400,
            message: e.to_string(),
        })?;
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = E::from_draft(id, &draft, t0());
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    fn do_update(&self, id: &str, patch: &Patch) -> Result<E, RemoteError> {
        self.log(format!("update {} {id}", E::COLLECTION))?;
        let mut records = self.records.lock().unwrap();
        let slot = records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| Self::missing(id))?;
        let merged = merge_patch(slot, patch, t0()).map_err(|e| RemoteError::Rejected {
            status: 400,
            message: e.to_string(),
        })?;
        *slot = merged.clone();
        Ok(merged)
    }

    fn do_delete(&self, id: &str) -> Result<(), RemoteError> {
        self.log(format!("delete {} {id}", E::COLLECTION))?;
        let mut records = self.records.lock().unwrap();
        let index = records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| Self::missing(id))?;
        match E::delete_policy() {
            DeletePolicy::Hard => {
                records.remove(index);
            }
            DeletePolicy::Soft => records[index].mark_deleted(t0()),
        }
        Ok(())
    }
}

impl<E: Entity> Resource<E> for MockResource<E> {
    fn list(&self, filter: E::Filter) -> RemoteFuture<'_, Vec<E>> {
        Box::pin(async move {
            self.log(format!("list {}", E::COLLECTION))?;
            Ok(self
                .records()
                .into_iter()
                .filter(|r| r.matches(&filter))
                .collect())
        })
    }

    fn get(&self, id: String) -> RemoteFuture<'_, E> {
        Box::pin(async move {
            self.log(format!("get {} {id}", E::COLLECTION))?;
            self.find(&id).ok_or_else(|| Self::missing(&id))
        })
    }

    fn create(&self, draft: Value) -> RemoteFuture<'_, E> {
        Box::pin(async move {
            self.wait().await;
            self.do_create(draft)
        })
    }

    fn update(&self, id: String, patch: Patch) -> RemoteFuture<'_, E> {
        Box::pin(async move {
            self.wait().await;
            self.do_update(&id, &patch)
        })
    }

    fn delete(&self, id: String) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.wait().await;
            self.do_delete(&id)
        })
    }

    fn aggregate(&self, id: String, name: String) -> RemoteFuture<'_, Value> {
        Box::pin(async move {
            self.log(format!("{name} {} {id}", E::COLLECTION))?;
            if self.find(&id).is_none() {
                return Err(Self::missing(&id));
            }
            Ok(json!({"id": id, "sessions": 0}))
        })
    }
}

/// A full offline-first stack over an in-memory store and mock remotes.
pub struct Harness {
    pub ctx: Context,
    pub clock: Arc<ManualClock>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub student_api: Arc<MockResource<Student>>,
    pub lesson_api: Arc<MockResource<Lesson>>,
    pub students: Arc<Gateway<Student>>,
    pub lessons: Arc<Gateway<Lesson>>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::seconds(2),
            max_delay: Duration::seconds(60),
        })
        .await
    }

    pub async fn with_policy(policy: RetryPolicy) -> Self {
        let store = Arc::new(LocalStore::open_in_memory());
        store.init().await.unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let dyn_clock: Arc<dyn ClockSource> = clock.clone();
        let ctx = Context::with_clock(store, Arc::new(Connectivity::new(true)), dyn_clock);

        // Each collection numbers its own ids, as a real backend does.
        let calls = Arc::new(Mutex::new(Vec::new()));
        let student_api = Arc::new(MockResource::shared(calls.clone(), Arc::default()));
        let lesson_api = Arc::new(MockResource::shared(calls.clone(), Arc::default()));

        let students = Arc::new(Gateway::new(ctx.clone(), student_api.clone()));
        let lessons = Arc::new(Gateway::new(ctx.clone(), lesson_api.clone()));

        let mut engine = SyncEngine::new(
            ctx.outbox.clone(),
            ctx.connectivity.clone(),
            ctx.clock.clone(),
            policy,
        );
        engine.register(students.clone());
        engine.register(lessons.clone());

        Harness {
            ctx,
            clock,
            calls,
            student_api,
            lesson_api,
            students,
            lessons,
            engine: Arc::new(engine),
        }
    }

    /// Cut the network: the oracle reports offline and every call fails.
    pub fn go_offline(&self) {
        self.ctx.connectivity.set_online(false);
        self.student_api.set_offline(true);
        self.lesson_api.set_offline(true);
    }

    pub fn go_online(&self) {
        self.student_api.set_offline(false);
        self.lesson_api.set_offline(false);
        self.ctx.connectivity.set_online(true);
    }

    /// Remote calls so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

pub fn student_draft(name: &str) -> StudentDraft {
    StudentDraft {
        name: name.to_string(),
        ..StudentDraft::default()
    }
}

pub fn lesson_draft(student_id: &str) -> LessonDraft {
    LessonDraft {
        student_id: student_id.to_string(),
        scheduled_at: t0() + Duration::days(1),
        duration_minutes: None,
        status: None,
        notes: None,
    }
}

/// An [`App`] over a store in `dir` and mock remotes.
pub fn mock_app(dir: &Path) -> (App, Arc<MockResource<Student>>, Arc<MockResource<Lesson>>) {
    let store = Arc::new(LocalStore::open(&store_path(dir)));
    let ctx = Context::new(store, Arc::new(Connectivity::new(true)));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let students = Arc::new(MockResource::shared(calls.clone(), Arc::default()));
    let lessons = Arc::new(MockResource::shared(calls, Arc::default()));
    let app = App::assemble(
        dir.to_path_buf(),
        Config::default(),
        ctx,
        students.clone(),
        lessons.clone(),
        None,
    );
    (app, students, lessons)
}
