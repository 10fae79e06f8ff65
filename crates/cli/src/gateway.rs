// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Generic entity gateway.
//!
//! A [`Gateway`] serves one entity type with online-first, offline-fallback
//! semantics. Every operation returns an [`Envelope`]; errors never escape.
//!
//! Online: call the remote, persist what it returns.
//! Offline (oracle says so, or the call failed in transport): read from the
//! store, or write to the store and queue the mutation in the outbox.
//! Rejections from a reachable server are returned as failures and never
//! queued.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tether_core::record::rewrite_references;
use tether_core::{
    is_temp_id, merge_patch, ClockSource, Connectivity, DeletePolicy, Entity, Envelope, LocalStore,
    LocalWrite, Mutation, MutationKind, Outbox, Patch, SystemClock, TempIdGenerator,
    TEMP_ID_PREFIX,
};
use tracing::{debug, info, warn};

use crate::remote::{RemoteError, RemoteFuture, RemoteResult, Resource};
use crate::sync::{Reconciled, ReplayFuture, Replayer};

/// Error text for records missing from the local store.
pub const NOT_FOUND: &str = "not found";

/// Collaborators shared by every gateway and the sync engine.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<LocalStore>,
    pub outbox: Arc<Outbox>,
    pub connectivity: Arc<Connectivity>,
    pub clock: Arc<dyn ClockSource>,
    pub ids: Arc<TempIdGenerator<Arc<dyn ClockSource>>>,
}

impl Context {
    pub fn new(store: Arc<LocalStore>, connectivity: Arc<Connectivity>) -> Self {
        Self::with_clock(store, connectivity, Arc::new(SystemClock))
    }

    /// Build a context around an explicit clock.
    pub fn with_clock(
        store: Arc<LocalStore>,
        connectivity: Arc<Connectivity>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let outbox = Arc::new(Outbox::with_clock(Arc::clone(&store), Arc::clone(&clock)));
        let ids = Arc::new(TempIdGenerator::with_clock(
            Arc::clone(&clock),
            std::process::id(),
        ));
        Context {
            store,
            outbox,
            connectivity,
            clock,
            ids,
        }
    }
}

/// How one remote attempt went.
enum Attempt<T> {
    Online(T),
    Offline,
    Rejected(RemoteError),
}

/// Online-first, offline-fallback access to one entity type.
pub struct Gateway<E: Entity> {
    ctx: Context,
    remote: Arc<dyn Resource<E>>,
}

impl<E: Entity> Gateway<E> {
    pub fn new(ctx: Context, remote: Arc<dyn Resource<E>>) -> Self {
        Gateway { ctx, remote }
    }

    /// List records, falling back to the store filtered with the same
    /// predicate the server applies.
    pub async fn get_all(&self, filter: E::Filter) -> Envelope<Vec<E>> {
        match self.attempt(self.remote.list(filter.clone())).await {
            Attempt::Online(records) => match self.absorb(records).await {
                Ok(records) => Envelope::ok(records),
                Err(e) => Envelope::err(e.to_string()),
            },
            Attempt::Rejected(e) => Envelope::err(e.message()),
            Attempt::Offline => match self.local_all(&filter).await {
                Ok(records) => Envelope::offline(records),
                Err(e) => Envelope::err(e.to_string()),
            },
        }
    }

    /// Fetch one record. An offline miss is a `not found` failure.
    pub async fn get_by_id(&self, id: &str) -> Envelope<E> {
        let id = match self.ctx.store.resolve_id(id).await {
            Ok(id) => id,
            Err(e) => return Envelope::err(e.to_string()),
        };

        let local_only = match self.must_stay_local(&id).await {
            Ok(local_only) => local_only,
            Err(e) => return Envelope::err(e.to_string()),
        };
        if !local_only {
            match self.attempt(self.remote.get(id.clone())).await {
                Attempt::Online(record) => return self.persist(record).await,
                Attempt::Rejected(e) => return Envelope::err(e.message()),
                Attempt::Offline => {}
            }
        }

        match self.ctx.store.get_by_id::<E>(&id).await {
            Ok(Some(record)) => Envelope::offline(record),
            Ok(None) => Envelope::err(NOT_FOUND),
            Err(e) => Envelope::err(e.to_string()),
        }
    }

    /// Create a record. Offline, the record gets a temp id, is committed
    /// locally right away, and a `create` is queued with the original draft.
    pub async fn create(&self, draft: E::Draft) -> Envelope<E> {
        let (draft, payload, unresolved) = match self.prepare_draft(&draft).await {
            Ok(prepared) => prepared,
            Err(e) => return Envelope::err(e.to_string()),
        };

        if !unresolved {
            match self.attempt(self.remote.create(payload.clone())).await {
                Attempt::Online(record) => return self.persist(record).await,
                Attempt::Rejected(e) => return Envelope::err(e.message()),
                Attempt::Offline => {}
            }
        }

        match self.create_offline(&draft, &payload).await {
            Ok(record) => Envelope::offline(record),
            Err(e) => Envelope::err(e.to_string()),
        }
    }

    /// Shallow-update a record. Offline, the patch is merged into the stored
    /// record and queued.
    pub async fn update(&self, id: &str, patch: Patch) -> Envelope<E> {
        let prepared = async {
            let id = self.ctx.store.resolve_id(id).await?;
            let mut value = Value::Object(patch);
            let unresolved = self.resolve_references(&mut value).await?;
            let local_only = unresolved || self.must_stay_local(&id).await?;
            let patch = match value {
                Value::Object(patch) => patch,
                _ => Patch::new(),
            };
            Ok::<_, tether_core::Error>((id, patch, local_only))
        };
        let (id, patch, local_only) = match prepared.await {
            Ok(prepared) => prepared,
            Err(e) => return Envelope::err(e.to_string()),
        };

        if !local_only {
            match self.attempt(self.remote.update(id.clone(), patch.clone())).await {
                Attempt::Online(record) => return self.persist(record).await,
                Attempt::Rejected(e) => return Envelope::err(e.message()),
                Attempt::Offline => {}
            }
        }

        match self.update_offline(&id, patch).await {
            Ok(Some(record)) => Envelope::offline(record),
            Ok(None) => Envelope::err(NOT_FOUND),
            Err(e) => Envelope::err(e.to_string()),
        }
    }

    /// Delete a record, applying the entity's delete policy locally either
    /// way. Returns the id that was deleted.
    pub async fn delete(&self, id: &str) -> Envelope<String> {
        let prepared = async {
            let id = self.ctx.store.resolve_id(id).await?;
            let local_only = self.must_stay_local(&id).await?;
            Ok::<_, tether_core::Error>((id, local_only))
        };
        let (id, local_only) = match prepared.await {
            Ok(prepared) => prepared,
            Err(e) => return Envelope::err(e.to_string()),
        };

        if !local_only {
            match self.attempt(self.remote.delete(id.clone())).await {
                Attempt::Online(()) => {
                    return match self.apply_delete_policy(&id).await {
                        Ok(_) => Envelope::ok(id),
                        Err(e) => Envelope::err(e.to_string()),
                    };
                }
                Attempt::Rejected(e) => return Envelope::err(e.message()),
                Attempt::Offline => {}
            }
        }

        match self.delete_offline(&id).await {
            Ok(true) => Envelope::offline(id),
            Ok(false) => Envelope::err(NOT_FOUND),
            Err(e) => Envelope::err(e.to_string()),
        }
    }

    /// Run a call whose result cannot be derived locally.
    ///
    /// Offline, fails with `"<operation> requires a network connection"`
    /// instead of approximating.
    pub async fn online_only<T>(&self, operation: &str, call: RemoteFuture<'_, T>) -> Envelope<T> {
        match self.attempt(call).await {
            Attempt::Online(value) => Envelope::ok(value),
            Attempt::Rejected(e) => Envelope::err(e.message()),
            Attempt::Offline => {
                Envelope::err(format!("{operation} requires a network connection")).with_offline(true)
            }
        }
    }

    /// Server-side aggregate for one record, e.g. a fee summary.
    pub async fn aggregate(&self, id: &str, name: &str) -> Envelope<Value> {
        let id = match self.ctx.store.resolve_id(id).await {
            Ok(id) => id,
            Err(e) => return Envelope::err(e.to_string()),
        };
        if is_temp_id(&id) {
            return Envelope::err(format!("{name} is unavailable until {id} is synced"));
        }
        let operation = format!("{} {name}", E::COLLECTION);
        self.online_only(&operation, self.remote.aggregate(id, name.to_string()))
            .await
    }

    async fn attempt<T>(&self, call: RemoteFuture<'_, T>) -> Attempt<T> {
        if !self.ctx.connectivity.is_online() {
            debug!(collection = E::COLLECTION, "offline, using local store");
            return Attempt::Offline;
        }
        match call.await {
            Ok(value) => {
                self.ctx.connectivity.set_online(true);
                Attempt::Online(value)
            }
            Err(e) if e.is_transport() => {
                warn!(collection = E::COLLECTION, "remote unreachable, falling back: {}", e);
                self.ctx.connectivity.set_online(false);
                Attempt::Offline
            }
            Err(e) => {
                debug!(collection = E::COLLECTION, "remote rejected: {}", e);
                Attempt::Rejected(e)
            }
        }
    }

    async fn persist(&self, record: E) -> Envelope<E> {
        match self.ctx.store.save(&record).await {
            Ok(()) => Envelope::ok(record),
            Err(e) => Envelope::err(e.to_string()),
        }
    }

    /// Persist a server listing. Records with queued local mutations keep
    /// their local version.
    async fn absorb(&self, records: Vec<E>) -> tether_core::Result<Vec<E>> {
        let pending = self.pending_ids().await?;
        if pending.is_empty() {
            self.ctx.store.save_all(&records).await?;
            return Ok(records);
        }

        let mut merged = Vec::with_capacity(records.len());
        let mut fresh = Vec::new();
        for record in records {
            if pending.contains(record.id()) {
                if let Some(local) = self.ctx.store.get_by_id::<E>(record.id()).await? {
                    merged.push(local);
                    continue;
                }
            }
            fresh.push(record.clone());
            merged.push(record);
        }
        self.ctx.store.save_all(&fresh).await?;
        Ok(merged)
    }

    async fn local_all(&self, filter: &E::Filter) -> tether_core::Result<Vec<E>> {
        let records = self.ctx.store.get_all::<E>().await?;
        Ok(records.into_iter().filter(|r| r.matches(filter)).collect())
    }

    /// Record ids of this collection with live outbox entries.
    async fn pending_ids(&self) -> tether_core::Result<HashSet<String>> {
        Ok(self
            .ctx
            .outbox
            .snapshot()
            .await?
            .into_iter()
            .filter(|m| m.entity == E::COLLECTION)
            .map(|m| m.record_id)
            .collect())
    }

    /// Temp records and records with queued mutations must not bypass the
    /// outbox, or their mutations would reach the server out of order.
    async fn must_stay_local(&self, id: &str) -> tether_core::Result<bool> {
        Ok(is_temp_id(id) || self.ctx.outbox.has_later_for(0, E::COLLECTION, id).await?)
    }

    /// Serialize a draft with stale temp ids resolved.
    ///
    /// The flag is true if it still references unsynced records.
    async fn prepare_draft(&self, draft: &E::Draft) -> tether_core::Result<(E::Draft, Value, bool)> {
        let mut payload = serde_json::to_value(draft)?;
        let unresolved = self.resolve_references(&mut payload).await?;
        let draft = serde_json::from_value(payload.clone())?;
        Ok((draft, payload, unresolved))
    }

    /// Rewrite temp ids inside `value` that already have a server id.
    ///
    /// Returns true if any temp id is left.
    async fn resolve_references(&self, value: &mut Value) -> tether_core::Result<bool> {
        let mut temp_ids = Vec::new();
        collect_temp_ids(value, &mut temp_ids);
        let mut unresolved = false;
        for temp_id in temp_ids {
            let resolved = self.ctx.store.resolve_id(&temp_id).await?;
            if resolved == temp_id {
                unresolved = true;
            } else {
                rewrite_references(value, &temp_id, &resolved);
            }
        }
        Ok(unresolved)
    }

    async fn create_offline(&self, draft: &E::Draft, payload: &Value) -> tether_core::Result<E> {
        let id = self.ctx.ids.next_id();
        let record = E::from_draft(id.clone(), draft, self.ctx.clock.now());
        self.ctx
            .outbox
            .commit(MutationKind::Create, LocalWrite::Save(&record), payload)
            .await?;
        info!(collection = E::COLLECTION, id = %id, "created offline");
        Ok(record)
    }

    async fn update_offline(&self, id: &str, patch: Patch) -> tether_core::Result<Option<E>> {
        let Some(existing) = self.ctx.store.get_by_id::<E>(id).await? else {
            return Ok(None);
        };
        let merged = merge_patch(&existing, &patch, self.ctx.clock.now())?;
        self.ctx
            .outbox
            .commit(MutationKind::Update, LocalWrite::Save(&merged), &Value::Object(patch))
            .await?;
        info!(collection = E::COLLECTION, id, "updated offline");
        Ok(Some(merged))
    }

    async fn delete_offline(&self, id: &str) -> tether_core::Result<bool> {
        let Some(mut existing) = self.ctx.store.get_by_id::<E>(id).await? else {
            return Ok(false);
        };
        let write = match E::delete_policy() {
            DeletePolicy::Hard => LocalWrite::Remove(id),
            DeletePolicy::Soft => {
                existing.mark_deleted(self.ctx.clock.now());
                LocalWrite::Save(&existing)
            }
        };
        self.ctx
            .outbox
            .commit(MutationKind::Delete, write, &Value::Null)
            .await?;
        info!(collection = E::COLLECTION, id, "deleted offline");
        Ok(true)
    }

    async fn apply_delete_policy(&self, id: &str) -> tether_core::Result<bool> {
        match E::delete_policy() {
            DeletePolicy::Hard => self.ctx.store.delete::<E>(id).await,
            DeletePolicy::Soft => match self.ctx.store.get_by_id::<E>(id).await? {
                Some(mut record) => {
                    record.mark_deleted(self.ctx.clock.now());
                    self.ctx.store.save(&record).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    async fn replay_entry(&self, entry: &Mutation) -> RemoteResult<Option<Value>> {
        match entry.kind {
            MutationKind::Create => {
                let record = self.remote.create(entry.payload.clone()).await?;
                Ok(serde_json::to_value(&record).ok())
            }
            MutationKind::Update => {
                let Value::Object(patch) = &entry.payload else {
                    return Err(RemoteError::Rejected {
                        status: 400,
                        message: "queued update is not an object".to_string(),
                    });
                };
                let record = self
                    .remote
                    .update(entry.record_id.clone(), patch.clone())
                    .await?;
                Ok(serde_json::to_value(&record).ok())
            }
            MutationKind::Delete => match self.remote.delete(entry.record_id.clone()).await {
                Ok(()) => Ok(None),
                // Already gone on the server.
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    async fn reconcile_entry(
        &self,
        entry: &Mutation,
        server: Option<Value>,
    ) -> tether_core::Result<Reconciled> {
        let store = &self.ctx.store;
        let outbox = &self.ctx.outbox;
        match entry.kind {
            MutationKind::Create => {
                let Some(server) = server else {
                    return Ok(Reconciled::Unchanged);
                };
                let record: E = serde_json::from_value(server)?;
                let temp_id = entry.record_id.as_str();
                let server_id = record.id().to_string();
                if server_id != temp_id {
                    store.record_remap(E::COLLECTION, temp_id, &server_id).await?;
                    outbox.remap_id(temp_id, &server_id).await?;
                }

                if outbox
                    .has_later_for(entry.entry_id, E::COLLECTION, &server_id)
                    .await?
                {
                    // Pending local intent wins over the server response.
                    if let Some(mut local) = store.get_by_id::<E>(temp_id).await? {
                        local.set_id(server_id.clone());
                        store.replace(temp_id, &local).await?;
                    }
                } else {
                    store.replace(temp_id, &record).await?;
                }

                if server_id == temp_id {
                    Ok(Reconciled::Refreshed)
                } else {
                    info!(collection = E::COLLECTION, from = temp_id, to = %server_id, "reconciled");
                    Ok(Reconciled::Remapped {
                        from: temp_id.to_string(),
                        to: server_id,
                    })
                }
            }
            MutationKind::Update => {
                if outbox
                    .has_later_for(entry.entry_id, E::COLLECTION, &entry.record_id)
                    .await?
                {
                    return Ok(Reconciled::KeptLocal);
                }
                let Some(server) = server else {
                    return Ok(Reconciled::Unchanged);
                };
                let record: E = serde_json::from_value(server)?;
                store.save(&record).await?;
                Ok(Reconciled::Refreshed)
            }
            MutationKind::Delete => Ok(Reconciled::Unchanged),
        }
    }
}

impl<E: Entity> Replayer for Gateway<E> {
    fn entity(&self) -> &'static str {
        E::COLLECTION
    }

    fn replay<'a>(&'a self, entry: &'a Mutation) -> ReplayFuture<'a, RemoteResult<Option<Value>>> {
        Box::pin(self.replay_entry(entry))
    }

    fn reconcile<'a>(
        &'a self,
        entry: &'a Mutation,
        server: Option<Value>,
    ) -> ReplayFuture<'a, tether_core::Result<Reconciled>> {
        Box::pin(self.reconcile_entry(entry, server))
    }
}

fn collect_temp_ids(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if s.starts_with(TEMP_ID_PREFIX) => {
            if !out.contains(s) {
                out.push(s.clone());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_temp_ids(v, out)),
        Value::Object(fields) => fields.values().for_each(|v| collect_temp_ids(v, out)),
        _ => {}
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
