// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable outbox of mutations accepted while offline.
//!
//! Entries are stored in the same database as the local store and are
//! ordered by a monotonically increasing entry id, which is the only ordering
//! guarantee. An entry stays until its remote call succeeds, it is discarded,
//! or it is moved to the dead-letter set after repeated or authoritative
//! failures.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{ClockSource, SystemClock};
use crate::error::{Error, Result};
use crate::record::{self, Entity};
use crate::store::{self, DrainLease, LocalStore};
use crate::temp_id::is_temp_id;

/// What a queued mutation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" => Ok(MutationKind::Create),
            "update" => Ok(MutationKind::Update),
            "delete" => Ok(MutationKind::Delete),
            _ => Err(Error::InvalidMutationKind(s.to_string())),
        }
    }
}

/// One outbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Position in the global FIFO.
    pub entry_id: i64,
    #[serde(rename = "type")]
    pub kind: MutationKind,
    /// Collection name of the affected entity.
    pub entity: String,
    /// Record the mutation applies to. For creates this is the temp id.
    pub record_id: String,
    /// Original payload: a draft for creates, a patch for updates.
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Earliest time the entry may be retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Set once the entry has been moved to the dead-letter set.
    #[serde(default)]
    pub dead: bool,
}

impl Mutation {
    /// Returns true if the entry targets or mentions `id`.
    pub fn references(&self, id: &str) -> bool {
        self.record_id == id || record::references(&self.payload, id)
    }

    /// Returns true if the entry targets a record in `blocked`, or mentions a
    /// blocked record that only exists locally.
    ///
    /// Keys are `(entity, record_id)`. Server ids are only unique within a
    /// collection, so payload mentions count for temp ids alone.
    pub fn references_any(&self, blocked: &HashSet<(String, String)>) -> bool {
        blocked.iter().any(|(entity, id)| {
            (*entity == self.entity && *id == self.record_id)
                || (is_temp_id(id) && record::references(&self.payload, id))
        })
    }

    /// The `(entity, record_id)` key of the record this entry targets.
    pub fn record_key(&self) -> (String, String) {
        (self.entity.clone(), self.record_id.clone())
    }

    /// Returns true if the entry is still waiting out a backoff delay.
    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_some_and(|at| at > now)
    }
}

/// Bounded retry schedule with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which an entry is dead-lettered.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 8,
            base_delay: Duration::seconds(2),
            max_delay: Duration::minutes(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given the number of failed attempts so far.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(30);
        let factor = 1i32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The entry stays queued until `retry_at`.
    Retrying { attempts: u32, retry_at: DateTime<Utc> },
    /// The entry hit the attempt limit and was dead-lettered.
    DeadLettered { attempts: u32 },
}

/// A change to the local store that is committed with its outbox entry.
#[derive(Debug)]
pub enum LocalWrite<'a, E> {
    /// Insert or replace the record.
    Save(&'a E),
    /// Remove the record with this id.
    Remove(&'a str),
}

impl<E: Entity> LocalWrite<'_, E> {
    fn record_id(&self) -> &str {
        match self {
            LocalWrite::Save(record) => record.id(),
            LocalWrite::Remove(id) => id,
        }
    }
}

/// Durable, ordered queue of pending mutations.
pub struct Outbox {
    store: Arc<LocalStore>,
    clock: Arc<dyn ClockSource>,
}

const COLUMNS: &str = "entry_id, kind, entity, record_id, payload, created_at, attempts, \
                       last_error, next_attempt_at, dead";

impl Outbox {
    /// Create an outbox sharing the given store's database.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create an outbox with a custom clock source.
    pub fn with_clock(store: Arc<LocalStore>, clock: Arc<dyn ClockSource>) -> Self {
        Outbox { store, clock }
    }

    /// Append a mutation. The entry is durable once this returns.
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        entity: &str,
        record_id: &str,
        payload: &Value,
    ) -> Result<Mutation> {
        let created_at = self.clock.now();
        let conn = self.store.connection().await?;
        let entry = insert_entry(&conn, kind, entity, record_id, payload, created_at)?;
        tracing::debug!(entry_id = entry.entry_id, %kind, entity, record_id, "mutation queued");
        Ok(entry)
    }

    /// Apply a local write and queue the mutation describing it, atomically.
    ///
    /// Either both land or neither does, so the store never shows a change
    /// the outbox will not replay.
    pub async fn commit<E: Entity>(
        &self,
        kind: MutationKind,
        write: LocalWrite<'_, E>,
        payload: &Value,
    ) -> Result<Mutation> {
        let created_at = self.clock.now();
        let mut conn = self.store.connection().await?;
        let tx = conn.transaction()?;
        match &write {
            LocalWrite::Save(record) => {
                store::upsert(&tx, E::COLLECTION, record.id(), &serde_json::to_string(record)?)?;
            }
            LocalWrite::Remove(id) => {
                tx.execute(
                    "DELETE FROM records WHERE collection = ?1 AND id = ?2",
                    params![E::COLLECTION, id],
                )?;
            }
        }
        let entry = insert_entry(&tx, kind, E::COLLECTION, write.record_id(), payload, created_at)?;
        tx.commit()?;
        tracing::debug!(
            entry_id = entry.entry_id,
            %kind,
            entity = E::COLLECTION,
            record_id = %entry.record_id,
            "mutation committed"
        );
        Ok(entry)
    }

    /// Take the exclusive right to drain this outbox, if nobody holds it.
    pub fn try_drain_lease(&self) -> Result<Option<DrainLease>> {
        self.store.try_drain_lease()
    }

    /// All live entries in FIFO order.
    pub async fn snapshot(&self) -> Result<Vec<Mutation>> {
        let conn = self.store.connection().await?;
        select(&conn, "WHERE dead = 0 ORDER BY entry_id")
    }

    /// All dead-lettered entries in FIFO order.
    pub async fn dead_letters(&self) -> Result<Vec<Mutation>> {
        let conn = self.store.connection().await?;
        select(&conn, "WHERE dead = 1 ORDER BY entry_id")
    }

    /// Look up one entry, live or dead.
    pub async fn get(&self, entry_id: i64) -> Result<Option<Mutation>> {
        let conn = self.store.connection().await?;
        let sql = format!("SELECT {COLUMNS} FROM outbox WHERE entry_id = ?1");
        Ok(conn
            .query_row(&sql, params![entry_id], row_to_mutation)
            .optional()?)
    }

    /// Number of live entries.
    pub async fn len(&self) -> Result<usize> {
        self.count("dead = 0").await
    }

    /// Returns true if there are no live entries.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Number of dead-lettered entries.
    pub async fn dead_len(&self) -> Result<usize> {
        self.count("dead = 1").await
    }

    async fn count(&self, condition: &str) -> Result<usize> {
        let conn = self.store.connection().await?;
        let sql = format!("SELECT COUNT(*) FROM outbox WHERE {condition}");
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns true if a live entry queued after `entry_id` targets the
    /// `record_id` of `entity`.
    pub async fn has_later_for(&self, entry_id: i64, entity: &str, record_id: &str) -> Result<bool> {
        let conn = self.store.connection().await?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM outbox
             WHERE dead = 0 AND entry_id > ?1 AND entity = ?2 AND record_id = ?3)",
            params![entry_id, entity, record_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Remove an entry after its remote call succeeded.
    pub async fn remove(&self, entry_id: i64) -> Result<()> {
        let conn = self.store.connection().await?;
        let changed = conn.execute("DELETE FROM outbox WHERE entry_id = ?1", params![entry_id])?;
        if changed == 0 {
            return Err(Error::EntryNotFound(entry_id));
        }
        Ok(())
    }

    /// Record a failed attempt and schedule the next one.
    pub async fn record_failure(
        &self,
        entry_id: i64,
        error: &str,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome> {
        let now = self.clock.now();
        let conn = self.store.connection().await?;
        let attempts: i64 = conn
            .query_row(
                "SELECT attempts FROM outbox WHERE entry_id = ?1",
                params![entry_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(Error::EntryNotFound(entry_id))?;
        let attempts = u32::try_from(attempts).unwrap_or(u32::MAX).saturating_add(1);

        if attempts >= policy.max_attempts {
            conn.execute(
                "UPDATE outbox SET attempts = ?2, last_error = ?3, next_attempt_at = NULL, dead = 1
                 WHERE entry_id = ?1",
                params![entry_id, attempts, error],
            )?;
            return Ok(FailureOutcome::DeadLettered { attempts });
        }

        let retry_at = now + policy.delay_for(attempts);
        conn.execute(
            "UPDATE outbox SET attempts = ?2, last_error = ?3, next_attempt_at = ?4
             WHERE entry_id = ?1",
            params![entry_id, attempts, error, retry_at.to_rfc3339()],
        )?;
        Ok(FailureOutcome::Retrying { attempts, retry_at })
    }

    /// Move an entry straight to the dead-letter set.
    pub async fn dead_letter(&self, entry_id: i64, error: &str) -> Result<()> {
        let conn = self.store.connection().await?;
        let changed = conn.execute(
            "UPDATE outbox SET attempts = attempts + 1, last_error = ?2, next_attempt_at = NULL,
             dead = 1 WHERE entry_id = ?1",
            params![entry_id, error],
        )?;
        if changed == 0 {
            return Err(Error::EntryNotFound(entry_id));
        }
        Ok(())
    }

    /// Put a dead-lettered entry back in the live queue with a fresh attempt budget.
    ///
    /// The entry keeps its original FIFO position.
    pub async fn retry(&self, entry_id: i64) -> Result<()> {
        let conn = self.store.connection().await?;
        let changed = conn.execute(
            "UPDATE outbox SET dead = 0, attempts = 0, next_attempt_at = NULL
             WHERE entry_id = ?1 AND dead = 1",
            params![entry_id],
        )?;
        if changed == 0 {
            return Err(Error::EntryNotFound(entry_id));
        }
        Ok(())
    }

    /// Drop a dead-lettered entry for good.
    pub async fn discard(&self, entry_id: i64) -> Result<Mutation> {
        let entry = self
            .get(entry_id)
            .await?
            .filter(|e| e.dead)
            .ok_or(Error::EntryNotFound(entry_id))?;
        self.remove(entry_id).await?;
        tracing::info!(entry_id, kind = %entry.kind, record_id = %entry.record_id, "dead entry discarded");
        Ok(entry)
    }

    /// Rewrite every remaining entry that refers to `temp_id` so it refers to
    /// `server_id` instead.
    ///
    /// Returns the number of entries rewritten.
    pub async fn remap_id(&self, temp_id: &str, server_id: &str) -> Result<usize> {
        let mut conn = self.store.connection().await?;
        let tx = conn.transaction()?;
        let entries = select(&tx, "ORDER BY entry_id")?;

        let mut rewritten = 0;
        for mut entry in entries.into_iter().filter(|e| e.references(temp_id)) {
            if entry.record_id == temp_id {
                entry.record_id = server_id.to_string();
            }
            record::rewrite_references(&mut entry.payload, temp_id, server_id);
            tx.execute(
                "UPDATE outbox SET record_id = ?2, payload = ?3 WHERE entry_id = ?1",
                params![
                    entry.entry_id,
                    entry.record_id,
                    serde_json::to_string(&entry.payload)?
                ],
            )?;
            rewritten += 1;
        }
        tx.commit()?;
        Ok(rewritten)
    }
}

fn insert_entry(
    conn: &Connection,
    kind: MutationKind,
    entity: &str,
    record_id: &str,
    payload: &Value,
    created_at: DateTime<Utc>,
) -> Result<Mutation> {
    conn.execute(
        "INSERT INTO outbox (kind, entity, record_id, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            kind.as_str(),
            entity,
            record_id,
            serde_json::to_string(payload)?,
            created_at.to_rfc3339(),
        ],
    )?;
    Ok(Mutation {
        entry_id: conn.last_insert_rowid(),
        kind,
        entity: entity.to_string(),
        record_id: record_id.to_string(),
        payload: payload.clone(),
        created_at,
        attempts: 0,
        last_error: None,
        next_attempt_at: None,
        dead: false,
    })
}

fn select(conn: &Connection, clause: &str) -> Result<Vec<Mutation>> {
    let sql = format!("SELECT {COLUMNS} FROM outbox {clause}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_mutation)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn row_to_mutation(row: &Row<'_>) -> rusqlite::Result<Mutation> {
    let kind: String = row.get(1)?;
    let payload: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let attempts: i64 = row.get(6)?;
    let next_attempt_at: Option<String> = row.get(8)?;

    Ok(Mutation {
        entry_id: row.get(0)?,
        kind: kind.parse().map_err(|e| conversion_error(1, e))?,
        entity: row.get(2)?,
        record_id: row.get(3)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(4, e))?,
        created_at: parse_timestamp(5, &created_at)?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        last_error: row.get(7)?,
        next_attempt_at: next_attempt_at
            .map(|at| parse_timestamp(8, &at))
            .transpose()?,
        dead: row.get(9)?,
    })
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            conversion_error(
                column,
                Error::CorruptedData(format!("invalid timestamp '{value}'")),
            )
        })
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

#[cfg(test)]
#[path = "outbox_tests.rs"]
mod tests;
