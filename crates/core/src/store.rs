// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed local persistent store.
//!
//! The [`LocalStore`] keeps one logical collection per entity type as an
//! `id → record` lookup table, plus a metadata slot table and the temp-id
//! remap table. The outbox lives in the same database file.
//!
//! The connection is opened lazily behind a process-wide init-once gate: the
//! first call performs initialization and every other call awaits it. A
//! failed initialization fails only the call that triggered it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fs2::FileExt;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, OnceCell};

use crate::error::{Error, Result};
use crate::record::{self, Entity};

/// SQL schema for the local store.
pub const SCHEMA: &str = r#"
-- Entity records, one logical collection per entity type
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);

-- Singleton metadata slots, overwritten wholesale
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Pending mutations in global FIFO order
CREATE TABLE IF NOT EXISTS outbox (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    entity TEXT NOT NULL,
    record_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    next_attempt_at TEXT,
    dead INTEGER NOT NULL DEFAULT 0
);

-- Temp ids that have been replaced by canonical server ids
CREATE TABLE IF NOT EXISTS id_remap (
    temp_id TEXT PRIMARY KEY,
    server_id TEXT NOT NULL,
    collection TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_outbox_record ON outbox(record_id);
CREATE INDEX IF NOT EXISTS idx_outbox_dead ON outbox(dead);
"#;

enum Location {
    File(PathBuf),
    Memory,
}

/// Durable key-value collections keyed by entity type.
pub struct LocalStore {
    location: Location,
    conn: OnceCell<Mutex<Connection>>,
    drain_held: Arc<AtomicBool>,
}

/// Exclusive right to drain the outbox of one database.
///
/// File-backed stores hold an advisory lock on a sibling `.drain.lock` file,
/// so the lease excludes other processes as well as other handles opened on
/// the same path. Released on drop.
pub struct DrainLease {
    file: Option<File>,
    held: Arc<AtomicBool>,
}

impl Drop for DrainLease {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = FileExt::unlock(file);
        }
        self.held.store(false, Ordering::Release);
    }
}

impl LocalStore {
    /// Create a store backed by the database file at `path`.
    ///
    /// Nothing is opened until the first operation.
    pub fn open(path: &Path) -> Self {
        LocalStore {
            location: Location::File(path.to_path_buf()),
            conn: OnceCell::new(),
            drain_held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a store backed by an in-memory database (for testing).
    pub fn open_in_memory() -> Self {
        LocalStore {
            location: Location::Memory,
            conn: OnceCell::new(),
            drain_held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the one-time initialization now instead of on first use.
    pub async fn init(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    /// Wait for initialization, then lock the connection.
    pub(crate) async fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        let conn = self
            .conn
            .get_or_try_init(|| async { self.initialize().map(Mutex::new) })
            .await?;
        Ok(conn.lock().await)
    }

    /// Try to take the drain lease without blocking.
    ///
    /// Returns `None` while another holder, in this process or any other,
    /// has it.
    pub fn try_drain_lease(&self) -> Result<Option<DrainLease>> {
        if self
            .drain_held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        let mut lease = DrainLease {
            file: None,
            held: Arc::clone(&self.drain_held),
        };

        if let Location::File(path) = &self.location {
            let lock_path = drain_lock_path(path);
            if let Some(parent) = lock_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            match file.try_lock_exclusive() {
                Ok(()) => lease.file = Some(file),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(lease))
    }

    fn initialize(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            Error::StoreUnavailable(format!("{}: {e}", parent.display()))
                        })?;
                    }
                }
                let conn = Connection::open(path)
                    .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", path.display())))?;
                conn.execute_batch(
                    "PRAGMA journal_mode = WAL;
                     PRAGMA busy_timeout = 5000;",
                )?;
                conn
            }
            Location::Memory => Connection::open_in_memory()
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?,
        };

        conn.execute_batch(SCHEMA)?;
        tracing::debug!("local store initialized");
        Ok(conn)
    }

    /// Insert or replace one record.
    pub async fn save<E: Entity>(&self, record: &E) -> Result<()> {
        let conn = self.connection().await?;
        upsert(&conn, E::COLLECTION, record.id(), &serde_json::to_string(record)?)
    }

    /// Insert or replace many records in one transaction.
    pub async fn save_all<E: Entity>(&self, records: &[E]) -> Result<()> {
        let mut conn = self.connection().await?;
        let tx = conn.transaction()?;
        for record in records {
            upsert(&tx, E::COLLECTION, record.id(), &serde_json::to_string(record)?)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All records of a collection, in no particular order.
    pub async fn get_all<E: Entity>(&self) -> Result<Vec<E>> {
        let conn = self.connection().await?;
        let mut stmt = conn.prepare("SELECT id, data FROM records WHERE collection = ?1")?;
        let rows = stmt.query_map(params![E::COLLECTION], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, data) = row?;
            records.push(decode::<E>(&id, &data)?);
        }
        Ok(records)
    }

    /// Look up one record.
    pub async fn get_by_id<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let conn = self.connection().await?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![E::COLLECTION, id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| decode::<E>(id, &d)).transpose()
    }

    /// Remove one record. Returns false if it did not exist.
    pub async fn delete<E: Entity>(&self, id: &str) -> Result<bool> {
        let conn = self.connection().await?;
        let changed = conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![E::COLLECTION, id],
        )?;
        Ok(changed > 0)
    }

    /// Atomically swap the record stored under `old_id` for `record`.
    ///
    /// Used to reconcile a temp record with its canonical counterpart.
    pub async fn replace<E: Entity>(&self, old_id: &str, record: &E) -> Result<()> {
        let mut conn = self.connection().await?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![E::COLLECTION, old_id],
        )?;
        upsert(&tx, E::COLLECTION, record.id(), &serde_json::to_string(record)?)?;
        tx.commit()?;
        Ok(())
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: &str) -> Result<usize> {
        let conn = self.connection().await?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Remember that `temp_id` became `server_id`, and rewrite every stored
    /// record that still references the temp id.
    ///
    /// Returns the number of records rewritten.
    pub async fn record_remap(
        &self,
        collection: &str,
        temp_id: &str,
        server_id: &str,
    ) -> Result<usize> {
        let mut conn = self.connection().await?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO id_remap (temp_id, server_id, collection) VALUES (?1, ?2, ?3)",
            params![temp_id, server_id, collection],
        )?;

        let candidates: Vec<(String, String, String)> = {
            let mut stmt =
                tx.prepare("SELECT collection, id, data FROM records WHERE data LIKE ?1")?;
            let pattern = format!("%\"{temp_id}\"%");
            let rows = stmt.query_map(params![pattern], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let mut rewritten = 0;
        for (coll, id, data) in candidates {
            let mut value: serde_json::Value = serde_json::from_str(&data)?;
            if record::rewrite_references(&mut value, temp_id, server_id) == 0 {
                continue;
            }
            upsert(&tx, &coll, &id, &serde_json::to_string(&value)?)?;
            rewritten += 1;
        }
        tx.commit()?;
        Ok(rewritten)
    }

    /// Map a possibly stale temp id to the server id it was reconciled to.
    ///
    /// Ids without a remap entry are returned unchanged.
    pub async fn resolve_id(&self, id: &str) -> Result<String> {
        let conn = self.connection().await?;
        let server_id: Option<String> = conn
            .query_row(
                "SELECT server_id FROM id_remap WHERE temp_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(server_id.unwrap_or_else(|| id.to_string()))
    }

    /// Read a metadata slot.
    pub async fn get_meta<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.connection().await?;
        let value: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    /// Overwrite a metadata slot.
    pub async fn put_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let conn = self.connection().await?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, serde_json::to_string(value)?],
        )?;
        Ok(())
    }
}

fn drain_lock_path(db: &Path) -> PathBuf {
    let mut name = db.file_name().unwrap_or_default().to_os_string();
    name.push(".drain.lock");
    db.with_file_name(name)
}

pub(crate) fn upsert(conn: &Connection, collection: &str, id: &str, data: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO records (collection, id, data) VALUES (?1, ?2, ?3)",
        params![collection, id, data],
    )?;
    Ok(())
}

fn decode<E: Entity>(id: &str, data: &str) -> Result<E> {
    serde_json::from_str(data)
        .map_err(|e| Error::CorruptedData(format!("{}/{id}: {e}", E::COLLECTION)))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
