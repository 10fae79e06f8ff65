// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Named response caches.
//!
//! Each cache maps a request key (the absolute URL of a GET) to the last
//! stored response. Caches are namespaced by name, and a name carries the
//! generation tag, so purging an old generation is a matter of deleting its
//! caches.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tether_ipc::FetchResponse;

use crate::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS caches (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    cache TEXT NOT NULL REFERENCES caches(name) ON DELETE CASCADE,
    key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (cache, key)
);
"#;

/// SQLite-backed cache storage shared by every strategy.
pub struct CacheStorage {
    conn: Mutex<Connection>,
}

impl CacheStorage {
    /// Open or create the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(CacheStorage {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the named cache if it does not exist.
    pub fn open_cache(&self, name: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// All cache names, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Delete a cache and everything in it. Returns true if it existed.
    pub fn delete_cache(&self, name: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM caches WHERE name = ?1", params![name])?;
        Ok(changed > 0)
    }

    /// Store a response under `key`, replacing any previous one.
    pub fn put(&self, cache: &str, key: &str, response: &FetchResponse) -> Result<()> {
        self.open_cache(cache)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO entries (cache, key, status, headers, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                cache,
                key,
                response.status,
                serde_json::to_string(&response.headers)?,
                response.body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up `key` in one cache.
    pub fn get(&self, cache: &str, key: &str) -> Result<Option<FetchResponse>> {
        let row = self
            .conn()
            .query_row(
                "SELECT status, headers, body FROM entries WHERE cache = ?1 AND key = ?2",
                params![cache, key],
                |row| {
                    Ok((
                        row.get::<_, u16>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(status, headers, body)| {
            let headers: BTreeMap<String, String> = serde_json::from_str(&headers)?;
            Ok(FetchResponse {
                status,
                headers,
                body,
            })
        })
        .transpose()
    }

    /// Look up `key` across the given caches in order.
    pub fn match_any(&self, caches: &[&str], key: &str) -> Result<Option<FetchResponse>> {
        for cache in caches {
            if let Some(found) = self.get(cache, key)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Keys stored in a cache, sorted.
    pub fn keys(&self, cache: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM entries WHERE cache = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![cache], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
