// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde::Deserialize;
use tempfile::tempdir;

use super::*;
use crate::test_helpers::{contact, Contact};

#[tokio::test]
async fn save_and_get_by_id() {
    let store = LocalStore::open_in_memory();
    store.save(&contact("c-1", "Ada")).await.unwrap();

    let found: Contact = store.get_by_id("c-1").await.unwrap().unwrap();
    assert_eq!(found.name, "Ada");
}

#[tokio::test]
async fn get_by_id_missing_is_none() {
    let store = LocalStore::open_in_memory();
    let found: Option<Contact> = store.get_by_id("nope").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn save_upserts() {
    let store = LocalStore::open_in_memory();
    store.save(&contact("c-1", "Ada")).await.unwrap();
    store.save(&contact("c-1", "Grace")).await.unwrap();

    let all: Vec<Contact> = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Grace");
}

#[tokio::test]
async fn save_all_and_get_all() {
    let store = LocalStore::open_in_memory();
    let records = vec![contact("c-1", "Ada"), contact("c-2", "Grace")];
    store.save_all(&records).await.unwrap();

    let mut all: Vec<Contact> = store.get_all().await.unwrap();
    all.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(all, records);
    assert_eq!(store.count(Contact::COLLECTION).await.unwrap(), 2);
}

#[tokio::test]
async fn collections_are_isolated() {
    #[derive(Debug, Clone, serde::Serialize, Deserialize)]
    struct Tag {
        id: String,
    }

    impl Entity for Tag {
        type Draft = ();
        type Filter = ();
        const COLLECTION: &'static str = "tags";
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
        fn from_draft(id: String, _: &(), _: chrono::DateTime<chrono::Utc>) -> Self {
            Tag { id }
        }
        fn touch(&mut self, _: chrono::DateTime<chrono::Utc>) {}
        fn matches(&self, _: &()) -> bool {
            true
        }
    }

    let store = LocalStore::open_in_memory();
    store.save(&contact("shared", "Ada")).await.unwrap();
    store.save(&Tag { id: "shared".into() }).await.unwrap();

    assert!(store.delete::<Tag>("shared").await.unwrap());
    let still_there: Option<Contact> = store.get_by_id("shared").await.unwrap();
    assert!(still_there.is_some());
}

#[tokio::test]
async fn delete_reports_existence() {
    let store = LocalStore::open_in_memory();
    store.save(&contact("c-1", "Ada")).await.unwrap();

    assert!(store.delete::<Contact>("c-1").await.unwrap());
    assert!(!store.delete::<Contact>("c-1").await.unwrap());
}

#[tokio::test]
async fn replace_swaps_temp_record() {
    let store = LocalStore::open_in_memory();
    store.save(&contact("tmp_1-0-1", "Ada")).await.unwrap();

    store
        .replace("tmp_1-0-1", &contact("srv-10", "Ada"))
        .await
        .unwrap();

    let all: Vec<Contact> = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "srv-10");
}

#[tokio::test]
async fn record_remap_rewrites_references_and_resolves() {
    let store = LocalStore::open_in_memory();
    let mut child = contact("c-2", "Child");
    child.owner_id = Some("tmp_1-0-1".into());
    store.save(&child).await.unwrap();
    store.save(&contact("c-3", "Unrelated")).await.unwrap();

    let rewritten = store
        .record_remap(Contact::COLLECTION, "tmp_1-0-1", "srv-10")
        .await
        .unwrap();

    assert_eq!(rewritten, 1);
    let child: Contact = store.get_by_id("c-2").await.unwrap().unwrap();
    assert_eq!(child.owner_id.as_deref(), Some("srv-10"));
    assert_eq!(store.resolve_id("tmp_1-0-1").await.unwrap(), "srv-10");
    assert_eq!(store.resolve_id("c-3").await.unwrap(), "c-3");
}

#[tokio::test]
async fn meta_slot_is_overwritten_wholesale() {
    #[derive(Debug, PartialEq, serde::Serialize, Deserialize)]
    struct Settings {
        currency: String,
        #[serde(default)]
        rounding: Option<u32>,
    }

    let store = LocalStore::open_in_memory();
    assert!(store.get_meta::<Settings>("settings").await.unwrap().is_none());

    store
        .put_meta(
            "settings",
            &Settings {
                currency: "VND".into(),
                rounding: Some(1000),
            },
        )
        .await
        .unwrap();
    store
        .put_meta(
            "settings",
            &Settings {
                currency: "USD".into(),
                rounding: None,
            },
        )
        .await
        .unwrap();

    let settings: Settings = store.get_meta("settings").await.unwrap().unwrap();
    assert_eq!(
        settings,
        Settings {
            currency: "USD".into(),
            rounding: None
        }
    );
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("tether.db");

    {
        let store = LocalStore::open(&path);
        store.save(&contact("c-1", "Ada")).await.unwrap();
    }

    let store = LocalStore::open(&path);
    let found: Option<Contact> = store.get_by_id("c-1").await.unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn unavailable_store_fails_the_call() {
    let dir = tempdir().unwrap();
    // A directory where the database file should be
    let path = dir.path().join("db");
    std::fs::create_dir(&path).unwrap();

    let store = LocalStore::open(&path);
    let err = store.get_all::<Contact>().await.unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(_) | Error::Database(_)));
}

#[tokio::test]
async fn concurrent_first_use_initializes_once() {
    let store = Arc::new(LocalStore::open_in_memory());

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.save(&contact(&format!("c-{i}"), "x")).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // A second in-memory init would have produced a fresh, empty database
    assert_eq!(store.count(Contact::COLLECTION).await.unwrap(), 8);
}

#[tokio::test]
async fn corrupted_row_is_reported() {
    let store = LocalStore::open_in_memory();
    {
        let conn = store.connection().await.unwrap();
        conn.execute(
            "INSERT INTO records (collection, id, data) VALUES ('contacts', 'bad', '{oops')",
            [],
        )
        .unwrap();
    }
    let err = store.get_by_id::<Contact>("bad").await.unwrap_err();
    assert!(matches!(err, Error::CorruptedData(_)));
}

#[test]
fn drain_lease_is_exclusive_across_handles_on_one_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tether.db");
    let first = LocalStore::open(&path);
    let second = LocalStore::open(&path);

    let lease = first.try_drain_lease().unwrap();
    assert!(lease.is_some());
    assert!(second.try_drain_lease().unwrap().is_none());
    assert!(first.try_drain_lease().unwrap().is_none());
    assert!(dir.path().join("tether.db.drain.lock").exists());

    drop(lease);
    assert!(second.try_drain_lease().unwrap().is_some());
}

#[test]
fn drain_lease_in_memory_is_released_on_drop() {
    let store = LocalStore::open_in_memory();

    let lease = store.try_drain_lease().unwrap();
    assert!(lease.is_some());
    assert!(store.try_drain_lease().unwrap().is_none());

    drop(lease);
    assert!(store.try_drain_lease().unwrap().is_some());
}
