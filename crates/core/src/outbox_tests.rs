// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tempfile::tempdir;
use yare::parameterized;

use super::*;
use crate::clock::ManualClock;
use crate::test_helpers::{contact, t0, Contact};

fn outbox() -> (Outbox, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(LocalStore::open_in_memory());
    (Outbox::with_clock(store, clock.clone()), clock)
}

#[parameterized(
    create = { "create", MutationKind::Create },
    update = { "update", MutationKind::Update },
    delete = { "delete", MutationKind::Delete },
    uppercase = { "DELETE", MutationKind::Delete },
)]
fn mutation_kind_parses(input: &str, expected: MutationKind) {
    assert_eq!(input.parse::<MutationKind>().unwrap(), expected);
}

#[test]
fn mutation_kind_rejects_unknown() {
    let err = "upsert".parse::<MutationKind>().unwrap_err();
    assert!(err.to_string().contains("valid kinds are"));
}

#[test]
fn mutation_serializes_kind_as_type() {
    let entry = Mutation {
        entry_id: 1,
        kind: MutationKind::Create,
        entity: "students".into(),
        record_id: "tmp_1-0-1".into(),
        payload: json!({"name": "A"}),
        created_at: t0(),
        attempts: 0,
        last_error: None,
        next_attempt_at: None,
        dead: false,
    };
    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["type"], "create");
    assert_eq!(value["entryId"], 1);
    assert!(value.get("lastError").is_none());
}

#[parameterized(
    first = { 1, 2 },
    second = { 2, 4 },
    third = { 3, 8 },
    capped = { 10, 300 },
    huge = { 200, 300 },
)]
fn retry_delay_doubles_until_capped(attempts: u32, expected_secs: i64) {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_for(attempts), Duration::seconds(expected_secs));
}

#[tokio::test]
async fn enqueue_preserves_fifo_order() {
    let (outbox, _) = outbox();
    outbox
        .enqueue(MutationKind::Create, "students", "tmp_a", &json!({"name": "A"}))
        .await
        .unwrap();
    outbox
        .enqueue(MutationKind::Update, "students", "tmp_a", &json!({"name": "B"}))
        .await
        .unwrap();
    outbox
        .enqueue(MutationKind::Delete, "students", "s-9", &json!(null))
        .await
        .unwrap();

    let kinds: Vec<_> = outbox
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.kind, e.record_id))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (MutationKind::Create, "tmp_a".to_string()),
            (MutationKind::Update, "tmp_a".to_string()),
            (MutationKind::Delete, "s-9".to_string()),
        ]
    );
    assert_eq!(outbox.len().await.unwrap(), 3);
}

#[tokio::test]
async fn entries_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tether.db");
    {
        let outbox = Outbox::new(Arc::new(LocalStore::open(&path)));
        outbox
            .enqueue(MutationKind::Create, "students", "tmp_a", &json!({"name": "A"}))
            .await
            .unwrap();
    }

    let outbox = Outbox::new(Arc::new(LocalStore::open(&path)));
    let entries = outbox.snapshot().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, json!({"name": "A"}));
}

#[tokio::test]
async fn remove_deletes_entry() {
    let (outbox, _) = outbox();
    let entry = outbox
        .enqueue(MutationKind::Create, "students", "tmp_a", &json!({}))
        .await
        .unwrap();

    outbox.remove(entry.entry_id).await.unwrap();

    assert!(outbox.is_empty().await.unwrap());
    assert!(matches!(
        outbox.remove(entry.entry_id).await,
        Err(Error::EntryNotFound(_))
    ));
}

#[tokio::test]
async fn record_failure_schedules_backoff() {
    let (outbox, _) = outbox();
    let entry = outbox
        .enqueue(MutationKind::Update, "students", "s-1", &json!({}))
        .await
        .unwrap();
    let policy = RetryPolicy::default();

    let outcome = outbox
        .record_failure(entry.entry_id, "connection refused", &policy)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        FailureOutcome::Retrying {
            attempts: 1,
            retry_at: t0() + Duration::seconds(2),
        }
    );

    let stored = outbox.get(entry.entry_id).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.last_error.as_deref(), Some("connection refused"));
    assert!(stored.is_backing_off(t0()));
    assert!(!stored.is_backing_off(t0() + Duration::seconds(2)));
}

#[tokio::test]
async fn record_failure_dead_letters_at_limit() {
    let (outbox, _) = outbox();
    let entry = outbox
        .enqueue(MutationKind::Update, "students", "s-1", &json!({}))
        .await
        .unwrap();
    let policy = RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    };

    outbox.record_failure(entry.entry_id, "timeout", &policy).await.unwrap();
    let outcome = outbox
        .record_failure(entry.entry_id, "timeout", &policy)
        .await
        .unwrap();

    assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 2 });
    assert!(outbox.is_empty().await.unwrap());
    assert_eq!(outbox.dead_len().await.unwrap(), 1);
}

#[tokio::test]
async fn retry_revives_dead_entry_in_place() {
    let (outbox, _) = outbox();
    let first = outbox
        .enqueue(MutationKind::Create, "students", "tmp_a", &json!({}))
        .await
        .unwrap();
    outbox
        .enqueue(MutationKind::Update, "students", "s-2", &json!({}))
        .await
        .unwrap();
    outbox.dead_letter(first.entry_id, "422 invalid").await.unwrap();
    assert_eq!(outbox.len().await.unwrap(), 1);

    outbox.retry(first.entry_id).await.unwrap();

    let entries = outbox.snapshot().await.unwrap();
    assert_eq!(entries[0].entry_id, first.entry_id);
    assert_eq!(entries[0].attempts, 0);
    assert_eq!(entries[0].last_error.as_deref(), Some("422 invalid"));
}

#[tokio::test]
async fn retry_rejects_live_entry() {
    let (outbox, _) = outbox();
    let entry = outbox
        .enqueue(MutationKind::Create, "students", "tmp_a", &json!({}))
        .await
        .unwrap();

    assert!(matches!(
        outbox.retry(entry.entry_id).await,
        Err(Error::EntryNotFound(_))
    ));
}

#[tokio::test]
async fn discard_only_drops_dead_entries() {
    let (outbox, _) = outbox();
    let live = outbox
        .enqueue(MutationKind::Create, "students", "tmp_a", &json!({}))
        .await
        .unwrap();
    let dead = outbox
        .enqueue(MutationKind::Delete, "students", "s-1", &json!(null))
        .await
        .unwrap();
    outbox.dead_letter(dead.entry_id, "403 forbidden").await.unwrap();

    assert!(outbox.discard(live.entry_id).await.is_err());
    let dropped = outbox.discard(dead.entry_id).await.unwrap();

    assert_eq!(dropped.record_id, "s-1");
    assert_eq!(outbox.dead_len().await.unwrap(), 0);
    assert_eq!(outbox.len().await.unwrap(), 1);
}

#[tokio::test]
async fn has_later_for_only_looks_forward() {
    let (outbox, _) = outbox();
    let create = outbox
        .enqueue(MutationKind::Create, "students", "tmp_a", &json!({}))
        .await
        .unwrap();
    let update = outbox
        .enqueue(MutationKind::Update, "students", "tmp_a", &json!({"name": "B"}))
        .await
        .unwrap();

    assert!(outbox.has_later_for(create.entry_id, "students", "tmp_a").await.unwrap());
    assert!(!outbox.has_later_for(update.entry_id, "students", "tmp_a").await.unwrap());
    assert!(!outbox.has_later_for(create.entry_id, "students", "s-1").await.unwrap());
}

#[tokio::test]
async fn has_later_for_keys_on_entity_and_id() {
    let (outbox, _) = outbox();
    outbox
        .enqueue(MutationKind::Update, "lessons", "srv-1", &json!({"notes": "x"}))
        .await
        .unwrap();

    assert!(outbox.has_later_for(0, "lessons", "srv-1").await.unwrap());
    assert!(!outbox.has_later_for(0, "students", "srv-1").await.unwrap());
}

#[tokio::test]
async fn remap_id_rewrites_targets_and_payload_references() {
    let (outbox, _) = outbox();
    outbox
        .enqueue(MutationKind::Update, "students", "tmp_a", &json!({"name": "B"}))
        .await
        .unwrap();
    outbox
        .enqueue(
            MutationKind::Create,
            "lessons",
            "tmp_l",
            &json!({"studentId": "tmp_a", "durationMinutes": 45}),
        )
        .await
        .unwrap();
    outbox
        .enqueue(MutationKind::Delete, "students", "s-7", &json!(null))
        .await
        .unwrap();

    let rewritten = outbox.remap_id("tmp_a", "s-100").await.unwrap();

    assert_eq!(rewritten, 2);
    let entries = outbox.snapshot().await.unwrap();
    assert_eq!(entries[0].record_id, "s-100");
    assert_eq!(entries[1].record_id, "tmp_l");
    assert_eq!(entries[1].payload["studentId"], "s-100");
    assert_eq!(entries[2].record_id, "s-7");
}

#[tokio::test]
async fn enqueue_uses_injected_clock() {
    let (outbox, clock) = outbox();
    clock.advance(Duration::minutes(5));

    let entry = outbox
        .enqueue(MutationKind::Create, "students", "tmp_a", &json!({}))
        .await
        .unwrap();

    assert_eq!(entry.created_at, t0() + Duration::minutes(5));
    let stored = outbox.get(entry.entry_id).await.unwrap().unwrap();
    assert_eq!(stored.created_at, entry.created_at);
}

#[test]
fn references_any_checks_record_and_payload() {
    let entry = Mutation {
        entry_id: 3,
        kind: MutationKind::Create,
        entity: "lessons".into(),
        record_id: "tmp_l".into(),
        payload: json!({"studentId": "tmp_s"}),
        created_at: t0(),
        attempts: 0,
        last_error: None,
        next_attempt_at: None,
        dead: false,
    };
    let blocked: HashSet<(String, String)> =
        [("students".to_string(), "tmp_s".to_string())].into_iter().collect();
    assert!(entry.references_any(&blocked));
    assert!(entry.references("tmp_l"));
    assert!(!entry.references("tmp_x"));
}

#[test]
fn references_any_does_not_cross_collections() {
    let entry = Mutation {
        entry_id: 4,
        kind: MutationKind::Update,
        entity: "students".into(),
        record_id: "srv-1".into(),
        payload: json!({"name": "Ana"}),
        created_at: t0(),
        attempts: 0,
        last_error: None,
        next_attempt_at: None,
        dead: false,
    };
    let lesson: HashSet<(String, String)> =
        [("lessons".to_string(), "srv-1".to_string())].into_iter().collect();
    let student: HashSet<(String, String)> =
        [("students".to_string(), "srv-1".to_string())].into_iter().collect();

    assert!(!entry.references_any(&lesson));
    assert!(entry.references_any(&student));
}

#[test]
fn references_any_ignores_server_id_mentions() {
    let entry = Mutation {
        entry_id: 5,
        kind: MutationKind::Update,
        entity: "lessons".into(),
        record_id: "srv-9".into(),
        payload: json!({"studentId": "srv-1"}),
        created_at: t0(),
        attempts: 0,
        last_error: None,
        next_attempt_at: None,
        dead: false,
    };
    let blocked: HashSet<(String, String)> =
        [("students".to_string(), "srv-1".to_string())].into_iter().collect();

    assert!(!entry.references_any(&blocked));
}

#[tokio::test]
async fn commit_writes_record_and_entry_together() {
    let store = Arc::new(LocalStore::open_in_memory());
    let outbox = Outbox::with_clock(store.clone(), Arc::new(ManualClock::new(t0())));
    let record = contact("c-1", "Ada");

    let entry = outbox
        .commit(MutationKind::Update, LocalWrite::Save(&record), &json!({"name": "Ada"}))
        .await
        .unwrap();

    assert_eq!(entry.entity, "contacts");
    assert_eq!(entry.record_id, "c-1");
    assert!(store.get_by_id::<Contact>("c-1").await.unwrap().is_some());
    assert_eq!(outbox.len().await.unwrap(), 1);

    outbox
        .commit(MutationKind::Delete, LocalWrite::<Contact>::Remove("c-1"), &Value::Null)
        .await
        .unwrap();
    assert!(store.get_by_id::<Contact>("c-1").await.unwrap().is_none());
    assert_eq!(outbox.len().await.unwrap(), 2);
}

#[tokio::test]
async fn commit_rolls_back_record_when_queueing_fails() {
    let store = Arc::new(LocalStore::open_in_memory());
    let outbox = Outbox::with_clock(store.clone(), Arc::new(ManualClock::new(t0())));
    store.save(&contact("c-1", "Ada")).await.unwrap();
    {
        let conn = store.connection().await.unwrap();
        conn.execute_batch(
            "CREATE TRIGGER outbox_full BEFORE INSERT ON outbox
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
    }

    let renamed = contact("c-1", "Grace");
    let err = outbox
        .commit(MutationKind::Update, LocalWrite::Save(&renamed), &json!({"name": "Grace"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)));

    let err = outbox
        .commit(MutationKind::Delete, LocalWrite::<Contact>::Remove("c-1"), &Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)));

    let stored: Contact = store.get_by_id("c-1").await.unwrap().unwrap();
    assert_eq!(stored.name, "Ada");
    assert!(outbox.is_empty().await.unwrap());
}
