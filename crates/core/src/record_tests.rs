// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use chrono::Duration;
use serde_json::json;

use super::*;
use crate::test_helpers::{contact, t0, Contact};

fn patch(value: Value) -> Patch {
    value.as_object().unwrap().clone()
}

#[test]
fn merge_patch_changes_only_given_fields() {
    let original = contact("c-1", "Ada");
    let later = t0() + Duration::minutes(5);

    let merged = merge_patch(&original, &patch(json!({"name": "Ada L."})), later).unwrap();

    assert_eq!(merged.name, "Ada L.");
    assert!(merged.active);
    assert_eq!(merged.created_at, original.created_at);
    assert_eq!(merged.updated_at, later);
}

#[test]
fn merge_patch_never_changes_id() {
    let original = contact("c-1", "Ada");
    let merged = merge_patch(&original, &patch(json!({"id": "c-2"})), t0()).unwrap();
    assert_eq!(merged.id, "c-1");
}

#[test]
fn merge_patch_rejects_wrong_types() {
    let original = contact("c-1", "Ada");
    let err = merge_patch(&original, &patch(json!({"active": "yes"})), t0()).unwrap_err();
    assert!(matches!(err, Error::InvalidPatch(_)));
}

#[test]
fn soft_delete_policy_clears_active() {
    let mut record = contact("c-1", "Ada");
    assert_eq!(Contact::delete_policy(), DeletePolicy::Soft);
    record.mark_deleted(t0() + Duration::seconds(1));
    assert!(!record.active);
}

#[test]
fn references_finds_nested_strings() {
    let value = json!({"name": "x", "links": [{"ownerId": "tmp_1-0-1"}]});
    assert!(references(&value, "tmp_1-0-1"));
    assert!(!references(&value, "tmp_2-0-1"));
}

#[test]
fn rewrite_references_replaces_every_match() {
    let mut value = json!({
        "ownerId": "tmp_1-0-1",
        "tags": ["tmp_1-0-1", "other"],
        "nested": {"parent": "tmp_1-0-1", "count": 3}
    });

    let replaced = rewrite_references(&mut value, "tmp_1-0-1", "srv-9");

    assert_eq!(replaced, 3);
    assert_eq!(value["ownerId"], "srv-9");
    assert_eq!(value["tags"][0], "srv-9");
    assert_eq!(value["tags"][1], "other");
    assert_eq!(value["nested"]["parent"], "srv-9");
}
