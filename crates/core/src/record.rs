// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Entity records and the traits that describe them.
//!
//! Every synchronized resource type implements [`Entity`]. The trait carries
//! the pieces that differ between resources (collection name, server-side
//! defaulting, filter semantics, delete policy) so the gateway logic itself
//! can stay generic.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Partial update: the changed fields of a record, keyed by their wire names.
pub type Patch = Map<String, Value>;

/// How a resource is deleted, applied identically online and offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// The record stays in place with its active flag cleared.
    Soft,
    /// The record is removed.
    Hard,
}

/// A synchronized resource type.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Creation payload, as sent to the remote API.
    type Draft: Clone + Send + Sync + Serialize + DeserializeOwned;
    /// Query predicate for list operations.
    type Filter: Clone + Default + Send + Sync + Serialize;

    /// Name of the store collection and remote resource.
    const COLLECTION: &'static str;

    /// Record identifier (canonical or temporary).
    fn id(&self) -> &str;

    /// Replaces the identifier.
    fn set_id(&mut self, id: String);

    /// Builds a record from a draft, applying the same defaults the server
    /// applies on create.
    fn from_draft(id: String, draft: &Self::Draft, now: DateTime<Utc>) -> Self;

    /// Bumps the modification timestamp.
    fn touch(&mut self, now: DateTime<Utc>);

    /// Returns true if the record satisfies `filter`. Must match the remote
    /// filter semantics exactly.
    fn matches(&self, filter: &Self::Filter) -> bool;

    /// Delete policy for this resource.
    fn delete_policy() -> DeletePolicy {
        DeletePolicy::Hard
    }

    /// Applies a soft delete. Only called for [`DeletePolicy::Soft`].
    fn mark_deleted(&mut self, _now: DateTime<Utc>) {}
}

/// Shallow-merges `patch` into `record` and bumps its modification time.
///
/// The `id` field is never overwritten.
pub fn merge_patch<E: Entity>(record: &E, patch: &Patch, now: DateTime<Utc>) -> Result<E> {
    let mut value = serde_json::to_value(record)?;
    let fields = value
        .as_object_mut()
        .ok_or_else(|| Error::InvalidPatch(format!("{} record is not an object", E::COLLECTION)))?;

    for (key, field) in patch {
        if key == "id" {
            continue;
        }
        fields.insert(key.clone(), field.clone());
    }

    let mut merged: E = serde_json::from_value(value)
        .map_err(|e| Error::InvalidPatch(format!("{}: {e}", E::COLLECTION)))?;
    merged.touch(now);
    Ok(merged)
}

/// Returns true if any string inside `value` equals `needle`.
pub fn references(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s == needle,
        Value::Array(items) => items.iter().any(|v| references(v, needle)),
        Value::Object(fields) => fields.values().any(|v| references(v, needle)),
        _ => false,
    }
}

/// Replaces every string equal to `from` inside `value` with `to`.
///
/// Returns the number of replacements.
pub fn rewrite_references(value: &mut Value, from: &str, to: &str) -> usize {
    match value {
        Value::String(s) if s == from => {
            *s = to.to_string();
            1
        }
        Value::Array(items) => items
            .iter_mut()
            .map(|v| rewrite_references(v, from, to))
            .sum(),
        Value::Object(fields) => fields
            .values_mut()
            .map(|v| rewrite_references(v, from, to))
            .sum(),
        _ => 0,
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
