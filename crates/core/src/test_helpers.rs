// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for tether-core tests.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{DeletePolicy, Entity};

/// A minimal soft-deleted entity for exercising generic code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactFilter {
    pub active: Option<bool>,
}

impl Entity for Contact {
    type Draft = ContactDraft;
    type Filter = ContactFilter;

    const COLLECTION: &'static str = "contacts";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_draft(id: String, draft: &ContactDraft, now: DateTime<Utc>) -> Self {
        Contact {
            id,
            name: draft.name.clone(),
            owner_id: draft.owner_id.clone(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &ContactFilter) -> bool {
        filter.active.is_none_or(|active| self.active == active)
    }

    fn delete_policy() -> DeletePolicy {
        DeletePolicy::Soft
    }

    fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.updated_at = now;
    }
}

/// Fixed point in time used across tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Create a contact with the given id and name.
pub fn contact(id: &str, name: &str) -> Contact {
    Contact::from_draft(
        id.to_string(),
        &ContactDraft {
            name: name.to_string(),
            owner_id: None,
        },
        t0(),
    )
}
