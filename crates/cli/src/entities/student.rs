// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use tether_core::{DeletePolicy, Entity};

use crate::error::{Error, Result};

/// How a student is billed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentType {
    /// One-to-one lessons.
    #[default]
    Individual,
    /// Lessons shared with other students.
    Group,
}

impl StudentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentType::Individual => "individual",
            StudentType::Group => "group",
        }
    }
}

impl fmt::Display for StudentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StudentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "individual" => Ok(StudentType::Individual),
            "group" => Ok(StudentType::Group),
            _ => Err(Error::InvalidStudentType(s.to_string())),
        }
    }
}

/// A student record.
///
/// Students are soft-deleted: removing one clears `active` and keeps the
/// record so past lessons still resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: StudentType,
    /// Fee per session in the smallest currency unit.
    #[serde(default)]
    pub fee_per_session: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default = "active_by_default")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn active_by_default() -> bool {
    true
}

/// Payload for creating a student. Omitted fields take the server defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDraft {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<StudentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_per_session: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// List filter for students.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl Entity for Student {
    type Draft = StudentDraft;
    type Filter = StudentFilter;

    const COLLECTION: &'static str = "students";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_draft(id: String, draft: &StudentDraft, now: DateTime<Utc>) -> Self {
        Student {
            id,
            name: draft.name.clone(),
            kind: draft.kind.unwrap_or_default(),
            fee_per_session: draft.fee_per_session.unwrap_or(0),
            phone: draft.phone.clone(),
            notes: draft.notes.clone(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &StudentFilter) -> bool {
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

#[cfg(test)]
#[path = "student_tests.rs"]
mod tests;
