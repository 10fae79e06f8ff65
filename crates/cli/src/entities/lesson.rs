// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use tether_core::Entity;

use crate::error::{Error, Result};

/// Where a lesson stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Scheduled => "scheduled",
            LessonStatus::Completed => "completed",
            LessonStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LessonStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(LessonStatus::Scheduled),
            "completed" => Ok(LessonStatus::Completed),
            "cancelled" | "canceled" => Ok(LessonStatus::Cancelled),
            _ => Err(Error::InvalidLessonStatus(s.to_string())),
        }
    }
}

/// A lesson booked for one student. Lessons are hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    /// Owning student; may be a temp id until that student is synced.
    pub student_id: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub status: LessonStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_duration() -> u32 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonDraft {
    pub student_id: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LessonStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// List filter for lessons.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl Entity for Lesson {
    type Draft = LessonDraft;
    type Filter = LessonFilter;

    const COLLECTION: &'static str = "lessons";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_draft(id: String, draft: &LessonDraft, now: DateTime<Utc>) -> Self {
        Lesson {
            id,
            student_id: draft.student_id.clone(),
            scheduled_at: draft.scheduled_at,
            duration_minutes: draft.duration_minutes.unwrap_or_else(default_duration),
            status: draft.status.unwrap_or_default(),
            notes: draft.notes.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &LessonFilter) -> bool {
        filter
            .student_id
            .as_deref()
            .is_none_or(|student_id| self.student_id == student_id)
    }
}

#[cfg(test)]
#[path = "lesson_tests.rs"]
mod tests;
