// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};

use crate::app::App;
use crate::cli::{LessonFields, OutputFormat};
use crate::display::format_lesson_line;
use crate::entities::{LessonDraft, LessonFilter, LessonStatus};
use crate::error::{Error, Result};

use super::{emit, open_app};

pub async fn list(student: Option<String>, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    let filter = LessonFilter {
        student_id: student,
    };
    let envelope = app.lessons.get_all(filter).await;
    emit(envelope, output, |lessons| {
        if lessons.is_empty() {
            return "No lessons".to_string();
        }
        lessons
            .iter()
            .map(format_lesson_line)
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub async fn add(student: String, fields: LessonFields, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    add_impl(&app, student, fields, output).await
}

pub(crate) async fn add_impl(
    app: &App,
    student: String,
    fields: LessonFields,
    output: OutputFormat,
) -> Result<()> {
    let draft = LessonDraft {
        student_id: student,
        scheduled_at: parse_timestamp(&fields.at)?,
        duration_minutes: fields.duration,
        status: fields
            .status
            .as_deref()
            .map(str::parse::<LessonStatus>)
            .transpose()?,
        notes: fields.notes,
    };
    let envelope = app.lessons.create(draft).await;
    emit(envelope, output, |l| format!("Created {}", format_lesson_line(l)))
}

pub async fn remove(id: &str, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    let envelope = app.lessons.delete(id).await;
    emit(envelope, output, |id| format!("Deleted {}", id))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
#[path = "lesson_tests.rs"]
mod tests;
