// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::Value;
use tether_core::Patch;

use crate::app::App;
use crate::cli::{OutputFormat, StudentFields};
use crate::display::{format_student_details, format_student_line};
use crate::entities::{StudentDraft, StudentFilter, StudentType};
use crate::error::{Error, Result};

use super::{emit, open_app};

pub async fn list(all: bool, inactive: bool, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    list_impl(&app, all, inactive, output).await
}

pub(crate) async fn list_impl(
    app: &App,
    all: bool,
    inactive: bool,
    output: OutputFormat,
) -> Result<()> {
    let filter = StudentFilter {
        active: if all { None } else { Some(!inactive) },
    };
    let envelope = app.students.get_all(filter).await;
    emit(envelope, output, |students| {
        if students.is_empty() {
            return "No students".to_string();
        }
        students
            .iter()
            .map(format_student_line)
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub async fn show(id: &str, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    let envelope = app.students.get_by_id(id).await;
    emit(envelope, output, format_student_details)
}

pub async fn add(name: String, fields: StudentFields, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    add_impl(&app, name, fields, output).await
}

pub(crate) async fn add_impl(
    app: &App,
    name: String,
    fields: StudentFields,
    output: OutputFormat,
) -> Result<()> {
    let kind = fields
        .kind
        .as_deref()
        .map(str::parse::<StudentType>)
        .transpose()?;
    let draft = StudentDraft {
        name,
        kind,
        fee_per_session: fields.fee,
        phone: fields.phone,
        notes: fields.notes,
    };
    let envelope = app.students.create(draft).await;
    emit(envelope, output, |s| format!("Created {}", format_student_line(s)))
}

pub async fn edit(id: &str, fields: &[String], output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    edit_impl(&app, id, fields, output).await
}

pub(crate) async fn edit_impl(
    app: &App,
    id: &str,
    fields: &[String],
    output: OutputFormat,
) -> Result<()> {
    let patch = parse_assignments(fields)?;
    let envelope = app.students.update(id, patch).await;
    emit(envelope, output, |s| format!("Updated {}", format_student_line(s)))
}

pub async fn remove(id: &str, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    let envelope = app.students.delete(id).await;
    emit(envelope, output, |id| format!("Deactivated {}", id))
}

pub async fn summary(id: &str, output: OutputFormat) -> Result<()> {
    let app = open_app().await?;
    let envelope = app.students.aggregate(id, "summary").await;
    emit(envelope, output, |summary| {
        serde_json::to_string_pretty(summary).unwrap_or_else(|_| summary.to_string())
    })
}

/// Build a patch from `key=value` arguments.
///
/// Keys accept the wire name, snake_case or kebab-case, plus `fee` for
/// `feePerSession`. Values are parsed as JSON when possible and kept as
/// strings otherwise.
pub(crate) fn parse_assignments(fields: &[String]) -> Result<Patch> {
    let mut patch = Patch::new();
    for field in fields {
        let Some((key, raw)) = field.split_once('=') else {
            return Err(Error::InvalidAssignment(field.clone()));
        };
        let key = wire_name(key.trim());
        if key.is_empty() || key == "id" {
            return Err(Error::InvalidAssignment(field.clone()));
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        if key == "type" {
            value.as_str().unwrap_or_default().parse::<StudentType>()?;
        }
        patch.insert(key, value);
    }
    if patch.is_empty() {
        return Err(Error::EmptyUpdate);
    }
    Ok(patch)
}

fn wire_name(key: &str) -> String {
    if key == "fee" {
        return "feePerSession".to_string();
    }
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' || c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
#[path = "student_tests.rs"]
mod tests;
