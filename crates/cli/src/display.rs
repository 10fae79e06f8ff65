// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tether_core::{is_temp_id, Mutation};

use crate::app::SyncStatus;
use crate::entities::{Lesson, Student};
use crate::sync::DrainReport;

/// Maximum line width for wrapped text content (excluding 4-space indent).
const WRAP_WIDTH: usize = 96;

/// Wrap text at word boundaries if it's a single line.
///
/// Multi-line content is returned as-is.
pub fn wrap_text(content: &str, width: usize) -> String {
    if content.contains('\n') || content.len() <= width {
        return content.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in content.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}

/// Marks ids the server has not assigned yet.
fn id_label(id: &str) -> String {
    if is_temp_id(id) {
        format!("{} (unsynced)", id)
    } else {
        id.to_string()
    }
}

/// Format a single student line for list output
pub fn format_student_line(student: &Student) -> String {
    let inactive = if student.active { "" } else { ", inactive" };
    format!(
        "- [{}{}] {}: {} (fee {})",
        student.kind,
        inactive,
        id_label(&student.id),
        student.name,
        student.fee_per_session
    )
}

/// Format student details for the show command
pub fn format_student_details(student: &Student) -> String {
    let mut output = vec![
        format!("[{}] {}", student.kind, id_label(&student.id)),
        format!("Name: {}", student.name),
        format!("Fee per session: {}", student.fee_per_session),
        format!("Active: {}", if student.active { "yes" } else { "no" }),
    ];
    if let Some(phone) = &student.phone {
        output.push(format!("Phone: {}", phone));
    }
    output.push(format!(
        "Created: {}",
        student.created_at.format("%Y-%m-%d %H:%M")
    ));
    output.push(format!(
        "Updated: {}",
        student.updated_at.format("%Y-%m-%d %H:%M")
    ));
    if let Some(notes) = &student.notes {
        output.push(String::new());
        output.push("Notes:".to_string());
        for line in wrap_text(notes, WRAP_WIDTH).lines() {
            output.push(format!("    {}", line));
        }
    }
    output.join("\n")
}

/// Format a single lesson line for list output
pub fn format_lesson_line(lesson: &Lesson) -> String {
    format!(
        "- [{}] {}: {} {}min, student {}",
        lesson.status,
        id_label(&lesson.id),
        lesson.scheduled_at.format("%Y-%m-%d %H:%M"),
        lesson.duration_minutes,
        lesson.student_id
    )
}

/// Format an outbox entry for the outbox command
pub fn format_mutation_line(entry: &Mutation) -> String {
    let mut line = format!(
        "#{} {} {}/{}",
        entry.entry_id, entry.kind, entry.entity, entry.record_id
    );
    if entry.attempts > 0 {
        line.push_str(&format!(", {} attempts", entry.attempts));
    }
    if let Some(at) = entry.next_attempt_at {
        line.push_str(&format!(", next {}", at.format("%H:%M:%S")));
    }
    if let Some(error) = &entry.last_error {
        line.push_str(&format!("\n    {}", error));
    }
    line
}

/// One-line summary of a drain.
pub fn format_report(report: &DrainReport) -> String {
    if report.skipped {
        return "sync already in progress".to_string();
    }
    let mut parts = vec![format!("{} synced", report.synced)];
    if report.failed > 0 {
        parts.push(format!("{} failed", report.failed));
    }
    if report.deferred > 0 {
        parts.push(format!("{} deferred", report.deferred));
    }
    if report.dead_lettered > 0 {
        parts.push(format!("{} dead-lettered", report.dead_lettered));
    }
    parts.join(", ")
}

/// Format the last-sync part of the status command.
pub fn format_last_sync(status: Option<&SyncStatus>) -> String {
    let Some(status) = status else {
        return "Last sync: never".to_string();
    };
    match (&status.last_sync_at, &status.last_report) {
        (Some(at), Some(report)) => format!(
            "Last sync: {} ({})",
            at.format("%Y-%m-%d %H:%M:%S UTC"),
            format_report(report)
        ),
        (Some(at), None) => format!("Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        _ => "Last sync: never".to_string(),
    }
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod tests;
