// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::test_helpers::t0;
use serde_json::json;
use tether_core::DeletePolicy;
use yare::parameterized;

#[parameterized(
    scheduled = { "scheduled", LessonStatus::Scheduled },
    completed = { "completed", LessonStatus::Completed },
    cancelled = { "cancelled", LessonStatus::Cancelled },
    american = { "canceled", LessonStatus::Cancelled },
)]
fn test_lesson_status_from_str(input: &str, expected: LessonStatus) {
    assert_eq!(input.parse::<LessonStatus>().unwrap(), expected);
}

#[test]
fn test_lesson_status_invalid() {
    assert!(matches!(
        "missed".parse::<LessonStatus>(),
        Err(Error::InvalidLessonStatus(_))
    ));
}

#[test]
fn test_from_draft_defaults() {
    let draft: LessonDraft = serde_json::from_value(json!({
        "studentId": "s1",
        "scheduledAt": "2026-03-02T15:00:00Z",
    }))
    .unwrap();
    let lesson = Lesson::from_draft("l1".to_string(), &draft, t0());
    assert_eq!(lesson.duration_minutes, 60);
    assert_eq!(lesson.status, LessonStatus::Scheduled);
    assert_eq!(lesson.student_id, "s1");
}

#[test]
fn test_filter_by_student() {
    let draft = LessonDraft {
        student_id: "s1".to_string(),
        scheduled_at: t0(),
        duration_minutes: Some(45),
        status: None,
        notes: None,
    };
    let lesson = Lesson::from_draft("l1".to_string(), &draft, t0());
    assert!(lesson.matches(&LessonFilter::default()));
    assert!(lesson.matches(&LessonFilter {
        student_id: Some("s1".to_string())
    }));
    assert!(!lesson.matches(&LessonFilter {
        student_id: Some("s2".to_string())
    }));
}

#[test]
fn test_filter_serializes_camel_case() {
    let filter = LessonFilter {
        student_id: Some("s1".to_string()),
    };
    assert_eq!(
        serde_json::to_value(&filter).unwrap(),
        json!({"studentId": "s1"})
    );
    assert_eq!(
        serde_json::to_value(LessonFilter::default()).unwrap(),
        json!({})
    );
}

#[test]
fn test_hard_delete_policy() {
    assert_eq!(Lesson::delete_policy(), DeletePolicy::Hard);
}
