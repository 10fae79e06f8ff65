// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronized resource types.
//!
//! Each type implements [`tether_core::Entity`], which is all the generic
//! gateway needs to serve it online and offline.

mod lesson;
mod student;

pub use lesson::{Lesson, LessonDraft, LessonFilter, LessonStatus};
pub use student::{Student, StudentDraft, StudentFilter, StudentType};
