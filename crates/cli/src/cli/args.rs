// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared argument structs for CLI commands.
//!
//! These structs are used with `#[command(flatten)]` to reduce duplication
//! across commands.

use clap::Args;

use super::OutputFormat;

/// Output format selection.
#[derive(Args, Clone, Copy, Debug, Default)]
pub struct OutputArgs {
    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

/// Optional student fields for `student add`.
#[derive(Args, Clone, Debug, Default)]
pub struct StudentFields {
    /// Student type (individual, group)
    #[arg(long = "type", short = 't')]
    pub kind: Option<String>,

    /// Fee charged per session
    #[arg(long)]
    pub fee: Option<i64>,

    #[arg(long)]
    pub phone: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

/// Lesson fields for `lesson add`.
#[derive(Args, Clone, Debug, Default)]
pub struct LessonFields {
    /// Start time (RFC 3339)
    #[arg(long)]
    pub at: String,

    /// Length in minutes
    #[arg(long, short)]
    pub duration: Option<u32>,

    /// Lesson status (scheduled, completed, cancelled)
    #[arg(long, short)]
    pub status: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}
