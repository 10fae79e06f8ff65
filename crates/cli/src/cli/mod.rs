// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

mod args;

use clap::{Parser, Subcommand, ValueEnum};

pub use args::{LessonFields, OutputArgs, StudentFields};

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "tether")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline-first client for the tutoring records API")]
#[command(
    long_about = "Offline-first client for the tutoring records API.\n\n\
    Reads fall back to the local store and writes are queued in the outbox \
    while the remote is unreachable. Queued writes replay on `tether sync` \
    or automatically under `tether watch`."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize the state directory
    #[command(after_help = "\
Examples:
  tether init                                   Use the default remote
  tether init --remote https://api.example/v1   Use a specific remote")]
    Init {
        /// Base URL of the remote API
        #[arg(long)]
        remote: Option<String>,
    },

    /// Show connectivity, outbox and worker status
    Status {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Replay queued mutations now, ignoring backoff timers
    Sync {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Inspect and manage queued mutations
    #[command(args_conflicts_with_subcommands = true)]
    Outbox {
        #[command(subcommand)]
        command: Option<OutboxCommand>,

        /// Show dead-lettered entries instead of live ones
        #[arg(long)]
        dead: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Manage students
    #[command(subcommand)]
    Student(StudentCommand),

    /// Manage lessons
    #[command(subcommand)]
    Lesson(LessonCommand),

    /// Stay running, syncing whenever connectivity returns
    Watch {
        /// Seconds between scheduled drains (0 disables them)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Control the background cache worker
    #[command(subcommand)]
    Worker(WorkerCommand),
}

#[derive(Subcommand)]
pub enum OutboxCommand {
    /// Put a dead-lettered entry back in the queue
    Retry {
        /// Outbox entry id
        entry: i64,
    },
    /// Drop a dead-lettered entry for good
    Discard {
        /// Outbox entry id
        entry: i64,
    },
}

#[derive(Subcommand)]
pub enum StudentCommand {
    /// List students
    List {
        /// Include inactive students
        #[arg(long, conflicts_with = "inactive")]
        all: bool,
        /// Only inactive students
        #[arg(long)]
        inactive: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show one student
    Show {
        id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Add a student
    #[command(after_help = "\
Examples:
  tether student add \"Ana Lopez\" --fee 40
  tether student add \"Saturday group\" --type group")]
    Add {
        #[arg(value_parser = non_empty_string)]
        name: String,
        #[command(flatten)]
        fields: StudentFields,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Change fields of a student
    #[command(after_help = "\
Examples:
  tether student edit srv-12 fee=45
  tether student edit srv-12 name=\"Ana L\" phone=555-0100")]
    Edit {
        id: String,
        /// Field assignments (key=value)
        #[arg(required = true)]
        fields: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Deactivate a student
    Rm {
        id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fee summary computed by the server (online only)
    Summary {
        id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand)]
pub enum LessonCommand {
    /// List lessons
    List {
        /// Only lessons of this student
        #[arg(long)]
        student: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Schedule a lesson
    #[command(after_help = "\
Examples:
  tether lesson add srv-12 --at 2026-03-02T16:00:00Z
  tether lesson add tmp_1772355600000-0-42 --at 2026-03-02T16:00:00Z --duration 90")]
    Add {
        /// Student id (may be an unsynced temp id)
        student: String,
        #[command(flatten)]
        fields: LessonFields,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Delete a lesson
    Rm {
        id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Start the worker for this state directory
    Start,
    /// Stop the running worker
    Stop,
    /// Activate a waiting worker now
    SkipWaiting,
    /// Cache the given URLs
    Precache {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Cache every configured page
    PrecachePages,
    /// Fetch a URL through the worker
    Fetch {
        url: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
    },
}

#[cfg(test)]
#[path = "../cli_tests/mod.rs"]
mod tests;
