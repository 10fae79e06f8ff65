// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether - offline-first client for the tutoring records API.
//!
//! This crate provides the `tether` CLI and the data layer behind it.
//!
//! # Main Components
//!
//! - [`gateway::Gateway`] - online-first entity access with local fallback
//! - [`sync::SyncEngine`] - ordered outbox replay with retries
//! - [`entities`] - the `students` and `lessons` collections
//! - [`worker`] - client for the background cache worker (`tetherd`)
//! - [`Config`] - state directory configuration
//!
//! ```rust,ignore
//! use tether::app::App;
//! use tether::sync::Trigger;
//!
//! let app = App::open(&tether::config::state_dir()).await?;
//! let created = app.students.create(draft).await;
//! let report = app.sync(Trigger::Manual).await?;
//! ```

mod cli;
mod commands;
mod display;

pub mod app;
pub mod config;
pub mod entities;
pub mod env;
pub mod error;
pub mod gateway;
pub mod remote;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod test_helpers;

pub use cli::{Cli, Command, OutputFormat};
pub use config::Config;
pub use error::{Error, Result};

use cli::{LessonCommand, OutboxCommand, StudentCommand, WorkerCommand};

/// Execute a CLI command. This is the main entry point for library users
/// and provides a testable way to run commands without process execution.
pub fn run(command: Command) -> Result<()> {
    if let Command::Init { remote } = command {
        return commands::init::run(remote);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(command))
}

async fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Init { remote } => commands::init::run(remote),
        Command::Status { output } => commands::status::run(output.output).await,
        Command::Sync { output } => commands::sync::run(output.output).await,
        Command::Outbox {
            command,
            dead,
            output,
        } => match command {
            None => commands::outbox::list(dead, output.output).await,
            Some(OutboxCommand::Retry { entry }) => commands::outbox::retry(entry).await,
            Some(OutboxCommand::Discard { entry }) => commands::outbox::discard(entry).await,
        },
        Command::Student(cmd) => match cmd {
            StudentCommand::List {
                all,
                inactive,
                output,
            } => commands::student::list(all, inactive, output.output).await,
            StudentCommand::Show { id, output } => {
                commands::student::show(&id, output.output).await
            }
            StudentCommand::Add {
                name,
                fields,
                output,
            } => commands::student::add(name, fields, output.output).await,
            StudentCommand::Edit { id, fields, output } => {
                commands::student::edit(&id, &fields, output.output).await
            }
            StudentCommand::Rm { id, output } => {
                commands::student::remove(&id, output.output).await
            }
            StudentCommand::Summary { id, output } => {
                commands::student::summary(&id, output.output).await
            }
        },
        Command::Lesson(cmd) => match cmd {
            LessonCommand::List { student, output } => {
                commands::lesson::list(student, output.output).await
            }
            LessonCommand::Add {
                student,
                fields,
                output,
            } => commands::lesson::add(student, fields, output.output).await,
            LessonCommand::Rm { id, output } => commands::lesson::remove(&id, output.output).await,
        },
        Command::Watch { interval } => commands::watch::run(interval).await,
        Command::Worker(cmd) => match cmd {
            WorkerCommand::Start => commands::worker::start().await,
            WorkerCommand::Stop => commands::worker::stop().await,
            WorkerCommand::SkipWaiting => commands::worker::skip_waiting().await,
            WorkerCommand::Precache { urls } => commands::worker::precache(urls).await,
            WorkerCommand::PrecachePages => commands::worker::precache_pages().await,
            WorkerCommand::Fetch { url, navigate } => commands::worker::fetch(url, navigate).await,
        },
    }
}
