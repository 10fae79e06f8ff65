// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outbox replay.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Trigger   │────►│ SyncEngine  │────►│  Replayer   │──► Remote API
//! │ (watch loop)│     │  (drain)    │◄────│ (Gateway<E>)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │   Outbox    │
//!                     └─────────────┘
//! ```
//!
//! The engine owns ordering, retries and dead-lettering. Each gateway owns
//! the typed remote call for its entity and the store reconciliation that
//! follows a successful replay.

mod engine;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tether_core::Mutation;

use crate::remote::RemoteResult;

pub use engine::{watch, DrainReport, SyncEngine, Trigger};

/// Boxed future returned by [`Replayer`] methods.
pub type ReplayFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What reconciliation did to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// A temp record was replaced by its canonical counterpart.
    Remapped { from: String, to: String },
    /// The stored record was refreshed from the server response.
    Refreshed,
    /// Later queued mutations exist, so the local record was kept.
    KeptLocal,
    /// Nothing to do.
    Unchanged,
}

/// Replays queued mutations for one entity collection.
pub trait Replayer: Send + Sync {
    /// Collection this replayer handles.
    fn entity(&self) -> &'static str;

    /// Issue the remote call for `entry`.
    ///
    /// Returns the server's record, as JSON, for creates and updates.
    fn replay<'a>(&'a self, entry: &'a Mutation) -> ReplayFuture<'a, RemoteResult<Option<Value>>>;

    /// Bring the store in line with a successful replay. Called after the
    /// entry has left the outbox.
    fn reconcile<'a>(
        &'a self,
        entry: &'a Mutation,
        server: Option<Value>,
    ) -> ReplayFuture<'a, tether_core::Result<Reconciled>>;
}
