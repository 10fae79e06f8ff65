// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-core: Shared library for the tether offline-first sync layer
//!
//! This crate provides the local persistent store, the sync outbox, the
//! record and temp-id primitives, and the connectivity oracle used by the
//! tether CLI and its gateways.

pub mod clock;
pub mod connectivity;
pub mod envelope;
pub mod error;
pub mod meta;
pub mod outbox;
pub mod record;
pub mod store;
pub mod temp_id;

#[cfg(test)]
mod test_helpers;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use connectivity::Connectivity;
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use meta::MetaSlot;
pub use outbox::{FailureOutcome, LocalWrite, Mutation, MutationKind, Outbox, RetryPolicy};
pub use record::{merge_patch, DeletePolicy, Entity, Patch};
pub use store::{DrainLease, LocalStore};
pub use temp_id::{is_temp_id, TempIdGenerator, TEMP_ID_PREFIX};
