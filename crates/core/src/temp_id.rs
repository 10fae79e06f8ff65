// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client-generated temporary identifiers.
//!
//! Records created while offline get an id of the form
//! `tmp_{wall_ms}-{counter}-{node}` until the server assigns the canonical
//! one. The `tmp_` prefix is reserved: server ids never start with it.
//!
//! Uniqueness follows the same rules as a hybrid logical clock: the wall
//! time only moves forward, ties within one millisecond bump a counter, and
//! the node component separates concurrent processes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::clock::{ClockSource, SystemClock};

/// Reserved prefix for temporary ids.
pub const TEMP_ID_PREFIX: &str = "tmp_";

/// Returns true if `id` was generated by a [`TempIdGenerator`].
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Produces pairwise-distinct temporary ids.
pub struct TempIdGenerator<C: ClockSource = SystemClock> {
    clock: C,
    node_id: u32,
    last_wall_ms: Mutex<u64>,
    last_counter: AtomicU32,
}

impl TempIdGenerator<SystemClock> {
    /// Creates a generator keyed to the current process.
    pub fn new() -> Self {
        Self::with_clock(SystemClock, std::process::id())
    }
}

impl Default for TempIdGenerator<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ClockSource> TempIdGenerator<C> {
    /// Creates a generator with a custom clock source and node id.
    pub fn with_clock(clock: C, node_id: u32) -> Self {
        TempIdGenerator {
            clock,
            node_id,
            last_wall_ms: Mutex::new(0),
            last_counter: AtomicU32::new(0),
        }
    }

    /// Generates the next temporary id.
    ///
    /// Monotonic even if the wall clock goes backwards.
    pub fn next_id(&self) -> String {
        let physical = self.clock.now_ms();
        let mut last_ms = self
            .last_wall_ms
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let (wall_ms, counter) = if physical > *last_ms {
            *last_ms = physical;
            self.last_counter.store(0, Ordering::SeqCst);
            (physical, 0)
        } else {
            let counter = self.last_counter.fetch_add(1, Ordering::SeqCst) + 1;
            (*last_ms, counter)
        };

        format!("{TEMP_ID_PREFIX}{wall_ms}-{counter}-{}", self.node_id)
    }
}

#[cfg(test)]
#[path = "temp_id_tests.rs"]
mod tests;
