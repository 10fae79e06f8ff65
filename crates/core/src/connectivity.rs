// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort online/offline signal.
//!
//! The oracle is a hint. Callers still fall back to the offline path on any
//! transport failure even while it reports online.

use tokio::sync::watch;

/// Injected, process-wide connectivity state with change notifications.
#[derive(Debug)]
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    /// Create an oracle with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Connectivity { tx }
    }

    /// Returns the current hint.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the state. Returns true if it changed.
    ///
    /// Subscribers are only notified on an actual transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
        changed
    }

    /// Subscribe to transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Connectivity::new(true)
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
