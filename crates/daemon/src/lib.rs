// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tetherd: the background cache worker.
//!
//! Runs beside the main context as its own process. It intercepts fetches
//! routed to it over a Unix socket, answers them from network or cache
//! according to the request class, and tells connected pages to sync when
//! connectivity returns.

pub mod cache;
pub mod classify;
pub mod config;
pub mod env;
pub mod error;
pub mod network;
pub mod server;
pub mod worker;

#[cfg(test)]
mod test_helpers;

pub use cache::CacheStorage;
pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use network::{HttpNetwork, Network, NetworkError};
pub use worker::{Precache, Worker};
