// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Access to the background cache worker (tetherd).
//!
//! The worker is a separate process reached over a Unix socket. The CLI
//! never shares state with it; it only sends page messages and listens for
//! the worker's replies and broadcasts.

mod client;
mod lifecycle;

pub use client::{PrecacheReport, WorkerClient};
pub use lifecycle::{
    detect_worker, get_pid_path, get_socket_path, spawn_worker, WorkerInfo,
};
