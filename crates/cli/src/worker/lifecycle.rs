// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Worker lifecycle management: spawn, detect, cleanup.
//!
//! tetherd is spawned as a background process keyed to the state directory
//! and reached via `<state>/worker.sock`.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tether_ipc::{framing, PageMessage, WorkerMessage};

use crate::env;
use crate::error::{Error, Result};

/// Socket filename within the state directory.
const SOCKET_NAME: &str = "worker.sock";
/// PID filename within the state directory.
const PID_NAME: &str = "worker.pid";

/// Information about a running worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub pid: u32,
    pub version: String,
}

/// Get the socket path for the given state directory.
pub fn get_socket_path(state_dir: &Path) -> PathBuf {
    state_dir.join(SOCKET_NAME)
}

/// Get the PID file path for the given state directory.
pub fn get_pid_path(state_dir: &Path) -> PathBuf {
    state_dir.join(PID_NAME)
}

/// Detect a worker running for the given state directory.
///
/// Returns `None` if no worker answers. Stale PID and socket files are
/// removed.
pub fn detect_worker(state_dir: &Path) -> Option<WorkerInfo> {
    let socket_path = get_socket_path(state_dir);
    let pid_path = get_pid_path(state_dir);

    if !socket_path.exists() {
        if pid_path.exists() {
            let _ = fs::remove_file(&pid_path);
        }
        return None;
    }

    let Some(version) = ping(&socket_path) else {
        cleanup_stale_files(state_dir);
        return None;
    };

    // PID file missing while the socket answers: the worker is still starting.
    let pid = read_pid_file(&pid_path).filter(|pid| *pid > 0)?;
    Some(WorkerInfo { pid, version })
}

/// Say hello and return the worker's version.
fn ping(socket_path: &Path) -> Option<String> {
    let mut stream = UnixStream::connect(socket_path).ok()?;
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

    let hello = PageMessage::Hello {
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    framing::write_message(&mut stream, &hello).ok()?;

    // Broadcasts may arrive ahead of the reply.
    for _ in 0..8 {
        match framing::read_message::<_, WorkerMessage>(&mut stream).ok()? {
            WorkerMessage::Hello { version, .. } => return Some(version),
            _ => continue,
        }
    }
    None
}

/// Find the tetherd binary.
fn find_worker_binary() -> PathBuf {
    if let Some(path) = env::worker_binary() {
        return path;
    }

    if let Ok(exe) = std::env::current_exe() {
        let tetherd = exe.with_file_name("tetherd");
        if tetherd.exists() {
            return tetherd;
        }
    }

    PathBuf::from("tetherd")
}

/// Spawn a worker for the given state directory, or return the one already
/// running.
pub fn spawn_worker(state_dir: &Path, config: Option<&Path>) -> Result<WorkerInfo> {
    if let Some(info) = detect_worker(state_dir) {
        return Ok(info);
    }

    fs::create_dir_all(state_dir)?;
    let binary = find_worker_binary();

    let mut command = Command::new(&binary);
    command.arg("--state-dir").arg(state_dir);
    if let Some(config) = config {
        command.arg("--config").arg(config);
    }
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::Worker(format!(
                "failed to start tetherd ({}): {}",
                binary.display(),
                e
            ))
        })?;

    // tetherd prints READY once its socket is bound.
    if let Some(stdout) = child.stdout.take() {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            match line {
                Ok(line) if line == "READY" => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    for _ in 0..150 {
        if let Ok(Some(status)) = child.try_wait() {
            let mut output = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                let _ = stderr.read_to_string(&mut output);
            }
            return Err(Error::Worker(format!(
                "worker exited with status: {}\n{}",
                status,
                output.trim()
            )));
        }

        if let Some(info) = detect_worker(state_dir) {
            tracing::info!(pid = info.pid, "worker started");
            return Ok(info);
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    Err(Error::WorkerTimeout(
        "worker did not answer after starting".to_string(),
    ))
}

/// Clean up stale socket and PID files.
fn cleanup_stale_files(state_dir: &Path) {
    let _ = fs::remove_file(get_socket_path(state_dir));
    let _ = fs::remove_file(get_pid_path(state_dir));
}

/// Read PID from the PID file.
fn read_pid_file(pid_path: &Path) -> Option<u32> {
    fs::read_to_string(pid_path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}
