// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tetherd - The tether background cache worker.
//!
//! Keeps its caches in `<state-dir>/worker-cache.db` and listens on a Unix
//! socket for pages from `tether` processes.
//!
//! Usage:
//!   tetherd --state-dir <path> [--config <worker.toml>]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::UnixListener;
use tokio::sync::watch;

use tetherd::{env, server, CacheStorage, HttpNetwork, Worker, WorkerConfig};

/// Socket filename within the state directory.
const SOCKET_NAME: &str = "worker.sock";
/// PID filename within the state directory.
const PID_NAME: &str = "worker.pid";
/// Lock filename for single instance guarantee.
const LOCK_NAME: &str = "worker.lock";
/// Cache database filename.
const CACHE_DB_NAME: &str = "worker-cache.db";

/// tetherd: background cache worker for tether
#[derive(Parser, Debug)]
#[command(name = "tetherd", version)]
struct Args {
    /// Directory for the socket, pid, lock, log and cache files
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Worker config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    let state_dir = args.state_dir.unwrap_or_else(default_state_dir);
    if let Err(e) = fs::create_dir_all(&state_dir) {
        eprintln!("failed to create state dir {}: {}", state_dir.display(), e);
        std::process::exit(1);
    }

    let log_path = state_dir.join("worker.log");
    setup_logging(&log_path);

    tracing::info!("tetherd starting, state_dir={}", state_dir.display());

    let config_path = args.config.or_else(env::worker_config);
    let config = match WorkerConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Acquire file lock for single instance
    let lock_path = state_dir.join(LOCK_NAME);
    let lock_file = match acquire_lock(&lock_path) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("failed to acquire lock: {}", e);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let pid_path = state_dir.join(PID_NAME);
    if let Err(e) = write_pid_file(&pid_path) {
        tracing::error!("failed to write PID file: {}", e);
        std::process::exit(1);
    }

    let socket_path = state_dir.join(SOCKET_NAME);
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {}", e);
            cleanup(&pid_path, &socket_path);
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(run(config, &state_dir, &socket_path));

    cleanup(&pid_path, &socket_path);
    drop(lock_file);
    tracing::info!("tetherd stopped");
    if code != 0 {
        std::process::exit(code);
    }
}

async fn run(config: WorkerConfig, state_dir: &Path, socket_path: &Path) -> i32 {
    let cache = match CacheStorage::open(&state_dir.join(CACHE_DB_NAME)) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to open cache storage: {}", e);
            return 1;
        }
    };
    let network = match HttpNetwork::new(Duration::from_secs(config.timeout_secs)) {
        Ok(n) => n,
        Err(e) => {
            tracing::error!("failed to build http client: {}", e);
            return 1;
        }
    };
    let probe_interval = config.probe_interval_secs;
    let worker = match Worker::new(config, cache, Arc::new(network)) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("{}", e);
            return 1;
        }
    };

    // Remove stale socket if it exists
    let _ = fs::remove_file(socket_path);
    let listener = match UnixListener::bind(socket_path) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("failed to bind socket: {}", e);
            return 1;
        }
    };
    tracing::info!("listening on {}", socket_path.display());

    // Pages connecting before activation are passed straight to the network.
    let installing = worker.clone();
    tokio::spawn(async move {
        match installing.start().await {
            Ok(installed) if !installed.failed.is_empty() => {
                tracing::warn!("shell assets not cached: {}", installed.failed.join(", "));
            }
            Ok(_) => {}
            Err(e) => tracing::error!("install failed: {}", e),
        }
    });

    // Signal readiness to parent process
    println!("READY");
    // Flush stdout so parent sees READY immediately
    let _ = std::io::stdout().flush();

    let (shutdown, _) = watch::channel(false);
    if probe_interval > 0 {
        tokio::spawn(probe_loop(
            worker.clone(),
            Duration::from_secs(probe_interval),
            shutdown.subscribe(),
        ));
    }

    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            let _ = interrupt.send(true);
        }
    });

    let served = server::serve(listener, worker.clone(), shutdown).await;
    worker.settle().await;
    match served {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("server error: {}", e);
            1
        }
    }
}

async fn probe_loop(worker: Worker, every: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let online = worker.probe().await;
                tracing::debug!(online, "probe");
            }
            _ = stop.changed() => break,
        }
    }
}

fn default_state_dir() -> PathBuf {
    if let Some(dir) = env::state_dir() {
        return dir;
    }
    if let Some(dir) = env::xdg_state_home() {
        return dir.join("tether");
    }
    if let Some(dir) = dirs::state_dir() {
        return dir.join("tether");
    }
    dirs::home_dir()
        .map(|h| h.join(".local/state/tether"))
        .unwrap_or_else(|| PathBuf::from(".local/state/tether"))
}

fn setup_logging(log_path: &Path) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to open log file, fall back to stderr
    if let Ok(file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn acquire_lock(lock_path: &Path) -> std::io::Result<fs::File> {
    use fs2::FileExt;

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)?;
    file.try_lock_exclusive()
        .map_err(|_| std::io::Error::other("another worker instance is already running"))?;
    Ok(file)
}

fn write_pid_file(pid_path: &Path) -> std::io::Result<()> {
    fs::write(pid_path, format!("{}", std::process::id()))
}

fn cleanup(pid_path: &Path, socket_path: &Path) {
    let _ = fs::remove_file(pid_path);
    let _ = fs::remove_file(socket_path);
}
