// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Background cache worker control.

use std::path::PathBuf;

use tether_ipc::FetchRequest;

use crate::app::connect_worker;
use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::worker::{detect_worker, spawn_worker, PrecacheReport, WorkerClient};

fn load() -> Result<(PathBuf, Config)> {
    let state_dir = config::state_dir();
    let config = Config::load(&state_dir)?;
    Ok((state_dir, config))
}

async fn client() -> Result<WorkerClient> {
    let (state_dir, config) = load()?;
    connect_worker(&state_dir, &config).await
}

pub async fn start() -> Result<()> {
    let (state_dir, config) = load()?;
    let info = tokio::task::spawn_blocking(move || match detect_worker(&state_dir) {
        Some(info) => Ok((info, false)),
        None => spawn_worker(&state_dir, config.worker.config.as_deref()).map(|info| (info, true)),
    })
    .await
    .map_err(|e| Error::Worker(e.to_string()))?;

    let (info, started) = info?;
    if started {
        println!("Worker started (pid {}, version {})", info.pid, info.version);
    } else {
        println!("Worker already running (pid {}, version {})", info.pid, info.version);
    }
    Ok(())
}

pub async fn stop() -> Result<()> {
    client().await?.shutdown().await?;
    println!("Worker stopped");
    Ok(())
}

pub async fn skip_waiting() -> Result<()> {
    let version = client().await?.skip_waiting().await?;
    println!("Worker {} is now active", version);
    Ok(())
}

pub async fn precache(urls: Vec<String>) -> Result<()> {
    let report = client().await?.cache_urls(urls).await?;
    print_precache(&report);
    Ok(())
}

pub async fn precache_pages() -> Result<()> {
    let report = client().await?.cache_all_pages().await?;
    print_precache(&report);
    Ok(())
}

fn print_precache(report: &PrecacheReport) {
    println!("Cached {}", report.cached);
    for url in &report.failed {
        println!("  failed: {}", url);
    }
}

pub async fn fetch(url: String, navigate: bool) -> Result<()> {
    let request = if navigate {
        FetchRequest::navigate(url)
    } else {
        FetchRequest::get(url)
    };
    let response = client().await?.fetch(request).await?;
    eprintln!(
        "{} {}",
        response.status,
        response.content_type().unwrap_or("application/octet-stream")
    );
    println!("{}", response.text());
    if response.is_offline() {
        eprintln!("note: served offline by the worker");
    }
    Ok(())
}
