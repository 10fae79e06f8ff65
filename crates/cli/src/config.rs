// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! CLI configuration management.
//!
//! Configuration lives in `<state>/config.toml` next to the local store and
//! the outbox:
//! - `[remote]`: base URL of the remote API and the request timeout
//! - `[sync]`: retry schedule for outbox entries and the watch interval
//! - `[worker]`: how to reach the background cache worker

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tether_core::RetryPolicy;
use url::Url;

use crate::env;
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";
const STORE_FILE_NAME: &str = "tether.db";
const WORKER_SOCKET_NAME: &str = "worker.sock";

/// Configuration stored in `<state>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
}

/// Remote API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL; resources live at `<url><collection>`.
    #[serde(default = "default_remote_url")]
    pub url: String,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: default_remote_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Parses the base URL, making sure relative joins stay under it.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| Error::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl {
                url: self.url.clone(),
                reason: "must be http:// or https://".to_string(),
            });
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Outbox retry schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Failed attempts before an entry is dead-lettered (default: 8).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds (default: 2000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on the delay between attempts, in seconds (default: 300).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// How often `tether watch` drains on its own, in seconds. 0 = only on events.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let base_ms = i64::try_from(self.base_delay_ms).unwrap_or(i64::MAX);
        let max_secs = i64::try_from(self.max_delay_secs).unwrap_or(i64::MAX);
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: chrono::Duration::try_milliseconds(base_ms)
                .unwrap_or_else(chrono::Duration::zero),
            max_delay: chrono::Duration::try_seconds(max_secs)
                .unwrap_or_else(chrono::Duration::zero),
        }
    }
}

/// Background cache worker settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Socket of an already running worker. When unset the worker lives in
    /// the state directory and is started on demand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
    /// Worker config file passed to `tetherd --config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
    /// Route remote API calls through the worker instead of calling directly.
    #[serde(default)]
    pub proxy: bool,
}

fn default_remote_url() -> String {
    "http://127.0.0.1:8080/api/".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    8
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_secs() -> u64 {
    300
}

fn default_interval_secs() -> u64 {
    30
}

impl Config {
    /// Loads configuration from the given state directory, then applies
    /// environment overrides.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(Error::NotInitialized);
        }
        let content = fs::read_to_string(&config_path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        let mut config = Self::parse(&content)?;
        config.apply_overrides(env::remote_url());
        Ok(config)
    }

    /// Parses config file contents without consulting the environment.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Replaces the remote URL when an override is present.
    pub fn apply_overrides(&mut self, remote_url: Option<String>) {
        if let Some(url) = remote_url {
            self.remote.url = url;
        }
    }

    /// Saves configuration to the given state directory.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    /// Socket the worker listens on.
    pub fn worker_socket(&self, state_dir: &Path) -> PathBuf {
        self.worker
            .socket
            .clone()
            .unwrap_or_else(|| state_dir.join(WORKER_SOCKET_NAME))
    }
}

/// Resolve the state directory.
///
/// `TETHER_STATE_DIR`, then `$XDG_STATE_HOME/tether`, then the platform state
/// directory, then `~/.local/state/tether`.
pub fn state_dir() -> PathBuf {
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

/// Path of the local store database.
pub fn store_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STORE_FILE_NAME)
}

/// Initialize a state directory with a fresh config.
pub fn init_state_dir(state_dir: &Path, remote_url: Option<String>) -> Result<Config> {
    let config_path = state_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        return Err(Error::AlreadyInitialized(state_dir.display().to_string()));
    }

    let mut config = Config::default();
    if let Some(url) = remote_url {
        config.remote.url = url;
    }
    config.remote.base_url()?;

    fs::create_dir_all(state_dir)?;
    config.save(state_dir)?;
    Ok(config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
