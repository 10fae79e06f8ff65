// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration.
//!
//! Read from an optional TOML file passed with `--config`. Every key has a
//! default so an empty or missing file yields a working worker.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Cache worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Application name, used as the cache namespace prefix.
    pub app: String,
    /// Cache generation tag. Caches with any other tag are purged on activation.
    pub version: String,
    /// Origin the worker serves. Requests elsewhere are cross-origin.
    pub origin: String,
    /// Path prefix identifying data-API requests.
    pub api_prefix: String,
    /// Application shell precached on install.
    pub shell_assets: Vec<String>,
    /// Pages precached by `CACHE_ALL_PAGES`.
    pub pages: Vec<String>,
    /// Seconds between connectivity probes. 0 disables probing.
    pub probe_interval_secs: u64,
    /// Path fetched by the connectivity probe.
    pub probe_path: String,
    /// Network timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            app: "tether".to_string(),
            version: "v1".to_string(),
            origin: "http://127.0.0.1:8080".to_string(),
            api_prefix: "/api/".to_string(),
            shell_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/app.js".to_string(),
                "/app.css".to_string(),
                "/manifest.json".to_string(),
            ],
            pages: vec![
                "/".to_string(),
                "/students".to_string(),
                "/lessons".to_string(),
                "/reports".to_string(),
                "/settings".to_string(),
            ],
            probe_interval_secs: 30,
            probe_path: "/".to_string(),
            timeout_secs: 10,
        }
    }
}

impl WorkerConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(WorkerConfig::default());
        };
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        WorkerConfig::parse(&content)
    }

    /// Parse from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: WorkerConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.origin_url()?;
        Ok(config)
    }

    /// The parsed origin.
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).map_err(|e| Error::InvalidUrl {
            url: self.origin.clone(),
            reason: e.to_string(),
        })
    }

    /// Name of the precached shell cache for this generation.
    pub fn static_cache(&self) -> String {
        format!("{}-static-{}", self.app, self.version)
    }

    /// Name of the runtime cache for this generation.
    pub fn dynamic_cache(&self) -> String {
        format!("{}-dynamic-{}", self.app, self.version)
    }

    /// Returns true if `name` belongs to this app but not to this generation.
    ///
    /// Only `<app>-static-*` and `<app>-dynamic-*` count, so an app whose
    /// name extends this one (`<app>-admin`) keeps its caches.
    pub fn is_stale_cache(&self, name: &str) -> bool {
        let ours = ["static", "dynamic"]
            .iter()
            .any(|kind| name.starts_with(&format!("{}-{kind}-", self.app)));
        ours && name != self.static_cache() && name != self.dynamic_cache()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
