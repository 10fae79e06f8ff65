// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The background cache worker.
//!
//! Owns the cache storage and the network, runs the install → activate →
//! claim lifecycle, and answers intercepted fetches with a per-class
//! strategy. It also keeps its own view of connectivity from fetch outcomes
//! and tells pages to sync when connectivity returns.
//!
//! The worker never touches entity data. Pages are told to sync; they do
//! the syncing.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tether_core::Connectivity;
use tether_ipc::{FetchRequest, FetchResponse, LifecycleState, PageMessage, WorkerMessage};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::classify::{self, RequestClass};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::network::{Network, NetworkResult};

/// Outcome of a precache pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precache {
    pub cached: usize,
    pub failed: Vec<String>,
}

impl From<Precache> for WorkerMessage {
    fn from(p: Precache) -> Self {
        WorkerMessage::Precached {
            cached: p.cached,
            failed: p.failed,
        }
    }
}

/// Shared worker handle. Cloning is cheap.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

struct Inner {
    config: WorkerConfig,
    origin: Url,
    cache: CacheStorage,
    network: Arc<dyn Network>,
    state: Mutex<LifecycleState>,
    connectivity: Connectivity,
    sync_tags: Mutex<BTreeSet<String>>,
    events: broadcast::Sender<WorkerMessage>,
    background: Mutex<JoinSet<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Worker {
    pub fn new(config: WorkerConfig, cache: CacheStorage, network: Arc<dyn Network>) -> Result<Self> {
        let origin = config.origin_url()?;
        let (events, _) = broadcast::channel(256);
        Ok(Worker {
            inner: Arc::new(Inner {
                config,
                origin,
                cache,
                network,
                state: Mutex::new(LifecycleState::Installing),
                connectivity: Connectivity::new(true),
                sync_tags: Mutex::new(BTreeSet::new()),
                events,
                background: Mutex::new(JoinSet::new()),
            }),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &CacheStorage {
        &self.inner.cache
    }

    pub fn state(&self) -> LifecycleState {
        *lock(&self.inner.state)
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Messages broadcast to every connected page.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.inner.events.subscribe()
    }

    fn broadcast(&self, message: WorkerMessage) {
        // No receivers just means no pages are connected.
        let _ = self.inner.events.send(message);
    }

    fn set_state(&self, state: LifecycleState) {
        *lock(&self.inner.state) = state;
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Install, then activate straight away.
    ///
    /// Activation purges any older generation, so a new version never sits
    /// behind a stale one passing requests through unhandled.
    pub async fn start(&self) -> Result<Precache> {
        let installed = self.install().await?;
        self.activate()?;
        Ok(installed)
    }

    /// Precache the application shell into the static cache.
    pub async fn install(&self) -> Result<Precache> {
        self.set_state(LifecycleState::Installing);
        let name = self.inner.config.static_cache();
        self.inner.cache.open_cache(&name)?;
        self.inner.cache.open_cache(&self.inner.config.dynamic_cache())?;
        let shell = self.inner.config.shell_assets.clone();
        let result = self.precache_into(&name, &shell).await?;
        self.set_state(LifecycleState::Waiting);
        info!(
            cached = result.cached,
            failed = result.failed.len(),
            version = %self.inner.config.version,
            "installed"
        );
        Ok(result)
    }

    fn stale_caches(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .cache
            .names()?
            .into_iter()
            .filter(|name| self.inner.config.is_stale_cache(name))
            .collect())
    }

    /// Purge old generations, start serving, and claim open pages.
    ///
    /// Returns the names of the purged caches.
    pub fn activate(&self) -> Result<Vec<String>> {
        let stale = self.stale_caches()?;
        for name in &stale {
            self.inner.cache.delete_cache(name)?;
            info!(cache = %name, "purged old cache generation");
        }
        self.set_state(LifecycleState::Active);
        info!(version = %self.inner.config.version, "activated");
        self.broadcast(WorkerMessage::Controlled {
            version: self.inner.config.version.clone(),
        });
        Ok(stale)
    }

    /// Force a waiting worker to activate. Returns false if it was already active.
    pub fn skip_waiting(&self) -> Result<bool> {
        if self.state() == LifecycleState::Active {
            debug!("skip-waiting while already active");
            return Ok(false);
        }
        self.activate()?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Precaching
    // ------------------------------------------------------------------

    /// Precache an explicit URL list into the dynamic cache.
    pub async fn cache_urls(&self, urls: &[String]) -> Result<Precache> {
        let name = self.inner.config.dynamic_cache();
        self.precache_into(&name, urls).await
    }

    /// Precache the configured page list into the static cache.
    pub async fn cache_all_pages(&self) -> Result<Precache> {
        let name = self.inner.config.static_cache();
        let pages = self.inner.config.pages.clone();
        self.precache_into(&name, &pages).await
    }

    async fn precache_into(&self, cache: &str, urls: &[String]) -> Result<Precache> {
        let mut result = Precache::default();
        for raw in urls {
            let Some(url) = classify::resolve(&self.inner.origin, raw) else {
                warn!(url = %raw, "skipping unparseable precache url");
                result.failed.push(raw.clone());
                continue;
            };
            match self.network(FetchRequest::get(url.as_str())).await {
                Ok(response) if response.is_success() => {
                    self.inner.cache.put(cache, url.as_str(), &response)?;
                    result.cached += 1;
                }
                Ok(response) => {
                    warn!(url = %url, status = response.status, "precache got non-success status");
                    result.failed.push(raw.clone());
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "precache fetch failed");
                    result.failed.push(raw.clone());
                }
            }
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Connectivity and background sync
    // ------------------------------------------------------------------

    /// Register a background sync tag. Fires immediately when online.
    pub fn register_sync(&self, tag: &str) {
        let added = lock(&self.inner.sync_tags).insert(tag.to_string());
        debug!(tag, added, "sync registered");
        if self.is_online() {
            self.broadcast(WorkerMessage::SyncRequested {
                tag: tag.to_string(),
            });
        }
    }

    pub fn sync_tags(&self) -> Vec<String> {
        lock(&self.inner.sync_tags).iter().cloned().collect()
    }

    /// Record a connectivity observation. On offline → online, every
    /// registered tag is broadcast as `SYNC_REQUESTED`.
    pub fn observe_connectivity(&self, online: bool) {
        if !self.inner.connectivity.set_online(online) || !online {
            return;
        }
        for tag in self.sync_tags() {
            info!(tag = %tag, "connectivity restored, requesting sync");
            self.broadcast(WorkerMessage::SyncRequested { tag });
        }
    }

    /// Fetch the probe path once and record the outcome.
    pub async fn probe(&self) -> bool {
        let Some(url) = classify::resolve(&self.inner.origin, &self.inner.config.probe_path) else {
            return false;
        };
        self.network(FetchRequest::get(url.as_str())).await.is_ok()
    }

    async fn network(&self, request: FetchRequest) -> NetworkResult<FetchResponse> {
        let result = self.inner.network.fetch(request).await;
        self.observe_connectivity(result.is_ok());
        result
    }

    // ------------------------------------------------------------------
    // Fetch strategies
    // ------------------------------------------------------------------

    /// Answer an intercepted request.
    pub async fn fetch(&self, mut request: FetchRequest) -> FetchResponse {
        let Some(url) = classify::resolve(&self.inner.origin, &request.url) else {
            return FetchResponse::new(400, "text/plain", "invalid url");
        };
        request.url = url.to_string();

        if self.state() != LifecycleState::Active {
            debug!(url = %url, "not active, passing through");
            return self.pass_through(request).await;
        }

        let class = classify::classify(&request, &self.inner.origin, &self.inner.config.api_prefix);
        debug!(url = %url, ?class, "fetch");
        match class {
            RequestClass::PassThrough => self.pass_through(request).await,
            RequestClass::Api => self.network_only_api(request).await,
            RequestClass::Navigation => self.navigation(request).await,
            RequestClass::StaticAsset => self.cache_first(request, &url).await,
            RequestClass::CrossOriginAsset | RequestClass::Other => {
                self.network_first(request).await
            }
        }
    }

    fn caches(&self) -> [String; 2] {
        [
            self.inner.config.static_cache(),
            self.inner.config.dynamic_cache(),
        ]
    }

    fn lookup(&self, key: &str) -> Option<FetchResponse> {
        let [static_cache, dynamic_cache] = self.caches();
        match self
            .inner
            .cache
            .match_any(&[static_cache.as_str(), dynamic_cache.as_str()], key)
        {
            Ok(found) => found,
            Err(e) => {
                warn!(key, error = %e, "cache lookup failed");
                None
            }
        }
    }

    fn store(&self, cache: &str, key: &str, response: &FetchResponse) {
        if !response.is_success() {
            return;
        }
        if let Err(e) = self.inner.cache.put(cache, key, response) {
            warn!(key, error = %e, "cache write failed");
        }
    }

    async fn pass_through(&self, request: FetchRequest) -> FetchResponse {
        self.network(request)
            .await
            .unwrap_or_else(|_| FetchResponse::unavailable())
    }

    async fn network_only_api(&self, request: FetchRequest) -> FetchResponse {
        match self.network(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "api request failed, answering offline");
                FetchResponse::offline_api("network unavailable")
            }
        }
    }

    async fn network_first(&self, request: FetchRequest) -> FetchResponse {
        let key = request.url.clone();
        match self.network(request).await {
            Ok(response) => {
                self.store(&self.inner.config.dynamic_cache(), &key, &response);
                response
            }
            Err(_) => self.lookup(&key).unwrap_or_else(FetchResponse::unavailable),
        }
    }

    async fn navigation(&self, request: FetchRequest) -> FetchResponse {
        let key = request.url.clone();
        match self.network(request).await {
            Ok(response) => {
                self.store(&self.inner.config.static_cache(), &key, &response);
                response
            }
            Err(_) => {
                if let Some(cached) = self.lookup(&key) {
                    return cached;
                }
                let root = self.inner.origin.join("/").map(|u| u.to_string());
                match root.ok().and_then(|root| self.lookup(&root)) {
                    Some(shell) => {
                        debug!(url = %key, "serving app root for offline navigation");
                        shell
                    }
                    None => FetchResponse::unavailable(),
                }
            }
        }
    }

    async fn cache_first(&self, request: FetchRequest, url: &Url) -> FetchResponse {
        let key = request.url.clone();
        let [static_cache, dynamic_cache] = self.caches();

        let hit = [&static_cache, &dynamic_cache].into_iter().find_map(|cache| {
            self.inner
                .cache
                .get(cache, &key)
                .ok()
                .flatten()
                .map(|found| (cache.clone(), found))
        });
        if let Some((cache, found)) = hit {
            self.revalidate(cache, request);
            return found;
        }

        match self.network(request).await {
            Ok(response) => {
                self.store(&dynamic_cache, &key, &response);
                response
            }
            Err(_) => placeholder(classify::extension(url).as_deref()),
        }
    }

    /// Refetch a cached asset in the background and update its cache.
    fn revalidate(&self, cache: String, request: FetchRequest) {
        let worker = self.clone();
        let mut background = lock(&self.inner.background);
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            let key = request.url.clone();
            if let Ok(response) = worker.network(request).await {
                worker.store(&cache, &key, &response);
                debug!(key = %key, "revalidated");
            }
        });
    }

    /// Wait for background revalidations to finish.
    pub async fn settle(&self) {
        let mut pending = std::mem::take(&mut *lock(&self.inner.background));
        while pending.join_next().await.is_some() {}
    }

    // ------------------------------------------------------------------
    // Message dispatch
    // ------------------------------------------------------------------

    /// Handle one page message and produce the reply.
    ///
    /// Returns `None` when the answer already went out as a broadcast.
    pub async fn handle(&self, message: PageMessage) -> Option<WorkerMessage> {
        let reply = match message {
            PageMessage::Hello { version } => {
                debug!(page_version = %version, "hello");
                WorkerMessage::Hello {
                    version: self.inner.config.version.clone(),
                    state: self.state(),
                }
            }
            PageMessage::SkipWaiting => match self.skip_waiting() {
                Ok(true) => return None,
                Ok(false) => WorkerMessage::Controlled {
                    version: self.inner.config.version.clone(),
                },
                Err(e) => WorkerMessage::Error {
                    message: e.to_string(),
                },
            },
            PageMessage::CacheUrls { urls } => reply(self.cache_urls(&urls).await),
            PageMessage::CacheAllPages => reply(self.cache_all_pages().await),
            PageMessage::RegisterSync { tag } => {
                self.register_sync(&tag);
                WorkerMessage::Registered { tag }
            }
            PageMessage::Fetch { id, request } => WorkerMessage::Response {
                id,
                response: self.fetch(request).await,
            },
            PageMessage::Shutdown => WorkerMessage::ShuttingDown,
        };
        Some(reply)
    }
}

fn reply(result: Result<Precache>) -> WorkerMessage {
    match result {
        Ok(precache) => precache.into(),
        Err(e) => WorkerMessage::Error {
            message: e.to_string(),
        },
    }
}

const EMPTY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

const EMPTY_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3B,
];

/// A minimal valid empty body for an asset that could not be fetched.
pub fn placeholder(extension: Option<&str>) -> FetchResponse {
    let (content_type, body): (&str, &[u8]) = match extension.unwrap_or("") {
        "css" => ("text/css", b""),
        "js" | "mjs" => ("application/javascript", b""),
        "map" => ("application/json", b"{}"),
        "svg" => ("image/svg+xml", b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
        "png" => ("image/png", EMPTY_PNG),
        "gif" => ("image/gif", EMPTY_GIF),
        "jpg" | "jpeg" => ("image/jpeg", b""),
        "webp" => ("image/webp", b""),
        "ico" => ("image/x-icon", b""),
        "woff" => ("font/woff", b""),
        "woff2" => ("font/woff2", b""),
        "ttf" => ("font/ttf", b""),
        "otf" => ("font/otf", b""),
        "eot" => ("application/vnd.ms-fontobject", b""),
        "webmanifest" => ("application/manifest+json", b"{}"),
        _ => ("application/octet-stream", b""),
    };
    FetchResponse::new(200, content_type, body)
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
