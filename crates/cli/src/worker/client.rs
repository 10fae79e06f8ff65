// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Async client for the worker socket.
//!
//! One connection carries three kinds of traffic:
//! - `RESPONSE` messages, matched to their `FETCH` by id
//! - broadcasts (`SYNC_REQUESTED`, `CONTROLLED`), fanned out to subscribers
//! - replies to every other command, delivered in order

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tether_ipc::{framing, FetchRequest, FetchResponse, LifecycleState, PageMessage, WorkerMessage};
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Outcome of a precache command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrecacheReport {
    pub cached: usize,
    pub failed: Vec<String>,
}

/// A page connection to the worker. Cheap to clone.
#[derive(Clone)]
pub struct WorkerClient {
    inner: Arc<Inner>,
}

struct Inner {
    outgoing: mpsc::Sender<PageMessage>,
    routes: Arc<Routes>,
    replies: tokio::sync::Mutex<mpsc::Receiver<WorkerMessage>>,
    next_id: AtomicU64,
    timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

/// Where incoming messages go.
struct Routes {
    pending: Mutex<HashMap<u64, oneshot::Sender<FetchResponse>>>,
    events: broadcast::Sender<WorkerMessage>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl WorkerClient {
    /// Connect to the worker listening on `socket`.
    pub async fn connect(socket: &Path, timeout: Duration) -> Result<Self> {
        let stream = UnixStream::connect(socket).await.map_err(|e| {
            Error::Worker(format!("cannot connect to {}: {}", socket.display(), e))
        })?;
        Ok(Self::from_stream(stream, timeout))
    }

    pub(crate) fn from_stream(stream: UnixStream, timeout: Duration) -> Self {
        let (mut reader, mut writer) = stream.into_split();

        let (out_tx, mut out_rx) = mpsc::channel::<PageMessage>(64);
        let writer_task = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(e) = framing::write_message_async(&mut writer, &message).await {
                    tracing::debug!("write to worker failed: {}", e);
                    break;
                }
            }
        });

        let (events, _) = broadcast::channel(64);
        let routes = Arc::new(Routes {
            pending: Mutex::new(HashMap::new()),
            events,
        });
        let (reply_tx, reply_rx) = mpsc::channel::<WorkerMessage>(16);
        let reader_routes = Arc::clone(&routes);
        let reader_task = tokio::spawn(async move {
            loop {
                match framing::read_message_async::<_, WorkerMessage>(&mut reader).await {
                    Ok(Some(message)) => {
                        if !reader_routes.deliver(message, &reply_tx).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!("read from worker failed: {}", e);
                        break;
                    }
                }
            }
            // Waiting fetches see their sender dropped.
            reader_routes.lock_pending().clear();
        });

        WorkerClient {
            inner: Arc::new(Inner {
                outgoing: out_tx,
                routes,
                replies: tokio::sync::Mutex::new(reply_rx),
                next_id: AtomicU64::new(1),
                timeout,
                tasks: vec![writer_task, reader_task],
            }),
        }
    }

    /// Receive worker broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.inner.routes.events.subscribe()
    }

    /// Exchange versions; returns the worker's version and lifecycle state.
    pub async fn hello(&self) -> Result<(String, LifecycleState)> {
        let hello = PageMessage::Hello {
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        match self.request(hello).await? {
            WorkerMessage::Hello { version, state } => Ok((version, state)),
            other => Err(unexpected(&other)),
        }
    }

    /// Ask a waiting worker to take over now. Returns the version in control.
    pub async fn skip_waiting(&self) -> Result<String> {
        let mut replies = self.inner.replies.lock().await;
        let mut events = self.subscribe();
        self.send(PageMessage::SkipWaiting).await?;

        let wait = async {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(WorkerMessage::Controlled { version }) => return Ok(version),
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return Err(closed()),
                    },
                    reply = replies.recv() => match reply {
                        Some(WorkerMessage::Error { message }) => return Err(Error::Worker(message)),
                        Some(other) => return Err(unexpected(&other)),
                        None => return Err(closed()),
                    },
                }
            }
        };
        tokio::time::timeout(self.inner.timeout, wait)
            .await
            .map_err(|_| Error::WorkerTimeout("no answer to SKIP_WAITING".to_string()))?
    }

    /// Precache an explicit URL list into the dynamic cache.
    pub async fn cache_urls(&self, urls: Vec<String>) -> Result<PrecacheReport> {
        precached(self.request(PageMessage::CacheUrls { urls }).await?)
    }

    /// Precache the configured page list into the static cache.
    pub async fn cache_all_pages(&self) -> Result<PrecacheReport> {
        precached(self.request(PageMessage::CacheAllPages).await?)
    }

    /// Ask to be told when connectivity returns.
    pub async fn register_sync(&self, tag: &str) -> Result<()> {
        let message = PageMessage::RegisterSync {
            tag: tag.to_string(),
        };
        match self.request(message).await? {
            WorkerMessage::Registered { .. } => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Ask the worker to exit.
    pub async fn shutdown(&self) -> Result<()> {
        match self.request(PageMessage::Shutdown).await? {
            WorkerMessage::ShuttingDown => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch through the worker's caching strategies.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.routes.lock_pending().insert(id, tx);

        if let Err(e) = self.send(PageMessage::Fetch { id, request }).await {
            self.inner.routes.lock_pending().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.inner.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(closed()),
            Err(_) => {
                self.inner.routes.lock_pending().remove(&id);
                Err(Error::WorkerTimeout(format!("fetch {id} got no response")))
            }
        }
    }

    async fn send(&self, message: PageMessage) -> Result<()> {
        self.inner
            .outgoing
            .send(message)
            .await
            .map_err(|_| closed())
    }

    async fn request(&self, message: PageMessage) -> Result<WorkerMessage> {
        let mut replies = self.inner.replies.lock().await;
        self.send(message).await?;
        match tokio::time::timeout(self.inner.timeout, replies.recv()).await {
            Ok(Some(WorkerMessage::Error { message })) => Err(Error::Worker(message)),
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(closed()),
            Err(_) => Err(Error::WorkerTimeout("no reply from worker".to_string())),
        }
    }
}

impl Routes {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<FetchResponse>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Route one message. Returns false once nobody is listening for replies.
    async fn deliver(&self, message: WorkerMessage, replies: &mpsc::Sender<WorkerMessage>) -> bool {
        match message {
            WorkerMessage::Response { id, response } => {
                match self.lock_pending().remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::debug!(id, "response for unknown fetch"),
                }
                true
            }
            message @ (WorkerMessage::SyncRequested { .. } | WorkerMessage::Controlled { .. }) => {
                let _ = self.events.send(message);
                true
            }
            reply => replies.send(reply).await.is_ok(),
        }
    }
}

fn precached(reply: WorkerMessage) -> Result<PrecacheReport> {
    match reply {
        WorkerMessage::Precached { cached, failed } => Ok(PrecacheReport { cached, failed }),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(message: &WorkerMessage) -> Error {
    Error::Worker(format!("unexpected reply: {:?}", message))
}

fn closed() -> Error {
    Error::Worker("connection to worker closed".to_string())
}
