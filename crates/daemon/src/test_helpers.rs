// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for worker tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tether_ipc::{FetchRequest, FetchResponse};

use crate::network::{Network, NetworkError, NetworkResult};

/// Mock network for testing without real sockets.
#[derive(Clone, Default)]
pub struct MockNetwork {
    /// Responses keyed by absolute URL.
    routes: Arc<Mutex<HashMap<String, FetchResponse>>>,
    /// Every request seen, in order.
    requests: Arc<Mutex<Vec<FetchRequest>>>,
    /// Whether every fetch should fail as unreachable.
    offline: Arc<AtomicBool>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`.
    pub fn route(&self, url: &str, response: FetchResponse) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    /// Serve a 200 with the given content type and body.
    pub fn serve(&self, url: &str, content_type: &str, body: &str) {
        self.route(url, FetchResponse::new(200, content_type, body));
    }

    /// Set whether fetches should fail.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// URLs requested so far.
    pub fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    /// Number of requests made for `url`.
    pub fn hits(&self, url: &str) -> usize {
        self.requested().iter().filter(|u| *u == url).count()
    }
}

impl Network for MockNetwork {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = NetworkResult<FetchResponse>> + Send + '_>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            if self.offline.load(Ordering::SeqCst) {
                return Err(NetworkError::ConnectionFailed("mock offline".into()));
            }
            Ok(self
                .routes
                .lock()
                .unwrap()
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| FetchResponse::new(404, "text/plain", "not found")))
        })
    }
}
