// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP implementation of [`Resource`].
//!
//! Requests go straight to the remote API, or through the background cache
//! worker when it is configured as a proxy. Both routes hand the raw status
//! and body to [`decode`] so failures classify the same way.

use std::marker::PhantomData;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tether_core::{Entity, Patch};
use tether_ipc::FetchRequest;
use url::Url;

use super::{decode, decode_required, RemoteError, RemoteFuture, RemoteResult, Resource};
use crate::worker::WorkerClient;

/// How requests reach the remote API.
#[derive(Clone)]
pub enum Via {
    /// Direct HTTP via `reqwest`.
    Direct(reqwest::Client),
    /// `FETCH` messages to the background cache worker.
    Worker(WorkerClient),
}

impl Via {
    /// A direct client with the given per-request timeout.
    pub fn direct(timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Via::Direct(client))
    }

    async fn send(
        &self,
        method: &'static str,
        url: Url,
        body: Option<Value>,
    ) -> RemoteResult<(u16, Vec<u8>)> {
        tracing::debug!(method, url = %url, "remote request");
        match self {
            Via::Direct(client) => {
                let method = reqwest::Method::from_bytes(method.as_bytes())
                    .map_err(|e| RemoteError::Transport(e.to_string()))?;
                let mut request = client.request(method, url);
                if let Some(body) = &body {
                    request = request.json(body);
                }
                let response = request.send().await.map_err(transport_error)?;
                let status = response.status().as_u16();
                let bytes = response.bytes().await.map_err(transport_error)?;
                Ok((status, bytes.to_vec()))
            }
            Via::Worker(worker) => {
                let request =
                    FetchRequest::with_method(method, url.as_str(), body.map(|b| b.to_string()));
                let response = worker
                    .fetch(request)
                    .await
                    .map_err(|e| RemoteError::Transport(e.to_string()))?;
                Ok((response.status, response.body))
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Transport("request timed out".to_string())
    } else if e.is_connect() {
        RemoteError::Transport(format!("connection failed: {e}"))
    } else {
        RemoteError::Transport(e.to_string())
    }
}

/// One resource collection on the remote API, at `<base>/<collection>`.
pub struct HttpResource<E> {
    via: Via,
    base: Url,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> HttpResource<E> {
    pub fn new(via: Via, base: Url) -> Self {
        HttpResource {
            via,
            base,
            _marker: PhantomData,
        }
    }

    /// URL of the collection, extended by `segments`.
    pub fn url(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::Transport(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .push(E::COLLECTION)
            .extend(segments);
        Ok(url)
    }
}

/// Append the non-null fields of `filter` as query parameters.
pub(crate) fn append_query<F: Serialize>(url: &mut Url, filter: &F) -> RemoteResult<()> {
    let value = serde_json::to_value(filter)
        .map_err(|e| RemoteError::Transport(format!("invalid filter: {e}")))?;
    let Value::Object(fields) = value else {
        return Ok(());
    };
    let params: Vec<(String, String)> = fields
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect();
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(())
}

impl<E: Entity> Resource<E> for HttpResource<E> {
    fn list(&self, filter: E::Filter) -> RemoteFuture<'_, Vec<E>> {
        Box::pin(async move {
            let mut url = self.url(&[])?;
            append_query(&mut url, &filter)?;
            let (status, body) = self.via.send("GET", url, None).await?;
            decode_required(status, &body)
        })
    }

    fn get(&self, id: String) -> RemoteFuture<'_, E> {
        Box::pin(async move {
            let url = self.url(&[&id])?;
            let (status, body) = self.via.send("GET", url, None).await?;
            decode_required(status, &body)
        })
    }

    fn create(&self, draft: Value) -> RemoteFuture<'_, E> {
        Box::pin(async move {
            let url = self.url(&[])?;
            let (status, body) = self.via.send("POST", url, Some(draft)).await?;
            decode_required(status, &body)
        })
    }

    fn update(&self, id: String, patch: Patch) -> RemoteFuture<'_, E> {
        Box::pin(async move {
            let url = self.url(&[&id])?;
            let (status, body) = self
                .via
                .send("PUT", url, Some(Value::Object(patch)))
                .await?;
            decode_required(status, &body)
        })
    }

    fn delete(&self, id: String) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let url = self.url(&[&id])?;
            let (status, body) = self.via.send("DELETE", url, None).await?;
            decode::<Value>(status, &body).map(|_| ())
        })
    }

    fn aggregate(&self, id: String, name: String) -> RemoteFuture<'_, Value> {
        Box::pin(async move {
            let url = self.url(&[&id, &name])?;
            let (status, body) = self.via.send("GET", url, None).await?;
            decode_required(status, &body)
        })
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
