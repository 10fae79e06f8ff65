// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote API abstraction.
//!
//! Every remote call either completes with a well-formed answer or fails.
//! Failures come in two kinds that callers must never confuse:
//! - [`RemoteError::Transport`]: the server could not be reached, or could
//!   not answer. Gateways fall back to the offline path.
//! - [`RemoteError::Rejected`]: the server answered and declined. Gateways
//!   surface the error; the sync engine dead-letters the entry.

mod http;

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tether_core::{Entity, Envelope, Patch};
use tether_ipc::OFFLINE_STATUS;

pub use http::{HttpResource, Via};

/// Boxed future returned by [`Resource`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// Error type for remote operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The server was unreachable or unable to answer.
    #[error("network unavailable: {0}")]
    Transport(String),

    /// The server answered and declined the operation.
    #[error("rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RemoteError {
    /// Returns true for failures that should route to the offline path.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }

    /// Returns true if the server said the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Rejected { status: 404, .. })
    }

    /// The message to show a user.
    pub fn message(&self) -> &str {
        match self {
            RemoteError::Transport(message) => message,
            RemoteError::Rejected { message, .. } => message,
        }
    }
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// CRUD endpoints for one resource type.
///
/// Arguments are owned so implementations can move them into the returned
/// future.
pub trait Resource<E: Entity>: Send + Sync {
    /// List records matching `filter`.
    fn list(&self, filter: E::Filter) -> RemoteFuture<'_, Vec<E>>;

    /// Fetch one record.
    fn get(&self, id: String) -> RemoteFuture<'_, E>;

    /// Create a record from a draft payload; returns the canonical record.
    fn create(&self, draft: Value) -> RemoteFuture<'_, E>;

    /// Apply a partial update; returns the updated record.
    fn update(&self, id: String, patch: Patch) -> RemoteFuture<'_, E>;

    /// Delete a record, applying the server's delete policy.
    fn delete(&self, id: String) -> RemoteFuture<'_, ()>;

    /// Server-side aggregate for one record, e.g. `students/{id}/summary`.
    fn aggregate(&self, id: String, name: String) -> RemoteFuture<'_, Value>;
}

/// Interpret a raw HTTP answer as an envelope.
///
/// 5xx statuses and the worker's synthesized offline body are transport
/// failures. 4xx statuses and `success: false` envelopes are rejections.
pub fn decode<T: DeserializeOwned>(status: u16, body: &[u8]) -> RemoteResult<Option<T>> {
    let envelope = serde_json::from_slice::<Envelope<T>>(body);

    if status >= 500 {
        let detail = match &envelope {
            Ok(envelope) if envelope.offline => {
                return Err(RemoteError::Transport(
                    envelope
                        .error
                        .clone()
                        .unwrap_or_else(|| "offline".to_string()),
                ));
            }
            Ok(Envelope {
                error: Some(message),
                ..
            }) => message.clone(),
            _ if status == OFFLINE_STATUS => "service unavailable".to_string(),
            _ => format!("server error {status}"),
        };
        return Err(RemoteError::Transport(detail));
    }

    match envelope {
        Ok(envelope) if (200..300).contains(&status) && envelope.success => Ok(envelope.data),
        Ok(envelope) => Err(RemoteError::Rejected {
            status,
            message: envelope
                .error
                .unwrap_or_else(|| format!("request failed with status {status}")),
        }),
        Err(_) if (400..500).contains(&status) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            Err(RemoteError::Rejected {
                status,
                message: if text.is_empty() {
                    format!("request failed with status {status}")
                } else {
                    text
                },
            })
        }
        Err(e) => Err(RemoteError::Transport(format!(
            "unexpected response ({status}): {e}"
        ))),
    }
}

/// Like [`decode`], but a missing `data` field is an error.
pub fn decode_required<T: DeserializeOwned>(status: u16, body: &[u8]) -> RemoteResult<T> {
    decode(status, body)?.ok_or_else(|| {
        RemoteError::Transport(format!("response ({status}) carried no data"))
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
