// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared protocol between pages and the background cache worker.
//!
//! This crate defines the message types and framing used between the
//! `tether` main context and the `tetherd` worker. The two never share
//! memory; everything crosses a Unix socket as length-prefixed JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag pages register to be told when connectivity returns.
pub const SYNC_TAG: &str = "tether-outbox-sync";

/// Status code used for synthesized offline responses.
pub const OFFLINE_STATUS: u16 = 503;

// ============================================================================
// Fetch types
// ============================================================================

/// A request routed through the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    /// True for top-level document navigations.
    #[serde(default)]
    pub navigate: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl FetchRequest {
    /// A plain GET.
    pub fn get(url: impl Into<String>) -> Self {
        FetchRequest {
            method: "GET".to_string(),
            url: url.into(),
            navigate: false,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// A GET for a document navigation.
    pub fn navigate(url: impl Into<String>) -> Self {
        FetchRequest {
            navigate: true,
            ..FetchRequest::get(url)
        }
    }

    /// A request with an arbitrary method and optional JSON body.
    pub fn with_method(method: &str, url: impl Into<String>, body: Option<String>) -> Self {
        let mut request = FetchRequest::get(url);
        request.method = method.to_uppercase();
        if body.is_some() {
            request
                .headers
                .insert("content-type".to_string(), "application/json".to_string());
        }
        request.body = body;
        request
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A response produced by the worker, from network or cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        FetchResponse {
            status,
            headers,
            body: body.into(),
        }
    }

    /// The structured failure body returned for data-API calls that could
    /// not reach the network.
    pub fn offline_api(message: &str) -> Self {
        let body = serde_json::json!({
            "success": false,
            "error": message,
            "offline": true,
        });
        FetchResponse::new(OFFLINE_STATUS, "application/json", body.to_string())
    }

    /// A generic failure for requests with nothing cached.
    pub fn unavailable() -> Self {
        FetchResponse::new(OFFLINE_STATUS, "text/plain", "offline")
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// Returns true if this is a synthesized offline body.
    pub fn is_offline(&self) -> bool {
        self.status == OFFLINE_STATUS
            && serde_json::from_slice::<serde_json::Value>(&self.body)
                .is_ok_and(|v| v.get("offline") == Some(&serde_json::Value::Bool(true)))
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// Protocol types
// ============================================================================

/// Worker lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Precaching the shell.
    Installing,
    /// Installed, waiting to take over.
    Waiting,
    /// Old generations purged, serving requests.
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Active => "active",
        };
        write!(f, "{s}")
    }
}

/// Message sent from a page to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    /// Version handshake.
    Hello { version: String },
    /// Force the waiting worker to activate now.
    SkipWaiting,
    /// Precache an explicit URL list.
    CacheUrls { urls: Vec<String> },
    /// Precache the configured page list.
    CacheAllPages,
    /// Ask to be told when connectivity returns.
    RegisterSync { tag: String },
    /// Route a request through the worker.
    Fetch { id: u64, request: FetchRequest },
    /// Stop the worker.
    Shutdown,
}

/// Message sent from the worker to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Version handshake response.
    Hello {
        version: String,
        state: LifecycleState,
    },
    /// Connectivity returned; the page should drain its outbox.
    SyncRequested { tag: String },
    /// Response to a `FETCH`.
    Response { id: u64, response: FetchResponse },
    /// The worker has claimed open pages.
    Controlled { version: String },
    /// Result of a precache command.
    Precached { cached: usize, failed: Vec<String> },
    /// Sync tag registered.
    Registered { tag: String },
    /// Shutdown acknowledged.
    ShuttingDown,
    /// Error response.
    Error { message: String },
}

// ============================================================================
// Message framing
// ============================================================================

/// IPC message framing.
///
/// Messages are framed as:
/// - 4 bytes: message length (big-endian u32)
/// - N bytes: JSON-encoded message
pub mod framing {
    use std::io::{Read, Write};

    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Maximum message size (16MB). Fetch bodies travel inside messages.
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

    fn encode<T: Serialize>(message: &T) -> std::io::Result<Vec<u8>> {
        let json = serde_json::to_vec(message)
            .map_err(|e| std::io::Error::other(format!("serialize error: {}", e)))?;
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::other("message too large"));
        }
        let len =
            u32::try_from(json.len()).map_err(|_| std::io::Error::other("message too large"))?;
        let mut frame = Vec::with_capacity(json.len() + 4);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&json);
        Ok(frame)
    }

    fn check_len(len_buf: [u8; 4]) -> std::io::Result<usize> {
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::other(format!(
                "message too large: {} bytes (max {})",
                len, MAX_MESSAGE_SIZE
            )));
        }
        Ok(len)
    }

    fn decode<T: DeserializeOwned>(buf: &[u8]) -> std::io::Result<T> {
        serde_json::from_slice(buf)
            .map_err(|e| std::io::Error::other(format!("deserialize error: {}", e)))
    }

    /// Write a serializable message to the given writer.
    pub fn write_message<W: Write, T: Serialize>(
        writer: &mut W,
        message: &T,
    ) -> std::io::Result<()> {
        writer.write_all(&encode(message)?)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a deserializable message from the given reader.
    pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> std::io::Result<T> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = check_len(len_buf)?;

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        decode(&buf)
    }

    /// Async variant of [`write_message`].
    pub async fn write_message_async<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        writer.write_all(&encode(message)?).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Async variant of [`read_message`].
    ///
    /// Returns `Ok(None)` on a clean end of stream before a frame starts.
    pub async fn read_message_async<R, T>(reader: &mut R) -> std::io::Result<Option<T>>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = check_len(len_buf)?;

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        decode(&buf).map(Some)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
