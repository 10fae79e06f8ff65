// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Network abstraction for the worker.
//!
//! A [`Network`] either produces a response (any status) or fails with a
//! transport error. Strategies treat only the latter as "offline".

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tether_ipc::{FetchRequest, FetchResponse};

/// Error type for network operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// Could not reach the host.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Performs requests on behalf of the worker.
pub trait Network: Send + Sync {
    /// Fetch `request`, where `url` is already absolute.
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = NetworkResult<FetchResponse>> + Send + '_>>;
}

/// Real HTTP network backed by `reqwest`.
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> NetworkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
        Ok(HttpNetwork { client })
    }
}

impl Network for HttpNetwork {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = NetworkResult<FetchResponse>> + Send + '_>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(classify_error)?;
            let status = response.status().as_u16();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(classify_error)?;

            Ok(FetchResponse {
                status,
                headers,
                body: body.to_vec(),
            })
        })
    }
}

fn classify_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if err.is_builder() {
        NetworkError::InvalidRequest(err.to_string())
    } else {
        NetworkError::ConnectionFailed(err.to_string())
    }
}
