// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform result shape returned by every gateway operation.

use serde::{Deserialize, Serialize};

/// `{success, data?, error?, offline?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the result came from the offline path.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub offline: bool,
}

impl<T> Envelope<T> {
    /// A successful online result.
    pub fn ok(data: T) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            error: None,
            offline: false,
        }
    }

    /// A successful result served from local state.
    pub fn offline(data: T) -> Self {
        Envelope {
            offline: true,
            ..Envelope::ok(data)
        }
    }

    /// A failed result.
    pub fn err(error: impl Into<String>) -> Self {
        Envelope {
            success: false,
            data: None,
            error: Some(error.into()),
            offline: false,
        }
    }

    /// Marks the result as coming from the offline path.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Convert into a `Result`, using the error message on failure.
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self.error.unwrap_or_else(|| "unknown error".to_string()))
        }
    }

    /// Apply `f` to the payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            offline: self.offline,
        }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
