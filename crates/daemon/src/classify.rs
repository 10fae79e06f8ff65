// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Request classification.
//!
//! Every intercepted request falls into exactly one class, and each class
//! has one caching strategy.

use tether_ipc::FetchRequest;
use url::Url;

/// File extensions treated as static assets.
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2",
    "ttf", "otf", "eot", "webmanifest",
];

/// Strategy class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Non-GET, non-http(s), or cross-origin non-asset: untouched.
    PassThrough,
    /// Cross-origin asset: network-first, fallback to cache.
    CrossOriginAsset,
    /// Same-origin data API: network-only with an offline body on failure.
    Api,
    /// Document navigation: network-first, fallback to the page or the app root.
    Navigation,
    /// Same-origin static asset: cache-first with background revalidation.
    StaticAsset,
    /// Anything else same-origin: network-first, fallback to cache.
    Other,
}

/// Resolve a possibly relative request URL against the origin.
pub fn resolve(origin: &Url, raw: &str) -> Option<Url> {
    origin.join(raw).ok()
}

/// Classify a request.
pub fn classify(request: &FetchRequest, origin: &Url, api_prefix: &str) -> RequestClass {
    if !request.is_get() {
        return RequestClass::PassThrough;
    }
    let Some(url) = resolve(origin, &request.url) else {
        return RequestClass::PassThrough;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return RequestClass::PassThrough;
    }

    let asset = has_asset_extension(&url);
    if url.origin() != origin.origin() {
        return if asset {
            RequestClass::CrossOriginAsset
        } else {
            RequestClass::PassThrough
        };
    }

    if url.path().starts_with(api_prefix) {
        RequestClass::Api
    } else if request.navigate {
        RequestClass::Navigation
    } else if asset {
        RequestClass::StaticAsset
    } else {
        RequestClass::Other
    }
}

fn has_asset_extension(url: &Url) -> bool {
    extension(url).is_some_and(|ext| ASSET_EXTENSIONS.contains(&ext.as_str()))
}

/// Lowercased extension of the last path segment.
pub fn extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
