//! Request and response bodies of the HTTP API
//!
//! Analysis results and queue statistics are served as the library's own
//! [`domainiq::AnalysisResult`] and [`domainiq::QueueStats`]; only the
//! envelopes specific to the API live here.

use serde::{Deserialize, Serialize};

/// Body of `POST /analyze`
///
/// ```json
/// { "domain": "crab.io" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub domain: String,
}

/// Error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body returned by `POST /cache/clear`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCacheResponse {
    /// Number of entries removed
    pub removed: usize,
}

/// Canonical cache key for a domain typed by a user
///
/// Case, surrounding whitespace, a URL scheme, any path and a trailing dot
/// are not significant.
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    host.trim_end_matches('.').to_lowercase()
}
