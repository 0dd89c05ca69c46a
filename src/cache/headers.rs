//! Entity tags and caching-header synthesis.

use std::time::Duration;

use axum::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{CACHE_CONTROL, ETAG},
};
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};

use crate::util::duration::format_duration;

pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");
pub const X_CACHE_EXPIRED_AT: HeaderName = HeaderName::from_static("x-cache-expired-at");

/// Strong entity tag for a body: `"<len-hex>-<digest>"`.
pub fn entity_tag(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    let encoded = STANDARD_NO_PAD.encode(&digest[..]);
    format!("\"{:x}-{}\"", body.len(), &encoded[..27])
}

/// Whether an `If-None-Match` value matches `etag`.
///
/// Accepts `*`, a single tag, or a comma-separated list; weak validators
/// compare by their opaque part.
pub fn if_none_match_matches(if_none_match: &str, etag: &str) -> bool {
    let target = etag.trim_start_matches("W/");
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.trim_start_matches("W/") == target
    })
}

/// Whether the response was served from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Everything needed to emit the caching headers for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeaders {
    pub status: CacheStatus,
    /// Freshness left under the policy; zero on forced refreshes.
    pub remaining: Duration,
    /// Advertised `stale-while-revalidate` window; zero on forced refreshes.
    pub stale_while_revalidate: Duration,
    pub etag: Option<String>,
}

impl CacheHeaders {
    pub fn cache_control(&self) -> String {
        let max_age = self.remaining.as_secs();
        format!(
            "public, must-revalidate, max-age={max_age}, s-maxage={max_age}, stale-while-revalidate={}",
            self.stale_while_revalidate.as_secs()
        )
    }

    pub fn expired_at(&self) -> String {
        format_duration(self.remaining)
    }

    /// Write the synthesized headers, replacing any previous values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.cache_control()) {
            headers.insert(CACHE_CONTROL, value);
        }
        headers.insert(
            X_CACHE_STATUS,
            HeaderValue::from_static(self.status.as_str()),
        );
        if let Ok(value) = HeaderValue::from_str(&self.expired_at()) {
            headers.insert(X_CACHE_EXPIRED_AT, value);
        }
        if let Some(value) = self
            .etag
            .as_deref()
            .and_then(|etag| HeaderValue::from_str(etag).ok())
        {
            headers.insert(ETAG, value);
        }
    }
}
