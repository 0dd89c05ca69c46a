//! Response store abstraction.
//!
//! The store is the single authority on entry lifetime: entries expire on the
//! store's clock and are never deleted by the cache itself.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::keys::CacheKey;

/// A rendered, already post-processed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub html: String,
    pub etag: String,
    /// Wall-clock creation time in Unix milliseconds.
    pub created_at_ms: i64,
    pub ttl_ms: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store operation `{op}` timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },
    #[error("corrupt entry for `{key}`: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn corrupt(key: &CacheKey, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Key/value store with per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError>;

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Write `entry` with an expiry of `ttl`. A zero TTL is a no-op.
    async fn set(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration)
    -> Result<(), StoreError>;

    /// Remaining life of `key`, or `None` if it is absent or never expires.
    async fn ttl_remaining(&self, key: &CacheKey) -> Result<Option<Duration>, StoreError>;
}
