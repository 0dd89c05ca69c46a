//! Cache key derivation and per-class freshness policy.

use std::fmt;
use std::time::Duration;

use super::classify::CallerClass;
use super::config::CacheConfig;

/// Identifies one cacheable response variant in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `(host, path, query, class)`.
    ///
    /// The caller-class prefix keeps crawler and browser variants of the same
    /// URL in separate partitions.
    pub fn derive(host: &str, path: &str, query: Option<&str>, class: CallerClass) -> Self {
        let query = query.filter(|q| !q.is_empty());
        let capacity = class.key_prefix().len()
            + host.len()
            + path.len()
            + query.map_or(0, |q| q.len() + 1);

        let mut key = String::with_capacity(capacity);
        key.push_str(class.key_prefix());
        key.push_str(host);
        key.push_str(path);
        if let Some(query) = query {
            key.push('?');
            key.push_str(query);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Freshness policy for one caller class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub revalidate_ratio: f64,
}

impl CachePolicy {
    /// Window advertised as `stale-while-revalidate` for a given TTL.
    pub fn stale_while_revalidate(&self) -> Duration {
        let ratio = self.revalidate_ratio.max(0.0);
        let millis = (self.ttl.as_millis() as f64 * ratio).round();
        Duration::from_millis(millis as u64)
    }
}

/// TTL table keyed by caller class.
#[derive(Debug, Clone, Copy)]
pub struct PolicyResolver {
    bot_ttl: Duration,
    human_ttl: Duration,
    revalidate_ratio: f64,
}

impl PolicyResolver {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            bot_ttl: config.bot_ttl,
            human_ttl: config.human_ttl,
            revalidate_ratio: config.revalidate_ratio,
        }
    }

    pub fn policy(&self, class: CallerClass) -> CachePolicy {
        let ttl = match class {
            CallerClass::Bot => self.bot_ttl,
            CallerClass::Human => self.human_ttl,
        };
        CachePolicy {
            ttl,
            revalidate_ratio: self.revalidate_ratio,
        }
    }

    pub fn resolve(
        &self,
        host: &str,
        path: &str,
        query: Option<&str>,
        class: CallerClass,
    ) -> (CacheKey, CachePolicy) {
        (
            CacheKey::derive(host, path, query, class),
            self.policy(class),
        )
    }
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
