//! Cache configuration.
//!
//! Controls freshness policy, entity tags and crawler detection via
//! `ssr-cache.toml`.

use std::time::Duration;

const DEFAULT_BOT_TTL_MS: u64 = 1000 * 60 * 60 * 48;
const DEFAULT_HUMAN_TTL_MS: u64 = 1000 * 60 * 20;
const DEFAULT_REVALIDATE_RATIO: f64 = 0.8;
const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Known crawler, link-preview and monitoring agents.
pub const DEFAULT_BOT_AGENTS: &[&str] = &[
    "applebot",
    "baiduspider",
    "bingbot",
    "chrome-lighthouse",
    "embedly",
    "facebookexternalhit",
    "facebot",
    "google page speed insights",
    "google-structured-html-testing-tool",
    "googlebot",
    "ia_archiver",
    "linkedinbot",
    "outbrain",
    "pingdom",
    "pinterest",
    "quora link preview",
    "rogerbot",
    "seositecheckup",
    "showyoubot",
    "slackbot",
    "telegrambot",
    "twitterbot",
    "vkshare",
    "w3c_validator",
    "whatsapp",
    "screaming frog",
];

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve candidate routes through the cache at all.
    pub enabled: bool,
    /// Time-to-live for crawler-facing entries.
    pub bot_ttl: Duration,
    /// Time-to-live for browser-facing entries.
    pub human_ttl: Duration,
    /// Fraction of the TTL advertised as `stale-while-revalidate`.
    pub revalidate_ratio: f64,
    /// Emit `ETag` and honor `If-None-Match`.
    pub etag: bool,
    /// Lower-cased user-agent fragments that identify automated callers.
    pub bot_agents: Vec<String>,
    /// Maximum rendered body size accepted for caching.
    pub body_limit_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_ttl: Duration::from_millis(DEFAULT_BOT_TTL_MS),
            human_ttl: Duration::from_millis(DEFAULT_HUMAN_TTL_MS),
            revalidate_ratio: DEFAULT_REVALIDATE_RATIO,
            etag: true,
            bot_agents: DEFAULT_BOT_AGENTS.iter().map(|s| s.to_string()).collect(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            bot_ttl: settings.bot_ttl,
            human_ttl: settings.human_ttl,
            revalidate_ratio: settings.revalidate_ratio,
            etag: settings.etag,
            bot_agents: settings.bot_agents.clone(),
            body_limit_bytes: settings.body_limit_bytes.get(),
        }
    }
}
