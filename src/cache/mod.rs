//! Response cache for server-rendered pages.
//!
//! Requests are classified as crawler or browser traffic, mapped to a
//! partitioned key with a per-class freshness policy and served from a shared
//! store when possible:
//!
//! - **classify / keys**: pure caller classification and key/TTL resolution
//! - **store**: the `CacheStore` contract with in-process and Redis backends
//! - **orchestrator**: the per-request lookup → render → write state machine
//! - **middleware**: the axum adapter around the orchestrator
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! bot_ttl_ms = 172800000
//! human_ttl_ms = 1200000
//! revalidate_ratio = 0.8
//! etag = true
//! ```

mod classify;
mod config;
mod headers;
mod keys;
mod memory;
mod middleware;
mod orchestrator;
mod redis;
mod store;

pub use classify::{BotMatcher, CallerClass};
pub use config::{CacheConfig, DEFAULT_BOT_AGENTS};
pub use headers::{
    CacheHeaders, CacheStatus, X_CACHE_EXPIRED_AT, X_CACHE_STATUS, entity_tag,
    if_none_match_matches,
};
pub use keys::{CacheKey, CachePolicy, PolicyResolver};
pub use memory::MemoryStore;
pub use middleware::{CacheState, NextRenderer, response_cache_layer};
pub use orchestrator::{
    CacheError, CacheOutcome, FORCE_PARAM, PageRenderer, RenderError, RenderedPage,
    RequestContext, ResponseCache, parse_force,
};
pub use redis::RedisStore;
pub use store::{CacheEntry, CacheStore, StoreError};
