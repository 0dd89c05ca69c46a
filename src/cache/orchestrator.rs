//! Per-request cache state machine.
//!
//! A request resolves its caller class and policy, looks the key up in the
//! store and either replays the stored payload or renders, transforms and
//! writes a fresh one. Header synthesis and the conditional short-circuit are
//! shared by both paths.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Uri, header};
use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{Instrument, debug, info, instrument, warn};
use url::form_urlencoded;

use crate::render::transform;

use super::classify::{BotMatcher, CallerClass};
use super::config::CacheConfig;
use super::headers::{CacheHeaders, CacheStatus, entity_tag, if_none_match_matches};
use super::keys::{CacheKey, CachePolicy, PolicyResolver};
use super::store::{CacheEntry, CacheStore, StoreError};

const METRIC_HIT: &str = "ssr_cache_hit_total";
const METRIC_MISS: &str = "ssr_cache_miss_total";
const METRIC_NOT_MODIFIED: &str = "ssr_cache_not_modified_total";
const METRIC_STORE_ERROR: &str = "ssr_cache_store_error_total";
const METRIC_RENDER_ERROR: &str = "ssr_cache_render_error_total";
const METRIC_RENDER_MS: &str = "ssr_cache_render_ms";

/// Query parameter that bypasses the lookup and refreshes the entry.
pub const FORCE_PARAM: &str = "force";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("request cannot be cached: {reason}")]
    ProtocolMisuse { reason: &'static str },
}

/// Everything the cache needs to know about one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub host: String,
    pub path: String,
    /// Query string with the force parameter removed; `None` when empty.
    pub query: Option<String>,
    pub user_agent: Option<String>,
    pub if_none_match: Option<String>,
    pub force: bool,
}

impl RequestContext {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Build the context from a request line and its headers.
    ///
    /// The host comes from `Host`, falling back to the URI authority.
    pub fn from_parts(uri: &Uri, headers: &HeaderMap) -> Result<Self, CacheError> {
        let host = header_str(headers, header::HOST)
            .filter(|host| !host.trim().is_empty())
            .map(str::to_owned)
            .or_else(|| uri.authority().map(|authority| authority.to_string()))
            .ok_or(CacheError::ProtocolMisuse {
                reason: "missing host",
            })?;
        let (query, force) = split_force(uri.query());

        Ok(Self {
            host,
            path: uri.path().to_owned(),
            query,
            user_agent: header_str(headers, header::USER_AGENT).map(str::to_owned),
            if_none_match: header_str(headers, header::IF_NONE_MATCH).map(str::to_owned),
            force,
        })
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Whether a `force` value requests a refresh.
///
/// A bare `?force` or an empty value forces, as does anything other than
/// `0`/`false`/`no`/`off`. This is not plain truthiness of the raw string,
/// where `force=` would not force and `force=0` would.
pub fn parse_force(value: &str) -> bool {
    let value = value.trim();
    !["0", "false", "no", "off"]
        .iter()
        .any(|off| value.eq_ignore_ascii_case(off))
}

/// Remove every `force` pair from `query`, keeping the other pairs verbatim.
fn split_force(query: Option<&str>) -> (Option<String>, bool) {
    let Some(query) = query else {
        return (None, false);
    };

    let mut force = false;
    let mut kept = Vec::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        match form_urlencoded::parse(pair.as_bytes()).next() {
            Some((name, value)) if name == FORCE_PARAM => force = parse_force(&value),
            _ => kept.push(pair),
        }
    }

    let query = (!kept.is_empty()).then(|| kept.join("&"));
    (query, force)
}

/// Markup produced by the render collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
}

impl RenderedPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer answered with something other than `200 OK`.
    #[error("renderer answered with status {}", .0.status())]
    Status(Box<axum::response::Response>),
    #[error("rendered body could not be collected: {0}")]
    Body(String),
    /// The body is not UTF-8; the response is kept so it can be passed on.
    #[error("rendered body is not valid UTF-8")]
    Encoding(Box<axum::response::Response>),
    #[error("renderer failed: {0}")]
    Handler(String),
}

/// Produces the page on a miss. Called at most once per request.
pub trait PageRenderer: Send {
    fn render(
        self,
        ctx: &RequestContext,
    ) -> impl Future<Output = Result<RenderedPage, RenderError>> + Send;
}

/// What the send collaborator has to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    NotModified { headers: CacheHeaders },
    Full { headers: CacheHeaders, html: String },
}

impl CacheOutcome {
    pub fn headers(&self) -> &CacheHeaders {
        match self {
            CacheOutcome::NotModified { headers } | CacheOutcome::Full { headers, .. } => headers,
        }
    }
}

struct Hit {
    entry: CacheEntry,
    remaining: Duration,
}

/// Response cache shared by every request of a server.
pub struct ResponseCache {
    config: CacheConfig,
    matcher: BotMatcher,
    resolver: PolicyResolver,
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        let matcher = BotMatcher::new(&config.bot_agents);
        let resolver = PolicyResolver::new(&config);
        info!(
            cache = "response",
            bot_agents = matcher.len(),
            bot_ttl_ms = config.bot_ttl.as_millis() as u64,
            human_ttl_ms = config.human_ttl.as_millis() as u64,
            etag = config.etag,
            "response cache ready"
        );
        Self {
            config,
            matcher,
            resolver,
            store,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Key and policy the request maps to.
    pub fn resolve(&self, ctx: &RequestContext) -> (CallerClass, CacheKey, CachePolicy) {
        let class = self.matcher.classify(ctx.user_agent.as_deref());
        let (key, policy) =
            self.resolver
                .resolve(&ctx.host, &ctx.path, ctx.query.as_deref(), class);
        (class, key, policy)
    }

    #[instrument(
        skip_all,
        fields(host = %ctx.host, path = %ctx.path, force = ctx.force)
    )]
    pub async fn serve<R: PageRenderer>(
        &self,
        ctx: &RequestContext,
        renderer: R,
    ) -> Result<CacheOutcome, RenderError> {
        let (class, key, policy) = self.resolve(ctx);

        if !ctx.force
            && let Some(hit) = self.lookup(&key).await
        {
            counter!(METRIC_HIT, "class" => class.as_str()).increment(1);
            debug!(cache = "response", outcome = "hit", %key, "serving stored page");
            let headers = CacheHeaders {
                status: CacheStatus::Hit,
                remaining: hit.remaining,
                stale_while_revalidate: policy.stale_while_revalidate(),
                etag: self.config.etag.then_some(hit.entry.etag),
            };
            return Ok(self.respond(ctx, headers, hit.entry.html));
        }

        counter!(METRIC_MISS, "class" => class.as_str()).increment(1);
        debug!(cache = "response", outcome = "miss", %key, "rendering page");

        let started_at = Instant::now();
        let rendered = match renderer.render(ctx).await {
            Ok(page) => page,
            Err(err) => {
                counter!(METRIC_RENDER_ERROR).increment(1);
                warn!(cache = "response", %key, error = %err, "render failed, nothing stored");
                return Err(err);
            }
        };
        histogram!(METRIC_RENDER_MS, "class" => class.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let html = transform(&rendered.html, class);
        let entry = CacheEntry {
            etag: entity_tag(&html),
            html,
            created_at_ms: now_unix_ms(),
            ttl_ms: u64::try_from(policy.ttl.as_millis()).unwrap_or(u64::MAX),
        };
        self.write(key, entry.clone(), policy.ttl).await;

        let (remaining, stale_while_revalidate) = if ctx.force {
            (Duration::ZERO, Duration::ZERO)
        } else {
            (policy.ttl, policy.stale_while_revalidate())
        };
        let headers = CacheHeaders {
            status: CacheStatus::Miss,
            remaining,
            stale_while_revalidate,
            etag: self.config.etag.then_some(entry.etag),
        };
        Ok(self.respond(ctx, headers, entry.html))
    }

    /// A stored entry counts only while the store still reports it alive.
    async fn lookup(&self, key: &CacheKey) -> Option<Hit> {
        let entry = match self.store.get(key).await {
            Ok(entry) => entry?,
            Err(err) => {
                store_failed("get", key, &err);
                return None;
            }
        };
        match self.store.ttl_remaining(key).await {
            Ok(remaining) => remaining.map(|remaining| Hit { entry, remaining }),
            Err(err) => {
                store_failed("ttl_remaining", key, &err);
                None
            }
        }
    }

    /// Write on a detached task so a dropped request still completes it.
    async fn write(&self, key: CacheKey, entry: CacheEntry, ttl: Duration) {
        let store = Arc::clone(&self.store);
        let task = tokio::spawn(
            async move {
                let result = store.set(&key, &entry, ttl).await;
                (key, result)
            }
            .in_current_span(),
        );

        match task.await {
            Ok((key, Ok(()))) => {
                debug!(cache = "response", %key, ttl_ms = ttl.as_millis() as u64, "page stored");
            }
            Ok((key, Err(err))) => store_failed("set", &key, &err),
            Err(err) => {
                counter!(METRIC_STORE_ERROR, "store_op" => "set").increment(1);
                warn!(cache = "response", store_op = "set", error = %err, "store write task failed");
            }
        }
    }

    fn respond(&self, ctx: &RequestContext, headers: CacheHeaders, html: String) -> CacheOutcome {
        let matches = match (headers.etag.as_deref(), ctx.if_none_match.as_deref()) {
            (Some(etag), Some(if_none_match)) => if_none_match_matches(if_none_match, etag),
            _ => false,
        };
        if matches {
            counter!(METRIC_NOT_MODIFIED).increment(1);
            CacheOutcome::NotModified { headers }
        } else {
            CacheOutcome::Full { headers, html }
        }
    }
}

fn store_failed(op: &'static str, key: &CacheKey, err: &StoreError) {
    counter!(METRIC_STORE_ERROR, "store_op" => op).increment(1);
    warn!(
        cache = "response",
        store_op = op,
        %key,
        error = %err,
        "store unavailable, treating as miss"
    );
}

fn now_unix_ms() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
