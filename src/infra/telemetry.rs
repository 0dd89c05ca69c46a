use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_lookup_metrics();
        describe_render_metrics();
        describe_store_metrics();
    });
}

/// How each request left the cache.
fn describe_lookup_metrics() {
    for (name, help) in [
        ("ssr_cache_hit_total", "Requests answered from the response store."),
        ("ssr_cache_miss_total", "Requests that had to render, including forced refreshes."),
        ("ssr_cache_not_modified_total", "Conditional requests answered with 304 Not Modified."),
    ] {
        describe_counter!(name, Unit::Count, help);
    }
}

fn describe_render_metrics() {
    describe_histogram!(
        "ssr_cache_render_ms",
        Unit::Milliseconds,
        "Render latency on cache misses, labelled by caller class."
    );
    describe_counter!(
        "ssr_cache_render_error_total",
        Unit::Count,
        "Renders that failed or returned a non-200 status; nothing is stored."
    );
    describe_counter!(
        "ssr_cache_transform_fallback_total",
        Unit::Count,
        "Pages stored as rendered because markup post-processing failed."
    );
}

fn describe_store_metrics() {
    describe_counter!(
        "ssr_cache_store_error_total",
        Unit::Count,
        "Store operations that failed, labelled by `store_op`; reads fall back to a miss."
    );
}
