use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::Path,
    http::{
        Method, Request, StatusCode,
        header::{ETAG, HOST, IF_NONE_MATCH, USER_AGENT},
    },
    middleware,
    response::{Html, IntoResponse},
    routing::get,
};
use metrics_util::debugging::DebuggingRecorder;
use ssr_cache::cache::{
    CacheConfig, CacheEntry, CacheKey, CacheState, CacheStore, MemoryStore, ResponseCache,
    StoreError, response_cache_layer,
};
use tower::ServiceExt;

struct DownStore;

#[async_trait]
impl CacheStore for DownStore {
    async fn exists(&self, _key: &CacheKey) -> Result<bool, StoreError> {
        Err(StoreError::unavailable("down"))
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        Err(StoreError::unavailable("down"))
    }

    async fn set(&self, _key: &CacheKey, _entry: &CacheEntry, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::unavailable("down"))
    }

    async fn ttl_remaining(&self, _key: &CacheKey) -> Result<Option<Duration>, StoreError> {
        Err(StoreError::unavailable("down"))
    }
}

fn app(store: Arc<dyn CacheStore>) -> Router {
    let cache = CacheState::new(ResponseCache::new(CacheConfig::default(), store));
    Router::new()
        .route(
            "/pages/{slug}",
            get(|Path(slug): Path<String>| async move {
                if slug == "gone" {
                    return StatusCode::NOT_FOUND.into_response();
                }
                Html(format!("<html><body><p>{slug}</p><script>go()</script></body></html>"))
                    .into_response()
            }),
        )
        .layer(middleware::from_fn_with_state(cache, response_cache_layer))
}

async fn get_page(app: &Router, uri: &str, if_none_match: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(HOST, "metrics.test")
        .header(USER_AGENT, "Mozilla/5.0 Firefox/128.0");
    if let Some(tag) = if_none_match {
        builder = builder.header(IF_NONE_MATCH, tag);
    }
    let request = builder.body(Body::empty()).expect("request should build");
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let memory: Arc<dyn CacheStore> =
        Arc::new(MemoryStore::new(NonZeroUsize::new(8).expect("capacity")));
    let healthy = app(memory);

    // miss, hit, then a conditional hit
    let miss = get_page(&healthy, "/pages/one", None).await;
    assert_eq!(miss.status(), StatusCode::OK);
    let etag = miss
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .expect("etag");
    assert_eq!(get_page(&healthy, "/pages/one", None).await.status(), StatusCode::OK);
    assert_eq!(
        get_page(&healthy, "/pages/one", Some(&etag)).await.status(),
        StatusCode::NOT_MODIFIED
    );

    // render failure
    assert_eq!(
        get_page(&healthy, "/pages/gone", None).await.status(),
        StatusCode::NOT_FOUND
    );

    // store failure, served anyway
    let degraded = app(Arc::new(DownStore));
    assert_eq!(get_page(&degraded, "/pages/two", None).await.status(), StatusCode::OK);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        "ssr_cache_hit_total",
        "ssr_cache_miss_total",
        "ssr_cache_not_modified_total",
        "ssr_cache_render_error_total",
        "ssr_cache_store_error_total",
        "ssr_cache_render_ms",
    ] {
        assert!(
            names.contains(expected),
            "missing metric {expected}; recorded: {names:?}"
        );
    }
}
