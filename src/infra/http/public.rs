use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::HOST},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{blog::BlogService, error::HttpError},
    cache::{CacheState, response_cache_layer},
    presentation::views::{IndexTemplate, PostTemplate, render_template_response},
};

use super::middleware::{log_responses, set_request_id};

#[derive(Clone)]
pub struct HttpState {
    pub blog: Arc<BlogService>,
    pub cache: Option<CacheState>,
}

pub fn build_router(state: HttpState) -> Router {
    // Pages rendered on demand go through the response cache.
    let cached_routes = Router::new()
        .route("/", get(index))
        .route("/blog/{id}", get(post_detail));

    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        cached_routes
    };

    let passthrough_routes = Router::new()
        .route("/_health", get(health))
        .route("/robots.txt", get(robots_txt));

    cached_routes
        .merge(passthrough_routes)
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_id))
}

async fn index(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    match state.blog.index(&origin(&headers)) {
        Ok(view) => render_template_response(IndexTemplate::from(view), StatusCode::OK),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.blog.post(&origin(&headers), &id) {
        Ok(page) => render_template_response(PostTemplate::from(page), StatusCode::OK),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn robots_txt() -> &'static str {
    "User-agent: *\nAllow: /\n"
}

async fn not_found() -> Response {
    HttpError::new(
        "infra::http::public::not_found",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matched",
    )
    .into_response()
}

fn origin(headers: &HeaderMap) -> String {
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}
