//! Response cache middleware.
//!
//! Adapts the orchestrator to an axum router: the downstream handler is the
//! render collaborator and the returned `Response` is the send collaborator.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use tracing::{error, instrument, warn};

use super::orchestrator::{
    CacheOutcome, PageRenderer, RenderError, RenderedPage, RequestContext, ResponseCache,
};

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub cache: Arc<ResponseCache>,
}

impl CacheState {
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }
}

/// Middleware serving `GET`/`HEAD` pages through the response cache.
///
/// Anything else, and requests without a host, go straight to the handler.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<CacheState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !state.cache.config().enabled {
        return next.run(request).await;
    }

    let head = match *request.method() {
        Method::GET => false,
        Method::HEAD => true,
        _ => return next.run(request).await,
    };

    let ctx = match RequestContext::from_parts(request.uri(), request.headers()) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(cache = "response", error = %err, "bypassing response cache");
            return next.run(request).await;
        }
    };

    // HEAD shares the GET entry, so render the full page.
    if head {
        *request.method_mut() = Method::GET;
    }

    let renderer = NextRenderer::new(next, request, state.cache.config().body_limit_bytes);
    let response = match state.cache.serve(&ctx, renderer).await {
        Ok(outcome) => outcome.into_response(),
        Err(err) => err.into_response(),
    };

    if head {
        let (parts, _) = response.into_parts();
        Response::from_parts(parts, Body::empty())
    } else {
        response
    }
}

/// Renders by running the rest of the middleware stack.
pub struct NextRenderer {
    next: Next,
    request: Request<Body>,
    body_limit: usize,
}

impl NextRenderer {
    pub fn new(next: Next, request: Request<Body>, body_limit: usize) -> Self {
        Self {
            next,
            request,
            body_limit,
        }
    }
}

impl PageRenderer for NextRenderer {
    async fn render(self, _ctx: &RequestContext) -> Result<RenderedPage, RenderError> {
        let response = self.next.run(self.request).await;
        if response.status() != StatusCode::OK {
            return Err(RenderError::Status(Box::new(response)));
        }

        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|err| RenderError::Body(err.to_string()))?;

        match String::from_utf8(bytes.to_vec()) {
            Ok(html) => Ok(RenderedPage { html }),
            Err(err) => Err(RenderError::Encoding(Box::new(Response::from_parts(
                parts,
                Body::from(err.into_bytes()),
            )))),
        }
    }
}

impl IntoResponse for CacheOutcome {
    fn into_response(self) -> Response {
        let (status, headers, mut response) = match self {
            CacheOutcome::NotModified { headers } => {
                (StatusCode::NOT_MODIFIED, headers, Body::empty().into_response())
            }
            CacheOutcome::Full { headers, html } => {
                (StatusCode::OK, headers, Html(html).into_response())
            }
        };
        *response.status_mut() = status;
        headers.apply(response.headers_mut());
        response
    }
}

/// Downstream failures are passed on untouched where a response exists.
impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        match self {
            RenderError::Status(response) | RenderError::Encoding(response) => *response,
            RenderError::Body(message) => {
                warn!(cache = "response", error = %message, "rendered body dropped");
                StatusCode::BAD_GATEWAY.into_response()
            }
            RenderError::Handler(message) => {
                warn!(cache = "response", error = %message, "renderer failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
