use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::blog::{IndexView, PostPage, PostView};
use crate::application::error::HttpError;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub canonical_url: String,
    /// Serialized hydration payload, embedded verbatim.
    pub page_data: String,
    pub posts: Vec<PostView>,
}

impl From<IndexView> for IndexTemplate {
    fn from(view: IndexView) -> Self {
        Self {
            canonical_url: view.canonical_url,
            page_data: view.page_data,
            posts: view.posts,
        }
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub canonical_url: String,
    pub page_data: String,
    pub structured_data: String,
    pub post: PostView,
}

impl From<PostPage> for PostTemplate {
    fn from(page: PostPage) -> Self {
        Self {
            canonical_url: page.canonical_url,
            page_data: page.page_data,
            structured_data: page.structured_data,
            post: page.post,
        }
    }
}
