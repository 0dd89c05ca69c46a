//! Demo blog content served through the response cache.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

const FEATURED_POSTS: &[&str] = &["1", "2", "42"];
const POST_BODY: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod \
tempor incididunt ut labore et dolore magna aliqua.";
const MAX_ID_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum BlogError {
    #[error("unknown post `{0}`")]
    UnknownPost(String),
    #[error("failed to serialize page data: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: String,
    pub title: String,
    pub body: String,
}

impl PostView {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: format!("My {id} blog post"),
            body: POST_BODY.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexView {
    pub canonical_url: String,
    pub page_data: String,
    pub posts: Vec<PostView>,
}

#[derive(Debug, Clone)]
pub struct PostPage {
    pub canonical_url: String,
    pub page_data: String,
    pub structured_data: String,
    pub post: PostView,
}

#[derive(Debug, Clone, Default)]
pub struct BlogService;

impl BlogService {
    pub fn index(&self, origin: &str) -> Result<IndexView, BlogError> {
        let posts: Vec<PostView> = FEATURED_POSTS.iter().map(|id| PostView::new(id)).collect();
        let page_data = script_json(&json!({ "page": "/", "posts": posts.len() }))?;
        Ok(IndexView {
            canonical_url: format!("{origin}/"),
            page_data,
            posts,
        })
    }

    /// Any short alphanumeric id is a post.
    pub fn post(&self, origin: &str, id: &str) -> Result<PostPage, BlogError> {
        if !is_valid_id(id) {
            return Err(BlogError::UnknownPost(id.to_string()));
        }

        let post = PostView::new(id);
        let canonical_url = format!("{origin}/blog/{id}");
        let page_data = script_json(&json!({ "page": "/blog/[id]", "props": { "id": id } }))?;
        let structured_data = script_json(&json!({
            "@context": "https://schema.org",
            "@type": "BlogPosting",
            "headline": post.title,
            "url": canonical_url,
        }))?;

        Ok(PostPage {
            canonical_url,
            page_data,
            structured_data,
            post,
        })
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// JSON safe to embed inside a `<script>` element.
fn script_json(value: &serde_json::Value) -> Result<String, serde_json::Error> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_titles_follow_the_id() {
        let page = BlogService.post("http://localhost:3000", "42").expect("post");
        assert_eq!(page.post.title, "My 42 blog post");
        assert_eq!(page.canonical_url, "http://localhost:3000/blog/42");
        assert!(page.structured_data.contains("\"BlogPosting\""));
        assert!(page.page_data.contains("\"id\":\"42\""));
    }

    #[test]
    fn malformed_ids_are_unknown() {
        assert!(matches!(
            BlogService.post("http://localhost", "a b"),
            Err(BlogError::UnknownPost(_))
        ));
        assert!(BlogService.post("http://localhost", "").is_err());
    }

    #[test]
    fn index_lists_featured_posts() {
        let index = BlogService.index("http://localhost").expect("index");
        assert_eq!(index.posts.len(), FEATURED_POSTS.len());
        assert_eq!(index.canonical_url, "http://localhost/");
    }
}
