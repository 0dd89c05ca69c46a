//! Markup post-processing applied to freshly rendered pages.
//!
//! Crawlers get low-noise markup: executable scripts and non-canonical head
//! links are dropped. Browsers get every script lifted out of the document and
//! replayed by a single loader once the page has fully loaded.

use std::{cell::RefCell, rc::Rc};

use html_escape::decode_html_entities;
use lol_html::html_content::{ContentType, Element, EndTag};
use lol_html::{
    EndTagHandler, HandlerResult, RewriteStrSettings, element, end, rewrite_str, text,
};
use metrics::counter;
use thiserror::Error;
use tracing::warn;

use crate::cache::CallerClass;

use super::loader::{LOADER_ATTRIBUTE, ScriptRecord, build_loader};

const METRIC_TRANSFORM_FALLBACK: &str = "ssr_cache_transform_fallback_total";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("markup could not be rewritten: {message}")]
    Rewrite { message: String },
}

/// Adapt `raw` for `class`, falling back to the untouched markup on failure.
pub fn transform(raw: &str, class: CallerClass) -> String {
    match try_transform(raw, class) {
        Ok(html) => html,
        Err(err) => {
            warn!(
                target = "ssr_cache::render::transform",
                class = %class,
                error = %err,
                "serving untransformed markup"
            );
            counter!(METRIC_TRANSFORM_FALLBACK).increment(1);
            raw.to_string()
        }
    }
}

pub fn try_transform(raw: &str, class: CallerClass) -> Result<String, TransformError> {
    match class {
        CallerClass::Bot => strip_for_crawlers(raw),
        CallerClass::Human => defer_scripts(raw),
    }
}

// ----------------------------------------------------------------------------
// Selection predicates
// ----------------------------------------------------------------------------

/// Scripts whose `type` marks them as data rather than code.
pub fn is_data_script(script_type: Option<&str>) -> bool {
    let Some(script_type) = script_type else {
        return false;
    };
    let essence = script_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json") || essence.ends_with("/json")
}

/// Links whose `rel` contains the `canonical` token.
pub fn is_canonical_link(rel: Option<&str>) -> bool {
    rel.is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("canonical"))
    })
}

/// Loader scripts emitted by an earlier browser pass.
pub fn is_deferred_loader(el: &Element<'_, '_>) -> bool {
    el.has_attribute(LOADER_ATTRIBUTE)
}

// ----------------------------------------------------------------------------
// Crawler pass
// ----------------------------------------------------------------------------

fn strip_for_crawlers(raw: &str) -> Result<String, TransformError> {
    rewrite_str(
        raw,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script", |el| {
                    if !is_data_script(el.get_attribute("type").as_deref()) {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("head link", |el| {
                    if !is_canonical_link(el.get_attribute("rel").as_deref()) {
                        el.remove();
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| TransformError::Rewrite {
        message: err.to_string(),
    })
}

// ----------------------------------------------------------------------------
// Browser pass
// ----------------------------------------------------------------------------

#[derive(Default)]
struct DeferState {
    scripts: Vec<ScriptRecord>,
    /// Text chunks belong to the most recently opened lifted script.
    capturing: bool,
    loader_emitted: bool,
}

impl DeferState {
    /// Loader markup for the collected scripts, at most once per document.
    fn take_loader(&mut self) -> Result<Option<String>, serde_json::Error> {
        if self.loader_emitted || self.scripts.is_empty() {
            return Ok(None);
        }
        self.loader_emitted = true;
        build_loader(&self.scripts).map(Some)
    }
}

fn defer_scripts(raw: &str) -> Result<String, TransformError> {
    let state = Rc::new(RefCell::new(DeferState::default()));

    let rewritten = rewrite_str(
        raw,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script", {
                    let state = Rc::clone(&state);
                    move |el| {
                        let mut state = state.borrow_mut();
                        // An existing loader marks the document as already deferred.
                        if is_deferred_loader(el) {
                            state.loader_emitted = true;
                        }
                        // Scripts after </body> and existing loaders stay put.
                        if state.loader_emitted {
                            state.capturing = false;
                            return Ok(());
                        }

                        // Values come back as written; the loader sets them via the DOM.
                        let attrs = el
                            .attributes()
                            .iter()
                            .map(|attr| {
                                let value = attr.value();
                                (attr.name(), decode_html_entities(&value).into_owned())
                            })
                            .collect();
                        state.scripts.push(ScriptRecord {
                            attrs,
                            code: String::new(),
                        });
                        state.capturing = true;
                        el.remove_and_keep_content();
                        Ok(())
                    }
                }),
                text!("script", {
                    let state = Rc::clone(&state);
                    move |chunk| {
                        let mut state = state.borrow_mut();
                        if !state.capturing {
                            return Ok(());
                        }
                        if let Some(record) = state.scripts.last_mut() {
                            record.code.push_str(chunk.as_str());
                        }
                        chunk.remove();
                        Ok(())
                    }
                }),
                element!("body", {
                    let state = Rc::clone(&state);
                    move |el| {
                        let state = Rc::clone(&state);
                        if let Some(handlers) = el.end_tag_handlers() {
                            let handler: EndTagHandler<'static> =
                                Box::new(move |end_tag: &mut EndTag<'_>| -> HandlerResult {
                                    if let Some(loader) = state.borrow_mut().take_loader()? {
                                        end_tag.before(&loader, ContentType::Html);
                                    }
                                    Ok(())
                                });
                            handlers.push(handler);
                        }
                        Ok(())
                    }
                }),
            ],
            document_content_handlers: vec![end!({
                let state = Rc::clone(&state);
                move |doc_end| {
                    // Documents without an explicit </body>.
                    if let Some(loader) = state.borrow_mut().take_loader()? {
                        doc_end.append(&loader, ContentType::Html);
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| TransformError::Rewrite {
        message: err.to_string(),
    })?;

    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::render::loader::LOADER_PRELUDE;

    /// Decoded `[{attrs, code}]` payload of the single loader in `html`.
    fn loader_payload(html: &str) -> Vec<Value> {
        let start = html.find(LOADER_PRELUDE).expect("loader present") + LOADER_PRELUDE.len();
        let len = html[start..].find(";function r(){").expect("loader body");
        serde_json::from_str(&html[start..start + len]).expect("payload is json")
    }

    const PAGE: &str = concat!(
        "<!DOCTYPE html><html><head>",
        "<link rel=\"canonical\" href=\"https://example.com/blog/42\">",
        "<link rel=\"preload\" href=\"/app.js\" as=\"script\">",
        "<link rel=\"stylesheet\" href=\"/site.css\">",
        "<script type=\"application/ld+json\">{\"@type\":\"BlogPosting\"}</script>",
        "<script src=\"/app.js\" async></script>",
        "</head><body><h1>My 42 blog post</h1>",
        "<script>window.__DATA__ = {\"id\":42};</script>",
        "<script type=\"module\" src=\"/hydrate.js\" nomodule></script>",
        "</body></html>"
    );

    #[test]
    fn data_script_predicate() {
        assert!(is_data_script(Some("application/ld+json")));
        assert!(is_data_script(Some("application/json")));
        assert!(is_data_script(Some("Application/JSON; charset=utf-8")));
        assert!(!is_data_script(Some("text/javascript")));
        assert!(!is_data_script(Some("module")));
        assert!(!is_data_script(None));
    }

    #[test]
    fn canonical_link_predicate() {
        assert!(is_canonical_link(Some("canonical")));
        assert!(is_canonical_link(Some("alternate Canonical")));
        assert!(!is_canonical_link(Some("stylesheet")));
        assert!(!is_canonical_link(None));
    }

    #[test]
    fn crawler_pass_keeps_data_and_canonical_only() {
        let html = try_transform(PAGE, CallerClass::Bot).expect("rewrites");

        assert!(html.contains("rel=\"canonical\""));
        assert!(html.contains("application/ld+json"));
        assert!(html.contains("<h1>My 42 blog post</h1>"));
        assert!(!html.contains("preload"));
        assert!(!html.contains("stylesheet"));
        assert!(!html.contains("/app.js"));
        assert!(!html.contains("__DATA__"));
        assert!(!html.contains("/hydrate.js"));
    }

    #[test]
    fn crawler_pass_keeps_links_outside_head() {
        let page = "<html><head></head><body><link rel=\"stylesheet\" href=\"/x.css\"></body></html>";
        let html = try_transform(page, CallerClass::Bot).expect("rewrites");
        assert!(html.contains("/x.css"));
    }

    #[test]
    fn browser_pass_moves_scripts_into_one_loader() {
        let html = try_transform(PAGE, CallerClass::Human).expect("rewrites");

        assert_eq!(html.matches("<script").count(), 1);
        assert_eq!(html.matches(LOADER_ATTRIBUTE).count(), 1);
        assert!(html.ends_with("</script></body></html>"));
        assert!(html.contains("<h1>My 42 blog post</h1>"));
        // Links are untouched for browsers.
        assert!(html.contains("stylesheet"));

        let app = html.find(r#"["src","/app.js"],["async",""]"#).expect("app.js");
        let data = html.find("window.__DATA__").expect("inline data");
        let hydrate = html
            .find(r#"["type","module"],["src","/hydrate.js"],["nomodule",""]"#)
            .expect("hydrate.js");
        assert!(app < data && data < hydrate);
    }

    #[test]
    fn browser_pass_is_idempotent() {
        let trailing = "<html><body><script src=\"/a.js\"></script></body><script>late()</script></html>";
        for page in [PAGE, trailing] {
            let once = try_transform(page, CallerClass::Human).expect("first pass");
            let twice = try_transform(&once, CallerClass::Human).expect("second pass");
            assert_eq!(once.matches(LOADER_ATTRIBUTE).count(), 1);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn scripts_after_body_end_stay_in_place() {
        let page = "<html><body><script src=\"/a.js\"></script></body><script>late()</script></html>";
        let html = try_transform(page, CallerClass::Human).expect("rewrites");

        assert!(html.ends_with("</body><script>late()</script></html>"));
        assert_eq!(
            loader_payload(&html),
            [json!({ "attrs": [["src", "/a.js"]], "code": "" })]
        );
    }

    #[test]
    fn browser_pass_decodes_attribute_values() {
        let page = concat!(
            "<html><body>",
            "<script src=\"/a.js?x=1&amp;y=2\"></script>",
            "<script data-config='{&quot;theme&quot;:\"dark\"}' src=/b.js></script>",
            "<script>if (a < b && c) { go(\"</x\"); }</script>",
            "</body></html>"
        );
        let html = try_transform(page, CallerClass::Human).expect("rewrites");

        assert_eq!(
            loader_payload(&html),
            [
                json!({ "attrs": [["src", "/a.js?x=1&y=2"]], "code": "" }),
                json!({
                    "attrs": [["data-config", "{\"theme\":\"dark\"}"], ["src", "/b.js"]],
                    "code": ""
                }),
                json!({ "attrs": [], "code": "if (a < b && c) { go(\"</x\"); }" }),
            ]
        );
    }

    #[test]
    fn browser_pass_without_scripts_adds_nothing() {
        let page = "<html><head></head><body><p>static</p></body></html>";
        let html = try_transform(page, CallerClass::Human).expect("rewrites");
        assert_eq!(html, page);
    }

    #[test]
    fn browser_pass_without_body_end_appends_loader() {
        let page = "<p>fragment</p><script>go()</script>";
        let html = try_transform(page, CallerClass::Human).expect("rewrites");
        assert!(html.starts_with("<p>fragment</p><script data-deferred-loader>"));
        assert!(html.contains("go()"));
    }

    #[test]
    fn transform_returns_markup_for_every_class() {
        for class in [CallerClass::Bot, CallerClass::Human] {
            let html = transform("<p>plain</p>", class);
            assert_eq!(html, "<p>plain</p>");
        }
    }
}
