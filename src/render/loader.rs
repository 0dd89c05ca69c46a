//! Deferred script loader emitted at the end of browser-facing pages.

use serde::Serialize;

/// Attribute marking the loader so later passes leave it alone.
pub(crate) const LOADER_ATTRIBUTE: &str = "data-deferred-loader";

/// A script lifted out of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct ScriptRecord {
    /// Attributes in source order; boolean attributes carry an empty value.
    pub(crate) attrs: Vec<(String, String)>,
    /// Inline source, empty for external scripts.
    pub(crate) code: String,
}

pub(super) const LOADER_PRELUDE: &str = "(function(){var l=document.currentScript;var s=";

// Waits for `load` (or the next tick when already complete), recreates every
// script in order and finally removes the loader element.
const LOADER_BODY: &str = ";function r(){for(var i=0;i<s.length;i++){\
var d=s[i],e=document.createElement(\"script\"),a=false;\
for(var j=0;j<d.attrs.length;j++){e.setAttribute(d.attrs[j][0],d.attrs[j][1]);\
if(d.attrs[j][0]===\"async\"){a=true;}}\
if(!a){e.async=false;}if(d.code){e.text=d.code;}document.body.appendChild(e);}\
if(l&&l.parentNode){l.parentNode.removeChild(l);}}\
if(document.readyState===\"complete\"){setTimeout(r,0);}\
else{window.addEventListener(\"load\",r);}})();";

/// Build the loader element for `scripts`.
pub(crate) fn build_loader(scripts: &[ScriptRecord]) -> Result<String, serde_json::Error> {
    let payload = escape_for_script(&serde_json::to_string(scripts)?);
    Ok(format!(
        "<script {LOADER_ATTRIBUTE}>{LOADER_PRELUDE}{payload}{LOADER_BODY}</script>"
    ))
}

/// Keep serialized JSON from terminating or commenting out the host element.
fn escape_for_script(json: &str) -> String {
    json.replace("</", "<\\/").replace("<!--", "<\\u0021--")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_embeds_attributes_and_code() {
        let scripts = vec![
            ScriptRecord {
                attrs: vec![
                    ("src".to_string(), "/app.js".to_string()),
                    ("nomodule".to_string(), String::new()),
                ],
                code: String::new(),
            },
            ScriptRecord {
                attrs: Vec::new(),
                code: "window.ready = true;".to_string(),
            },
        ];

        let loader = build_loader(&scripts).expect("serializes");
        assert!(loader.starts_with("<script data-deferred-loader>"));
        assert!(loader.ends_with("</script>"));
        assert!(loader.contains(r#"[["src","/app.js"],["nomodule",""]]"#));
        assert!(loader.contains("window.ready = true;"));
        assert!(loader.contains("document.readyState"));
    }

    #[test]
    fn closing_tags_inside_code_are_escaped() {
        let scripts = vec![ScriptRecord {
            attrs: Vec::new(),
            code: "document.write('</script><!-- x')".to_string(),
        }];
        let loader = build_loader(&scripts).expect("serializes");
        let inner = loader
            .strip_suffix("</script>")
            .expect("loader closes once");
        assert!(!inner.contains("</script>"));
        assert!(!inner.contains("<!--"));
    }
}
