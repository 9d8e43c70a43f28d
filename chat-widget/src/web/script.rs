//! Finding the loader's own `<script>` tag.

use chatlive_shared::ConfigPatch;
use url::Url;
use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlScriptElement};

/// What the loader tag tells us before any `init()` call.
#[derive(Debug, Default)]
pub struct LoaderTag {
    pub declarative: ConfigPatch,
    /// Origin the loader was served from; the bootstrap fallback.
    pub origin: Option<String>,
}

/// `document.currentScript` is gone by the time a wasm module starts, so a
/// tag carrying `data-site-key` is the fallback.
fn locate(document: &Document) -> Option<HtmlScriptElement> {
    if let Some(script) = document
        .current_script()
        .and_then(|el| el.dyn_into::<HtmlScriptElement>().ok())
    {
        return Some(script);
    }
    document
        .query_selector("script[data-site-key]")
        .ok()
        .flatten()
        .and_then(|el| el.dyn_into::<HtmlScriptElement>().ok())
}

fn origin_of(src: &str) -> Option<String> {
    let url = Url::parse(src).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

pub fn read(document: &Document) -> LoaderTag {
    let Some(script) = locate(document) else {
        tracing::debug!("no loader tag found");
        return LoaderTag::default();
    };
    LoaderTag {
        declarative: ConfigPatch::from_attributes(|name| script.get_attribute(name)),
        origin: origin_of(&script.src()),
    }
}
