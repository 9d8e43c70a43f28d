//! Config resolution: built-in defaults ← page-author layer ← server patch.

use chatlive_shared::{
    AutoHeightMode, ColorSettingsMode, ConfigPatch, LauncherStyle, NavigationMode, Position,
    ThemeMode, WidgetConfig,
};
use url::Url;

use crate::error::WidgetError;

pub const DEFAULT_LAUNCHER_TEXT: &str = "Chat with us";
pub const DEFAULT_TITLE: &str = "Chat";
pub const DEFAULT_Z_INDEX: i64 = 2_147_483_000;
pub const DEFAULT_OFFSET: f64 = 20.0;
pub const DEFAULT_WIDTH: f64 = 380.0;
pub const DEFAULT_HEIGHT: f64 = 560.0;
pub const DEFAULT_MIN_HEIGHT: f64 = 320.0;
pub const DEFAULT_MAX_HEIGHT_RATIO: f64 = 0.85;
pub const DEFAULT_MOBILE_BREAKPOINT: f64 = 640.0;

/// What the resolver needs to know about the page it runs on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveContext {
    pub loader_origin: Option<String>,
    pub page_origin: String,
}

/// A validated config plus the values derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub widget: WidgetConfig,
    /// Origin of `embedUrl`; the only postMessage target.
    pub iframe_origin: String,
    pub embed_src: String,
    pub service_origin: String,
    /// Origins accepted for inbound messages.
    pub allowlist: Vec<String>,
}

impl ResolvedConfig {
    /// Reconfiguring in place is only possible when this pair is unchanged.
    pub fn same_identity(&self, other: &ResolvedConfig) -> bool {
        self.widget.site_key == other.widget.site_key && self.widget.embed_url == other.widget.embed_url
    }
}

pub fn resolve(
    page: &ConfigPatch,
    server: Option<&ConfigPatch>,
    cx: &ResolveContext,
) -> Result<ResolvedConfig, WidgetError> {
    let merged = match server {
        Some(patch) => page.clone().overlay(patch),
        None => page.clone(),
    };
    let widget = build(merged)?;

    let embed = parse_http_url(&widget.embed_url)
        .ok_or_else(|| WidgetError::InvalidEmbedUrl(widget.embed_url.clone()))?;
    let iframe_origin = embed.origin().ascii_serialization();
    let service_origin = widget
        .origin
        .as_deref()
        .and_then(origin_of)
        .or_else(|| cx.loader_origin.as_deref().and_then(origin_of))
        .unwrap_or_else(|| iframe_origin.clone());
    let allowlist = if widget.allowed_origins.is_empty() {
        vec![iframe_origin.clone()]
    } else {
        widget
            .allowed_origins
            .iter()
            .map(|entry| origin_of(entry).unwrap_or_else(|| entry.trim_end_matches('/').to_string()))
            .collect()
    };
    let embed_src = embed_src(embed, &widget, &cx.page_origin);

    Ok(ResolvedConfig {
        widget,
        iframe_origin,
        embed_src,
        service_origin,
        allowlist,
    })
}

/// Applies the built-in defaults to a merged layer and checks the identity
/// fields. Out-of-range numbers fall back to their defaults.
pub fn build(merged: ConfigPatch) -> Result<WidgetConfig, WidgetError> {
    let site_key = merged.site_key.ok_or(WidgetError::MissingSiteKey)?;
    let embed_url = merged.embed_url.ok_or(WidgetError::MissingEmbedUrl)?;

    let positive = |value: Option<f64>, default: f64| value.filter(|v| *v > 0.0).unwrap_or(default);
    let non_negative = |value: Option<f64>, default: f64| value.filter(|v| *v >= 0.0).unwrap_or(default);

    Ok(WidgetConfig {
        site_key,
        embed_url,
        origin: merged.origin,
        cookie_domain: merged.cookie_domain,
        cookie_same_site: merged.cookie_same_site,
        launcher_style: merged.launcher_style.unwrap_or(LauncherStyle::Bubble),
        launcher_text: merged
            .launcher_text
            .unwrap_or_else(|| DEFAULT_LAUNCHER_TEXT.to_string()),
        theme_color: merged.theme_color,
        theme_mode: merged.theme_mode.unwrap_or(ThemeMode::Auto),
        color_settings_mode: merged.color_settings_mode.unwrap_or(ColorSettingsMode::Theme),
        color_overrides_json: merged.color_overrides_json,
        position: merged.position.unwrap_or(Position::BottomRight),
        z_index: merged.z_index.unwrap_or(DEFAULT_Z_INDEX),
        offset_x: non_negative(merged.offset_x, DEFAULT_OFFSET),
        offset_y: non_negative(merged.offset_y, DEFAULT_OFFSET),
        width: positive(merged.width, DEFAULT_WIDTH),
        height: positive(merged.height, DEFAULT_HEIGHT),
        auto_height: merged.auto_height.unwrap_or(true),
        auto_height_mode: merged.auto_height_mode.unwrap_or(AutoHeightMode::GrowOnly),
        min_height: non_negative(merged.min_height, DEFAULT_MIN_HEIGHT),
        max_height_ratio: merged
            .max_height_ratio
            .filter(|r| *r > 0.0 && *r <= 1.0)
            .unwrap_or(DEFAULT_MAX_HEIGHT_RATIO),
        mobile_breakpoint: non_negative(merged.mobile_breakpoint, DEFAULT_MOBILE_BREAKPOINT),
        mobile_fullscreen: merged.mobile_fullscreen.unwrap_or(true),
        allowed_origins: merged.allowed_origins.unwrap_or_default(),
        debug: merged.debug.unwrap_or(false),
        show_agent_photo: merged.show_agent_photo.unwrap_or(true),
        navigation_mode: merged.navigation_mode.unwrap_or(NavigationMode::Auto),
        title: merged.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
    })
}

/// The identity fields `build` needs, checked on the page layer alone so a
/// bad `init()` fails before any network call.
pub fn check_identity(page: &ConfigPatch) -> Result<(), WidgetError> {
    if page.site_key.is_none() {
        return Err(WidgetError::MissingSiteKey);
    }
    let embed_url = page.embed_url.as_deref().ok_or(WidgetError::MissingEmbedUrl)?;
    parse_http_url(embed_url)
        .map(drop)
        .ok_or_else(|| WidgetError::InvalidEmbedUrl(embed_url.to_string()))
}

/// Service origin for the bootstrap call, derived before a full resolve:
/// explicit `origin`, else the loader's origin, else the `embedUrl` origin.
pub fn bootstrap_origin(page: &ConfigPatch, cx: &ResolveContext) -> Option<String> {
    page.origin
        .as_deref()
        .and_then(origin_of)
        .or_else(|| cx.loader_origin.as_deref().and_then(origin_of))
        .or_else(|| page.embed_url.as_deref().and_then(origin_of))
}

/// ASCII origin of an absolute http(s) URL; opaque or unparseable input is `None`.
pub fn origin_of(raw: &str) -> Option<String> {
    let url = parse_http_url(raw)?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn embed_src(mut embed: Url, widget: &WidgetConfig, page_origin: &str) -> String {
    {
        let mut query = embed.query_pairs_mut();
        query.append_pair("site_key", &widget.site_key);
        query.append_pair("origin", page_origin);
        if let Some(domain) = &widget.cookie_domain {
            query.append_pair("cookie_domain", domain);
        }
        if let Some(same_site) = widget.cookie_same_site {
            query.append_pair("cookie_samesite", same_site.cookie_value());
        }
    }
    embed.into()
}
