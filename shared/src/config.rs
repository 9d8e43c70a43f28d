//! Widget configuration: the resolved [`WidgetConfig`] and the all-optional
//! [`ConfigPatch`] used for every configuration layer.
//!
//! Layers arrive from three places (programmatic `init()` object, `data-*`
//! attributes on the loader script, server bootstrap patch). They all go through
//! the same tolerant coercion: a value that cannot be understood is treated as
//! absent so the layer below still applies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

macro_rules! keyword_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key = s.trim().to_ascii_lowercase().replace('_', "-");
                match key.as_str() {
                    $($text $(| $alias)* => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

keyword_enum! {
    /// `SameSite` hint forwarded to the iframe for its session cookie.
    SameSite { None => "none", Strict => "strict", Lax => "lax" }
}

impl SameSite {
    /// Spelling used in the `cookie_samesite` embed parameter.
    pub const fn cookie_value(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Strict => "Strict",
            Self::Lax => "Lax",
        }
    }
}

keyword_enum! {
    /// Round icon-only launcher or a pill that also shows `launcherText`.
    LauncherStyle { Bubble => "bubble" | "circle" | "icon", Pill => "pill" | "label" | "text" }
}

keyword_enum! {
    ThemeMode { Light => "light", Dark => "dark", Auto => "auto" | "system" }
}

keyword_enum! {
    /// `theme` derives every launcher color from `themeColor`; `custom` reads
    /// per-element colors from `colorOverridesJson`.
    ColorSettingsMode { Theme => "theme" | "simple", Custom => "custom" | "advanced" }
}

keyword_enum! {
    Position { BottomRight => "bottom-right" | "right", BottomLeft => "bottom-left" | "left" }
}

keyword_enum! {
    AutoHeightMode {
        Fixed => "fixed",
        GrowOnly => "grow-only" | "growonly" | "grow",
        Dynamic => "dynamic",
    }
}

keyword_enum! {
    /// How SPA navigations are observed on the host page.
    NavigationMode {
        Auto => "auto",
        Patch => "patch" | "history",
        NavigateEvent => "navigate-event" | "navigation",
        Poll => "poll",
    }
}

/// Fully resolved configuration for one widget session.
///
/// Built once per `init()` by the loader's resolver and never mutated in place;
/// theme changes produce a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub site_key: String,
    pub embed_url: String,
    pub origin: Option<String>,
    pub cookie_domain: Option<String>,
    pub cookie_same_site: Option<SameSite>,
    pub launcher_style: LauncherStyle,
    pub launcher_text: String,
    pub theme_color: Option<String>,
    pub theme_mode: ThemeMode,
    pub color_settings_mode: ColorSettingsMode,
    pub color_overrides_json: Option<String>,
    pub position: Position,
    pub z_index: i64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
    pub auto_height: bool,
    pub auto_height_mode: AutoHeightMode,
    pub min_height: f64,
    pub max_height_ratio: f64,
    pub mobile_breakpoint: f64,
    pub mobile_fullscreen: bool,
    pub allowed_origins: Vec<String>,
    pub debug: bool,
    pub show_agent_photo: bool,
    pub navigation_mode: NavigationMode,
    pub title: String,
}

/// One configuration layer. `None` means "not specified here".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_same_site: Option<SameSite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher_style: Option<LauncherStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_mode: Option<ThemeMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_settings_mode: Option<ColorSettingsMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_overrides_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_height: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_height_mode: Option<AutoHeightMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_breakpoint: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_fullscreen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_agent_photo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_mode: Option<NavigationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// camelCase names of every configurable field, in declaration order.
pub const FIELD_NAMES: &[&str] = &[
    "siteKey",
    "embedUrl",
    "origin",
    "cookieDomain",
    "cookieSameSite",
    "launcherStyle",
    "launcherText",
    "themeColor",
    "themeMode",
    "colorSettingsMode",
    "colorOverridesJson",
    "position",
    "zIndex",
    "offsetX",
    "offsetY",
    "width",
    "height",
    "autoHeight",
    "autoHeightMode",
    "minHeight",
    "maxHeightRatio",
    "mobileBreakpoint",
    "mobileFullscreen",
    "allowedOrigins",
    "debug",
    "showAgentPhoto",
    "navigationMode",
    "title",
];

macro_rules! overlay_fields {
    ($base:ident, $upper:ident, $($field:ident),+ $(,)?) => {
        $(
            if $upper.$field.is_some() {
                $base.$field = $upper.$field.clone();
            }
        )+
    };
}

impl ConfigPatch {
    /// Layers `upper` on top of `self`; fields absent in `upper` keep their value.
    #[must_use]
    pub fn overlay(mut self, upper: &ConfigPatch) -> ConfigPatch {
        overlay_fields!(
            self,
            upper,
            site_key,
            embed_url,
            origin,
            cookie_domain,
            cookie_same_site,
            launcher_style,
            launcher_text,
            theme_color,
            theme_mode,
            color_settings_mode,
            color_overrides_json,
            position,
            z_index,
            offset_x,
            offset_y,
            width,
            height,
            auto_height,
            auto_height_mode,
            min_height,
            max_height_ratio,
            mobile_breakpoint,
            mobile_fullscreen,
            allowed_origins,
            debug,
            show_agent_photo,
            navigation_mode,
            title,
        );
        self
    }

    /// Reads a layer from a JSON object, accepting camelCase keys and their
    /// snake_case spelling. Non-objects yield an empty patch.
    pub fn from_json(value: &Value) -> ConfigPatch {
        let Some(map) = value.as_object() else {
            return ConfigPatch::default();
        };
        ConfigPatch {
            site_key: field(map, "siteKey").and_then(text),
            embed_url: field(map, "embedUrl").and_then(text),
            origin: field(map, "origin").and_then(text),
            cookie_domain: field(map, "cookieDomain").and_then(text),
            cookie_same_site: field(map, "cookieSameSite").and_then(keyword),
            launcher_style: field(map, "launcherStyle").and_then(keyword),
            launcher_text: field(map, "launcherText").and_then(text),
            theme_color: field(map, "themeColor").and_then(text),
            theme_mode: field(map, "themeMode").and_then(keyword),
            color_settings_mode: field(map, "colorSettingsMode").and_then(keyword),
            color_overrides_json: field(map, "colorOverridesJson")
                .or_else(|| field(map, "colorOverrides"))
                .and_then(json_text),
            position: field(map, "position").and_then(keyword),
            z_index: field(map, "zIndex").and_then(integer),
            offset_x: field(map, "offsetX").and_then(number),
            offset_y: field(map, "offsetY").and_then(number),
            width: field(map, "width").and_then(number),
            height: field(map, "height").and_then(number),
            auto_height: field(map, "autoHeight").and_then(flag),
            auto_height_mode: field(map, "autoHeightMode").and_then(keyword),
            min_height: field(map, "minHeight").and_then(number),
            max_height_ratio: field(map, "maxHeightRatio").and_then(number),
            mobile_breakpoint: field(map, "mobileBreakpoint").and_then(number),
            mobile_fullscreen: field(map, "mobileFullscreen").and_then(flag),
            allowed_origins: field(map, "allowedOrigins").and_then(list),
            debug: field(map, "debug").and_then(flag),
            show_agent_photo: field(map, "showAgentPhoto").and_then(flag),
            navigation_mode: field(map, "navigationMode").and_then(keyword),
            title: field(map, "title").and_then(text),
        }
    }

    /// Reads a layer from `data-*` attributes (`siteKey` ↔ `data-site-key`).
    /// `attribute` returns the raw attribute value when present.
    pub fn from_attributes(attribute: impl Fn(&str) -> Option<String>) -> ConfigPatch {
        let mut map = Map::new();
        for name in FIELD_NAMES {
            if let Some(raw) = attribute(&attribute_name(name)) {
                map.insert((*name).to_string(), Value::String(raw));
            }
        }
        ConfigPatch::from_json(&Value::Object(map))
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }
}

impl<'de> Deserialize<'de> for ConfigPatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(ConfigPatch::from_json(&value))
    }
}

/// `data-` attribute carrying the camelCase field `name`.
pub fn attribute_name(name: &str) -> String {
    let mut out = String::from("data-");
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn field<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    match map.get(name) {
        Some(Value::Null) | None => match map.get(&snake_case(name)) {
            Some(Value::Null) | None => None,
            found => found,
        },
        found => found,
    }
}

fn text(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(_) => Some(value.to_string()),
        _ => text(value),
    }
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn integer(value: &Value) -> Option<i64> {
    let n = number(value)?;
    (n.fract() == 0.0 && n.abs() < 9.0e15).then_some(n as i64)
}

/// Boolean coercion: `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(true),
            Some(v) if v == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => parse_flag(s),
        _ => None,
    }
}

fn keyword<T: FromStr>(value: &Value) -> Option<T> {
    value.as_str()?.parse().ok()
}

fn list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => return None,
    };
    (!items.is_empty()).then_some(items)
}

/// Per-element launcher colors decoded from `colorOverridesJson`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorOverrides {
    pub launcher_background: Option<String>,
    pub launcher_foreground: Option<String>,
    pub badge_background: Option<String>,
    pub badge_foreground: Option<String>,
}

impl ColorOverrides {
    /// Malformed JSON yields no overrides rather than an error.
    pub fn parse(raw: &str) -> ColorOverrides {
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            return ColorOverrides::default();
        };
        let Some(map) = value.as_object() else {
            return ColorOverrides::default();
        };
        ColorOverrides {
            launcher_background: field(map, "launcherBackground").and_then(text),
            launcher_foreground: field(map, "launcherForeground").and_then(text),
            badge_background: field(map, "badgeBackground").and_then(text),
            badge_foreground: field(map, "badgeForeground").and_then(text),
        }
    }
}
