//! Launcher colors derived from the config.

use chatlive_shared::envelope::ThemePayload;
use chatlive_shared::{ColorOverrides, ColorSettingsMode, WidgetConfig};

use crate::host::Style;

pub const BRAND_COLOR: &str = "#2563eb";
const BADGE_BACKGROUND: &str = "#ef4444";
const LIGHT_TEXT: &str = "#ffffff";
const DARK_TEXT: &str = "#111827";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub launcher_background: String,
    pub launcher_foreground: String,
    pub badge_background: String,
    pub badge_foreground: String,
}

/// `#abc`, `abc`, `#AABBCC` and `#aabbccdd` normalise to lowercase `#rrggbb[aa]`.
pub fn normalize_hex(raw: &str) -> Option<String> {
    let digits = raw.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded = match digits.len() {
        3 | 4 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 | 8 => digits.to_string(),
        _ => return None,
    };
    Some(format!("#{}", expanded.to_ascii_lowercase()))
}

pub fn contrast_foreground(background: &str) -> &'static str {
    let Some(hex) = normalize_hex(background) else {
        return LIGHT_TEXT;
    };
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map(f64::from).unwrap_or(0.0);
    let luminance = 0.2126 * channel(1) + 0.7152 * channel(3) + 0.0722 * channel(5);
    if luminance > 160.0 {
        DARK_TEXT
    } else {
        LIGHT_TEXT
    }
}

pub fn derive_palette(config: &WidgetConfig) -> Palette {
    let base = config
        .theme_color
        .as_deref()
        .and_then(normalize_hex)
        .unwrap_or_else(|| BRAND_COLOR.to_string());

    let overrides = match (config.color_settings_mode, config.color_overrides_json.as_deref()) {
        (ColorSettingsMode::Custom, Some(raw)) => ColorOverrides::parse(raw),
        _ => ColorOverrides::default(),
    };
    let pick = |value: &Option<String>| value.as_deref().and_then(normalize_hex);

    let launcher_background = pick(&overrides.launcher_background).unwrap_or(base);
    let launcher_foreground = pick(&overrides.launcher_foreground)
        .unwrap_or_else(|| contrast_foreground(&launcher_background).to_string());
    let badge_background =
        pick(&overrides.badge_background).unwrap_or_else(|| BADGE_BACKGROUND.to_string());
    let badge_foreground = pick(&overrides.badge_foreground)
        .unwrap_or_else(|| contrast_foreground(&badge_background).to_string());

    Palette {
        launcher_background,
        launcher_foreground,
        badge_background,
        badge_foreground,
    }
}

impl Palette {
    pub fn button_style(&self) -> Style {
        Style::new()
            .set("background-color", self.launcher_background.as_str())
            .set("color", self.launcher_foreground.as_str())
    }

    pub fn badge_style(&self) -> Style {
        Style::new()
            .set("background-color", self.badge_background.as_str())
            .set("color", self.badge_foreground.as_str())
    }

    pub fn payload(&self, config: &WidgetConfig) -> ThemePayload {
        ThemePayload {
            color: self.launcher_background.clone(),
            mode: config.theme_mode.as_str().to_string(),
            position: config.position.as_str().to_string(),
            launcher_background: self.launcher_background.clone(),
            launcher_foreground: self.launcher_foreground.clone(),
        }
    }
}
