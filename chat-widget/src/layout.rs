//! Layout engine: desktop popup vs. mobile fullscreen overlay, plus the
//! auto-height negotiation with the iframe.
//!
//! Everything here is pure: [`plan`] turns config + signals + state into the
//! inline styles for each element, and the runtime applies them.

use chatlive_shared::{AutoHeightMode, LauncherStyle, Position, WidgetConfig};

use crate::host::{px, Style, TimerId, ViewportSignals};

pub const LAUNCHER_SIZE: f64 = 56.0;
pub const PANEL_GAP: f64 = 16.0;
pub const FIXED_CHROME_ALLOWANCE: f64 = 96.0;
pub const HEIGHT_DEBOUNCE_MS: u32 = 120;

const OPEN_TRANSITION: &str = "opacity 160ms ease, transform 160ms ease";
const CLOSE_TRANSITION: &str = "opacity 160ms ease, transform 160ms ease, visibility 0s linear 160ms";

/// True when the reported signals look like desktop browser zoom or DevTools
/// device emulation rather than a real handheld.
pub fn emulated_zoom(signals: &ViewportSignals) -> bool {
    if !signals.any_fine_pointer {
        return false;
    }
    let dpr = signals.device_pixel_ratio;
    let fractional_dpr = dpr.is_finite() && dpr > 0.0 && (dpr - dpr.round()).abs() > 0.01;
    let zoomed_out = signals
        .visual
        .map(|v| v.scale.is_finite() && v.scale > 0.0 && v.scale < 0.99)
        .unwrap_or(false);
    fractional_dpr || zoomed_out
}

/// Any mobile signal counts, unless emulated zoom forces desktop.
pub fn is_mobile(signals: &ViewportSignals, breakpoint: f64) -> bool {
    if emulated_zoom(signals) {
        return false;
    }
    signals.inner_width <= breakpoint || signals.coarse_no_hover || signals.max_touch_points > 0
}

pub fn max_panel_height(config: &WidgetConfig, viewport_height: f64) -> f64 {
    let by_ratio = config.max_height_ratio * viewport_height;
    let by_room = viewport_height - config.offset_y - FIXED_CHROME_ALLOWANCE;
    by_ratio.min(by_room)
}

pub fn clamp_height(value: f64, config: &WidgetConfig, viewport_height: f64) -> f64 {
    value
        .min(max_panel_height(config, viewport_height))
        .max(config.min_height)
}

/// Auto-height is on and the mode lets the iframe drive the panel height.
pub fn negotiates_height(config: &WidgetConfig) -> bool {
    config.auto_height && config.auto_height_mode != AutoHeightMode::Fixed
}

pub fn initial_panel_height(config: &WidgetConfig, viewport_height: f64) -> f64 {
    if negotiates_height(config) {
        clamp_height(config.min_height, config, viewport_height)
    } else {
        config.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutState {
    pub open: bool,
    pub panel_height: f64,
    pub unread: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub mobile: bool,
    pub fullscreen: bool,
    pub root: Style,
    pub panel: Style,
    pub button: Style,
    pub label: Style,
    pub badge: Style,
}

pub fn plan(config: &WidgetConfig, signals: &ViewportSignals, state: LayoutState) -> LayoutPlan {
    let mobile = is_mobile(signals, config.mobile_breakpoint);
    let fullscreen = mobile && state.open && config.mobile_fullscreen;
    let (side, other_side) = match config.position {
        Position::BottomRight => ("right", "left"),
        Position::BottomLeft => ("left", "right"),
    };

    let root = if fullscreen {
        let (left, top, width, height) = match signals.visual {
            Some(v) => (v.offset_left, v.offset_top, v.width, v.height),
            None => (0.0, 0.0, signals.inner_width, signals.inner_height),
        };
        Style::new()
            .set("position", "fixed")
            .px("left", left)
            .px("top", top)
            .px("width", width)
            .px("height", height)
            .set("right", "auto")
            .set("bottom", "auto")
            .set("z-index", config.z_index.to_string())
            .set("pointer-events", "auto")
    } else {
        Style::new()
            .set("position", "fixed")
            .px(side, config.offset_x)
            .set(other_side, "auto")
            .px("bottom", config.offset_y)
            .set("top", "auto")
            .set("width", "0px")
            .set("height", "0px")
            .set("z-index", config.z_index.to_string())
            .set("pointer-events", "none")
    };

    let visibility = |style: Style| {
        if state.open {
            style
                .set("opacity", "1")
                .set("visibility", "visible")
                .set("pointer-events", "auto")
                .set("transition", OPEN_TRANSITION)
        } else {
            style
                .set("opacity", "0")
                .set("visibility", "hidden")
                .set("pointer-events", "none")
                .set("transition", CLOSE_TRANSITION)
        }
    };

    let panel = if fullscreen {
        visibility(
            Style::new()
                .set("position", "absolute")
                .set("left", "0px")
                .set("top", "0px")
                .set("right", "auto")
                .set("bottom", "auto")
                .set("width", "100%")
                .set("height", "100%")
                .set("border-radius", "0px")
                .set("transform", "none"),
        )
    } else {
        let width = config
            .width
            .min(signals.inner_width - 2.0 * config.offset_x)
            .max(LAUNCHER_SIZE);
        let height = state
            .panel_height
            .min(signals.inner_height - config.offset_y - FIXED_CHROME_ALLOWANCE)
            .max(0.0);
        visibility(
            Style::new()
                .set("position", "absolute")
                .px("bottom", LAUNCHER_SIZE + PANEL_GAP)
                .set("top", "auto")
                .set(side, "0px")
                .set(other_side, "auto")
                .px("width", width)
                .px("height", height)
                .set("border-radius", "16px")
                .set(
                    "transform",
                    if state.open { "translateY(0)" } else { "translateY(8px)" },
                ),
        )
    };

    let pill = config.launcher_style == LauncherStyle::Pill;
    let button = Style::new()
        .set("position", "absolute")
        .set("bottom", "0px")
        .set(side, "0px")
        .set(other_side, "auto")
        .set("display", if fullscreen { "none" } else { "flex" })
        .set("pointer-events", if fullscreen { "none" } else { "auto" })
        .px("height", LAUNCHER_SIZE)
        .set("width", if pill { "auto".to_string() } else { px(LAUNCHER_SIZE) })
        .set("padding", if pill { "0 20px" } else { "0" })
        .set("border-radius", if pill { "28px" } else { "50%" });

    let label = Style::new().set("display", if pill { "inline" } else { "none" });

    let badge = Style::new()
        .set("display", if state.unread > 0 { "flex" } else { "none" })
        .set("position", "absolute")
        .set("top", "-4px")
        .set("right", "-4px");

    LayoutPlan {
        mobile,
        fullscreen,
        root,
        panel,
        button,
        label,
        badge,
    }
}

/// Badge text for an unread count.
pub fn badge_text(unread: u32) -> String {
    if unread > 99 {
        "99+".to_string()
    } else {
        unread.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Ignored,
    Buffered { arm: bool },
}

/// Coalesces `WIDGET_HEIGHT` reports over one debounce window.
#[derive(Debug, Default)]
pub struct AutoHeight {
    pending: Option<f64>,
    pub timer: Option<TimerId>,
}

impl AutoHeight {
    pub fn offer(&mut self, config: &WidgetConfig, current: f64, reported: f64, fullscreen: bool) -> Offer {
        if !negotiates_height(config) || fullscreen {
            return Offer::Ignored;
        }
        if config.auto_height_mode == AutoHeightMode::GrowOnly && reported < current {
            return Offer::Ignored;
        }
        self.pending = Some(self.pending.map_or(reported, |p| p.max(reported)));
        Offer::Buffered {
            arm: self.timer.is_none(),
        }
    }

    /// Ends the window, returning the largest accepted report.
    pub fn settle(&mut self) -> Option<f64> {
        self.timer = None;
        self.pending.take()
    }

    pub fn reset(&mut self) -> Option<TimerId> {
        self.pending = None;
        self.timer.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::build;
    use crate::host::VisualViewportRect;
    use chatlive_shared::ConfigPatch;

    fn config(patch: ConfigPatch) -> WidgetConfig {
        build(ConfigPatch {
            site_key: Some("sk".into()),
            embed_url: Some("https://chat.example.com".into()),
            ..patch
        })
        .unwrap()
    }

    fn desktop() -> ViewportSignals {
        ViewportSignals::default()
    }

    fn phone(dpr: f64) -> ViewportSignals {
        ViewportSignals {
            inner_width: 390.0,
            inner_height: 844.0,
            visual: Some(VisualViewportRect {
                offset_left: 0.0,
                offset_top: 0.0,
                width: 390.0,
                height: 844.0,
                scale: 1.0,
            }),
            device_pixel_ratio: dpr,
            coarse_no_hover: true,
            any_fine_pointer: false,
            max_touch_points: 5,
        }
    }

    #[test]
    fn emulated_zoom_against_representative_devices() {
        assert!(!emulated_zoom(&desktop()), "plain desktop");
        assert!(!emulated_zoom(&phone(3.0)), "iPhone");
        assert!(!emulated_zoom(&phone(2.625)), "Pixel with fractional dpr");

        let mut pinched = phone(2.625);
        pinched.visual = pinched.visual.map(|v| VisualViewportRect { scale: 1.8, ..v });
        assert!(!emulated_zoom(&pinched), "pinch-zoomed phone");

        let browser_zoom = ViewportSignals {
            device_pixel_ratio: 1.25,
            ..desktop()
        };
        assert!(emulated_zoom(&browser_zoom), "desktop at 125%");

        let devtools = ViewportSignals {
            device_pixel_ratio: 2.7,
            any_fine_pointer: true,
            ..phone(2.7)
        };
        assert!(emulated_zoom(&devtools), "DevTools emulation at 90% zoom");

        let zoomed_out = ViewportSignals {
            any_fine_pointer: true,
            visual: phone(3.0).visual.map(|v| VisualViewportRect { scale: 0.5, ..v }),
            ..phone(3.0)
        };
        assert!(emulated_zoom(&zoomed_out), "emulated viewport shown at 50%");
    }

    #[test]
    fn any_mobile_signal_counts_unless_emulated() {
        assert!(!is_mobile(&desktop(), 640.0));
        assert!(is_mobile(&ViewportSignals { inner_width: 600.0, ..desktop() }, 640.0));
        assert!(is_mobile(&ViewportSignals { max_touch_points: 1, ..desktop() }, 640.0));
        assert!(is_mobile(&phone(3.0), 640.0));
        let emulated = ViewportSignals {
            device_pixel_ratio: 2.7,
            any_fine_pointer: true,
            ..phone(2.7)
        };
        assert!(!is_mobile(&emulated, 640.0));
    }

    #[test]
    fn fullscreen_overlay_tracks_visual_viewport() {
        let cfg = config(ConfigPatch::default());
        let mut signals = phone(3.0);
        signals.visual = Some(VisualViewportRect {
            offset_left: 0.0,
            offset_top: 120.0,
            width: 390.0,
            height: 500.0,
            scale: 1.0,
        });
        let plan = plan(&cfg, &signals, LayoutState { open: true, panel_height: 400.0, unread: 0 });
        assert!(plan.fullscreen);
        assert_eq!(plan.root.get("top"), Some("120px"));
        assert_eq!(plan.root.get("height"), Some("500px"));
        assert_eq!(plan.button.get("display"), Some("none"));
        assert_eq!(plan.panel.get("width"), Some("100%"));
    }

    #[test]
    fn closed_panel_hides_via_opacity_visibility_and_pointer_events() {
        let cfg = config(ConfigPatch::default());
        let plan = plan(&cfg, &desktop(), LayoutState { open: false, panel_height: 400.0, unread: 2 });
        assert!(!plan.fullscreen);
        assert_eq!(plan.root.get("width"), Some("0px"));
        assert_eq!(plan.panel.get("opacity"), Some("0"));
        assert_eq!(plan.panel.get("visibility"), Some("hidden"));
        assert_eq!(plan.panel.get("pointer-events"), Some("none"));
        assert_eq!(plan.panel.get("display"), None);
        assert_eq!(plan.badge.get("display"), Some("flex"));
    }

    #[test]
    fn bottom_left_anchors_to_the_left_edge() {
        let cfg = config(ConfigPatch {
            position: Some(Position::BottomLeft),
            offset_x: Some(12.0),
            ..ConfigPatch::default()
        });
        let plan = plan(&cfg, &desktop(), LayoutState { open: true, panel_height: 400.0, unread: 0 });
        assert_eq!(plan.root.get("left"), Some("12px"));
        assert_eq!(plan.root.get("right"), Some("auto"));
        assert_eq!(plan.panel.get("left"), Some("0px"));
    }

    #[test]
    fn grow_only_ignores_shrinking_reports() {
        let cfg = config(ConfigPatch {
            auto_height_mode: Some(AutoHeightMode::GrowOnly),
            ..ConfigPatch::default()
        });
        let mut auto = AutoHeight::default();
        assert_eq!(auto.offer(&cfg, 320.0, 400.0, false), Offer::Buffered { arm: true });
        auto.timer = Some(TimerId(1));
        assert_eq!(auto.offer(&cfg, 320.0, 300.0, false), Offer::Ignored);
        assert_eq!(auto.offer(&cfg, 320.0, 500.0, false), Offer::Buffered { arm: false });
        assert_eq!(auto.settle(), Some(500.0));
        assert_eq!(auto.settle(), None);
    }

    #[test]
    fn fixed_mode_and_fullscreen_ignore_reports() {
        let fixed = config(ConfigPatch {
            auto_height_mode: Some(AutoHeightMode::Fixed),
            ..ConfigPatch::default()
        });
        let mut auto = AutoHeight::default();
        assert_eq!(auto.offer(&fixed, 320.0, 400.0, false), Offer::Ignored);
        let dynamic = config(ConfigPatch {
            auto_height_mode: Some(AutoHeightMode::Dynamic),
            ..ConfigPatch::default()
        });
        assert_eq!(auto.offer(&dynamic, 320.0, 400.0, true), Offer::Ignored);
        assert_eq!(auto.offer(&dynamic, 600.0, 400.0, false), Offer::Buffered { arm: true });
    }

    #[test]
    fn clamp_respects_ratio_room_and_minimum() {
        let cfg = config(ConfigPatch {
            min_height: Some(300.0),
            max_height_ratio: Some(0.5),
            offset_y: Some(20.0),
            ..ConfigPatch::default()
        });
        assert_eq!(clamp_height(900.0, &cfg, 1000.0), 500.0);
        assert_eq!(clamp_height(100.0, &cfg, 1000.0), 300.0);
        // Room above the launcher wins over the ratio on short viewports.
        let tall_ratio = config(ConfigPatch {
            max_height_ratio: Some(1.0),
            offset_y: Some(20.0),
            min_height: Some(100.0),
            ..ConfigPatch::default()
        });
        assert_eq!(clamp_height(900.0, &tall_ratio, 600.0), 484.0);
    }
}
