//! One mounted widget: the DOM nodes it owns and the state that lives and
//! dies with them.

use chatlive_shared::envelope::{HostInit, PageInfo, ThemeSync, VisibilityPayload};
use chatlive_shared::{ColorSettingsMode, HostMessage, Position, ThemeMode};
use url::Url;

use crate::channel::MessageChannel;
use crate::config::ResolvedConfig;
use crate::error::HostError;
use crate::host::{DomEvent, ElementId, ElementKind, Host, ListenTarget, ListenerId, Style, TimerId, Timers};
use crate::layout::{self, AutoHeight, LayoutState};
use crate::navigation::NavigationObserver;
use crate::theme::{self, derive_palette, Palette};
use crate::verify::InstallVerifier;

pub const LOADER_VERSION: &str = env!("CARGO_PKG_VERSION");
const LAUNCHER_GLYPH: &str = "\u{1F4AC}";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Nodes {
    pub root: ElementId,
    pub iframe: ElementId,
    pub button: ElementId,
    pub icon: ElementId,
    pub label: ElementId,
    pub badge: ElementId,
}

#[derive(Debug)]
pub(crate) struct Preview {
    pub overlay: ElementId,
    image: ElementId,
    click: Option<ListenerId>,
}

#[derive(Debug)]
pub(crate) struct Session {
    pub resolved: ResolvedConfig,
    pub nodes: Nodes,
    pub bindings: Vec<ListenerId>,
    pub channel: MessageChannel,
    pub navigation: NavigationObserver,
    pub auto_height: AutoHeight,
    pub verifier: Option<InstallVerifier>,
    pub keep_alive: Option<TimerId>,
    pub preview: Option<Preview>,
    pub open: bool,
    pub is_mobile: bool,
    pub fullscreen: bool,
    pub unread: u32,
    pub agent_avatar_url: Option<String>,
    pub palette: Palette,
    pub panel_height: f64,
}

fn child<H: Host>(host: &mut H, parent: ElementId, kind: ElementKind) -> Result<ElementId, HostError> {
    let id = host.create_element(kind)?;
    if let Err(err) = host.append_child(parent, id) {
        host.remove(id);
        return Err(err);
    }
    Ok(id)
}

impl Nodes {
    fn create<H: Host>(host: &mut H, resolved: &ResolvedConfig) -> Result<Nodes, HostError> {
        let root = host.create_element(ElementKind::Div)?;
        match Nodes::fill(host, root, resolved) {
            Ok(nodes) => Ok(nodes),
            Err(err) => {
                host.remove(root);
                Err(err)
            }
        }
    }

    fn fill<H: Host>(host: &mut H, root: ElementId, resolved: &ResolvedConfig) -> Result<Nodes, HostError> {
        let widget = &resolved.widget;
        host.set_attribute(root, "data-chatlive", "root");
        host.set_style(
            root,
            &Style::new()
                .set("font-family", "system-ui, -apple-system, 'Segoe UI', Roboto, sans-serif")
                .set("line-height", "1"),
        );

        let iframe = child(host, root, ElementKind::Iframe)?;
        host.set_attribute(iframe, "src", &resolved.embed_src);
        host.set_attribute(iframe, "title", &widget.title);
        host.set_attribute(iframe, "allow", "clipboard-write");
        host.set_style(
            iframe,
            &Style::new()
                .set("border", "0")
                .set("background", "#ffffff")
                .set("overflow", "hidden")
                .set("box-shadow", "0 12px 40px rgba(0, 0, 0, 0.18)")
                .set("color-scheme", "normal"),
        );

        let button = child(host, root, ElementKind::Button)?;
        host.set_attribute(button, "type", "button");
        host.set_attribute(button, "aria-label", &widget.launcher_text);
        host.set_style(
            button,
            &Style::new()
                .set("border", "none")
                .set("cursor", "pointer")
                .set("align-items", "center")
                .set("justify-content", "center")
                .set("gap", "8px")
                .set("font-size", "15px")
                .set("font-weight", "600")
                .set("box-shadow", "0 6px 20px rgba(0, 0, 0, 0.2)"),
        );

        let icon = child(host, button, ElementKind::Span)?;
        host.set_text(icon, LAUNCHER_GLYPH);
        host.set_style(
            icon,
            &Style::new()
                .set("display", "inline-flex")
                .set("align-items", "center")
                .set("justify-content", "center")
                .set("width", "24px")
                .set("height", "24px")
                .set("font-size", "20px")
                .set("border-radius", "50%")
                .set("background-size", "cover")
                .set("background-position", "center"),
        );

        let label = child(host, button, ElementKind::Span)?;
        host.set_text(label, &widget.launcher_text);

        let badge = child(host, button, ElementKind::Span)?;
        host.set_style(
            badge,
            &Style::new()
                .set("min-width", "18px")
                .set("height", "18px")
                .set("padding", "0 5px")
                .set("border-radius", "9px")
                .set("font-size", "11px")
                .set("align-items", "center")
                .set("justify-content", "center")
                .set("box-sizing", "border-box"),
        );

        Ok(Nodes {
            root,
            iframe,
            button,
            icon,
            label,
            badge,
        })
    }
}

impl Session {
    /// Builds the DOM and attaches it. Nothing is left behind on failure.
    pub fn mount<H: Host>(host: &mut H, resolved: ResolvedConfig) -> Result<Session, HostError> {
        let nodes = Nodes::create(host, &resolved)?;
        if let Err(err) = host.attach(nodes.root) {
            host.remove(nodes.root);
            return Err(err);
        }
        let viewport = host.viewport();
        let panel_height = layout::initial_panel_height(&resolved.widget, viewport.inner_height);
        let palette = derive_palette(&resolved.widget);
        let is_mobile = layout::is_mobile(&viewport, resolved.widget.mobile_breakpoint);
        let mut channel = MessageChannel::default();
        channel.connect(nodes.iframe, &resolved.iframe_origin, &resolved.allowlist);
        Ok(Session {
            resolved,
            nodes,
            bindings: Vec::new(),
            channel,
            navigation: NavigationObserver::default(),
            auto_height: AutoHeight::default(),
            verifier: None,
            keep_alive: None,
            preview: None,
            open: false,
            is_mobile,
            fullscreen: false,
            unread: 0,
            agent_avatar_url: None,
            palette,
            panel_height,
        })
    }

    pub fn bind<H: Host>(&mut self, host: &mut H) {
        let targets = [
            (ListenTarget::Window, DomEvent::Message { iframe: self.nodes.iframe }),
            (ListenTarget::Window, DomEvent::Resize),
            (ListenTarget::VisualViewport, DomEvent::Resize),
            (ListenTarget::VisualViewport, DomEvent::Scroll),
            (ListenTarget::Document, DomEvent::VisibilityChange),
            (ListenTarget::Window, DomEvent::Focus),
            (ListenTarget::Window, DomEvent::Blur),
            (ListenTarget::Element(self.nodes.button), DomEvent::Click),
        ];
        for (target, event) in targets {
            match host.listen(target, event) {
                Ok(id) => self.bindings.push(id),
                Err(err) => tracing::debug!(?target, ?event, %err, "listener not bound"),
            }
        }
    }

    pub fn relayout<H: Host>(&mut self, host: &mut H) {
        let signals = host.viewport();
        let plan = layout::plan(
            &self.resolved.widget,
            &signals,
            LayoutState {
                open: self.open,
                panel_height: self.panel_height,
                unread: self.unread,
            },
        );
        self.is_mobile = plan.mobile;
        self.fullscreen = plan.fullscreen;
        host.set_style(self.nodes.root, &plan.root);
        host.set_style(self.nodes.iframe, &plan.panel);
        host.set_style(self.nodes.button, &plan.button);
        host.set_style(self.nodes.button, &self.palette.button_style());
        host.set_style(self.nodes.label, &plan.label);
        host.set_style(self.nodes.badge, &plan.badge);
        host.set_style(self.nodes.badge, &self.palette.badge_style());
    }

    pub fn reclamp<H: Host>(&mut self, host: &H) {
        let widget = &self.resolved.widget;
        if layout::negotiates_height(widget) {
            self.panel_height = layout::clamp_height(self.panel_height, widget, host.viewport().inner_height);
        }
    }

    pub fn page_info<H: Host>(host: &H) -> PageInfo {
        let page = host.page();
        PageInfo {
            url: page.url,
            title: page.title,
            referrer: page.referrer,
        }
    }

    pub fn visibility<H: Host>(host: &H) -> VisibilityPayload {
        let state = host.visibility();
        VisibilityPayload {
            visible: state.visible,
            focused: state.focused,
        }
    }

    pub fn host_init<H: Host>(&self, host: &H) -> HostMessage {
        let widget = &self.resolved.widget;
        HostMessage::Init(HostInit {
            site_key: widget.site_key.clone(),
            open: self.open,
            is_mobile: self.is_mobile,
            fullscreen: self.fullscreen,
            host_origin: host.page().origin,
            theme: self.palette.payload(widget),
            page: Session::page_info(host),
            show_agent_photo: widget.show_agent_photo,
            loader_version: LOADER_VERSION.to_string(),
        })
    }

    /// `HOST_INIT`, `HOST_VISIBILITY`, `HOST_PAGEVIEW`.
    pub fn handshake<H: Host>(&self, host: &H) -> Vec<HostMessage> {
        vec![
            self.host_init(host),
            HostMessage::Visibility(Session::visibility(host)),
            HostMessage::Pageview(Session::page_info(host)),
        ]
    }

    /// Applies an iframe-driven theme change. Nothing is echoed back.
    pub fn apply_theme_sync<H: Host>(&mut self, host: &mut H, sync: ThemeSync) {
        let mut widget = self.resolved.widget.clone();
        if let Some(color) = sync.theme_color.as_deref().and_then(theme::normalize_hex) {
            widget.theme_color = Some(color);
        }
        if let Some(mode) = sync.theme_mode.as_deref().and_then(|m| m.parse::<ThemeMode>().ok()) {
            widget.theme_mode = mode;
        }
        if let Some(position) = sync.position.as_deref().and_then(|p| p.parse::<Position>().ok()) {
            widget.position = position;
        }
        match sync.color_overrides {
            Some(serde_json::Value::Object(map)) if !map.is_empty() => {
                widget.color_overrides_json = Some(serde_json::Value::Object(map).to_string());
                widget.color_settings_mode = ColorSettingsMode::Custom;
            }
            Some(serde_json::Value::String(raw)) if !raw.trim().is_empty() => {
                widget.color_overrides_json = Some(raw);
                widget.color_settings_mode = ColorSettingsMode::Custom;
            }
            _ => {}
        }
        self.replace_widget(host, widget);
    }

    pub fn replace_widget<H: Host>(&mut self, host: &mut H, widget: chatlive_shared::WidgetConfig) {
        self.palette = derive_palette(&widget);
        self.resolved.widget = widget;
        self.relayout(host);
    }

    pub fn set_unread<H: Host>(&mut self, host: &mut H, count: u32) -> bool {
        let changed = self.unread != count;
        self.unread = count;
        host.set_text(self.nodes.badge, &layout::badge_text(count));
        self.relayout(host);
        changed
    }

    pub fn set_agent<H: Host>(&mut self, host: &mut H, avatar_url: Option<String>) {
        self.agent_avatar_url = avatar_url.as_deref().and_then(safe_image_src);
        let shown = self
            .agent_avatar_url
            .as_deref()
            .filter(|_| self.resolved.widget.show_agent_photo);
        match shown {
            Some(src) => {
                host.set_text(self.nodes.icon, "");
                host.set_style(self.nodes.icon, &Style::new().set("background-image", css_url(src)));
            }
            None => {
                host.set_text(self.nodes.icon, LAUNCHER_GLYPH);
                host.set_style(self.nodes.icon, &Style::new().set("background-image", "none"));
            }
        }
    }

    pub fn show_preview<H: Host>(&mut self, host: &mut H, src: Option<String>) {
        let Some(src) = src.as_deref().and_then(safe_image_src) else {
            self.close_preview(host);
            return;
        };
        if let Some(preview) = &self.preview {
            host.set_attribute(preview.image, "src", &src);
            return;
        }
        match Preview::open(host, &src, self.resolved.widget.z_index) {
            Ok(preview) => self.preview = Some(preview),
            Err(err) => tracing::debug!(%err, "image preview unavailable"),
        }
    }

    pub fn close_preview<H: Host>(&mut self, host: &mut H) {
        if let Some(preview) = self.preview.take() {
            if let Some(click) = preview.click {
                host.unlisten(click);
            }
            host.remove(preview.overlay);
        }
    }

    pub fn teardown<H: Host>(&mut self, host: &mut H, timers: &mut Timers) {
        for id in self.bindings.drain(..) {
            host.unlisten(id);
        }
        self.navigation.unsubscribe(host, timers);
        if let Some(verifier) = self.verifier.as_mut() {
            verifier.cancel(host, timers);
        }
        timers.disarm(host, self.auto_height.reset());
        timers.disarm(host, self.keep_alive.take());
        self.close_preview(host);
        host.remove(self.nodes.root);
        self.channel.reset();
    }
}

impl Preview {
    fn open<H: Host>(host: &mut H, src: &str, z_index: i64) -> Result<Preview, HostError> {
        let overlay = host.create_element(ElementKind::Div)?;
        host.set_attribute(overlay, "data-chatlive", "preview");
        host.set_style(
            overlay,
            &Style::new()
                .set("position", "fixed")
                .set("inset", "0")
                .set("display", "flex")
                .set("align-items", "center")
                .set("justify-content", "center")
                .set("background", "rgba(0, 0, 0, 0.8)")
                .set("cursor", "zoom-out")
                .set("z-index", z_index.saturating_add(1).to_string()),
        );
        let image = match child(host, overlay, ElementKind::Img) {
            Ok(image) => image,
            Err(err) => {
                host.remove(overlay);
                return Err(err);
            }
        };
        host.set_attribute(image, "src", src);
        host.set_attribute(image, "alt", "");
        host.set_style(
            image,
            &Style::new()
                .set("max-width", "90vw")
                .set("max-height", "90vh")
                .set("border-radius", "8px"),
        );
        if let Err(err) = host.attach(overlay) {
            host.remove(overlay);
            return Err(err);
        }
        let click = host.listen(ListenTarget::Element(overlay), DomEvent::Click).ok();
        Ok(Preview { overlay, image, click })
    }
}

/// Accepts `https:`, `http:` and `data:image/` sources only.
pub fn safe_image_src(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let is_data_image = raw
        .get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:image/"));
    if is_data_image && raw.len() > 11 {
        return Some(raw.to_string());
    }
    let url = Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.into())
}

fn css_url(src: &str) -> String {
    let escaped: String = src
        .chars()
        .filter(|c| !c.is_control())
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            other => vec![other],
        })
        .collect();
    format!("url(\"{escaped}\")")
}
