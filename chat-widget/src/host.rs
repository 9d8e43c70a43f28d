//! The seam between the runtime and the page it is embedded in.
//!
//! [`Host`] is everything the runtime needs from a browser: element handles,
//! event subscriptions, timers, postMessage and two fire-and-forget network
//! calls. `web::WebHost` implements it with `web-sys`; tests use a
//! deterministic fake. Results of asynchronous work come back to the runtime
//! as [`HostEvent`]s.

use std::collections::HashMap;

use chatlive_shared::{BootstrapRequest, Envelope};
use serde_json::Value;

use crate::error::HostError;
use crate::navigation::NavigationStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Div,
    Span,
    Button,
    Iframe,
    Img,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenTarget {
    Window,
    Document,
    VisualViewport,
    Element(ElementId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEvent {
    /// `message` events; `source` is compared against this iframe's window.
    Message { iframe: ElementId },
    Resize,
    Scroll,
    VisibilityChange,
    Focus,
    Blur,
    PopState,
    HashChange,
    Click,
}

/// A `message` event reduced to what the channel needs to judge it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub origin: String,
    /// `event.source === iframe.contentWindow`.
    pub from_iframe: bool,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Message(InboundMessage),
    Resize,
    ViewportChange,
    VisibilityChange,
    Focus,
    Blur,
    Navigation,
    Click(ElementId),
    Timer(TimerId),
    BootstrapSettled { ticket: u64, body: Option<Value> },
    PingSettled { ticket: u64, delivered: bool },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContext {
    pub url: String,
    pub origin: String,
    pub title: String,
    pub referrer: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualViewportRect {
    pub offset_left: f64,
    pub offset_top: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

/// Best-effort environment signals; any of them may be wrong.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSignals {
    pub inner_width: f64,
    pub inner_height: f64,
    pub visual: Option<VisualViewportRect>,
    pub device_pixel_ratio: f64,
    /// `(hover: none) and (pointer: coarse)`.
    pub coarse_no_hover: bool,
    /// `(any-pointer: fine)`.
    pub any_fine_pointer: bool,
    pub max_touch_points: u32,
}

impl Default for ViewportSignals {
    fn default() -> Self {
        ViewportSignals {
            inner_width: 1280.0,
            inner_height: 800.0,
            visual: None,
            device_pixel_ratio: 1.0,
            coarse_no_hover: false,
            any_fine_pointer: true,
            max_touch_points: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub visible: bool,
    pub focused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PingTransport {
    Beacon,
    Fetch,
    Pixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOutcome {
    /// Handed to the browser; nothing more will be reported.
    Delivered,
    /// Started; a [`HostEvent::PingSettled`] follows.
    Pending,
    /// Not supported or refused synchronously.
    Unavailable,
}

/// Ordered inline style declarations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style(Vec<(&'static str, String)>);

impl Style {
    pub fn new() -> Self {
        Style::default()
    }

    #[must_use]
    pub fn set(mut self, property: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.0.iter_mut().find(|(p, _)| *p == property) {
            Some(slot) => slot.1 = value,
            None => self.0.push((property, value)),
        }
        self
    }

    #[must_use]
    pub fn px(self, property: &'static str, value: f64) -> Self {
        self.set(property, px(value))
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(p, v)| (*p, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn px(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}px", rounded as i64)
    } else {
        format!("{rounded}px")
    }
}

pub trait Host {
    fn now_ms(&self) -> f64;
    fn page(&self) -> PageContext;
    fn viewport(&self) -> ViewportSignals;
    fn visibility(&self) -> Visibility;
    fn supports_navigate_event(&self) -> bool;
    /// Raises or lowers diagnostic logging.
    fn set_debug(&mut self, enabled: bool);

    fn create_element(&mut self, kind: ElementKind) -> Result<ElementId, HostError>;
    fn set_attribute(&mut self, element: ElementId, name: &str, value: &str);
    fn remove_attribute(&mut self, element: ElementId, name: &str);
    fn set_text(&mut self, element: ElementId, text: &str);
    /// Sets the listed properties; properties not in `style` are left alone.
    fn set_style(&mut self, element: ElementId, style: &Style);
    fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), HostError>;
    /// Appends to `document.body` (or `documentElement` when there is no body).
    fn attach(&mut self, element: ElementId) -> Result<(), HostError>;
    fn is_attached(&self, element: ElementId) -> bool;
    /// Detaches the element and releases the handle and its descendants.
    fn remove(&mut self, element: ElementId);

    /// Subscribes to a DOM event. Window `resize` arrives as
    /// [`HostEvent::Resize`], visual viewport `resize`/`scroll` as
    /// [`HostEvent::ViewportChange`], `popstate`/`hashchange` as
    /// [`HostEvent::Navigation`], clicks as [`HostEvent::Click`].
    fn listen(&mut self, target: ListenTarget, event: DomEvent) -> Result<ListenerId, HostError>;
    fn unlisten(&mut self, listener: ListenerId);
    /// Installs a `Patch` or `NavigateEvent` watcher raising [`HostEvent::Navigation`].
    fn watch_history(&mut self, strategy: NavigationStrategy) -> Result<WatchId, HostError>;
    fn unwatch_history(&mut self, watch: WatchId);

    fn set_timeout(&mut self, delay_ms: u32) -> Result<TimerId, HostError>;
    fn clear_timeout(&mut self, timer: TimerId);

    fn post_message(
        &mut self,
        iframe: ElementId,
        envelope: &Envelope,
        target_origin: &str,
    ) -> Result<(), HostError>;

    /// Starts the bootstrap POST; completes with [`HostEvent::BootstrapSettled`].
    fn fetch_bootstrap(&mut self, ticket: u64, url: &str, request: &BootstrapRequest);
    fn send_ping(&mut self, ticket: u64, transport: PingTransport, url: &str) -> TransportOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    BootstrapTimeout,
    HeightDebounce,
    KeepAlive,
    VerifyAttempt,
    NavigationPoll,
}

/// Every armed timer, so teardown can clear them all.
#[derive(Debug, Default)]
pub struct Timers {
    armed: HashMap<TimerId, TimerKind>,
}

impl Timers {
    pub fn arm<H: Host>(&mut self, host: &mut H, kind: TimerKind, delay_ms: u32) -> Option<TimerId> {
        match host.set_timeout(delay_ms) {
            Ok(id) => {
                self.armed.insert(id, kind);
                Some(id)
            }
            Err(err) => {
                tracing::warn!(?kind, %err, "timer unavailable");
                None
            }
        }
    }

    pub fn disarm<H: Host>(&mut self, host: &mut H, timer: Option<TimerId>) {
        if let Some(id) = timer {
            if self.armed.remove(&id).is_some() {
                host.clear_timeout(id);
            }
        }
    }

    /// Claims a fired timer. Unknown ids (already cleared) yield `None`.
    pub fn fire(&mut self, timer: TimerId) -> Option<TimerKind> {
        self.armed.remove(&timer)
    }

    pub fn clear_all<H: Host>(&mut self, host: &mut H) {
        for (id, _) in self.armed.drain() {
            host.clear_timeout(id);
        }
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
