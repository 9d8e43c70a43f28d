//! Lifecycle controller.
//!
//! [`Runtime`] owns everything one page knows about the widget: the bootstrap
//! sequencer, the mounted [`Session`] (if any), every armed timer and the
//! page-author listener registries. It is driven from outside through the API
//! methods and [`Runtime::handle`]; it never calls page-author code itself.
//! Listener invocations are collected and handed back via
//! [`Runtime::take_callbacks`] so the caller can run them after releasing its
//! borrow of the runtime.

use std::rc::Rc;

use chatlive_shared::{ConfigPatch, HostMessage, WidgetMessage};

use crate::bootstrap::{BootstrapSequencer, Phase, Settled, BOOTSTRAP_TIMEOUT_MS};
use crate::commands::{Command, Listener};
use crate::config::{bootstrap_origin, check_identity, resolve, ResolveContext, ResolvedConfig};
use crate::error::{CallbackError, WidgetError};
use crate::host::{ElementId, Host, HostEvent, InboundMessage, TimerId, TimerKind, Timers};
use crate::layout::{self, Offer, HEIGHT_DEBOUNCE_MS};
use crate::session::Session;
use crate::theme::{derive_palette, normalize_hex};
use crate::verify::{CancelToken, InstallVerifier, PingTarget, RetryPolicy};

pub const KEEP_ALIVE_MS: u32 = 2_000;

pub type Deferred = Box<dyn FnOnce() -> Result<(), CallbackError>>;

/// Page-author callbacks waiting to run.
#[derive(Default)]
pub struct Callbacks(Vec<Deferred>);

impl Callbacks {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Runs every callback in order; a failing one is logged and skipped.
    pub fn run(self) {
        for callback in self.0 {
            if let Err(err) = callback() {
                tracing::warn!(%err, "ChatLive listener failed");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Built synchronously.
    Mounted,
    /// Same identity: the existing DOM was updated.
    Reconfigured,
    /// Waiting on the bootstrap response (or its timeout).
    Pending,
}

pub struct Runtime<H: Host> {
    host: H,
    loader_origin: Option<String>,
    declarative: ConfigPatch,
    policy: RetryPolicy,
    timers: Timers,
    bootstrap: BootstrapSequencer,
    session: Option<Session>,
    ready_listeners: Vec<Listener<()>>,
    unread_listeners: Vec<Listener<u32>>,
    deferred: Vec<Deferred>,
}

impl<H: Host> Runtime<H> {
    pub fn new(host: H, loader_origin: Option<String>) -> Self {
        Runtime {
            host,
            loader_origin,
            declarative: ConfigPatch::default(),
            policy: RetryPolicy::default(),
            timers: Timers::default(),
            bootstrap: BootstrapSequencer::default(),
            session: None,
            ready_listeners: Vec::new(),
            unread_listeners: Vec::new(),
            deferred: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Config read from the loader's `data-*` attributes. `init()` input is
    /// layered on top of it.
    pub fn set_declarative(&mut self, patch: ConfigPatch) {
        self.declarative = patch;
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.open)
    }

    pub fn unread(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.unread)
    }

    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn take_callbacks(&mut self) -> Callbacks {
        Callbacks(std::mem::take(&mut self.deferred))
    }

    pub fn apply(&mut self, command: Command) -> Result<(), WidgetError> {
        match command {
            Command::Init(patch) => self.init(patch).map(|_| ()),
            Command::Destroy => {
                self.destroy();
                Ok(())
            }
            Command::Open => {
                self.open();
                Ok(())
            }
            Command::Close => {
                self.close();
                Ok(())
            }
            Command::Toggle => {
                self.toggle();
                Ok(())
            }
            Command::SetTheme(color) => {
                self.set_theme(&color);
                Ok(())
            }
            Command::OnReady(listener) => {
                self.on_ready(listener);
                Ok(())
            }
            Command::OnUnread(listener) => {
                self.on_unread(listener);
                Ok(())
            }
        }
    }

    fn resolve_context(&self) -> ResolveContext {
        ResolveContext {
            loader_origin: self.loader_origin.clone(),
            page_origin: self.host.page().origin,
        }
    }

    pub fn init(&mut self, input: ConfigPatch) -> Result<InitOutcome, WidgetError> {
        let page = self.declarative.clone().overlay(&input);
        check_identity(&page)?;
        match self.bootstrap.phase() {
            Phase::Inflight { .. } => {
                self.bootstrap.update_pending(page);
                Ok(InitOutcome::Pending)
            }
            Phase::Done => {
                let resolved = resolve(&page, self.bootstrap.server_patch(), &self.resolve_context())?;
                let same = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.resolved.same_identity(&resolved));
                if same {
                    self.reconfigure(resolved);
                    return Ok(InitOutcome::Reconfigured);
                }
                self.destroy();
                self.start(page)
            }
            Phase::Idle => self.start(page),
        }
    }

    fn start(&mut self, page: ConfigPatch) -> Result<InitOutcome, WidgetError> {
        self.host.set_debug(page.debug.unwrap_or(false));
        let cx = self.resolve_context();
        let origin = bootstrap_origin(&page, &cx);
        let now = self.host.now_ms();
        match self.bootstrap.begin(page.clone(), origin.as_deref(), &cx.page_origin, now) {
            Some(call) => {
                self.bootstrap.timer =
                    self.timers
                        .arm(&mut self.host, TimerKind::BootstrapTimeout, BOOTSTRAP_TIMEOUT_MS);
                tracing::debug!(url = %call.url, "fetching widget bootstrap");
                self.host.fetch_bootstrap(call.ticket, &call.url, &call.request);
                Ok(InitOutcome::Pending)
            }
            None => {
                self.mount(&page, None)?;
                Ok(InitOutcome::Mounted)
            }
        }
    }

    fn mount(&mut self, page: &ConfigPatch, server: Option<&ConfigPatch>) -> Result<(), WidgetError> {
        let resolved = resolve(page, server, &self.resolve_context())?;
        self.host.set_debug(resolved.widget.debug);
        let mut session = Session::mount(&mut self.host, resolved)?;
        session.bind(&mut self.host);
        session.relayout(&mut self.host);

        let current = self.host.page();
        let mode = session.resolved.widget.navigation_mode;
        session
            .navigation
            .subscribe(&mut self.host, &mut self.timers, mode, current.url.clone());

        let target = PingTarget {
            service_origin: session.resolved.service_origin.clone(),
            site_key: session.resolved.widget.site_key.clone(),
            page_origin: current.origin,
            page_url: current.url,
        };
        let mut verifier = InstallVerifier::new(self.policy.clone(), target, CancelToken::default());
        verifier.start(&mut self.host, &mut self.timers);
        session.verifier = Some(verifier);

        if session.resolved.widget.debug {
            session.keep_alive = self.timers.arm(&mut self.host, TimerKind::KeepAlive, KEEP_ALIVE_MS);
        }
        tracing::debug!(
            site_key = %session.resolved.widget.site_key,
            iframe_origin = %session.resolved.iframe_origin,
            "widget mounted"
        );
        self.session = Some(session);
        Ok(())
    }

    fn reconfigure(&mut self, resolved: ResolvedConfig) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let previous_mode = session.resolved.widget.navigation_mode;
        {
            let widget = &resolved.widget;
            self.host.set_debug(widget.debug);
            self.host.set_text(session.nodes.label, &widget.launcher_text);
            self.host
                .set_attribute(session.nodes.button, "aria-label", &widget.launcher_text);
            self.host.set_attribute(session.nodes.iframe, "title", &widget.title);
        }
        session.channel.set_allowlist(&resolved.allowlist);
        // The iframe keeps the document it already loaded.
        let embed_src = std::mem::take(&mut session.resolved.embed_src);
        session.resolved = ResolvedConfig { embed_src, ..resolved };
        session.palette = derive_palette(&session.resolved.widget);
        session.reclamp(&self.host);
        session.relayout(&mut self.host);
        let avatar = session.agent_avatar_url.clone();
        session.set_agent(&mut self.host, avatar);

        let widget = &session.resolved.widget;
        if widget.navigation_mode != previous_mode {
            let url = self.host.page().url;
            session
                .navigation
                .subscribe(&mut self.host, &mut self.timers, widget.navigation_mode, url);
        }
        if !widget.debug {
            self.timers.disarm(&mut self.host, session.keep_alive.take());
        } else if session.keep_alive.is_none() {
            session.keep_alive = self.timers.arm(&mut self.host, TimerKind::KeepAlive, KEEP_ALIVE_MS);
        }
        if session.channel.is_ready() {
            let init = session.host_init(&self.host);
            session.channel.send(&mut self.host, init);
        }
        tracing::debug!("widget reconfigured in place");
    }

    /// Removes every node, listener and timer. Safe to call repeatedly.
    /// Listener registries are kept for the next `init()`.
    pub fn destroy(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown(&mut self.host, &mut self.timers);
            tracing::debug!("widget destroyed");
        }
        let timer = self.bootstrap.reset();
        self.timers.disarm(&mut self.host, timer);
        self.timers.clear_all(&mut self.host);
    }

    pub fn open(&mut self) {
        self.set_open(true);
    }

    pub fn close(&mut self) {
        self.set_open(false);
    }

    pub fn toggle(&mut self) {
        if let Some(open) = self.session.as_ref().map(|s| s.open) {
            self.set_open(!open);
        }
    }

    fn set_open(&mut self, open: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.open == open {
            return;
        }
        session.open = open;
        session.relayout(&mut self.host);
        session.channel.send(&mut self.host, HostMessage::SetOpen { open });
    }

    pub fn set_theme(&mut self, color: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(color) = normalize_hex(color) else {
            tracing::warn!(color, "setTheme ignored: not a hex color");
            return;
        };
        let mut widget = session.resolved.widget.clone();
        widget.theme_color = Some(color);
        session.replace_widget(&mut self.host, widget);
        let payload = session.palette.payload(&session.resolved.widget);
        session.channel.send(&mut self.host, HostMessage::SetTheme(payload));
    }

    /// Registers a ready listener; it also runs right away when the iframe
    /// is already ready.
    pub fn on_ready(&mut self, listener: Listener<()>) {
        if self.session.as_ref().is_some_and(|s| s.channel.is_ready()) {
            let call = Rc::clone(&listener);
            self.deferred.push(Box::new(move || call(())));
        }
        self.ready_listeners.push(listener);
    }

    pub fn on_unread(&mut self, listener: Listener<u32>) {
        self.unread_listeners.push(listener);
    }

    pub fn handle(&mut self, event: HostEvent) {
        match event {
            HostEvent::Timer(id) => self.on_timer(id),
            HostEvent::BootstrapSettled { ticket, body } => self.on_bootstrap(ticket, body),
            HostEvent::PingSettled { ticket, delivered } => {
                if let Some(verifier) = self.session.as_mut().and_then(|s| s.verifier.as_mut()) {
                    verifier.on_settled(&mut self.host, &mut self.timers, ticket, delivered);
                }
            }
            HostEvent::Message(message) => self.on_message(message),
            HostEvent::Resize | HostEvent::ViewportChange => {
                if let Some(session) = self.session.as_mut() {
                    session.reclamp(&self.host);
                    session.relayout(&mut self.host);
                }
            }
            HostEvent::VisibilityChange | HostEvent::Focus | HostEvent::Blur => {
                if let Some(session) = self.session.as_mut() {
                    let state = Session::visibility(&self.host);
                    session.channel.send(&mut self.host, HostMessage::Visibility(state));
                }
            }
            HostEvent::Navigation => {
                if let Some(session) = self.session.as_mut() {
                    let url = self.host.page().url;
                    if session.navigation.observe(url).is_some() {
                        let page = Session::page_info(&self.host);
                        session.channel.send(&mut self.host, HostMessage::Pageview(page));
                    }
                }
            }
            HostEvent::Click(id) => self.on_click(id),
        }
    }

    fn on_bootstrap(&mut self, ticket: u64, body: Option<serde_json::Value>) {
        match self.bootstrap.on_settled(ticket, body.as_ref()) {
            Settled::Render { page, patch } => {
                let timer = self.bootstrap.timer.take();
                self.timers.disarm(&mut self.host, timer);
                if patch.is_none() {
                    tracing::debug!("no bootstrap patch; using page config");
                }
                if let Err(err) = self.mount(&page, patch.as_ref()) {
                    tracing::error!(%err, "ChatLive widget could not be built");
                }
            }
            Settled::Discard => {}
        }
    }

    fn on_timer(&mut self, id: TimerId) {
        let Some(kind) = self.timers.fire(id) else {
            return;
        };
        match kind {
            TimerKind::BootstrapTimeout => {
                if let Some(page) = self.bootstrap.on_timeout() {
                    tracing::warn!(
                        timeout_ms = BOOTSTRAP_TIMEOUT_MS,
                        "bootstrap timed out; rendering with page config"
                    );
                    if let Err(err) = self.mount(&page, None) {
                        tracing::error!(%err, "ChatLive widget could not be built");
                    }
                }
            }
            TimerKind::HeightDebounce => self.settle_height(),
            TimerKind::KeepAlive => self.keep_alive(),
            TimerKind::VerifyAttempt => {
                if let Some(verifier) = self.session.as_mut().and_then(|s| s.verifier.as_mut()) {
                    verifier.on_timer(&mut self.host, &mut self.timers);
                }
            }
            TimerKind::NavigationPoll => {
                if let Some(session) = self.session.as_mut() {
                    if session.navigation.poll(&mut self.host, &mut self.timers).is_some() {
                        let page = Session::page_info(&self.host);
                        session.channel.send(&mut self.host, HostMessage::Pageview(page));
                    }
                }
            }
        }
    }

    fn on_message(&mut self, message: InboundMessage) {
        let Some(decoded) = self.session.as_ref().and_then(|s| s.channel.receive(&message)) else {
            return;
        };
        match decoded {
            WidgetMessage::Ready => self.on_widget_ready(),
            WidgetMessage::Height { height } => self.offer_height(height),
            WidgetMessage::Unread { count } => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if session.set_unread(&mut self.host, count) {
                    for listener in &self.unread_listeners {
                        let call = Rc::clone(listener);
                        self.deferred.push(Box::new(move || call(count)));
                    }
                }
            }
            WidgetMessage::Theme(sync) => {
                if let Some(session) = self.session.as_mut() {
                    session.apply_theme_sync(&mut self.host, sync);
                }
            }
            WidgetMessage::Agent { avatar_url } => {
                if let Some(session) = self.session.as_mut() {
                    session.set_agent(&mut self.host, avatar_url);
                }
            }
            WidgetMessage::ImagePreview { src } => {
                if let Some(session) = self.session.as_mut() {
                    session.show_preview(&mut self.host, src);
                }
            }
            WidgetMessage::RequestOpen => self.open(),
            WidgetMessage::RequestClose => self.close(),
        }
    }

    fn on_widget_ready(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let first = !session.channel.is_ready();
        let handshake = session.handshake(&self.host);
        session.channel.mark_ready(&mut self.host, handshake);
        if first {
            tracing::debug!("iframe ready");
            for listener in &self.ready_listeners {
                let call = Rc::clone(listener);
                self.deferred.push(Box::new(move || call(())));
            }
        }
    }

    fn offer_height(&mut self, height: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let offer = session.auto_height.offer(
            &session.resolved.widget,
            session.panel_height,
            height,
            session.fullscreen,
        );
        if offer == (Offer::Buffered { arm: true }) {
            session.auto_height.timer =
                self.timers
                    .arm(&mut self.host, TimerKind::HeightDebounce, HEIGHT_DEBOUNCE_MS);
        }
    }

    fn settle_height(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(reported) = session.auto_height.settle() else {
            return;
        };
        let viewport_height = self.host.viewport().inner_height;
        session.panel_height = layout::clamp_height(reported, &session.resolved.widget, viewport_height);
        session.relayout(&mut self.host);
    }

    fn keep_alive(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.keep_alive = None;
        if !session.resolved.widget.debug {
            return;
        }
        if !self.host.is_attached(session.nodes.root) {
            tracing::debug!("widget root was detached; re-attaching");
            if let Err(err) = self.host.attach(session.nodes.root) {
                tracing::warn!(%err, "could not re-attach widget root");
            }
            session.relayout(&mut self.host);
        }
        session.keep_alive = self.timers.arm(&mut self.host, TimerKind::KeepAlive, KEEP_ALIVE_MS);
    }

    fn on_click(&mut self, id: ElementId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.preview.as_ref().is_some_and(|p| p.overlay == id) {
            session.close_preview(&mut self.host);
        } else if id == session.nodes.button {
            self.toggle();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::host::{ElementKind, PingTransport, TransportOutcome, ViewportSignals, VisualViewportRect};
    use crate::navigation::NavigationStrategy;
    use crate::testing::FakeHost;
    use chatlive_shared::envelope::kind;
    use chatlive_shared::NavigationMode;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const IFRAME_ORIGIN: &str = "https://chat.example.com";

    fn page() -> ConfigPatch {
        ConfigPatch {
            site_key: Some("sk_live".into()),
            embed_url: Some(format!("{IFRAME_ORIGIN}/embed")),
            ..ConfigPatch::default()
        }
    }

    fn runtime() -> Runtime<FakeHost> {
        Runtime::new(FakeHost::default(), None)
    }

    fn settle_bootstrap(rt: &mut Runtime<FakeHost>, body: Option<Value>) {
        let ticket = rt.host().bootstrap_calls.last().unwrap().ticket;
        rt.handle(HostEvent::BootstrapSettled { ticket, body });
    }

    fn mounted_with(mut rt: Runtime<FakeHost>, patch: ConfigPatch) -> Runtime<FakeHost> {
        assert_eq!(rt.init(patch).unwrap(), InitOutcome::Pending);
        settle_bootstrap(&mut rt, None);
        assert!(rt.is_initialized());
        rt
    }

    fn mounted(patch: ConfigPatch) -> Runtime<FakeHost> {
        mounted_with(runtime(), patch)
    }

    fn advance(rt: &mut Runtime<FakeHost>, ms: f64) {
        let until = rt.host().now + ms;
        while let Some(id) = rt.host_mut().next_due(until) {
            rt.handle(HostEvent::Timer(id));
        }
        rt.host_mut().now = until;
    }

    fn message_from(origin: &str, from_iframe: bool, kind: &str, payload: Value) -> HostEvent {
        HostEvent::Message(InboundMessage {
            origin: origin.to_string(),
            from_iframe,
            data: json!({ "channel": "chatlive", "version": 1, "type": kind, "payload": payload, "ts": 0 }),
        })
    }

    fn from_iframe(kind: &str, payload: Value) -> HostEvent {
        message_from(IFRAME_ORIGIN, true, kind, payload)
    }

    fn nodes(rt: &Runtime<FakeHost>) -> crate::session::Nodes {
        rt.session.as_ref().unwrap().nodes
    }

    fn counter() -> (Rc<Cell<u32>>, Listener<()>) {
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        (count, Rc::new(move |()| -> Result<(), CallbackError> {
            seen.set(seen.get() + 1);
            Ok(())
        }))
    }

    #[test]
    fn init_without_site_key_fails_synchronously() {
        let mut rt = runtime();
        let patch = ConfigPatch {
            embed_url: Some(format!("{IFRAME_ORIGIN}/embed")),
            ..ConfigPatch::default()
        };
        assert_eq!(rt.init(patch), Err(WidgetError::MissingSiteKey));
        assert!(rt.host().elements.is_empty());
        assert!(rt.host().bootstrap_calls.is_empty());
    }

    #[test]
    fn bad_embed_url_fails_before_bootstrap_with_known_loader_origin() {
        let mut rt = Runtime::new(FakeHost::default(), Some("https://cdn.example.com".into()));
        let missing = ConfigPatch {
            site_key: Some("sk".into()),
            ..ConfigPatch::default()
        };
        assert_eq!(rt.init(missing), Err(WidgetError::MissingEmbedUrl));

        let relative = ConfigPatch {
            site_key: Some("sk".into()),
            embed_url: Some("/embed".into()),
            ..ConfigPatch::default()
        };
        assert_eq!(
            rt.init(relative),
            Err(WidgetError::InvalidEmbedUrl("/embed".into()))
        );

        let ftp = ConfigPatch {
            site_key: Some("sk".into()),
            embed_url: Some("ftp://chat.example.com/embed".into()),
            origin: Some("https://api.example.com".into()),
            ..ConfigPatch::default()
        };
        assert!(matches!(rt.init(ftp), Err(WidgetError::InvalidEmbedUrl(_))));

        assert!(rt.host().bootstrap_calls.is_empty());
        assert!(rt.host().elements.is_empty());
        assert_eq!(rt.armed_timers(), 0);
        assert!(!rt.is_initialized());

        assert_eq!(rt.init(page()).unwrap(), InitOutcome::Pending);
        assert_eq!(rt.host().bootstrap_calls.len(), 1);
    }

    #[test]
    fn programmatic_config_overlays_script_attributes() {
        let mut rt = runtime();
        rt.set_declarative(ConfigPatch {
            launcher_text: Some("From attributes".into()),
            ..page()
        });
        let rt = mounted_with(
            rt,
            ConfigPatch {
                launcher_text: Some("From init".into()),
                ..ConfigPatch::default()
            },
        );
        assert_eq!(rt.host().element(nodes(&rt).label).text, "From init");
    }

    #[test]
    fn nothing_is_painted_until_the_bootstrap_settles() {
        let mut rt = runtime();
        rt.init(page()).unwrap();
        assert!(rt.host().elements.is_empty());
        let call = rt.host().bootstrap_calls[0].clone();
        assert!(call
            .url
            .starts_with("https://chat.example.com/api/v1/public/widget/bootstrap?site_key=sk_live&_ts="));
        assert_eq!(call.request.origin, "https://shop.example");

        settle_bootstrap(
            &mut rt,
            Some(json!({ "data": { "config": { "themeColor": "#FF0000", "launcherText": "Help" } } })),
        );
        let n = nodes(&rt);
        assert_eq!(rt.host().element(n.label).text, "Help");
        assert_eq!(rt.host().style(n.button, "background-color"), Some("#ff0000"));
        assert_eq!(rt.armed_timers(), 0);
    }

    #[test]
    fn bootstrap_timeout_renders_fallback_and_ignores_late_patch() {
        let mut rt = runtime();
        rt.init(page()).unwrap();
        advance(&mut rt, 9_999.0);
        assert!(!rt.is_initialized());
        advance(&mut rt, 1.0);
        assert!(rt.is_initialized());
        let button = nodes(&rt).button;
        assert_eq!(rt.host().style(button, "background-color"), Some("#2563eb"));

        settle_bootstrap(&mut rt, Some(json!({ "config": { "themeColor": "#ff0000" } })));
        assert_eq!(rt.host().style(button, "background-color"), Some("#2563eb"));
        assert_eq!(rt.host().roots().len(), 1);

        // A later re-init of the same widget still does not pick it up.
        assert_eq!(rt.init(page()).unwrap(), InitOutcome::Reconfigured);
        assert_eq!(rt.host().style(button, "background-color"), Some("#2563eb"));
    }

    #[test]
    fn reinit_while_inflight_replaces_pending_config() {
        let mut rt = runtime();
        rt.init(page()).unwrap();
        let updated = ConfigPatch {
            launcher_text: Some("Second".into()),
            ..page()
        };
        assert_eq!(rt.init(updated).unwrap(), InitOutcome::Pending);
        assert_eq!(rt.host().bootstrap_calls.len(), 1);
        settle_bootstrap(&mut rt, None);
        assert_eq!(rt.host().element(nodes(&rt).label).text, "Second");
    }

    #[test]
    fn destroy_is_idempotent_and_leaves_nothing_behind() {
        let mut rt = mounted(ConfigPatch {
            debug: Some(true),
            ..page()
        });
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.handle(from_iframe(kind::WIDGET_HEIGHT, json!({ "height": 500 })));
        rt.handle(from_iframe(
            kind::WIDGET_IMAGE_PREVIEW,
            json!({ "src": "https://cdn.example/a.png" }),
        ));
        rt.open();
        assert!(rt.armed_timers() > 0);
        assert_eq!(rt.host().roots().len(), 2);

        for _ in 0..2 {
            rt.destroy();
            let host = rt.host();
            assert!(host.elements.is_empty());
            assert!(host.listeners.is_empty());
            assert!(host.watches.is_empty());
            assert!(host.timers.is_empty());
            assert_eq!(rt.armed_timers(), 0);
            assert!(!rt.is_initialized());
        }

        let posted = rt.host().posted.len();
        rt.open();
        rt.toggle();
        rt.set_theme("#000000");
        rt.handle(from_iframe(kind::WIDGET_REQUEST_OPEN, Value::Null));
        assert_eq!(rt.host().posted.len(), posted);
        assert!(rt.host().elements.is_empty());
    }

    #[test]
    fn destroy_during_bootstrap_ignores_the_response() {
        let mut rt = runtime();
        rt.init(page()).unwrap();
        rt.destroy();
        assert!(rt.host().timers.is_empty());
        settle_bootstrap(&mut rt, None);
        assert!(!rt.is_initialized());
        assert!(rt.host().elements.is_empty());
    }

    #[test]
    fn same_identity_reconfigures_in_place() {
        let mut rt = mounted(page());
        let before = nodes(&rt);
        let changed = ConfigPatch {
            theme_color: Some("#10b981".into()),
            launcher_text: Some("Ask us".into()),
            ..page()
        };
        assert_eq!(rt.init(changed).unwrap(), InitOutcome::Reconfigured);
        let after = nodes(&rt);
        assert_eq!(before.root, after.root);
        assert_eq!(before.iframe, after.iframe);
        assert_eq!(rt.host().roots(), vec![before.root]);
        assert_eq!(rt.host().style(after.button, "background-color"), Some("#10b981"));
        assert_eq!(rt.host().element(after.label).text, "Ask us");
        assert_eq!(rt.host().bootstrap_calls.len(), 1);
    }

    #[test]
    fn reconfigure_after_ready_resends_host_init() {
        let mut rt = mounted(page());
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.host_mut().posted.clear();
        rt.init(ConfigPatch {
            show_agent_photo: Some(false),
            ..page()
        })
        .unwrap();
        assert_eq!(rt.host().posted_kinds(), vec![kind::HOST_INIT]);
        assert_eq!(rt.host().posted[0].envelope.payload["showAgentPhoto"], json!(false));
    }

    #[test]
    fn new_identity_rebuilds_from_scratch() {
        let mut rt = mounted(page());
        let before = nodes(&rt);
        let other = ConfigPatch {
            embed_url: Some("https://other-chat.example.com/embed".into()),
            ..page()
        };
        assert_eq!(rt.init(other).unwrap(), InitOutcome::Pending);
        assert!(rt.host().elements.is_empty());
        settle_bootstrap(&mut rt, None);
        let after = nodes(&rt);
        assert_ne!(before.root, after.root);
        assert_eq!(rt.host().roots(), vec![after.root]);
        assert!(!rt.host().elements.contains_key(&before.root));
        assert_eq!(rt.host().bootstrap_calls.len(), 2);
    }

    #[test]
    fn untrusted_messages_are_dropped_for_every_type() {
        let mut rt = mounted(page());
        let all = [
            (kind::WIDGET_READY, Value::Null),
            (kind::WIDGET_HEIGHT, json!({ "height": 600 })),
            (kind::WIDGET_UNREAD, json!({ "count": 4 })),
            (kind::WIDGET_THEME, json!({ "themeColor": "#000000" })),
            (kind::WIDGET_AGENT, json!({ "avatarUrl": "https://cdn.example/a.png" })),
            (kind::WIDGET_IMAGE_PREVIEW, json!({ "src": "https://cdn.example/a.png" })),
            (kind::WIDGET_REQUEST_OPEN, Value::Null),
            (kind::WIDGET_REQUEST_CLOSE, Value::Null),
        ];
        let button = nodes(&rt).button;
        let before = rt.host().style(button, "background-color").map(str::to_string);
        for (kind, payload) in all {
            rt.handle(message_from("https://evil.example", true, kind, payload.clone()));
            rt.handle(message_from(IFRAME_ORIGIN, false, kind, payload));
        }
        advance(&mut rt, 1_000.0);
        assert!(!rt.is_open());
        assert_eq!(rt.unread(), 0);
        assert!(!rt.session.as_ref().unwrap().channel.is_ready());
        assert!(rt.host().posted.is_empty());
        assert_eq!(rt.host().roots().len(), 1);
        assert_eq!(
            rt.host().style(button, "background-color").map(str::to_string),
            before
        );
        assert!(rt.take_callbacks().is_empty());
    }

    #[test]
    fn explicit_allowlist_replaces_the_iframe_origin() {
        let mut rt = mounted(ConfigPatch {
            allowed_origins: Some(vec!["https://relay.example.com/".into()]),
            ..page()
        });
        rt.handle(from_iframe(kind::WIDGET_REQUEST_OPEN, Value::Null));
        assert!(!rt.is_open());
        rt.handle(message_from("https://relay.example.com", true, kind::WIDGET_REQUEST_OPEN, Value::Null));
        assert!(rt.is_open());
    }

    #[test]
    fn malformed_envelopes_are_dropped() {
        let mut rt = mounted(page());
        for data in [
            json!("WIDGET_READY"),
            json!({ "channel": "other", "version": 1, "type": "WIDGET_READY" }),
            json!({ "channel": "chatlive", "version": 2, "type": "WIDGET_READY" }),
            json!({ "channel": "chatlive", "version": 1, "type": 7 }),
            json!({ "channel": "chatlive", "version": 1, "type": "WIDGET_HEIGHT", "payload": "tall" }),
        ] {
            rt.handle(HostEvent::Message(InboundMessage {
                origin: IFRAME_ORIGIN.into(),
                from_iframe: true,
                data,
            }));
        }
        assert!(rt.host().posted.is_empty());
        assert_eq!(rt.armed_timers(), 0);
    }

    #[test]
    fn queued_messages_follow_the_handshake_in_order() {
        let mut rt = mounted(page());
        rt.open();
        rt.set_theme("#ABC");
        rt.close();
        assert!(rt.host().posted.is_empty());

        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        assert_eq!(
            rt.host().posted_kinds(),
            vec![
                kind::HOST_INIT,
                kind::HOST_VISIBILITY,
                kind::HOST_PAGEVIEW,
                kind::HOST_SET_OPEN,
                kind::HOST_SET_THEME,
                kind::HOST_SET_OPEN,
            ]
        );
        let posted = &rt.host().posted;
        assert!(posted.iter().all(|p| p.target_origin == IFRAME_ORIGIN));
        assert_eq!(posted[3].envelope.payload, json!({ "open": true }));
        assert_eq!(posted[4].envelope.payload["color"], json!("#aabbcc"));
        assert_eq!(posted[5].envelope.payload, json!({ "open": false }));
        assert_eq!(posted[0].envelope.payload["siteKey"], json!("sk_live"));
        assert_eq!(posted[2].envelope.payload["url"], json!("https://shop.example/"));

        rt.open();
        assert_eq!(rt.host().posted.len(), 7);
    }

    #[test]
    fn repeated_ready_reruns_handshake_but_not_listeners() {
        let mut rt = mounted(page());
        let (count, listener) = counter();
        rt.on_ready(listener);
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.take_callbacks().run();
        assert_eq!(count.get(), 1);
        assert_eq!(
            rt.host().posted_kinds(),
            vec![
                kind::HOST_INIT,
                kind::HOST_VISIBILITY,
                kind::HOST_PAGEVIEW,
                kind::HOST_INIT,
                kind::HOST_VISIBILITY,
                kind::HOST_PAGEVIEW,
            ]
        );
    }

    #[test]
    fn grow_only_heights_settle_on_the_largest_report() {
        let mut rt = mounted(page());
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.open();
        let iframe = nodes(&rt).iframe;
        assert_eq!(rt.host().style(iframe, "height"), Some("320px"));

        let mut seen = Vec::new();
        for height in [400, 300, 500] {
            rt.handle(from_iframe(kind::WIDGET_HEIGHT, json!({ "height": height })));
            seen.push(rt.host().style(iframe, "height").unwrap().to_string());
        }
        advance(&mut rt, 119.0);
        seen.push(rt.host().style(iframe, "height").unwrap().to_string());
        advance(&mut rt, 1.0);
        seen.push(rt.host().style(iframe, "height").unwrap().to_string());

        assert!(!seen.iter().any(|h| h == "300px"));
        assert_eq!(seen.last().map(String::as_str), Some("500px"));
        assert_eq!(rt.armed_timers(), 0);
    }

    #[test]
    fn reported_heights_clamp_to_the_viewport() {
        let mut rt = mounted(ConfigPatch {
            auto_height_mode: Some(chatlive_shared::AutoHeightMode::Dynamic),
            ..page()
        });
        rt.open();
        let iframe = nodes(&rt).iframe;
        rt.handle(from_iframe(kind::WIDGET_HEIGHT, json!(5_000)));
        advance(&mut rt, 120.0);
        // min(0.85 * 800, 800 - 20 - 96)
        assert_eq!(rt.host().style(iframe, "height"), Some("680px"));

        rt.host_mut().viewport.inner_height = 600.0;
        rt.handle(HostEvent::Resize);
        assert_eq!(rt.host().style(iframe, "height"), Some("484px"));
    }

    #[test]
    fn mobile_open_covers_the_visual_viewport_and_close_restores() {
        let mut host = FakeHost::default();
        host.viewport = ViewportSignals {
            inner_width: 390.0,
            inner_height: 844.0,
            visual: Some(VisualViewportRect {
                offset_left: 0.0,
                offset_top: 0.0,
                width: 390.0,
                height: 844.0,
                scale: 1.0,
            }),
            device_pixel_ratio: 3.0,
            coarse_no_hover: true,
            any_fine_pointer: false,
            max_touch_points: 5,
        };
        let mut rt = mounted_with(Runtime::new(host, None), page());
        let n = nodes(&rt);
        assert_eq!(rt.host().style(n.root, "width"), Some("0px"));
        assert_eq!(rt.host().style(n.button, "display"), Some("flex"));

        rt.toggle();
        assert_eq!(rt.host().style(n.root, "width"), Some("390px"));
        assert_eq!(rt.host().style(n.root, "height"), Some("844px"));
        assert_eq!(rt.host().style(n.button, "display"), Some("none"));
        assert_eq!(rt.host().style(n.iframe, "height"), Some("100%"));

        rt.host_mut().viewport.visual = Some(VisualViewportRect {
            offset_left: 0.0,
            offset_top: 60.0,
            width: 390.0,
            height: 500.0,
            scale: 1.0,
        });
        rt.handle(HostEvent::ViewportChange);
        assert_eq!(rt.host().style(n.root, "top"), Some("60px"));
        assert_eq!(rt.host().style(n.root, "height"), Some("500px"));

        // Height reports are ignored while fullscreen.
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.handle(from_iframe(kind::WIDGET_HEIGHT, json!({ "height": 700 })));
        assert_eq!(rt.armed_timers(), 0);

        rt.toggle();
        assert_eq!(rt.host().style(n.root, "width"), Some("0px"));
        assert_eq!(rt.host().style(n.root, "top"), Some("auto"));
        assert_eq!(rt.host().style(n.button, "display"), Some("flex"));
        assert_eq!(rt.host().style(n.iframe, "visibility"), Some("hidden"));
    }

    #[test]
    fn launcher_click_toggles() {
        let mut rt = mounted(page());
        let button = nodes(&rt).button;
        rt.handle(HostEvent::Click(button));
        assert!(rt.is_open());
        rt.handle(HostEvent::Click(button));
        assert!(!rt.is_open());
    }

    #[test]
    fn failing_listener_does_not_stop_the_others() {
        let mut rt = mounted(page());
        let (first, a) = counter();
        let (second, b) = counter();
        rt.on_ready(a);
        rt.on_ready(Rc::new(|()| -> Result<(), CallbackError> { Err(CallbackError("boom".into())) }));
        rt.on_ready(b);
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        let callbacks = rt.take_callbacks();
        assert_eq!(callbacks.len(), 3);
        callbacks.run();
        assert_eq!((first.get(), second.get()), (1, 1));

        // Registered after readiness: runs right away.
        let (late, c) = counter();
        rt.on_ready(c);
        rt.take_callbacks().run();
        assert_eq!(late.get(), 1);
    }

    #[test]
    fn unread_updates_badge_and_notifies_on_change() {
        let mut rt = mounted(page());
        let seen = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&seen);
        rt.on_unread(Rc::new(move |count: u32| -> Result<(), CallbackError> {
            sink.set(count);
            Ok(())
        }));
        rt.handle(from_iframe(kind::WIDGET_UNREAD, json!({ "count": 120 })));
        let badge = nodes(&rt).badge;
        assert_eq!(rt.host().element(badge).text, "99+");
        assert_eq!(rt.host().style(badge, "display"), Some("flex"));
        assert_eq!(rt.take_callbacks().len(), 1);

        rt.handle(from_iframe(kind::WIDGET_UNREAD, json!(120)));
        assert!(rt.take_callbacks().is_empty());

        rt.handle(from_iframe(kind::WIDGET_UNREAD, json!(0)));
        rt.take_callbacks().run();
        assert_eq!(seen.get(), 0);
        assert_eq!(rt.host().style(badge, "display"), Some("none"));
    }

    #[test]
    fn listener_registries_survive_destroy() {
        let mut rt = mounted(page());
        let (count, listener) = counter();
        rt.on_ready(listener);
        rt.destroy();
        let mut rt = mounted_with(rt, page());
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.take_callbacks().run();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn theme_sync_from_iframe_is_applied_without_echo() {
        let mut rt = mounted(page());
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.host_mut().posted.clear();
        rt.handle(from_iframe(
            kind::WIDGET_THEME,
            json!({ "themeColor": "#f59e0b", "position": "bottom-left" }),
        ));
        let n = nodes(&rt);
        assert_eq!(rt.host().style(n.button, "background-color"), Some("#f59e0b"));
        assert_eq!(rt.host().style(n.root, "left"), Some("20px"));
        assert!(rt.host().posted.is_empty());
    }

    #[test]
    fn custom_color_mode_prefers_per_element_overrides() {
        let mut rt = mounted(ConfigPatch {
            color_settings_mode: Some(chatlive_shared::ColorSettingsMode::Custom),
            color_overrides_json: Some(r##"{"launcherBackground":"#222222"}"##.into()),
            ..page()
        });
        rt.set_theme("#ff0000");
        let button = nodes(&rt).button;
        assert_eq!(rt.host().style(button, "background-color"), Some("#222222"));
        rt.set_theme("not a color");
        assert_eq!(rt.host().style(button, "background-color"), Some("#222222"));
    }

    #[test]
    fn agent_photo_replaces_the_launcher_glyph() {
        let mut rt = mounted(page());
        let icon = nodes(&rt).icon;
        rt.handle(from_iframe(
            kind::WIDGET_AGENT,
            json!({ "avatarUrl": "https://cdn.example/agent.png" }),
        ));
        assert_eq!(
            rt.host().style(icon, "background-image"),
            Some("url(\"https://cdn.example/agent.png\")")
        );
        assert_eq!(rt.host().element(icon).text, "");

        rt.init(ConfigPatch {
            show_agent_photo: Some(false),
            ..page()
        })
        .unwrap();
        assert_eq!(rt.host().style(icon, "background-image"), Some("none"));
    }

    #[test]
    fn image_preview_opens_and_closes() {
        let mut rt = mounted(page());
        rt.handle(from_iframe(kind::WIDGET_IMAGE_PREVIEW, json!({ "src": "javascript:alert(1)" })));
        assert_eq!(rt.host().roots().len(), 1);

        rt.handle(from_iframe(
            kind::WIDGET_IMAGE_PREVIEW,
            json!({ "src": "https://cdn.example/photo.jpg" }),
        ));
        let overlay = rt.session.as_ref().unwrap().preview.as_ref().unwrap().overlay;
        let image = rt.host().element(overlay).children[0];
        assert_eq!(
            rt.host().element(image).attributes.get("src").map(String::as_str),
            Some("https://cdn.example/photo.jpg")
        );
        assert_eq!(rt.host().find(ElementKind::Img).len(), 1);

        rt.handle(HostEvent::Click(overlay));
        assert_eq!(rt.host().roots().len(), 1);
        assert!(rt.host().find(ElementKind::Img).is_empty());

        rt.handle(from_iframe(
            kind::WIDGET_IMAGE_PREVIEW,
            json!({ "src": "data:image/png;base64,AAAA" }),
        ));
        assert_eq!(rt.host().roots().len(), 2);
        rt.handle(from_iframe(kind::WIDGET_IMAGE_PREVIEW, json!({ "src": null })));
        assert_eq!(rt.host().roots().len(), 1);
    }

    #[test]
    fn debug_keep_alive_reattaches_a_wiped_root() {
        let mut rt = mounted(ConfigPatch {
            debug: Some(true),
            ..page()
        });
        assert!(rt.host().debug);
        let root = nodes(&rt).root;
        rt.host_mut().detach(root);
        assert!(!rt.host().is_attached(root));
        advance(&mut rt, 2_000.0);
        assert!(rt.host().is_attached(root));
        assert_eq!(rt.armed_timers(), 1);

        rt.init(page()).unwrap();
        assert!(!rt.host().debug);
        assert_eq!(rt.armed_timers(), 0);
    }

    #[test]
    fn verification_falls_through_transports() {
        let mut host = FakeHost::default();
        host.ping_outcomes.insert(PingTransport::Beacon, TransportOutcome::Unavailable);
        host.ping_outcomes.insert(PingTransport::Fetch, TransportOutcome::Pending);
        host.ping_outcomes.insert(PingTransport::Pixel, TransportOutcome::Pending);
        let mut rt = mounted_with(Runtime::new(host, None), page());

        let transports: Vec<_> = rt.host().pings.iter().map(|(_, t, _)| *t).collect();
        assert_eq!(transports, vec![PingTransport::Beacon, PingTransport::Fetch]);
        let (ticket, _, url) = rt.host().pings[1].clone();
        assert!(url.starts_with("https://chat.example.com/chatlive/ping?site_key=sk_live&origin="));

        rt.handle(HostEvent::PingSettled { ticket, delivered: false });
        let (pixel_ticket, transport, url) = rt.host().pings[2].clone();
        assert_eq!(transport, PingTransport::Pixel);
        assert!(url.contains("/chatlive/ping.gif?"));

        rt.handle(HostEvent::PingSettled { ticket: pixel_ticket, delivered: true });
        let verifier = rt.session.as_ref().unwrap().verifier.as_ref().unwrap();
        assert!(verifier.is_delivered());
        assert_eq!(verifier.attempts_made(), 1);
        assert_eq!(rt.armed_timers(), 0);
    }

    #[test]
    fn verification_retries_on_schedule_and_stops_on_destroy() {
        let mut host = FakeHost::default();
        for transport in [PingTransport::Beacon, PingTransport::Fetch, PingTransport::Pixel] {
            host.ping_outcomes.insert(transport, TransportOutcome::Unavailable);
        }
        let mut rt = mounted_with(Runtime::new(host, None), page());
        assert_eq!(rt.host().pings.len(), 3);
        advance(&mut rt, 2_999.0);
        assert_eq!(rt.host().pings.len(), 3);
        advance(&mut rt, 1.0);
        assert_eq!(rt.host().pings.len(), 6);

        rt.destroy();
        advance(&mut rt, 60_000.0);
        assert_eq!(rt.host().pings.len(), 6);
    }

    #[test]
    fn verification_gives_up_after_the_last_attempt() {
        let mut host = FakeHost::default();
        for transport in [PingTransport::Beacon, PingTransport::Fetch, PingTransport::Pixel] {
            host.ping_outcomes.insert(transport, TransportOutcome::Unavailable);
        }
        let mut rt = mounted_with(Runtime::new(host, None), page());
        advance(&mut rt, 60_000.0);
        assert_eq!(rt.host().pings.len(), 9);
        assert_eq!(rt.armed_timers(), 0);
    }

    #[test]
    fn navigation_reports_distinct_urls_and_restores_on_destroy() {
        let mut rt = mounted(page());
        assert_eq!(
            rt.host().watches.values().copied().collect::<Vec<_>>(),
            vec![NavigationStrategy::Patch]
        );
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.host_mut().posted.clear();

        rt.handle(HostEvent::Navigation);
        assert!(rt.host().posted.is_empty());
        rt.host_mut().page.url = "https://shop.example/cart".into();
        rt.handle(HostEvent::Navigation);
        rt.handle(HostEvent::Navigation);
        assert_eq!(rt.host().posted_kinds(), vec![kind::HOST_PAGEVIEW]);
        assert_eq!(
            rt.host().posted[0].envelope.payload["url"],
            json!("https://shop.example/cart")
        );

        rt.destroy();
        assert!(rt.host().watches.is_empty());
        assert!(rt.host().listeners.is_empty());
    }

    #[test]
    fn navigation_mode_picks_the_strategy() {
        let mut host = FakeHost::default();
        host.navigate_event = true;
        let rt = mounted_with(Runtime::new(host, None), page());
        assert_eq!(
            rt.session.as_ref().unwrap().navigation.strategy(),
            Some(NavigationStrategy::NavigateEvent)
        );

        let mut rt = mounted(ConfigPatch {
            navigation_mode: Some(NavigationMode::Poll),
            ..page()
        });
        assert!(rt.host().watches.is_empty());
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        rt.host_mut().posted.clear();
        rt.host_mut().page.url = "https://shop.example/checkout".into();
        advance(&mut rt, 500.0);
        assert_eq!(rt.host().posted_kinds(), vec![kind::HOST_PAGEVIEW]);
        advance(&mut rt, 1_000.0);
        assert_eq!(rt.host().posted.len(), 1);
    }

    #[test]
    fn refused_history_watch_falls_back_to_polling() {
        let mut host = FakeHost::default();
        host.refuse_watch = true;
        let rt = mounted_with(Runtime::new(host, None), page());
        assert_eq!(
            rt.session.as_ref().unwrap().navigation.strategy(),
            Some(NavigationStrategy::Poll)
        );
    }

    #[test]
    fn events_before_init_are_ignored() {
        let mut rt = runtime();
        rt.handle(HostEvent::Resize);
        rt.handle(HostEvent::Navigation);
        rt.handle(HostEvent::Click(ElementId(1)));
        rt.handle(HostEvent::Timer(TimerId(1)));
        rt.handle(from_iframe(kind::WIDGET_READY, Value::Null));
        assert!(rt.apply(Command::Open).is_ok());
        assert!(rt.host().posted.is_empty());
        assert!(rt.host().elements.is_empty());
    }

    #[test]
    fn commands_dispatch_to_the_api() {
        let mut rt = runtime();
        rt.apply(Command::Init(page())).unwrap();
        settle_bootstrap(&mut rt, None);
        rt.apply(Command::Toggle).unwrap();
        assert!(rt.is_open());
        rt.apply(Command::Close).unwrap();
        assert!(!rt.is_open());
        rt.apply(Command::SetTheme("#123456".into())).unwrap();
        assert_eq!(rt.host().style(nodes(&rt).button, "background-color"), Some("#123456"));
        rt.apply(Command::Destroy).unwrap();
        assert!(!rt.is_initialized());
    }

    #[test]
    fn loader_origin_is_used_for_the_service() {
        let mut rt = Runtime::new(FakeHost::default(), Some("https://cdn.chatlive.example".into()));
        rt.init(page()).unwrap();
        assert!(rt.host().bootstrap_calls[0]
            .url
            .starts_with("https://cdn.chatlive.example/api/v1/public/widget/bootstrap"));
    }
}
