//! [`Host`] over `web-sys`.
//!
//! Every browser call returns `Result`/`Option` and is reduced to a
//! [`HostError`] or a neutral default; a hostile page can disable features
//! but never make the runtime panic. Callbacks registered with the browser
//! only ever call [`super::dispatch`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chatlive_shared::{BootstrapRequest, Envelope};
use gloo_net::http::Request;
use js_sys::{Function, Object, Reflect};
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    Document, Event, EventTarget, HtmlElement, HtmlIFrameElement, HtmlImageElement, MessageEvent,
    RequestMode, VisibilityState, Window,
};

use super::{dispatch, logging};
use crate::error::HostError;
use crate::host::{
    DomEvent, ElementId, ElementKind, Host, HostEvent, InboundMessage, ListenTarget, ListenerId,
    PageContext, PingTransport, Style, TimerId, TransportOutcome, ViewportSignals, Visibility,
    VisualViewportRect, WatchId,
};
use crate::navigation::NavigationStrategy;

type EventClosure = Closure<dyn FnMut(Event)>;

struct Binding {
    target: EventTarget,
    event: &'static str,
    closure: EventClosure,
}

enum Watch {
    Patch {
        history: Object,
        originals: Vec<(&'static str, Function)>,
        wrappers: Vec<Closure<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>>,
    },
    NavigateEvent(Binding),
}

struct Pixel {
    _image: HtmlImageElement,
    _onload: Closure<dyn FnMut()>,
    _onerror: Closure<dyn FnMut()>,
}

pub struct WebHost {
    window: Window,
    document: Document,
    elements: HashMap<ElementId, HtmlElement>,
    children: HashMap<ElementId, Vec<ElementId>>,
    bindings: HashMap<ListenerId, Binding>,
    watches: HashMap<WatchId, Watch>,
    timers: HashMap<TimerId, (i32, Closure<dyn FnMut()>)>,
    fired: Rc<RefCell<Vec<TimerId>>>,
    pixels: HashMap<u64, Pixel>,
    settled_pixels: Rc<RefCell<Vec<u64>>>,
    next_id: u32,
}

fn dom_error(context: &str, err: JsValue) -> HostError {
    HostError::Dom(format!("{context}: {}", err.as_string().unwrap_or_else(|| format!("{err:?}"))))
}

impl WebHost {
    pub fn new() -> Result<WebHost, HostError> {
        let window = web_sys::window().ok_or(HostError::Unavailable("window"))?;
        let document = window.document().ok_or(HostError::Unavailable("document"))?;
        Ok(WebHost {
            window,
            document,
            elements: HashMap::new(),
            children: HashMap::new(),
            bindings: HashMap::new(),
            watches: HashMap::new(),
            timers: HashMap::new(),
            fired: Rc::new(RefCell::new(Vec::new())),
            pixels: HashMap::new(),
            settled_pixels: Rc::new(RefCell::new(Vec::new())),
            next_id: 1,
        })
    }

    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Drops closures whose timer or pixel has already completed.
    fn prune(&mut self) {
        for id in self.fired.borrow_mut().drain(..) {
            self.timers.remove(&id);
        }
        for ticket in self.settled_pixels.borrow_mut().drain(..) {
            self.pixels.remove(&ticket);
        }
    }

    fn media_matches(&self, query: &str) -> bool {
        matches!(self.window.match_media(query), Ok(Some(list)) if list.matches())
    }

    fn event_target(&self, target: ListenTarget) -> Result<EventTarget, HostError> {
        match target {
            ListenTarget::Window => Ok(self.window.clone().into()),
            ListenTarget::Document => Ok(self.document.clone().into()),
            ListenTarget::VisualViewport => self
                .window
                .visual_viewport()
                .map(Into::into)
                .ok_or(HostError::Unavailable("visualViewport")),
            ListenTarget::Element(id) => self
                .elements
                .get(&id)
                .map(|el| el.clone().into())
                .ok_or_else(|| HostError::Dom(format!("unknown element {id:?}"))),
        }
    }

    fn message_closure(&self, iframe: ElementId) -> Result<EventClosure, HostError> {
        let iframe = self
            .elements
            .get(&iframe)
            .and_then(|el| el.clone().dyn_into::<HtmlIFrameElement>().ok())
            .ok_or_else(|| HostError::Dom("message listener needs the iframe".into()))?;
        Ok(Closure::new(move |event: Event| {
            let Some(event) = event.dyn_ref::<MessageEvent>() else {
                return;
            };
            let from_iframe = match (event.source(), iframe.content_window()) {
                (Some(source), Some(window)) => Object::is(&source, &window),
                _ => false,
            };
            let data = js_to_json(&event.data()).unwrap_or(Value::Null);
            dispatch(HostEvent::Message(InboundMessage {
                origin: event.origin(),
                from_iframe,
                data,
            }));
        }))
    }

    fn bind(&self, target: EventTarget, event: &'static str, closure: EventClosure) -> Result<Binding, HostError> {
        target
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
            .map_err(|err| dom_error(event, err))?;
        Ok(Binding {
            target,
            event,
            closure,
        })
    }

    fn patch_history(&self) -> Result<Watch, HostError> {
        let history: Object = self
            .window
            .history()
            .map_err(|err| dom_error("history", err))?
            .into();
        let mut originals = Vec::new();
        let mut wrappers = Vec::new();
        for name in ["pushState", "replaceState"] {
            let original = Reflect::get(&history, &JsValue::from_str(name))
                .ok()
                .and_then(|f| f.dyn_into::<Function>().ok())
                .ok_or(HostError::Unavailable("history.pushState"))?;
            let target = history.clone();
            let call = original.clone();
            let wrapper = Closure::<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>::new(
                move |state: JsValue, title: JsValue, url: JsValue| {
                    let result = call.call3(&target, &state, &title, &url);
                    dispatch(HostEvent::Navigation);
                    result.unwrap_or(JsValue::UNDEFINED)
                },
            );
            Reflect::set(&history, &JsValue::from_str(name), wrapper.as_ref())
                .map_err(|err| dom_error(name, err))?;
            originals.push((name, original));
            wrappers.push(wrapper);
        }
        Ok(Watch::Patch {
            history,
            originals,
            wrappers,
        })
    }

    fn navigation_object(&self) -> Option<EventTarget> {
        Reflect::get(&self.window, &JsValue::from_str("navigation"))
            .ok()
            .filter(|value| value.is_object())
            .and_then(|value| value.dyn_into::<EventTarget>().ok())
    }

    fn start_pixel(&mut self, ticket: u64, url: &str) -> TransportOutcome {
        let Ok(image) = HtmlImageElement::new() else {
            return TransportOutcome::Unavailable;
        };
        let settled = |delivered: bool| {
            let done = Rc::clone(&self.settled_pixels);
            Closure::<dyn FnMut()>::new(move || {
                done.borrow_mut().push(ticket);
                dispatch(HostEvent::PingSettled { ticket, delivered });
            })
        };
        let onload = settled(true);
        let onerror = settled(false);
        image.set_onload(Some(onload.as_ref().unchecked_ref()));
        image.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        image.set_src(url);
        self.pixels.insert(
            ticket,
            Pixel {
                _image: image,
                _onload: onload,
                _onerror: onerror,
            },
        );
        TransportOutcome::Pending
    }

    fn release(&mut self, id: ElementId) {
        self.elements.remove(&id);
        if let Some(children) = self.children.remove(&id) {
            for child in children {
                self.release(child);
            }
        }
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.closure.as_ref().unchecked_ref());
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Watch::Patch {
            history,
            originals,
            wrappers,
        } = self
        {
            for ((name, original), wrapper) in originals.iter().zip(wrappers.iter()) {
                let key = JsValue::from_str(name);
                // Someone else may have wrapped us since; leave their wrapper alone.
                let still_ours = Reflect::get(history, &key)
                    .map(|current| Object::is(&current, wrapper.as_ref()))
                    .unwrap_or(false);
                if still_ours {
                    let _ = Reflect::set(history, &key, original);
                }
            }
        }
    }
}

/// DOM event name and the runtime event it raises, for events without payload.
fn plain_event(target: ListenTarget, event: DomEvent) -> Option<(&'static str, HostEvent)> {
    Some(match (target, event) {
        (ListenTarget::VisualViewport, DomEvent::Resize) => ("resize", HostEvent::ViewportChange),
        (_, DomEvent::Resize) => ("resize", HostEvent::Resize),
        (_, DomEvent::Scroll) => ("scroll", HostEvent::ViewportChange),
        (_, DomEvent::VisibilityChange) => ("visibilitychange", HostEvent::VisibilityChange),
        (_, DomEvent::Focus) => ("focus", HostEvent::Focus),
        (_, DomEvent::Blur) => ("blur", HostEvent::Blur),
        (_, DomEvent::PopState) => ("popstate", HostEvent::Navigation),
        (_, DomEvent::HashChange) => ("hashchange", HostEvent::Navigation),
        (_, DomEvent::Message { .. } | DomEvent::Click) => return None,
    })
}

pub fn js_to_json(value: &JsValue) -> Option<Value> {
    if value.is_undefined() || value.is_null() {
        return Some(Value::Null);
    }
    let text = js_sys::JSON::stringify(value).ok()?.as_string()?;
    serde_json::from_str(&text).ok()
}

fn json_to_js(value: &impl serde::Serialize) -> Result<JsValue, HostError> {
    let text = serde_json::to_string(value).map_err(|err| HostError::Dom(err.to_string()))?;
    js_sys::JSON::parse(&text).map_err(|err| dom_error("JSON.parse", err))
}

impl Host for WebHost {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    fn page(&self) -> PageContext {
        let location = self.window.location();
        PageContext {
            url: location.href().unwrap_or_default(),
            origin: location.origin().unwrap_or_default(),
            title: self.document.title(),
            referrer: self.document.referrer(),
        }
    }

    fn viewport(&self) -> ViewportSignals {
        let number = |value: Result<JsValue, JsValue>, default: f64| {
            value.ok().and_then(|v| v.as_f64()).unwrap_or(default)
        };
        let defaults = ViewportSignals::default();
        let visual = self.window.visual_viewport().map(|v| VisualViewportRect {
            offset_left: v.offset_left(),
            offset_top: v.offset_top(),
            width: v.width(),
            height: v.height(),
            scale: v.scale(),
        });
        ViewportSignals {
            inner_width: number(self.window.inner_width(), defaults.inner_width),
            inner_height: number(self.window.inner_height(), defaults.inner_height),
            visual,
            device_pixel_ratio: self.window.device_pixel_ratio(),
            coarse_no_hover: self.media_matches("(hover: none) and (pointer: coarse)"),
            any_fine_pointer: self.media_matches("(any-pointer: fine)"),
            max_touch_points: u32::try_from(self.window.navigator().max_touch_points()).unwrap_or(0),
        }
    }

    fn visibility(&self) -> Visibility {
        Visibility {
            visible: self.document.visibility_state() == VisibilityState::Visible,
            focused: self.document.has_focus().unwrap_or(false),
        }
    }

    fn supports_navigate_event(&self) -> bool {
        self.navigation_object().is_some()
    }

    fn set_debug(&mut self, enabled: bool) {
        logging::set_debug(enabled);
    }

    fn create_element(&mut self, kind: ElementKind) -> Result<ElementId, HostError> {
        let tag = match kind {
            ElementKind::Div => "div",
            ElementKind::Span => "span",
            ElementKind::Button => "button",
            ElementKind::Iframe => "iframe",
            ElementKind::Img => "img",
        };
        let element = self
            .document
            .create_element(tag)
            .map_err(|err| dom_error(tag, err))?
            .dyn_into::<HtmlElement>()
            .map_err(|_| HostError::Dom(format!("<{tag}> is not an HTMLElement")))?;
        let id = ElementId(self.id());
        self.elements.insert(id, element);
        Ok(id)
    }

    fn set_attribute(&mut self, element: ElementId, name: &str, value: &str) {
        if let Some(el) = self.elements.get(&element) {
            if let Err(err) = el.set_attribute(name, value) {
                tracing::debug!(name, ?err, "setAttribute failed");
            }
        }
    }

    fn remove_attribute(&mut self, element: ElementId, name: &str) {
        if let Some(el) = self.elements.get(&element) {
            let _ = el.remove_attribute(name);
        }
    }

    fn set_text(&mut self, element: ElementId, text: &str) {
        if let Some(el) = self.elements.get(&element) {
            el.set_text_content(Some(text));
        }
    }

    fn set_style(&mut self, element: ElementId, style: &Style) {
        let Some(el) = self.elements.get(&element) else {
            return;
        };
        let declarations = el.style();
        for (property, value) in style.iter() {
            // `important` keeps host-page stylesheets from restyling us.
            if let Err(err) = declarations.set_property_with_priority(property, value, "important") {
                tracing::debug!(property, ?err, "style rejected");
            }
        }
    }

    fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), HostError> {
        let (Some(p), Some(c)) = (self.elements.get(&parent), self.elements.get(&child)) else {
            return Err(HostError::Dom("unknown element".into()));
        };
        p.append_child(c).map_err(|err| dom_error("appendChild", err))?;
        self.children.entry(parent).or_default().push(child);
        Ok(())
    }

    fn attach(&mut self, element: ElementId) -> Result<(), HostError> {
        let el = self
            .elements
            .get(&element)
            .ok_or_else(|| HostError::Dom("unknown element".into()))?;
        let container: web_sys::Node = match self.document.body() {
            Some(body) => body.into(),
            None => self
                .document
                .document_element()
                .ok_or(HostError::Unavailable("documentElement"))?
                .into(),
        };
        container
            .append_child(el)
            .map(|_| ())
            .map_err(|err| dom_error("attach", err))
    }

    fn is_attached(&self, element: ElementId) -> bool {
        self.elements
            .get(&element)
            .is_some_and(|el| {
                let node: &web_sys::Node = el;
                self.document.contains(Some(node))
            })
    }

    fn remove(&mut self, element: ElementId) {
        if let Some(el) = self.elements.get(&element) {
            el.remove();
        }
        for children in self.children.values_mut() {
            children.retain(|c| *c != element);
        }
        self.release(element);
    }

    fn listen(&mut self, target: ListenTarget, event: DomEvent) -> Result<ListenerId, HostError> {
        let event_target = self.event_target(target)?;
        let (name, closure): (&'static str, EventClosure) = match event {
            DomEvent::Message { iframe } => ("message", self.message_closure(iframe)?),
            DomEvent::Click => {
                let ListenTarget::Element(id) = target else {
                    return Err(HostError::Dom("click needs an element".into()));
                };
                ("click", Closure::new(move |_: Event| dispatch(HostEvent::Click(id))))
            }
            other => {
                let (name, host_event) = plain_event(target, other)
                    .ok_or_else(|| HostError::Dom(format!("{other:?} carries a payload")))?;
                (name, Closure::new(move |_: Event| dispatch(host_event.clone())))
            }
        };
        let binding = self.bind(event_target, name, closure)?;
        let id = ListenerId(self.id());
        self.bindings.insert(id, binding);
        Ok(id)
    }

    fn unlisten(&mut self, listener: ListenerId) {
        self.bindings.remove(&listener);
    }

    fn watch_history(&mut self, strategy: NavigationStrategy) -> Result<WatchId, HostError> {
        let watch = match strategy {
            NavigationStrategy::Patch => self.patch_history()?,
            NavigationStrategy::NavigateEvent => {
                let target = self
                    .navigation_object()
                    .ok_or(HostError::Unavailable("navigation"))?;
                let closure: EventClosure = Closure::new(|_: Event| dispatch(HostEvent::Navigation));
                Watch::NavigateEvent(self.bind(target, "navigatesuccess", closure)?)
            }
            NavigationStrategy::Poll => return Err(HostError::Unavailable("poll is driven by timers")),
        };
        let id = WatchId(self.id());
        self.watches.insert(id, watch);
        Ok(id)
    }

    fn unwatch_history(&mut self, watch: WatchId) {
        self.watches.remove(&watch);
    }

    fn set_timeout(&mut self, delay_ms: u32) -> Result<TimerId, HostError> {
        self.prune();
        let id = TimerId(self.id());
        let fired = Rc::clone(&self.fired);
        let closure = Closure::<dyn FnMut()>::new(move || {
            fired.borrow_mut().push(id);
            dispatch(HostEvent::Timer(id));
        });
        let timeout = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        let handle = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(closure.as_ref().unchecked_ref(), timeout)
            .map_err(|err| dom_error("setTimeout", err))?;
        self.timers.insert(id, (handle, closure));
        Ok(id)
    }

    fn clear_timeout(&mut self, timer: TimerId) {
        if let Some((handle, _closure)) = self.timers.remove(&timer) {
            self.window.clear_timeout_with_handle(handle);
        }
        self.prune();
    }

    fn post_message(
        &mut self,
        iframe: ElementId,
        envelope: &Envelope,
        target_origin: &str,
    ) -> Result<(), HostError> {
        let target = self
            .elements
            .get(&iframe)
            .and_then(|el| el.dyn_ref::<HtmlIFrameElement>())
            .and_then(HtmlIFrameElement::content_window)
            .ok_or(HostError::Unavailable("iframe contentWindow"))?;
        let message = json_to_js(envelope)?;
        target
            .post_message(&message, target_origin)
            .map_err(|err| dom_error("postMessage", err))
    }

    fn fetch_bootstrap(&mut self, ticket: u64, url: &str, request: &BootstrapRequest) {
        let url = url.to_string();
        let request = request.clone();
        spawn_local(async move {
            let body = match Request::post(&url).json(&request) {
                Ok(builder) => match builder.send().await {
                    Ok(response) if response.ok() => response.json::<Value>().await.ok(),
                    Ok(response) => {
                        tracing::debug!(status = response.status(), "bootstrap rejected");
                        None
                    }
                    Err(err) => {
                        tracing::debug!(%err, "bootstrap request failed");
                        None
                    }
                },
                Err(err) => {
                    tracing::debug!(%err, "bootstrap request not built");
                    None
                }
            };
            dispatch(HostEvent::BootstrapSettled { ticket, body });
        });
    }

    fn send_ping(&mut self, ticket: u64, transport: PingTransport, url: &str) -> TransportOutcome {
        self.prune();
        match transport {
            PingTransport::Beacon => match self.window.navigator().send_beacon(url) {
                Ok(true) => TransportOutcome::Delivered,
                _ => TransportOutcome::Unavailable,
            },
            PingTransport::Fetch => {
                let url = url.to_string();
                spawn_local(async move {
                    let delivered = Request::get(&url).mode(RequestMode::NoCors).send().await.is_ok();
                    dispatch(HostEvent::PingSettled { ticket, delivered });
                });
                TransportOutcome::Pending
            }
            PingTransport::Pixel => self.start_pixel(ticket, url),
        }
    }
}
