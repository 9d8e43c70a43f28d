//! Deterministic [`Host`] for native tests: a virtual clock, an element tree
//! and a record of everything the runtime asked the browser to do.

use std::collections::{BTreeMap, HashMap};

use chatlive_shared::{BootstrapRequest, Envelope};

use crate::error::HostError;
use crate::host::{
    DomEvent, ElementId, ElementKind, Host, ListenTarget, ListenerId, PageContext, PingTransport,
    Style, TimerId, TransportOutcome, ViewportSignals, Visibility, WatchId,
};
use crate::navigation::NavigationStrategy;

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub kind: ElementKind,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub style: Style,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    /// Directly attached to the document.
    pub attached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Posted {
    pub iframe: ElementId,
    pub envelope: Envelope,
    pub target_origin: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapCallRecord {
    pub ticket: u64,
    pub url: String,
    pub request: BootstrapRequest,
}

#[derive(Debug)]
pub struct FakeHost {
    pub now: f64,
    pub page: PageContext,
    pub viewport: ViewportSignals,
    pub visibility: Visibility,
    pub navigate_event: bool,
    pub debug: bool,
    pub elements: BTreeMap<ElementId, FakeElement>,
    pub listeners: BTreeMap<ListenerId, (ListenTarget, DomEvent)>,
    pub watches: BTreeMap<WatchId, NavigationStrategy>,
    /// Armed timers and their due time.
    pub timers: BTreeMap<TimerId, f64>,
    pub posted: Vec<Posted>,
    pub bootstrap_calls: Vec<BootstrapCallRecord>,
    pub pings: Vec<(u64, PingTransport, String)>,
    pub ping_outcomes: HashMap<PingTransport, TransportOutcome>,
    pub refuse_watch: bool,
    next_id: u32,
}

impl Default for FakeHost {
    fn default() -> Self {
        FakeHost {
            now: 0.0,
            page: PageContext {
                url: "https://shop.example/".into(),
                origin: "https://shop.example".into(),
                title: "Shop".into(),
                referrer: String::new(),
            },
            viewport: ViewportSignals::default(),
            visibility: Visibility {
                visible: true,
                focused: true,
            },
            navigate_event: false,
            debug: false,
            elements: BTreeMap::new(),
            listeners: BTreeMap::new(),
            watches: BTreeMap::new(),
            timers: BTreeMap::new(),
            posted: Vec::new(),
            bootstrap_calls: Vec::new(),
            pings: Vec::new(),
            ping_outcomes: HashMap::new(),
            refuse_watch: false,
            next_id: 1,
        }
    }
}

impl FakeHost {
    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn element(&self, id: ElementId) -> &FakeElement {
        &self.elements[&id]
    }

    pub fn style(&self, id: ElementId, property: &str) -> Option<&str> {
        self.elements.get(&id).and_then(|el| el.style.get(property))
    }

    /// Elements directly under the document, i.e. visible on the page.
    pub fn roots(&self) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|(_, el)| el.attached)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn find(&self, kind: ElementKind) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|(_, el)| el.kind == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Simulates a framework wiping `document.body`.
    pub fn detach(&mut self, id: ElementId) {
        if let Some(el) = self.elements.get_mut(&id) {
            el.attached = false;
        }
    }

    pub fn posted_kinds(&self) -> Vec<String> {
        self.posted.iter().map(|p| p.envelope.kind.clone()).collect()
    }

    /// Claims the earliest timer due at or before `until`, moving the clock to it.
    pub fn next_due(&mut self, until: f64) -> Option<TimerId> {
        let (id, due) = self
            .timers
            .iter()
            .filter(|(_, due)| **due <= until)
            .min_by(|a, b| a.1.total_cmp(b.1).then(a.0.cmp(b.0)))
            .map(|(id, due)| (*id, *due))?;
        self.timers.remove(&id);
        self.now = self.now.max(due);
        Some(id)
    }

    fn release(&mut self, id: ElementId) {
        if let Some(el) = self.elements.remove(&id) {
            for child in el.children {
                self.release(child);
            }
        }
    }
}

impl Host for FakeHost {
    fn now_ms(&self) -> f64 {
        self.now
    }

    fn page(&self) -> PageContext {
        self.page.clone()
    }

    fn viewport(&self) -> ViewportSignals {
        self.viewport
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn supports_navigate_event(&self) -> bool {
        self.navigate_event
    }

    fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    fn create_element(&mut self, kind: ElementKind) -> Result<ElementId, HostError> {
        let id = ElementId(self.id());
        self.elements.insert(
            id,
            FakeElement {
                kind,
                attributes: BTreeMap::new(),
                text: String::new(),
                style: Style::new(),
                parent: None,
                children: Vec::new(),
                attached: false,
            },
        );
        Ok(id)
    }

    fn set_attribute(&mut self, element: ElementId, name: &str, value: &str) {
        if let Some(el) = self.elements.get_mut(&element) {
            el.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&mut self, element: ElementId, name: &str) {
        if let Some(el) = self.elements.get_mut(&element) {
            el.attributes.remove(name);
        }
    }

    fn set_text(&mut self, element: ElementId, text: &str) {
        if let Some(el) = self.elements.get_mut(&element) {
            el.text = text.to_string();
        }
    }

    fn set_style(&mut self, element: ElementId, style: &Style) {
        if let Some(el) = self.elements.get_mut(&element) {
            let mut merged = std::mem::take(&mut el.style);
            for (property, value) in style.iter() {
                merged = merged.set(property, value);
            }
            el.style = merged;
        }
    }

    fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), HostError> {
        if !self.elements.contains_key(&parent) || !self.elements.contains_key(&child) {
            return Err(HostError::Dom("unknown element".into()));
        }
        if let Some(el) = self.elements.get_mut(&child) {
            el.parent = Some(parent);
        }
        if let Some(el) = self.elements.get_mut(&parent) {
            el.children.push(child);
        }
        Ok(())
    }

    fn attach(&mut self, element: ElementId) -> Result<(), HostError> {
        let el = self
            .elements
            .get_mut(&element)
            .ok_or_else(|| HostError::Dom("unknown element".into()))?;
        el.attached = true;
        Ok(())
    }

    fn is_attached(&self, element: ElementId) -> bool {
        let mut current = Some(element);
        while let Some(id) = current {
            match self.elements.get(&id) {
                Some(el) if el.attached => return true,
                Some(el) => current = el.parent,
                None => return false,
            }
        }
        false
    }

    fn remove(&mut self, element: ElementId) {
        let parent = self.elements.get(&element).and_then(|el| el.parent);
        if let Some(parent) = parent.and_then(|p| self.elements.get_mut(&p)) {
            parent.children.retain(|c| *c != element);
        }
        self.release(element);
    }

    fn listen(&mut self, target: ListenTarget, event: DomEvent) -> Result<ListenerId, HostError> {
        let id = ListenerId(self.id());
        self.listeners.insert(id, (target, event));
        Ok(id)
    }

    fn unlisten(&mut self, listener: ListenerId) {
        self.listeners.remove(&listener);
    }

    fn watch_history(&mut self, strategy: NavigationStrategy) -> Result<WatchId, HostError> {
        if self.refuse_watch {
            return Err(HostError::Unavailable("history"));
        }
        let id = WatchId(self.id());
        self.watches.insert(id, strategy);
        Ok(id)
    }

    fn unwatch_history(&mut self, watch: WatchId) {
        self.watches.remove(&watch);
    }

    fn set_timeout(&mut self, delay_ms: u32) -> Result<TimerId, HostError> {
        let id = TimerId(self.id());
        self.timers.insert(id, self.now + f64::from(delay_ms));
        Ok(id)
    }

    fn clear_timeout(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }

    fn post_message(
        &mut self,
        iframe: ElementId,
        envelope: &Envelope,
        target_origin: &str,
    ) -> Result<(), HostError> {
        self.posted.push(Posted {
            iframe,
            envelope: envelope.clone(),
            target_origin: target_origin.to_string(),
        });
        Ok(())
    }

    fn fetch_bootstrap(&mut self, ticket: u64, url: &str, request: &BootstrapRequest) {
        self.bootstrap_calls.push(BootstrapCallRecord {
            ticket,
            url: url.to_string(),
            request: request.clone(),
        });
    }

    fn send_ping(&mut self, ticket: u64, transport: PingTransport, url: &str) -> TransportOutcome {
        self.pings.push((ticket, transport, url.to_string()));
        self.ping_outcomes
            .get(&transport)
            .copied()
            .unwrap_or(TransportOutcome::Delivered)
    }
}
