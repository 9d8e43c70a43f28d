//! SPA navigation observer.
//!
//! One subscribe/unsubscribe contract over three mechanisms: wrapping the
//! History API (`patch`), the Navigation API's `navigatesuccess` event
//! (`navigate-event`), or polling `location.href` (`poll`). `popstate` and
//! `hashchange` are observed in every mode.

use chatlive_shared::NavigationMode;

use crate::host::{DomEvent, Host, ListenTarget, ListenerId, TimerId, TimerKind, Timers, WatchId};

pub const POLL_INTERVAL_MS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationStrategy {
    Patch,
    NavigateEvent,
    Poll,
}

impl NavigationStrategy {
    pub fn resolve(mode: NavigationMode, supports_navigate_event: bool) -> NavigationStrategy {
        match mode {
            NavigationMode::Patch => NavigationStrategy::Patch,
            NavigationMode::Poll => NavigationStrategy::Poll,
            NavigationMode::NavigateEvent if supports_navigate_event => NavigationStrategy::NavigateEvent,
            NavigationMode::NavigateEvent => NavigationStrategy::Patch,
            NavigationMode::Auto if supports_navigate_event => NavigationStrategy::NavigateEvent,
            NavigationMode::Auto => NavigationStrategy::Patch,
        }
    }
}

#[derive(Debug, Default)]
pub struct NavigationObserver {
    strategy: Option<NavigationStrategy>,
    listeners: Vec<ListenerId>,
    watch: Option<WatchId>,
    poll: Option<TimerId>,
    last_url: Option<String>,
}

impl NavigationObserver {
    pub fn strategy(&self) -> Option<NavigationStrategy> {
        self.strategy
    }

    /// Starts observing. `current_url` is the page view already reported.
    pub fn subscribe<H: Host>(
        &mut self,
        host: &mut H,
        timers: &mut Timers,
        mode: NavigationMode,
        current_url: String,
    ) {
        self.unsubscribe(host, timers);
        let strategy = NavigationStrategy::resolve(mode, host.supports_navigate_event());
        self.last_url = Some(current_url);

        for event in [DomEvent::PopState, DomEvent::HashChange] {
            match host.listen(ListenTarget::Window, event) {
                Ok(id) => self.listeners.push(id),
                Err(err) => tracing::debug!(?event, %err, "navigation listener unavailable"),
            }
        }

        let strategy = match strategy {
            NavigationStrategy::Poll => {
                self.poll = timers.arm(host, TimerKind::NavigationPoll, POLL_INTERVAL_MS);
                NavigationStrategy::Poll
            }
            watched => match host.watch_history(watched) {
                Ok(id) => {
                    self.watch = Some(id);
                    watched
                }
                Err(err) => {
                    tracing::debug!(?watched, %err, "falling back to polling");
                    self.poll = timers.arm(host, TimerKind::NavigationPoll, POLL_INTERVAL_MS);
                    NavigationStrategy::Poll
                }
            },
        };
        self.strategy = Some(strategy);
    }

    pub fn unsubscribe<H: Host>(&mut self, host: &mut H, timers: &mut Timers) {
        for id in self.listeners.drain(..) {
            host.unlisten(id);
        }
        if let Some(watch) = self.watch.take() {
            host.unwatch_history(watch);
        }
        timers.disarm(host, self.poll.take());
        self.strategy = None;
    }

    pub fn observe(&mut self, url: String) -> Option<String> {
        if self.last_url.as_deref() == Some(url.as_str()) {
            return None;
        }
        self.last_url = Some(url.clone());
        Some(url)
    }

    /// Poll tick: re-arms and reports a changed URL.
    pub fn poll<H: Host>(&mut self, host: &mut H, timers: &mut Timers) -> Option<String> {
        if self.strategy != Some(NavigationStrategy::Poll) {
            return None;
        }
        self.poll = timers.arm(host, TimerKind::NavigationPoll, POLL_INTERVAL_MS);
        let url = host.page().url;
        self.observe(url)
    }
}
