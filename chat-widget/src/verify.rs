//! Install verification: a best-effort "the snippet is live here" ping.
//!
//! Purely operational. Nothing in the widget waits on it and every failure is
//! absorbed. Each attempt walks the transports in order (beacon, no-cors
//! fetch, image pixel) so a page that blocks one still lets another through.

use std::cell::Cell;
use std::rc::Rc;

use chatlive_shared::bootstrap::{PING_PATH, PIXEL_PATH};
use url::Url;

use crate::host::{Host, PingTransport, TimerId, TimerKind, Timers, TransportOutcome};

/// Attempt schedule. `delays_ms[n]` is the wait before attempt `n`, measured
/// from the previous attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delays_ms: Vec<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delays_ms: vec![0, 3_000, 15_000],
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> usize {
        self.delays_ms.len()
    }
}

/// Shared cancellation flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

const TRANSPORTS: [PingTransport; 3] = [PingTransport::Beacon, PingTransport::Fetch, PingTransport::Pixel];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingTarget {
    pub service_origin: String,
    pub site_key: String,
    pub page_origin: String,
    pub page_url: String,
}

#[derive(Debug)]
pub struct InstallVerifier {
    policy: RetryPolicy,
    token: CancelToken,
    target: PingTarget,
    attempt: usize,
    timer: Option<TimerId>,
    inflight: Option<(u64, usize)>,
    next_ticket: u64,
    delivered: bool,
}

impl InstallVerifier {
    pub fn new(policy: RetryPolicy, target: PingTarget, token: CancelToken) -> Self {
        InstallVerifier {
            policy,
            token,
            target,
            attempt: 0,
            timer: None,
            inflight: None,
            next_ticket: 1,
            delivered: false,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    pub fn attempts_made(&self) -> usize {
        self.attempt
    }

    pub fn start<H: Host>(&mut self, host: &mut H, timers: &mut Timers) {
        if self.policy.max_attempts() == 0 {
            return;
        }
        match self.policy.delays_ms[0] {
            0 => self.run_attempt(host, timers),
            delay => self.timer = timers.arm(host, TimerKind::VerifyAttempt, delay),
        }
    }

    pub fn on_timer<H: Host>(&mut self, host: &mut H, timers: &mut Timers) {
        self.timer = None;
        self.run_attempt(host, timers);
    }

    /// Result of a pending fetch or pixel. A failure falls through to the
    /// next transport within the same attempt.
    pub fn on_settled<H: Host>(&mut self, host: &mut H, timers: &mut Timers, ticket: u64, delivered: bool) {
        if self.token.is_cancelled() {
            return;
        }
        let Some((pending, index)) = self.inflight else {
            return;
        };
        if pending != ticket {
            return;
        }
        self.inflight = None;
        if delivered {
            self.finish(host, timers);
        } else {
            self.try_transports(host, timers, index + 1);
        }
    }

    pub fn cancel<H: Host>(&mut self, host: &mut H, timers: &mut Timers) {
        self.token.cancel();
        timers.disarm(host, self.timer.take());
        self.inflight = None;
    }

    fn run_attempt<H: Host>(&mut self, host: &mut H, timers: &mut Timers) {
        if self.token.is_cancelled() || self.delivered || self.attempt >= self.policy.max_attempts() {
            return;
        }
        self.attempt += 1;
        // A still-pending ping from the previous attempt no longer counts.
        self.inflight = None;
        if let Some(delay) = self.policy.delays_ms.get(self.attempt) {
            self.timer = timers.arm(host, TimerKind::VerifyAttempt, *delay);
        }
        self.try_transports(host, timers, 0);
    }

    fn try_transports<H: Host>(&mut self, host: &mut H, timers: &mut Timers, from: usize) {
        for (index, transport) in TRANSPORTS.iter().enumerate().skip(from) {
            let Some(url) = self.url(*transport, host.now_ms()) else {
                return;
            };
            let ticket = self.next_ticket;
            self.next_ticket += 1;
            match host.send_ping(ticket, *transport, &url) {
                TransportOutcome::Delivered => {
                    self.finish(host, timers);
                    return;
                }
                TransportOutcome::Pending => {
                    self.inflight = Some((ticket, index));
                    return;
                }
                TransportOutcome::Unavailable => continue,
            }
        }
    }

    fn finish<H: Host>(&mut self, host: &mut H, timers: &mut Timers) {
        self.delivered = true;
        timers.disarm(host, self.timer.take());
        tracing::debug!(attempt = self.attempt, "install verified");
    }

    fn url(&self, transport: PingTransport, now_ms: f64) -> Option<String> {
        let path = match transport {
            PingTransport::Pixel => PIXEL_PATH,
            PingTransport::Beacon | PingTransport::Fetch => PING_PATH,
        };
        let mut url = Url::parse(&self.target.service_origin).ok()?.join(path).ok()?;
        url.query_pairs_mut()
            .append_pair("site_key", &self.target.site_key)
            .append_pair("origin", &self.target.page_origin)
            .append_pair("page", &self.target.page_url)
            .append_pair("ts", &format!("{}", now_ms.round() as i64));
        Some(url.into())
    }
}
