//! Bootstrap sequencer: fetch the server patch before first paint, but never
//! wait longer than [`BOOTSTRAP_TIMEOUT_MS`] and never restyle a widget the
//! user has already seen.
//!
//! ```text
//! Idle ──init (site key + origin)──▶ Inflight ──response──▶ Done (patch merged)
//!   │                                    └──────timeout────▶ Done (fallback, late patch ignored)
//!   └──init (nothing to fetch)─────────────────────────────▶ Done
//! ```

use chatlive_shared::bootstrap::BOOTSTRAP_PATH;
use chatlive_shared::{extract_patch, BootstrapRequest, ConfigPatch};
use serde_json::Value;
use url::Url;

use crate::host::TimerId;

pub const BOOTSTRAP_TIMEOUT_MS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Inflight { ticket: u64 },
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapCall {
    pub ticket: u64,
    pub url: String,
    pub request: BootstrapRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    /// Render now with the pending page config and this server patch.
    Render { page: ConfigPatch, patch: Option<ConfigPatch> },
    /// Stale ticket or a patch that arrived after the fallback render.
    Discard,
}

#[derive(Debug)]
pub struct BootstrapSequencer {
    phase: Phase,
    pending: ConfigPatch,
    server_patch: Option<ConfigPatch>,
    pub timer: Option<TimerId>,
    fallback_rendered: bool,
    ignore_late_patch: bool,
    last_ticket: u64,
}

impl Default for BootstrapSequencer {
    fn default() -> Self {
        BootstrapSequencer {
            phase: Phase::Idle,
            pending: ConfigPatch::default(),
            server_patch: None,
            timer: None,
            fallback_rendered: false,
            ignore_late_patch: false,
            last_ticket: 0,
        }
    }
}

impl BootstrapSequencer {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn fallback_rendered(&self) -> bool {
        self.fallback_rendered
    }

    pub fn server_patch(&self) -> Option<&ConfigPatch> {
        self.server_patch.as_ref()
    }

    /// First `init()`: decides between fetching and rendering immediately.
    /// `service_origin` is `None` when no origin can be derived.
    pub fn begin(
        &mut self,
        page: ConfigPatch,
        service_origin: Option<&str>,
        page_origin: &str,
        now_ms: f64,
    ) -> Option<BootstrapCall> {
        debug_assert_eq!(self.phase, Phase::Idle);
        let call = match (page.site_key.as_deref(), service_origin) {
            (Some(site_key), Some(origin)) => bootstrap_url(origin, site_key, now_ms).map(|url| {
                self.last_ticket += 1;
                BootstrapCall {
                    ticket: self.last_ticket,
                    url,
                    request: BootstrapRequest {
                        site_key: site_key.to_string(),
                        origin: page_origin.to_string(),
                    },
                }
            }),
            _ => None,
        };
        self.pending = page;
        self.phase = match &call {
            Some(call) => Phase::Inflight { ticket: call.ticket },
            None => Phase::Done,
        };
        call
    }

    /// `init()` while the request is in flight only replaces the pending config.
    pub fn update_pending(&mut self, page: ConfigPatch) {
        self.pending = page;
    }

    /// Timeout fired: render with page config only and ignore whatever
    /// arrives later.
    pub fn on_timeout(&mut self) -> Option<ConfigPatch> {
        self.timer = None;
        match self.phase {
            Phase::Inflight { .. } => {
                self.phase = Phase::Done;
                self.fallback_rendered = true;
                self.ignore_late_patch = true;
                Some(self.pending.clone())
            }
            _ => None,
        }
    }

    pub fn on_settled(&mut self, ticket: u64, body: Option<&Value>) -> Settled {
        match self.phase {
            Phase::Inflight { ticket: expected } if expected == ticket => {
                self.phase = Phase::Done;
                let patch = body.and_then(extract_patch).filter(|p| !p.is_empty());
                self.server_patch = patch.clone();
                Settled::Render {
                    page: self.pending.clone(),
                    patch,
                }
            }
            _ => {
                if ticket == self.last_ticket && self.ignore_late_patch {
                    tracing::debug!("bootstrap patch arrived after fallback render; ignored");
                }
                Settled::Discard
            }
        }
    }

    /// Back to `Idle`; outstanding tickets become stale.
    pub fn reset(&mut self) -> Option<TimerId> {
        let timer = self.timer.take();
        let last_ticket = self.last_ticket;
        *self = BootstrapSequencer {
            last_ticket,
            ..BootstrapSequencer::default()
        };
        timer
    }
}

pub fn bootstrap_url(service_origin: &str, site_key: &str, now_ms: f64) -> Option<String> {
    let mut url = Url::parse(service_origin).ok()?.join(BOOTSTRAP_PATH).ok()?;
    url.query_pairs_mut()
        .append_pair("site_key", site_key)
        .append_pair("_ts", &format!("{}", now_ms.round() as i64));
    Some(url.into())
}
