//! In-memory record of where each site's loader has been seen running.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Via {
    Ping,
    Pixel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Install {
    pub origin: String,
    pub last_page: String,
    pub via: Via,
    pub pings: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Origins kept per site; the least recently seen one makes room.
pub const MAX_ORIGINS_PER_SITE: usize = 256;

/// One entry per (site, origin).
#[derive(Debug)]
pub struct InstallLog {
    sites: Mutex<HashMap<String, Vec<Install>>>,
    max_origins: usize,
}

impl Default for InstallLog {
    fn default() -> Self {
        InstallLog::with_max_origins(MAX_ORIGINS_PER_SITE)
    }
}

impl InstallLog {
    pub fn with_max_origins(max_origins: usize) -> InstallLog {
        InstallLog {
            sites: Mutex::new(HashMap::new()),
            max_origins: max_origins.max(1),
        }
    }

    pub fn record(&self, site_key: &str, origin: &str, page: &str, via: Via, at: DateTime<Utc>) {
        let mut sites = match self.sites.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let installs = sites.entry(site_key.to_string()).or_default();
        match installs.iter_mut().find(|i| i.origin == origin) {
            Some(install) => {
                install.last_page = page.to_string();
                install.via = via;
                install.pings += 1;
                install.last_seen = at;
            }
            None => {
                if installs.len() >= self.max_origins {
                    if let Some(stalest) = installs
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, i)| i.last_seen)
                        .map(|(index, _)| index)
                    {
                        installs.swap_remove(stalest);
                    }
                }
                installs.push(Install {
                    origin: origin.to_string(),
                    last_page: page.to_string(),
                    via,
                    pings: 1,
                    first_seen: at,
                    last_seen: at,
                });
            }
        }
    }

    pub fn for_site(&self, site_key: &str) -> Vec<Install> {
        let sites = match self.sites.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sites.get(site_key).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn repeat_pings_update_one_entry_per_origin() {
        let log = InstallLog::default();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap();
        log.record("k", "https://a.example", "https://a.example/", Via::Ping, t0);
        log.record("k", "https://a.example", "https://a.example/cart", Via::Pixel, t1);
        log.record("k", "https://b.example", "https://b.example/", Via::Ping, t1);

        let installs = log.for_site("k");
        assert_eq!(installs.len(), 2);
        assert_eq!(
            installs[0],
            Install {
                origin: "https://a.example".into(),
                last_page: "https://a.example/cart".into(),
                via: Via::Pixel,
                pings: 2,
                first_seen: t0,
                last_seen: t1,
            }
        );
        assert!(log.for_site("other").is_empty());
    }

    #[test]
    fn full_site_evicts_the_stalest_origin() {
        let log = InstallLog::with_max_origins(2);
        let at = |minute| Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap();
        log.record("k", "https://a.example", "/", Via::Ping, at(0));
        log.record("k", "https://b.example", "/", Via::Ping, at(1));
        log.record("k", "https://a.example", "/", Via::Ping, at(2));
        log.record("k", "https://c.example", "/", Via::Ping, at(3));

        let mut origins: Vec<_> = log.for_site("k").into_iter().map(|i| i.origin).collect();
        origins.sort();
        assert_eq!(origins, vec!["https://a.example", "https://c.example"]);

        for n in 0..50 {
            log.record("k", &format!("https://spam{n}.example"), "/", Via::Pixel, at(4));
        }
        assert_eq!(log.for_site("k").len(), 2);
    }
}
