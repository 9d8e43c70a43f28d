//! Site registry: which site keys exist, which domains may embed them and
//! the config patch each one serves.

use std::collections::HashMap;
use std::path::Path;

use chatlive_shared::ConfigPatch;
use serde::Deserialize;
use url::Url;

use crate::error::ServerError;

#[derive(Debug, Clone, Deserialize)]
pub struct Site {
    pub site_key: String,
    /// Hostnames allowed to bootstrap; subdomains match too. Empty allows any.
    #[serde(default)]
    pub trusted_domains: Vec<String>,
    #[serde(default)]
    pub config: ConfigPatch,
}

impl Site {
    pub fn trusts(&self, origin: &str) -> bool {
        if self.trusted_domains.is_empty() {
            return true;
        }
        let Some(host) = Url::parse(origin).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) else {
            return false;
        };
        self.trusted_domains.iter().any(|domain| {
            let domain = domain.trim().trim_start_matches("*.").to_ascii_lowercase();
            host == domain || host.strip_suffix(&domain).is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

#[derive(Debug, Default)]
pub struct Sites {
    by_key: HashMap<String, Site>,
}

impl Sites {
    pub fn new(sites: impl IntoIterator<Item = Site>) -> Sites {
        Sites {
            by_key: sites.into_iter().map(|site| (site.site_key.clone(), site)).collect(),
        }
    }

    /// Reads a JSON array of sites.
    pub fn load(path: &Path) -> Result<Sites, ServerError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ServerError::SitesFile {
            path: display.clone(),
            source,
        })?;
        let sites: Vec<Site> =
            serde_json::from_str(&raw).map_err(|source| ServerError::SitesJson { path: display, source })?;
        Ok(Sites::new(sites))
    }

    pub fn get(&self, site_key: &str) -> Option<&Site> {
        self.by_key.get(site_key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(domains: &[&str]) -> Site {
        Site {
            site_key: "k".into(),
            trusted_domains: domains.iter().map(|d| d.to_string()).collect(),
            config: ConfigPatch::default(),
        }
    }

    #[test]
    fn trusted_domains_match_host_and_subdomains() {
        let s = site(&["shop.example"]);
        assert!(s.trusts("https://shop.example"));
        assert!(s.trusts("https://www.shop.example:8443"));
        assert!(!s.trusts("https://evilshop.example"));
        assert!(!s.trusts("not an origin"));
        assert!(site(&[]).trusts("https://anything.test"));
        assert!(site(&["*.Shop.Example"]).trusts("https://m.shop.example"));
    }

    #[test]
    fn config_uses_widget_field_names() {
        let raw = r##"[{"site_key":"demo","config":{"themeColor":"#112233","autoHeight":"yes"}}]"##;
        let sites: Vec<Site> = serde_json::from_str(raw).unwrap();
        let sites = Sites::new(sites);
        let config = &sites.get("demo").unwrap().config;
        assert_eq!(config.theme_color.as_deref(), Some("#112233"));
        assert_eq!(config.auto_height, Some(true));
        assert!(sites.get("other").is_none());
    }
}
