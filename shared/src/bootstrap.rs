//! HTTP shapes of the bootstrap and install-ping endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConfigPatch;

pub const BOOTSTRAP_PATH: &str = "/api/v1/public/widget/bootstrap";
pub const PING_PATH: &str = "/chatlive/ping";
pub const PIXEL_PATH: &str = "/chatlive/ping.gif";

/// Key paths a bootstrap response may nest its config patch under, checked in
/// this order. Older servers used the later shapes.
pub const PATCH_PATHS: [&[&str]; 4] = [&["data", "config"], &["data", "widget"], &["config"], &["widget"]];

/// JSON body of the bootstrap POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapRequest {
    pub site_key: String,
    pub origin: String,
}

/// Query string shared by `ping` and `ping.gif`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingQuery {
    pub site_key: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub page: String,
    #[serde(default)]
    pub ts: Option<f64>,
}

/// Finds the config patch in a bootstrap response body. The first path that
/// resolves to an object wins; no match means "no patch".
pub fn extract_patch(body: &Value) -> Option<ConfigPatch> {
    PATCH_PATHS.iter().find_map(|path| {
        let node = path.iter().try_fold(body, |node, key| node.get(*key))?;
        node.is_object().then(|| ConfigPatch::from_json(node))
    })
}
