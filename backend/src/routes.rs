use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chatlive_shared::bootstrap::{BOOTSTRAP_PATH, PING_PATH, PIXEL_PATH};
use chatlive_shared::{BootstrapRequest, PingQuery};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiError;
use crate::installs::{InstallLog, Via};
use crate::sites::Sites;

pub const INSTALLS_PATH: &str = "/api/v1/public/widget/installs/:site_key";

/// Transparent 1×1 GIF.
const PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub struct AppState {
    pub sites: Sites,
    pub installs: InstallLog,
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(BOOTSTRAP_PATH, post(bootstrap_handler))
        .route(PING_PATH, get(ping_handler))
        .route(PIXEL_PATH, get(pixel_handler))
        .route(INSTALLS_PATH, get(installs_handler))
        .with_state(state)
        .layer(cors)
}

#[derive(Debug, Deserialize)]
struct BootstrapQuery {
    site_key: Option<String>,
}

// POST /api/v1/public/widget/bootstrap
async fn bootstrap_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BootstrapQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // The body is best effort; the query string and Origin header back it up.
    let body = serde_json::from_slice::<BootstrapRequest>(&body).ok();
    let site_key = body
        .as_ref()
        .map(|b| b.site_key.clone())
        .filter(|k| !k.is_empty())
        .or(query.site_key)
        .ok_or_else(|| ApiError::BadRequest("site_key is required".into()))?;
    let origin = body
        .map(|b| b.origin)
        .filter(|o| !o.is_empty())
        .or_else(|| {
            headers
                .get(header::ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default();

    let site = state
        .sites
        .get(&site_key)
        .ok_or_else(|| ApiError::UnknownSite(site_key.clone()))?;
    if !site.trusts(&origin) {
        return Err(ApiError::UntrustedOrigin(origin));
    }
    tracing::debug!(%site_key, %origin, "bootstrap");
    Ok(Json(json!({ "data": { "config": site.config } })))
}

fn record(state: &AppState, query: &PingQuery, via: Via) {
    if state.sites.get(&query.site_key).is_none() {
        tracing::debug!(site_key = %query.site_key, "ping for unknown site");
        return;
    }
    state
        .installs
        .record(&query.site_key, &query.origin, &query.page, via, Utc::now());
}

// GET /chatlive/ping
async fn ping_handler(State(state): State<Arc<AppState>>, Query(query): Query<PingQuery>) -> StatusCode {
    record(&state, &query, Via::Ping);
    StatusCode::NO_CONTENT
}

// GET /chatlive/ping.gif
async fn pixel_handler(State(state): State<Arc<AppState>>, Query(query): Query<PingQuery>) -> impl IntoResponse {
    record(&state, &query, Via::Pixel);
    (
        [(header::CONTENT_TYPE, "image/gif"), (header::CACHE_CONTROL, "no-store")],
        PIXEL,
    )
}

// GET /api/v1/public/widget/installs/{site_key}
async fn installs_handler(
    State(state): State<Arc<AppState>>,
    Path(site_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.sites.get(&site_key).is_none() {
        return Err(ApiError::UnknownSite(site_key));
    }
    let installs = state.installs.for_site(&site_key);
    Ok(Json(json!({ "data": { "site_key": site_key, "installs": installs } })))
}
