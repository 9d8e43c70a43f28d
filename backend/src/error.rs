use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown site key `{0}`")]
    UnknownSite(String),
    #[error("origin `{0}` is not trusted for this site")]
    UntrustedOrigin(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownSite(_) => StatusCode::NOT_FOUND,
            ApiError::UntrustedOrigin(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::info!(%status, error = %self, "request rejected");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Startup failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("reading sites file {path}: {source}")]
    SitesFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing sites file {path}: {source}")]
    SitesJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("binding {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server stopped: {0}")]
    Serve(#[source] std::io::Error),
}
