mod error;
mod installs;
mod routes;
mod sites;

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use error::ServerError;
use installs::InstallLog;
use routes::AppState;
use sites::Sites;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_SITES_FILE: &str = "sites.json";

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind = std::env::var("CHATLIVE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let sites_file = PathBuf::from(
        std::env::var("CHATLIVE_SITES_FILE").unwrap_or_else(|_| DEFAULT_SITES_FILE.to_string()),
    );

    let sites = if sites_file.exists() {
        Sites::load(&sites_file)?
    } else {
        tracing::warn!(path = %sites_file.display(), "sites file missing, every bootstrap will 404");
        Sites::default()
    };
    tracing::info!(sites = sites.len(), "site registry loaded");

    let state = Arc::new(AppState {
        sites,
        installs: InstallLog::default(),
    });
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|source| ServerError::Bind { addr: bind.clone(), source })?;
    tracing::info!(%bind, "chatlive-server listening");
    axum::serve(listener, app).await.map_err(ServerError::Serve)
}
