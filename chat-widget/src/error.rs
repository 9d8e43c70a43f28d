use thiserror::Error;

/// Failures surfaced to the page author from `init()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WidgetError {
    #[error("siteKey is required")]
    MissingSiteKey,

    #[error("embedUrl is required")]
    MissingEmbedUrl,

    #[error("embedUrl is not an absolute http(s) URL: {0}")]
    InvalidEmbedUrl(String),

    #[error("host environment error: {0}")]
    Host(#[from] HostError),
}

/// A browser API the runtime depends on misbehaved or is missing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("{0} is unavailable")]
    Unavailable(&'static str),

    #[error("DOM operation failed: {0}")]
    Dom(String),
}

/// Raised by a page-author callback. Never stops the remaining callbacks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("listener failed: {0}")]
pub struct CallbackError(pub String);
