//! Contract shared by the ChatLive loader and the reference server.
//!
//! Everything here is plain data: the postMessage envelope and its two closed
//! message sets, the layered widget configuration, and the bootstrap/ping HTTP
//! shapes. No browser types, so the whole contract is testable natively.

pub mod bootstrap;
pub mod config;
pub mod envelope;

pub use bootstrap::{extract_patch, BootstrapRequest, PingQuery};
pub use config::{
    AutoHeightMode, ColorOverrides, ColorSettingsMode, ConfigPatch, LauncherStyle, NavigationMode,
    Position, SameSite, ThemeMode, WidgetConfig,
};
pub use envelope::{Envelope, HostMessage, WidgetMessage, CHANNEL, VERSION};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("channel mismatch: got {0:?}")]
    ChannelMismatch(Option<String>),

    #[error("unsupported protocol version: {0}")]
    VersionMismatch(String),

    #[error("envelope type is missing or not a string")]
    MissingType,

    #[error("unknown message type {0:?}")]
    UnknownType(String),

    #[error("invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
