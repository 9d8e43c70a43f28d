//! postMessage envelope and the two closed message sets.
//!
//! Wire shape: `{channel, version, type, payload, ts}`. The host only ever
//! builds [`HostMessage`]s and only ever accepts [`WidgetMessage`]s; anything
//! that does not decode into one is dropped by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ContractError;

pub const CHANNEL: &str = "chatlive";
pub const VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub version: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    /// Sender clock in milliseconds; informational only.
    pub ts: f64,
}

impl Envelope {
    /// Structural validation of an untrusted value. Checks channel, version and
    /// that `type` is a string; the payload is left to the typed decoders.
    pub fn from_value(value: &Value) -> Result<Envelope, ContractError> {
        let map = value.as_object().ok_or(ContractError::NotAnObject)?;

        let channel = map.get("channel").and_then(Value::as_str);
        if channel != Some(CHANNEL) {
            return Err(ContractError::ChannelMismatch(channel.map(str::to_string)));
        }

        match map.get("version").and_then(Value::as_u64) {
            Some(VERSION) => {}
            _ => {
                let got = map.get("version").cloned().unwrap_or(Value::Null);
                return Err(ContractError::VersionMismatch(got.to_string()));
            }
        }

        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ContractError::MissingType)?;

        Ok(Envelope {
            channel: CHANNEL.to_string(),
            version: VERSION,
            kind: kind.to_string(),
            payload: map.get("payload").cloned().unwrap_or(Value::Null),
            ts: map.get("ts").and_then(Value::as_f64).unwrap_or(0.0),
        })
    }
}

pub mod kind {
    pub const HOST_INIT: &str = "HOST_INIT";
    pub const HOST_SET_OPEN: &str = "HOST_SET_OPEN";
    pub const HOST_SET_THEME: &str = "HOST_SET_THEME";
    pub const HOST_VISIBILITY: &str = "HOST_VISIBILITY";
    pub const HOST_PAGEVIEW: &str = "HOST_PAGEVIEW";

    pub const WIDGET_READY: &str = "WIDGET_READY";
    pub const WIDGET_HEIGHT: &str = "WIDGET_HEIGHT";
    pub const WIDGET_UNREAD: &str = "WIDGET_UNREAD";
    pub const WIDGET_THEME: &str = "WIDGET_THEME";
    pub const WIDGET_AGENT: &str = "WIDGET_AGENT";
    pub const WIDGET_IMAGE_PREVIEW: &str = "WIDGET_IMAGE_PREVIEW";
    pub const WIDGET_REQUEST_OPEN: &str = "WIDGET_REQUEST_OPEN";
    pub const WIDGET_REQUEST_CLOSE: &str = "WIDGET_REQUEST_CLOSE";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemePayload {
    pub color: String,
    pub mode: String,
    pub position: String,
    pub launcher_background: String,
    pub launcher_foreground: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    pub referrer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityPayload {
    pub visible: bool,
    pub focused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInit {
    pub site_key: String,
    pub open: bool,
    pub is_mobile: bool,
    pub fullscreen: bool,
    pub host_origin: String,
    pub theme: ThemePayload,
    pub page: PageInfo,
    pub show_agent_photo: bool,
    pub loader_version: String,
}

/// Host → iframe.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    Init(HostInit),
    SetOpen { open: bool },
    SetTheme(ThemePayload),
    Visibility(VisibilityPayload),
    Pageview(PageInfo),
}

impl HostMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            HostMessage::Init(_) => kind::HOST_INIT,
            HostMessage::SetOpen { .. } => kind::HOST_SET_OPEN,
            HostMessage::SetTheme(_) => kind::HOST_SET_THEME,
            HostMessage::Visibility(_) => kind::HOST_VISIBILITY,
            HostMessage::Pageview(_) => kind::HOST_PAGEVIEW,
        }
    }

    pub fn payload(&self) -> Value {
        let encoded = match self {
            HostMessage::Init(init) => serde_json::to_value(init),
            HostMessage::SetOpen { open } => Ok(serde_json::json!({ "open": open })),
            HostMessage::SetTheme(theme) => serde_json::to_value(theme),
            HostMessage::Visibility(state) => serde_json::to_value(state),
            HostMessage::Pageview(page) => serde_json::to_value(page),
        };
        // Plain structs of strings and bools always encode.
        encoded.unwrap_or(Value::Null)
    }

    pub fn into_envelope(self, ts: f64) -> Envelope {
        Envelope {
            channel: CHANNEL.to_string(),
            version: VERSION,
            kind: self.kind().to_string(),
            payload: self.payload(),
            ts,
        }
    }
}

/// Iframe-driven theme/placement sync. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSync {
    #[serde(default)]
    pub theme_color: Option<String>,
    #[serde(default)]
    pub theme_mode: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub color_overrides: Option<Value>,
}

/// Iframe → host.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetMessage {
    Ready,
    Height { height: f64 },
    Unread { count: u32 },
    Theme(ThemeSync),
    Agent { avatar_url: Option<String> },
    ImagePreview { src: Option<String> },
    RequestOpen,
    RequestClose,
}

impl WidgetMessage {
    /// Decodes an untrusted value into a widget message. Any structural or
    /// payload problem is an error; callers drop the message silently.
    pub fn decode(value: &Value) -> Result<WidgetMessage, ContractError> {
        let envelope = Envelope::from_value(value)?;
        WidgetMessage::from_envelope(&envelope)
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<WidgetMessage, ContractError> {
        let payload = &envelope.payload;
        match envelope.kind.as_str() {
            kind::WIDGET_READY => Ok(WidgetMessage::Ready),
            kind::WIDGET_HEIGHT => {
                let height = scalar(payload, "height")
                    .filter(|h| h.is_finite() && *h > 0.0)
                    .ok_or_else(|| invalid(kind::WIDGET_HEIGHT, "height must be a positive number"))?;
                Ok(WidgetMessage::Height { height })
            }
            kind::WIDGET_UNREAD => {
                let count = scalar(payload, "count")
                    .filter(|c| c.is_finite() && *c >= 0.0 && c.fract() == 0.0)
                    .ok_or_else(|| invalid(kind::WIDGET_UNREAD, "count must be a non-negative integer"))?;
                Ok(WidgetMessage::Unread {
                    count: count.min(f64::from(u32::MAX)) as u32,
                })
            }
            kind::WIDGET_THEME => {
                let sync = match payload {
                    Value::Null => ThemeSync::default(),
                    other => serde_json::from_value(other.clone())
                        .map_err(|e| invalid(kind::WIDGET_THEME, &e.to_string()))?,
                };
                Ok(WidgetMessage::Theme(sync))
            }
            kind::WIDGET_AGENT => Ok(WidgetMessage::Agent {
                avatar_url: optional_string(payload, &["avatarUrl", "avatar_url", "photoUrl"]),
            }),
            kind::WIDGET_IMAGE_PREVIEW => Ok(WidgetMessage::ImagePreview {
                src: optional_string(payload, &["src", "url"]),
            }),
            kind::WIDGET_REQUEST_OPEN => Ok(WidgetMessage::RequestOpen),
            kind::WIDGET_REQUEST_CLOSE => Ok(WidgetMessage::RequestClose),
            other => Err(ContractError::UnknownType(other.to_string())),
        }
    }
}

fn invalid(kind: &'static str, reason: &str) -> ContractError {
    ContractError::InvalidPayload {
        kind,
        reason: reason.to_string(),
    }
}

/// Accepts either a bare number or `{ key: number }`.
fn scalar(payload: &Value, key: &str) -> Option<f64> {
    match payload {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get(key).and_then(Value::as_f64),
        _ => None,
    }
}

fn optional_string(payload: &Value, keys: &[&str]) -> Option<String> {
    let map = payload.as_object()?;
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
