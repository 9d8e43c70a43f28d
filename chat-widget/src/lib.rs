//! ChatLive embeddable widget loader.
//!
//! A page includes one script tag; this crate mounts a launcher button and
//! the cross-origin chat iframe, then keeps the two in sync over a versioned
//! postMessage channel.
//!
//! The runtime is platform independent and talks to the browser only through
//! the [`host::Host`] trait, so everything except the `web` glue runs and is
//! tested natively. On `wasm32` the `web` module implements `Host` with
//! `web-sys` and exports the `window.ChatLive` API.

pub mod bootstrap;
pub mod channel;
pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod layout;
pub mod navigation;
pub mod runtime;
mod session;
pub mod theme;
pub mod verify;

#[cfg(test)]
mod testing;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use commands::{Command, Listener, Method};
pub use config::{resolve, ResolveContext, ResolvedConfig};
pub use error::{CallbackError, HostError, WidgetError};
pub use host::{Host, HostEvent};
pub use runtime::{Callbacks, InitOutcome, Runtime};
pub use session::{safe_image_src, LOADER_VERSION};
