//! `tracing` output routed to the browser console.
//!
//! Quiet by default (warnings and errors); `debug: true` in the widget
//! config raises the filter to DEBUG at runtime through a reload handle.

use std::cell::RefCell;
use std::io;

use tracing::{Level, Metadata};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, Registry};

thread_local! {
    static FILTER: RefCell<Option<reload::Handle<LevelFilter, Registry>>> = const { RefCell::new(None) };
}

/// Buffers one formatted event and hands it to `console.*` when dropped.
pub struct ConsoleWriter {
    level: Level,
    buf: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let line = format!("[chatlive] {}", text.trim_end());
        let line = wasm_bindgen::JsValue::from_str(&line);
        match self.level {
            Level::ERROR => web_sys::console::error_1(&line),
            Level::WARN => web_sys::console::warn_1(&line),
            Level::INFO => web_sys::console::info_1(&line),
            _ => web_sys::console::debug_1(&line),
        }
    }
}

pub struct MakeConsoleWriter;

impl<'a> MakeWriter<'a> for MakeConsoleWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            level: Level::INFO,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            level: *meta.level(),
            buf: Vec::new(),
        }
    }
}

/// Installs the global subscriber once. A page that already installed one
/// (two loaders) keeps the first.
pub fn init() {
    let (filter, handle) = reload::Layer::new(LevelFilter::WARN);
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_ansi(false)
                .with_target(false)
                .with_writer(MakeConsoleWriter),
        )
        .try_init();
    if installed.is_ok() {
        FILTER.with(|slot| *slot.borrow_mut() = Some(handle));
    }
}

pub fn set_debug(enabled: bool) {
    let level = if enabled { LevelFilter::DEBUG } else { LevelFilter::WARN };
    FILTER.with(|slot| {
        if let Some(handle) = slot.borrow().as_ref() {
            if let Err(err) = handle.modify(|filter| *filter = level) {
                tracing::debug!(%err, "log level not changed");
            }
        }
    });
}
