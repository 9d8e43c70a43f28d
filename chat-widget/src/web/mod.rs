//! Browser entry point.
//!
//! The runtime lives in a thread-local `RefCell`. Browser callbacks never
//! touch it directly: they [`dispatch`] a [`HostEvent`], which is queued and
//! drained as soon as nobody holds the borrow. Page-author callbacks collected
//! during a drain run after the borrow is released, so they can call back into
//! `window.ChatLive`.

mod api;
mod host;
mod logging;
mod script;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use chatlive_shared::ConfigPatch;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;

use wasm_bindgen_futures::spawn_local;
use web_sys::Document;

use crate::host::HostEvent;
use crate::runtime::{Callbacks, Runtime};
use host::WebHost;

thread_local! {
    static RUNTIME: RefCell<Option<Runtime<WebHost>>> = const { RefCell::new(None) };
    static PENDING: RefCell<VecDeque<HostEvent>> = const { RefCell::new(VecDeque::new()) };
    static EXPLICIT_INIT: Cell<bool> = const { Cell::new(false) };
    static AUTO_INIT: RefCell<Option<AutoInitListener>> = const { RefCell::new(None) };
}

/// The pending `DOMContentLoaded` listener; removed when dropped.
struct AutoInitListener {
    document: Document,
    closure: Closure<dyn FnMut()>,
}

impl Drop for AutoInitListener {
    fn drop(&mut self) {
        let _ = self
            .document
            .remove_event_listener_with_callback("DOMContentLoaded", self.closure.as_ref().unchecked_ref());
    }
}

pub(crate) fn dispatch(event: HostEvent) {
    PENDING.with(|queue| queue.borrow_mut().push_back(event));
    drain();
}

fn drain() {
    loop {
        let callbacks = RUNTIME.with(|slot| {
            // Busy: whoever holds the borrow drains on the way out.
            let mut guard = slot.try_borrow_mut().ok()?;
            let Some(runtime) = guard.as_mut() else {
                PENDING.with(|queue| queue.borrow_mut().clear());
                return None;
            };
            while let Some(event) = PENDING.with(|queue| queue.borrow_mut().pop_front()) {
                runtime.handle(event);
            }
            Some(runtime.take_callbacks())
        });
        match callbacks {
            Some(callbacks) if !callbacks.is_empty() => callbacks.run(),
            _ => break,
        }
    }
}

/// Runs `f` against the runtime, then the callbacks it produced and any
/// events raised meanwhile. `None` when the runtime is missing or borrowed.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&mut Runtime<WebHost>) -> R) -> Option<R> {
    let (result, callbacks): (R, Callbacks) = RUNTIME.with(|slot| {
        let mut guard = slot.try_borrow_mut().ok()?;
        let runtime = guard.as_mut()?;
        let result = f(runtime);
        Some((result, runtime.take_callbacks()))
    })?;
    callbacks.run();
    drain();
    Some(result)
}

/// The page took over with `init()` or `destroy()`: no auto-init, and the
/// pending `DOMContentLoaded` listener goes away.
fn cancel_auto_init() {
    EXPLICIT_INIT.with(|flag| flag.set(true));
    let listener = AUTO_INIT.with(|slot| slot.borrow_mut().take());
    drop(listener);
}

fn on_dom_ready(has_site_key: bool) {
    if let Some(listener) = AUTO_INIT.with(|slot| slot.borrow_mut().take()) {
        // Still on this closure's stack; free it after the event returns.
        spawn_local(async move { drop(listener) });
    }
    auto_init(has_site_key);
}

/// Mounts from the loader tag's attributes unless the page already called
/// `init()` itself.
fn auto_init(declarative_site_key: bool) {
    if !declarative_site_key || EXPLICIT_INIT.with(Cell::get) {
        return;
    }
    let outcome = with_runtime(|runtime| {
        if runtime.is_initialized() {
            return Ok(None);
        }
        runtime.init(ConfigPatch::default()).map(Some)
    });
    match outcome {
        Some(Ok(Some(outcome))) => tracing::debug!(?outcome, "auto init"),
        Some(Ok(None)) | None => {}
        Some(Err(err)) => tracing::error!(%err, "auto init failed"),
    }
}

/// Installs the runtime and `window.ChatLive`. Runs once at module start;
/// later calls are no-ops.
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    let installed = RUNTIME.with(|slot| slot.try_borrow().map_or(true, |runtime| runtime.is_some()));
    if installed {
        return Ok(());
    }
    console_error_panic_hook::set_once();
    logging::init();

    let host = WebHost::new().map_err(|err| JsError::new(&err.to_string()))?;
    let window = web_sys::window().ok_or_else(|| JsError::new("no window"))?;
    let document = window.document().ok_or_else(|| JsError::new("no document"))?;

    let tag = script::read(&document);
    let has_site_key = tag.declarative.site_key.is_some();
    let mut runtime = Runtime::new(host, tag.origin);
    runtime.set_declarative(tag.declarative);
    RUNTIME.with(|slot| *slot.borrow_mut() = Some(runtime));

    let queued = api::install(&window)?;
    api::replay(queued);

    if document.ready_state() == "loading" {
        let closure = Closure::<dyn FnMut()>::new(move || on_dom_ready(has_site_key));
        document.add_event_listener_with_callback("DOMContentLoaded", closure.as_ref().unchecked_ref())?;
        AUTO_INIT.with(|slot| *slot.borrow_mut() = Some(AutoInitListener { document, closure }));
    } else {
        auto_init(has_site_key);
    }
    Ok(())
}
