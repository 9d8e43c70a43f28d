//! `window.ChatLive`: the page-facing function, its methods and the
//! pre-load queue.
//!
//! `ChatLive("open")` and `ChatLive.open()` are the same call. Anything the
//! page pushed onto `ChatLive.q` before the loader ran is replayed in order.

use std::rc::Rc;

use chatlive_shared::ConfigPatch;
use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsError, JsValue};

use super::host::js_to_json;
use super::with_runtime;
use crate::commands::{Command, Method};
use crate::error::CallbackError;
use crate::session::LOADER_VERSION;

const GLOBAL: &str = "ChatLive";

const METHODS: [Method; 8] = [
    Method::Init,
    Method::Destroy,
    Method::Open,
    Method::Close,
    Method::Toggle,
    Method::SetTheme,
    Method::OnReady,
    Method::OnUnread,
];

fn callback_error(err: JsValue) -> CallbackError {
    CallbackError(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

fn listener_fn(method: Method, arg: &JsValue) -> Result<Function, JsError> {
    arg.clone()
        .dyn_into::<Function>()
        .map_err(|_| JsError::new(&format!("ChatLive.{}() expects a function", method.name())))
}

/// Converts one JS call into a [`Command`].
pub fn command(method: Method, arg: &JsValue) -> Result<Command, JsError> {
    Ok(match method {
        Method::Init => {
            let patch = js_to_json(arg)
                .map(|value| ConfigPatch::from_json(&value))
                .unwrap_or_default();
            Command::Init(patch)
        }
        Method::Destroy => Command::Destroy,
        Method::Open => Command::Open,
        Method::Close => Command::Close,
        Method::Toggle => Command::Toggle,
        Method::SetTheme => {
            let color = arg
                .as_string()
                .ok_or_else(|| JsError::new("ChatLive.setTheme() expects a color string"))?;
            Command::SetTheme(color)
        }
        Method::OnReady => {
            let f = listener_fn(method, arg)?;
            Command::OnReady(Rc::new(move |()| {
                f.call0(&JsValue::NULL).map(drop).map_err(callback_error)
            }))
        }
        Method::OnUnread => {
            let f = listener_fn(method, arg)?;
            Command::OnUnread(Rc::new(move |count: u32| {
                f.call1(&JsValue::NULL, &JsValue::from(count))
                    .map(drop)
                    .map_err(callback_error)
            }))
        }
    })
}

/// Runs one call against the live runtime.
pub fn call(name: &str, arg: &JsValue) -> Result<(), JsError> {
    let method = Method::parse(name).ok_or_else(|| JsError::new(&format!("unknown ChatLive method `{name}`")))?;
    let command = command(method, arg)?;
    tracing::debug!(?command, "api call");
    if matches!(method, Method::Init | Method::Destroy) {
        super::cancel_auto_init();
    }
    match with_runtime(|runtime| runtime.apply(command)) {
        Some(Ok(())) => Ok(()),
        Some(Err(err)) => Err(JsError::new(&err.to_string())),
        None => Err(JsError::new("ChatLive is busy")),
    }
}

fn queued_calls(window: &Object) -> Vec<(String, JsValue)> {
    let Ok(existing) = Reflect::get(window, &JsValue::from_str(GLOBAL)) else {
        return Vec::new();
    };
    let Ok(queue) = Reflect::get(&existing, &JsValue::from_str("q")) else {
        return Vec::new();
    };
    if !Array::is_array(&queue) {
        return Vec::new();
    }
    Array::from(&queue)
        .iter()
        .filter_map(|args| {
            // Each entry is an `arguments` object.
            let args = Array::from(&args);
            let name = args.get(0).as_string()?;
            Some((name, args.get(1)))
        })
        .collect()
}

/// Installs `window.ChatLive` and returns the calls queued before it existed.
pub fn install(window: &Object) -> Result<Vec<(String, JsValue)>, JsValue> {
    let queued = queued_calls(window);

    let entry = Closure::<dyn Fn(JsValue, JsValue) -> Result<(), JsValue>>::new(
        |name: JsValue, arg: JsValue| {
            let name = name.as_string().unwrap_or_default();
            call(&name, &arg).map_err(JsValue::from)
        },
    )
    .into_js_value();

    for method in METHODS {
        let bound = Closure::<dyn Fn(JsValue) -> Result<(), JsValue>>::new(move |arg: JsValue| {
            call(method.name(), &arg).map_err(JsValue::from)
        })
        .into_js_value();
        Reflect::set(&entry, &JsValue::from_str(method.name()), &bound)?;
    }
    Reflect::set(&entry, &JsValue::from_str("version"), &JsValue::from_str(LOADER_VERSION))?;
    Reflect::set(&entry, &JsValue::from_str("q"), &Array::new())?;
    Reflect::set(window, &JsValue::from_str(GLOBAL), &entry)?;
    Ok(queued)
}

/// Replays pre-load calls; a bad entry is logged and the rest still run.
pub fn replay(queued: Vec<(String, JsValue)>) {
    for (name, arg) in queued {
        if let Err(err) = call(&name, &arg) {
            tracing::warn!(method = %name, err = ?JsValue::from(err), "queued ChatLive call failed");
        }
    }
}
