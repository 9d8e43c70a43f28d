//! Page-facing API calls as values, so the pre-load queue and the live API
//! share one dispatch path.

use std::fmt;
use std::rc::Rc;

use chatlive_shared::ConfigPatch;

use crate::error::CallbackError;

pub type Listener<T> = Rc<dyn Fn(T) -> Result<(), CallbackError>>;

pub enum Command {
    Init(ConfigPatch),
    Destroy,
    Open,
    Close,
    Toggle,
    SetTheme(String),
    OnReady(Listener<()>),
    OnUnread(Listener<u32>),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Init(patch) => f.debug_tuple("Init").field(patch).finish(),
            Command::SetTheme(color) => f.debug_tuple("SetTheme").field(color).finish(),
            other => f.write_str(other.method().name()),
        }
    }
}

impl Command {
    pub fn method(&self) -> Method {
        match self {
            Command::Init(_) => Method::Init,
            Command::Destroy => Method::Destroy,
            Command::Open => Method::Open,
            Command::Close => Method::Close,
            Command::Toggle => Method::Toggle,
            Command::SetTheme(_) => Method::SetTheme,
            Command::OnReady(_) => Method::OnReady,
            Command::OnUnread(_) => Method::OnUnread,
        }
    }
}

/// Method names accepted by `ChatLive(name, ...args)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Init,
    Destroy,
    Open,
    Close,
    Toggle,
    SetTheme,
    OnReady,
    OnUnread,
}

impl Method {
    pub fn parse(name: &str) -> Option<Method> {
        Some(match name {
            "init" => Method::Init,
            "destroy" => Method::Destroy,
            "open" => Method::Open,
            "close" => Method::Close,
            "toggle" => Method::Toggle,
            "setTheme" => Method::SetTheme,
            "onReady" => Method::OnReady,
            "onUnread" => Method::OnUnread,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Init => "init",
            Method::Destroy => "destroy",
            Method::Open => "open",
            Method::Close => "close",
            Method::Toggle => "toggle",
            Method::SetTheme => "setTheme",
            Method::OnReady => "onReady",
            Method::OnUnread => "onUnread",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip() {
        for method in [
            Method::Init,
            Method::Destroy,
            Method::Open,
            Method::Close,
            Method::Toggle,
            Method::SetTheme,
            Method::OnReady,
            Method::OnUnread,
        ] {
            assert_eq!(Method::parse(method.name()), Some(method));
        }
        assert_eq!(Method::parse("settheme"), None);
        assert_eq!(Method::parse("boot"), None);
    }

    #[test]
    fn debug_output_names_the_call() {
        let listener: Listener<()> = Rc::new(|()| -> Result<(), CallbackError> { Ok(()) });
        assert_eq!(format!("{:?}", Command::OnReady(listener)), "onReady");
        assert_eq!(format!("{:?}", Command::SetTheme("#fff".into())), "SetTheme(\"#fff\")");
    }
}
