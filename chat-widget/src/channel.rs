//! Host half of the postMessage channel.

use std::collections::VecDeque;

use chatlive_shared::{HostMessage, WidgetMessage};

use crate::host::{ElementId, Host, InboundMessage};

#[derive(Debug, Default)]
pub struct MessageChannel {
    iframe: Option<ElementId>,
    iframe_origin: Option<String>,
    allowlist: Vec<String>,
    ready: bool,
    queue: VecDeque<HostMessage>,
}

impl MessageChannel {
    pub fn connect(&mut self, iframe: ElementId, iframe_origin: &str, allowlist: &[String]) {
        self.iframe = Some(iframe);
        self.iframe_origin = Some(iframe_origin.to_string());
        self.allowlist = allowlist.to_vec();
    }

    pub fn set_allowlist(&mut self, allowlist: &[String]) {
        self.allowlist = allowlist.to_vec();
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn accepts(&self, message: &InboundMessage) -> bool {
        message.from_iframe
            && self.iframe.is_some()
            && self.allowlist.iter().any(|origin| *origin == message.origin)
    }

    /// Trust check plus decode. `None` means "drop silently".
    pub fn receive(&self, message: &InboundMessage) -> Option<WidgetMessage> {
        if !self.accepts(message) {
            return None;
        }
        WidgetMessage::decode(&message.data).ok()
    }

    pub fn send<H: Host>(&mut self, host: &mut H, message: HostMessage) {
        if self.ready {
            self.post(host, message);
        } else {
            self.queue.push_back(message);
        }
    }

    /// Completes the handshake: `handshake` goes out first, then the queue in
    /// the order it was filled.
    pub fn mark_ready<H: Host>(&mut self, host: &mut H, handshake: Vec<HostMessage>) {
        if self.iframe.is_none() || self.iframe_origin.is_none() {
            return;
        }
        self.ready = true;
        for message in handshake {
            self.post(host, message);
        }
        while let Some(message) = self.queue.pop_front() {
            self.post(host, message);
        }
    }

    fn post<H: Host>(&mut self, host: &mut H, message: HostMessage) {
        let (Some(iframe), Some(origin)) = (self.iframe, self.iframe_origin.as_deref()) else {
            return;
        };
        let kind = message.kind();
        let envelope = message.into_envelope(host.now_ms());
        if let Err(err) = host.post_message(iframe, &envelope, origin) {
            tracing::debug!(kind, %err, "postMessage failed");
        }
    }

    pub fn reset(&mut self) {
        *self = MessageChannel::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::testing::FakeHost;
    use chatlive_shared::envelope::{kind, VisibilityPayload};
    use serde_json::json;

    const ORIGIN: &str = "https://chat.example.com";

    fn connected(host: &mut FakeHost) -> MessageChannel {
        let iframe = host.create_element(crate::host::ElementKind::Iframe).unwrap();
        let mut channel = MessageChannel::default();
        channel.connect(iframe, ORIGIN, &[ORIGIN.to_string()]);
        channel
    }

    fn inbound(origin: &str, from_iframe: bool) -> InboundMessage {
        InboundMessage {
            origin: origin.into(),
            from_iframe,
            data: json!({ "channel": "chatlive", "version": 1, "type": kind::WIDGET_REQUEST_OPEN, "ts": 1 }),
        }
    }

    #[test]
    fn receive_requires_source_and_origin() {
        let mut host = FakeHost::default();
        let channel = connected(&mut host);
        assert_eq!(channel.receive(&inbound(ORIGIN, true)), Some(WidgetMessage::RequestOpen));
        assert_eq!(channel.receive(&inbound(ORIGIN, false)), None);
        assert_eq!(channel.receive(&inbound("https://chat.example.com:8443", true)), None);
        assert_eq!(MessageChannel::default().receive(&inbound(ORIGIN, true)), None);
    }

    #[test]
    fn sends_queue_until_ready() {
        let mut host = FakeHost::default();
        let mut channel = connected(&mut host);
        channel.send(&mut host, HostMessage::SetOpen { open: true });
        assert_eq!(channel.queued(), 1);
        assert!(host.posted.is_empty());

        let visible = HostMessage::Visibility(VisibilityPayload {
            visible: true,
            focused: false,
        });
        channel.mark_ready(&mut host, vec![visible]);
        assert_eq!(host.posted_kinds(), vec![kind::HOST_VISIBILITY, kind::HOST_SET_OPEN]);
        assert_eq!(channel.queued(), 0);
        assert!(host.posted.iter().all(|p| p.target_origin == ORIGIN));
    }

    #[test]
    fn reset_drops_queue_and_connection() {
        let mut host = FakeHost::default();
        let mut channel = connected(&mut host);
        channel.send(&mut host, HostMessage::SetOpen { open: true });
        channel.reset();
        assert_eq!(channel.queued(), 0);
        channel.mark_ready(&mut host, Vec::new());
        assert!(!channel.is_ready());
        assert!(host.posted.is_empty());
    }
}
