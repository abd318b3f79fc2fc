//! The outbound message seam.
//!
//! Replies and server-initiated notifications leave through the same
//! channel. Production wires a framed stdout writer here; tests substitute
//! a recording sink.

use serde::Serialize;
use serde_json::Value;

use crate::proto::{MessageType, OutMessage, ShowMessageParams, NOTIFY_SHOW_MESSAGE};

pub trait OutboundSink {
    fn send(&self, message: OutMessage);
}

/// Send a notification with the given params.
pub fn notify<P: Serialize>(sink: &dyn OutboundSink, method: &'static str, params: &P) {
    let params = serde_json::to_value(params).unwrap_or(Value::Null);
    sink.send(OutMessage::notification(method, params));
}

/// Send a `window/showMessage` notification.
pub fn show_message(sink: &dyn OutboundSink, typ: MessageType, message: String) {
    notify(sink, NOTIFY_SHOW_MESSAGE, &ShowMessageParams { typ, message });
}
