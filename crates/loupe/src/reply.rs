//! The per-request reply channel.
//!
//! Every request gets exactly one reply. [`ReplyOnce`] enforces the "at
//! most one" half: a second reply attempt panics in debug builds via
//! `debug_assert!` and is silently ignored in release builds. The "at
//! least one" half is the dispatcher's job (see `dispatch::run`), which
//! converts handler failures into error replies.

use std::rc::Rc;

use loupe_core::config::ReplySettings;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::proto::{ErrorCode, Location, LocationLink, OutMessage, RequestId};
use crate::sink::OutboundSink;

pub struct ReplyOnce {
    sink: Rc<dyn OutboundSink>,
    id: RequestId,
    settings: ReplySettings,
    sent: bool,
}

impl ReplyOnce {
    pub fn new(sink: Rc<dyn OutboundSink>, id: RequestId, settings: ReplySettings) -> ReplyOnce {
        ReplyOnce {
            sink,
            id,
            settings,
            sent: false,
        }
    }

    /// Whether a reply has been produced on this channel.
    pub fn sent(&self) -> bool {
        self.sent
    }

    /// Reply with a serialized result.
    pub fn success<T: Serialize>(&mut self, result: &T) {
        let value = serde_json::to_value(result).unwrap_or(Value::Null);
        self.send(OutMessage::response(self.id.clone(), value));
    }

    /// Reply with a structured error.
    pub fn error(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.send(OutMessage::error(self.id.clone(), code, message.into()));
    }

    /// Standard `InvalidRequest` reply for operations on unopened files.
    pub fn not_opened(&mut self, path: &str) {
        self.error(ErrorCode::InvalidRequest, format!("{path} is not opened"));
    }

    /// Reply with a list of navigation targets.
    ///
    /// Candidates are sorted, exact duplicates removed, and the list
    /// truncated to the configured maximum. Clients that declared link
    /// support get the rich objects; everyone else gets each candidate
    /// downgraded to a plain location.
    pub fn reply_location_link(&mut self, mut links: Vec<LocationLink>) {
        links.sort();
        links.dedup();
        links.truncate(self.settings.max_num);
        if self.settings.link_support {
            self.success(&links);
        } else {
            let locations: Vec<Location> = links.into_iter().map(Location::from).collect();
            self.success(&locations);
        }
    }

    fn send(&mut self, message: OutMessage) {
        if self.sent {
            debug_assert!(!self.sent, "second reply for request {:?}", self.id);
            warn!(id = ?self.id, "dropping duplicate reply");
            return;
        }
        self.sent = true;
        self.sink.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loupe_core::position::{LsPosition, LsRange};
    use std::cell::RefCell;

    use crate::proto::DocumentUri;

    #[derive(Default)]
    struct RecordingSink {
        messages: RefCell<Vec<OutMessage>>,
    }

    impl OutboundSink for RecordingSink {
        fn send(&self, message: OutMessage) {
            self.messages.borrow_mut().push(message);
        }
    }

    fn settings(max_num: usize, link_support: bool) -> ReplySettings {
        ReplySettings {
            max_num,
            link_support,
        }
    }

    fn link(path: &str, line: u32) -> LocationLink {
        let range = LsRange::new(LsPosition::new(line, 0), LsPosition::new(line, 4));
        LocationLink {
            origin_selection_range: Some(range),
            target_uri: DocumentUri::from_path(path),
            target_range: range,
            target_selection_range: range,
        }
    }

    fn result_of(sink: &RecordingSink) -> serde_json::Value {
        let messages = sink.messages.borrow();
        assert_eq!(messages.len(), 1);
        let json = serde_json::to_value(&messages[0]).unwrap();
        json["result"].clone()
    }

    mod single_reply {
        use super::*;

        #[test]
        fn success_sends_once() {
            let sink = Rc::new(RecordingSink::default());
            let mut reply = ReplyOnce::new(sink.clone(), RequestId::Number(1), settings(10, false));
            assert!(!reply.sent());
            reply.success(&"ok");
            assert!(reply.sent());
            assert_eq!(sink.messages.borrow().len(), 1);
        }

        #[test]
        #[cfg_attr(debug_assertions, should_panic(expected = "second reply"))]
        fn second_reply_is_rejected() {
            let sink = Rc::new(RecordingSink::default());
            let mut reply = ReplyOnce::new(sink.clone(), RequestId::Number(1), settings(10, false));
            reply.success(&"first");
            reply.success(&"second");
            // Release builds swallow the duplicate instead of panicking.
            assert_eq!(sink.messages.borrow().len(), 1);
        }

        #[test]
        fn not_opened_is_invalid_request() {
            let sink = Rc::new(RecordingSink::default());
            let mut reply = ReplyOnce::new(sink.clone(), RequestId::Number(7), settings(10, false));
            reply.not_opened("/missing.cc");
            let messages = sink.messages.borrow();
            let json = serde_json::to_value(&messages[0]).unwrap();
            assert_eq!(json["error"]["code"], -32600);
            assert_eq!(json["error"]["message"], "/missing.cc is not opened");
        }
    }

    mod location_links {
        use super::*;

        #[test]
        fn dedups_sorts_and_truncates_with_link_support() {
            let sink = Rc::new(RecordingSink::default());
            let mut reply = ReplyOnce::new(sink.clone(), RequestId::Number(1), settings(3, true));
            // Five candidates, one exact duplicate, out of order.
            reply.reply_location_link(vec![
                link("/d.cc", 0),
                link("/b.cc", 0),
                link("/a.cc", 0),
                link("/a.cc", 0),
                link("/c.cc", 0),
            ]);
            let result = result_of(&sink);
            let targets: Vec<&str> = result
                .as_array()
                .unwrap()
                .iter()
                .map(|l| l["targetUri"].as_str().unwrap())
                .collect();
            assert_eq!(
                targets,
                vec!["file:///a.cc", "file:///b.cc", "file:///c.cc"]
            );
            assert!(result[0].get("originSelectionRange").is_some());
        }

        #[test]
        fn downgrades_to_locations_without_link_support() {
            let sink = Rc::new(RecordingSink::default());
            let mut reply = ReplyOnce::new(sink.clone(), RequestId::Number(1), settings(3, false));
            reply.reply_location_link(vec![
                link("/d.cc", 0),
                link("/b.cc", 0),
                link("/a.cc", 0),
                link("/a.cc", 0),
                link("/c.cc", 0),
            ]);
            let result = result_of(&sink);
            let entries = result.as_array().unwrap();
            assert_eq!(entries.len(), 3);
            for entry in entries {
                assert!(entry.get("uri").is_some());
                assert!(entry.get("targetUri").is_none());
                assert!(entry.get("originSelectionRange").is_none());
            }
        }
    }
}
