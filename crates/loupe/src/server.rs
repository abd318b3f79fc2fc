//! Framed stdio transport loop.
//!
//! Messages arrive `Content-Length`-framed on stdin and are dispatched one
//! at a time to completion; replies and notifications leave through a
//! framed writer on stdout. A request the dispatcher hands back as
//! [`NotIndexed`](crate::dispatch::NotIndexed) is parked in a backlog and
//! retried after the next index-affecting event; a retried message runs
//! with `overdue` set, so a still-missing index entry becomes a terminal
//! `InvalidRequest` instead of looping.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};

use tracing::{debug, warn};

use crate::dispatch::MessageHandler;
use crate::proto::{InMessage, OutMessage};
use crate::sink::OutboundSink;
use crate::state::ServerState;

/// Outbound sink writing `Content-Length`-framed JSON.
pub struct WriterSink<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> WriterSink<W> {
        WriterSink {
            writer: RefCell::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> OutboundSink for WriterSink<W> {
    fn send(&self, message: OutMessage) {
        let body = serde_json::to_vec(&message).unwrap_or_default();
        let mut writer = self.writer.borrow_mut();
        let _ = write!(writer, "Content-Length: {}\r\n\r\n", body.len());
        let _ = writer.write_all(&body);
        let _ = writer.flush();
    }
}

/// Read one framed message body. `Ok(None)` means clean end of input.
fn read_message(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("Content-Length:") {
            content_length = rest.trim().parse().ok();
        }
    }
    let Some(length) = content_length else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing Content-Length header",
        ));
    };
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(Some(String::from_utf8_lossy(&body).into_owned()))
}

/// Events after which deferred messages are worth retrying.
fn is_index_event(method: &str) -> bool {
    matches!(
        method,
        "textDocument/didOpen"
            | "textDocument/didChange"
            | "textDocument/didSave"
            | "workspace/didChangeWatchedFiles"
    )
}

/// Run the message loop until `exit` or end of input. Returns the process
/// exit code.
pub fn run(state: &mut ServerState, handler: &MessageHandler, reader: &mut impl BufRead) -> i32 {
    let mut backlog: Vec<InMessage> = Vec::new();
    loop {
        let body = match read_message(reader) {
            Ok(Some(body)) => body,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "transport read failed");
                break;
            }
        };
        let msg: InMessage = match serde_json::from_str(&body) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(error = %err, "dropping unparseable message");
                continue;
            }
        };
        let retry_after = is_index_event(&msg.method);
        if let Err(not_indexed) = handler.run(state, &msg) {
            debug!(method = %msg.method, path = %not_indexed.path, "deferring until indexed");
            backlog.push(msg);
        }
        if retry_after && !backlog.is_empty() {
            let pending = std::mem::take(&mut backlog);
            state.overdue = true;
            for msg in &pending {
                // With `overdue` set a handler cannot raise NotIndexed
                // again, so the result carries nothing.
                let _ = handler.run(state, msg);
            }
            state.overdue = false;
        }
        if let Some(code) = state.exit_code {
            return code;
        }
    }
    state.exit_code
        .unwrap_or(if state.shutdown_requested { 0 } else { 1 })
}
