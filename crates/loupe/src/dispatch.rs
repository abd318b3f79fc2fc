//! Message dispatch.
//!
//! [`MessageHandler`] maps method names to typed handlers, split into a
//! notification table (no reply path) and a request table (exactly one
//! reply). [`MessageHandler::run`] decodes the message, invokes the bound
//! handler inside the failure boundary the protocol demands, and keeps the
//! reply contract: every request produces exactly one reply, success or
//! error, no matter how the handler exits.
//!
//! The one deliberate hole in the boundary is [`NotIndexed`]: a request
//! touching a file the index has not seen yet is handed back to the caller
//! untouched, so the transport loop can defer and retry the whole message
//! once the index catches up.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::proto::{ErrorCode, InMessage, MessageType};
use crate::reply::ReplyOnce;
use crate::sink;
use crate::state::ServerState;

// ============================================================================
// Errors
// ============================================================================

/// A parameter payload did not match the declared shape.
#[derive(Debug, Clone)]
pub struct ParamDecodeError {
    /// Short name of the expected parameter type.
    pub expected: &'static str,
    /// JSON path at which decoding failed.
    pub path: String,
    /// Underlying decoder message.
    pub detail: String,
}

/// The file has no index entry yet; the message should be retried once the
/// index catches up. Never converted into a reply by the dispatcher.
#[derive(Debug, Clone, Error)]
#[error("{path} is not indexed")]
pub struct NotIndexed {
    pub path: String,
}

/// Failure of a bound handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid params: expected {} for {}", .0.expected, .0.path)]
    Decode(ParamDecodeError),
    #[error(transparent)]
    NotIndexed(#[from] NotIndexed),
    #[error("{0}")]
    Internal(String),
}

// ============================================================================
// Registry
// ============================================================================

type NotificationHandler = Box<dyn Fn(&mut ServerState, &Value) -> Result<(), HandlerError>>;
type RequestHandler =
    Box<dyn Fn(&mut ServerState, &Value, &mut ReplyOnce) -> Result<(), HandlerError>>;

/// The method registry.
#[derive(Default)]
pub struct MessageHandler {
    method2notification: HashMap<&'static str, NotificationHandler>,
    method2request: HashMap<&'static str, RequestHandler>,
}

impl MessageHandler {
    pub fn new() -> MessageHandler {
        MessageHandler::default()
    }

    /// Bind a notification handler with a typed parameter shape.
    pub fn notification<P, F>(&mut self, method: &'static str, handler: F)
    where
        P: DeserializeOwned + 'static,
        F: Fn(&mut ServerState, P) -> Result<(), HandlerError> + 'static,
    {
        self.method2notification.insert(
            method,
            Box::new(move |state, params| handler(state, decode::<P>(params)?)),
        );
    }

    /// Bind a notification handler that wants the raw params value.
    pub fn notification_raw<F>(&mut self, method: &'static str, handler: F)
    where
        F: Fn(&mut ServerState, &Value) -> Result<(), HandlerError> + 'static,
    {
        self.method2notification.insert(method, Box::new(handler));
    }

    /// Bind a request handler with a typed parameter shape.
    pub fn request<P, F>(&mut self, method: &'static str, handler: F)
    where
        P: DeserializeOwned + 'static,
        F: Fn(&mut ServerState, P, &mut ReplyOnce) -> Result<(), HandlerError> + 'static,
    {
        self.method2request.insert(
            method,
            Box::new(move |state, params, reply| handler(state, decode::<P>(params)?, reply)),
        );
    }

    /// Bind a request handler that wants the raw params value.
    pub fn request_raw<F>(&mut self, method: &'static str, handler: F)
    where
        F: Fn(&mut ServerState, &Value, &mut ReplyOnce) -> Result<(), HandlerError> + 'static,
    {
        self.method2request.insert(method, Box::new(handler));
    }

    /// Dispatch one message to completion.
    ///
    /// Requests get exactly one reply. A [`NotIndexed`] failure is returned
    /// to the caller instead of being replied to; everything else becomes a
    /// structured error reply. Notification failures are swallowed and
    /// surfaced as a best-effort `window/showMessage`; unknown notifications
    /// are silently dropped.
    pub fn run(&self, state: &mut ServerState, msg: &InMessage) -> Result<(), NotIndexed> {
        let method = msg.method.as_str();
        if let Some(id) = &msg.id {
            let mut reply = ReplyOnce::new(
                state.sink.clone(),
                id.clone(),
                state.config.reply_settings(),
            );
            match self.method2request.get(method) {
                Some(handler) => match handler(state, &msg.params, &mut reply) {
                    Ok(()) => {
                        debug_assert!(
                            reply.sent(),
                            "handler for {method} returned without replying"
                        );
                    }
                    Err(HandlerError::Decode(err)) => {
                        reply.error(
                            ErrorCode::InvalidParams,
                            format!(
                                "invalid params of {method}: expected {} for {}",
                                err.expected, err.path
                            ),
                        );
                    }
                    Err(HandlerError::NotIndexed(err)) => return Err(err),
                    Err(err) => {
                        warn!(method, error = %err, "request handler failed");
                        reply.error(
                            ErrorCode::InternalError,
                            format!("failed to process {method}"),
                        );
                    }
                },
                None => {
                    reply.error(
                        ErrorCode::MethodNotFound,
                        format!("unknown request {method}"),
                    );
                }
            }
        } else if let Some(handler) = self.method2notification.get(method) {
            if let Err(err) = handler(state, &msg.params) {
                warn!(method, error = %err, "notification handler failed");
                sink::show_message(
                    state.sink.as_ref(),
                    MessageType::Error,
                    format!("failed to process {method}"),
                );
            }
        } else {
            debug!(method, "ignoring unknown notification");
        }
        Ok(())
    }
}

fn decode<P: DeserializeOwned>(params: &Value) -> Result<P, HandlerError> {
    serde_path_to_error::deserialize(params.clone()).map_err(|err| {
        HandlerError::Decode(ParamDecodeError {
            expected: short_type_name::<P>(),
            path: err.path().to_string(),
            detail: err.inner().to_string(),
        })
    })
}

/// Last path segment of a type name: `proto::TextDocumentParam` becomes
/// `TextDocumentParam`.
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

// ============================================================================
// Tests
// ============================================================================
