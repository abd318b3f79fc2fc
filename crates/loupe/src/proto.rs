//! Wire protocol types.
//!
//! loupe speaks a JSON-RPC 2.0 dialect over a framed transport: requests
//! carry an id and require exactly one reply, notifications carry no id
//! and have no reply path. This module defines the envelope types, the
//! error code enumeration, and the protocol-side value types used by the
//! method handlers and the outbound notifications.

use std::cmp::Ordering;

use loupe_core::index::{StorageClass, SymbolKind};
use loupe_core::position::{LsPosition, LsRange};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

// ============================================================================
// Envelope
// ============================================================================

pub const JSONRPC_VERSION: &str = "2.0";

/// Request correlation id. Clients send integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// An incoming message: a request when `id` is present, a notification
/// otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct InMessage {
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// An outgoing message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutMessage {
    Response {
        jsonrpc: &'static str,
        id: RequestId,
        result: Value,
    },
    ErrorResponse {
        jsonrpc: &'static str,
        id: RequestId,
        error: ResponseError,
    },
    Notification {
        jsonrpc: &'static str,
        method: &'static str,
        params: Value,
    },
}

impl OutMessage {
    pub fn response(id: RequestId, result: Value) -> OutMessage {
        OutMessage::Response {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }

    pub fn error(id: RequestId, code: ErrorCode, message: String) -> OutMessage {
        OutMessage::ErrorResponse {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: ResponseError {
                code: code.code(),
                message,
            },
        }
    }

    pub fn notification(method: &'static str, params: Value) -> OutMessage {
        OutMessage::Notification {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
}

/// Error codes used in replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

// ============================================================================
// URIs and locations
// ============================================================================

/// A document URI. Only `file://` URIs are produced; percent-escapes are
/// decoded when converting back to a path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentUri(pub String);

impl DocumentUri {
    pub fn from_path(path: &str) -> DocumentUri {
        DocumentUri(format!("file://{path}"))
    }

    pub fn to_path(&self) -> String {
        let raw = self.0.strip_prefix("file://").unwrap_or(&self.0);
        percent_decode(raw)
    }
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub uri: DocumentUri,
    pub range: LsRange,
}

/// A rich navigation target. Ordered by target, so that sorting and
/// deduplicating a candidate list is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationLink {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_selection_range: Option<LsRange>,
    pub target_uri: DocumentUri,
    pub target_range: LsRange,
    pub target_selection_range: LsRange,
}

impl Ord for LocationLink {
    fn cmp(&self, other: &LocationLink) -> Ordering {
        (
            &self.target_uri,
            self.target_range,
            self.target_selection_range,
            self.origin_selection_range,
        )
            .cmp(&(
                &other.target_uri,
                other.target_range,
                other.target_selection_range,
                other.origin_selection_range,
            ))
    }
}

impl PartialOrd for LocationLink {
    fn partial_cmp(&self, other: &LocationLink) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<LocationLink> for Location {
    /// Downgrade to a plain location, dropping the link-specific fields.
    fn from(link: LocationLink) -> Location {
        Location {
            uri: link.target_uri,
            range: link.target_selection_range,
        }
    }
}

// ============================================================================
// Request params
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentIdentifier {
    pub uri: DocumentUri,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: DocumentUri,
    #[serde(default)]
    pub language_id: String,
    #[serde(default)]
    pub version: i64,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentParam {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenTextDocumentParam {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentContentChangeEvent {
    #[serde(default)]
    pub range: Option<LsRange>,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentDidChangeParam {
    pub text_document: TextDocumentIdentifier,
    pub content_changes: Vec<TextDocumentContentChangeEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentPositionParam {
    pub text_document: TextDocumentIdentifier,
    pub position: LsPosition,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkspaceSymbolParam {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandParam {
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    pub uri: DocumentUri,
    #[serde(rename = "type", default)]
    pub change_type: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeWatchedFilesParam {
    pub changes: Vec<FileEvent>,
}

/// Params of the `$loupe/navigate` extension: move the cursor between
/// indexed symbol ranges.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParam {
    pub text_document: TextDocumentIdentifier,
    pub position: LsPosition,
    /// One of `"D"` (next), `"U"` (previous), `"R"` (first child),
    /// `"L"` (parent).
    #[serde(default)]
    pub direction: String,
}

// ============================================================================
// Initialize
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitializeParam {
    pub initialization_options: Option<loupe_core::config::Config>,
    pub capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientCapabilities {
    pub text_document: TextDocumentClientCapabilities,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextDocumentClientCapabilities {
    pub definition: LinkSupportCapability,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkSupportCapability {
    pub link_support: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    /// Full document sync.
    pub text_document_sync: u8,
    pub definition_provider: bool,
    pub declaration_provider: bool,
    pub type_definition_provider: bool,
    pub implementation_provider: bool,
    pub references_provider: bool,
    pub document_highlight_provider: bool,
    pub workspace_symbol_provider: bool,
}

impl Default for ServerCapabilities {
    fn default() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: 1,
            definition_provider: true,
            declaration_provider: true,
            type_definition_provider: true,
            implementation_provider: true,
            references_provider: true,
            document_highlight_provider: true,
            workspace_symbol_provider: true,
        }
    }
}

// ============================================================================
// Results and notifications
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInformation {
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentHighlight {
    pub range: LsRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Error = 1,
    Warning = 2,
    Info = 3,
    Log = 4,
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowMessageParams {
    #[serde(rename = "type")]
    pub typ: MessageType,
    pub message: String,
}

/// A pair of byte offsets into the raw buffer, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OffsetRange(pub usize, pub usize);

/// One symbol in a highlight notification. Also serves as the accumulator
/// the highlight engine groups display ranges into: exactly one of
/// `ranges` / `ls_ranges` is populated at emission time, depending on the
/// configured output mode.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSymbol {
    pub id: usize,
    pub parent_kind: SymbolKind,
    pub kind: SymbolKind,
    pub storage: StorageClass,
    pub ranges: Vec<OffsetRange>,
    pub ls_ranges: Vec<LsRange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishSemanticHighlightParams {
    pub uri: DocumentUri,
    pub symbols: Vec<HighlightSymbol>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSkippedRangesParams {
    pub uri: DocumentUri,
    pub skipped_ranges: Vec<LsRange>,
}

// Outbound notification methods.
pub const NOTIFY_SHOW_MESSAGE: &str = "window/showMessage";
pub const NOTIFY_SEMANTIC_HIGHLIGHT: &str = "$loupe/publishSemanticHighlight";
pub const NOTIFY_SKIPPED_RANGES: &str = "$loupe/publishSkippedRanges";

// ============================================================================
// Tests
// ============================================================================
