//! The method table and its handlers.
//!
//! Every handler receives the shared [`ServerState`] explicitly. The table
//! covers lifecycle, document sync, the navigation queries the symbol
//! index can serve, the workspace methods, and the `$loupe/navigate`
//! extension. Editing-assistance methods (completion, hover, formatting)
//! need a compiler frontend and are not registered.

use std::collections::BTreeSet;

use loupe_core::config::HighlightFilter;
use loupe_core::index::{RefKind, SymbolDef, SymbolKey};
use loupe_core::position::{LineNum, LsPosition, LsRange, Pos, Range, LINE_NUM_MAX};
use loupe_core::working_files::ls_range_unmapped;
use serde_json::Value;
use tracing::{debug, info};

use crate::dispatch::{HandlerError, MessageHandler};
use crate::highlight;
use crate::proto::{
    DidChangeWatchedFilesParam, DidOpenTextDocumentParam, DocumentHighlight, DocumentUri,
    ErrorCode, ExecuteCommandParam, InitializeParam, InitializeResult, Location, LocationLink,
    NavigateParam, ServerCapabilities, SymbolInformation, TextDocumentDidChangeParam,
    TextDocumentParam, TextDocumentPositionParam, WorkspaceSymbolParam,
};
use crate::reply::ReplyOnce;
use crate::state::ServerState;

/// Build the full method table.
pub fn message_handler() -> MessageHandler {
    let mut h = MessageHandler::new();
    h.request("initialize", initialize);
    h.notification_raw("initialized", initialized);
    h.request_raw("shutdown", shutdown);
    h.notification_raw("exit", exit);
    h.notification("textDocument/didOpen", did_open);
    h.notification("textDocument/didChange", did_change);
    h.notification("textDocument/didSave", did_save);
    h.notification("textDocument/didClose", did_close);
    h.request("textDocument/definition", definition);
    h.request("textDocument/declaration", definition);
    h.request("textDocument/typeDefinition", type_definition);
    h.request("textDocument/implementation", implementation);
    h.request("textDocument/references", references);
    h.request("textDocument/documentHighlight", document_highlight);
    h.request("workspace/symbol", workspace_symbol);
    h.notification_raw("workspace/didChangeConfiguration", did_change_configuration);
    h.notification("workspace/didChangeWatchedFiles", did_change_watched_files);
    h.notification_raw(
        "workspace/didChangeWorkspaceFolders",
        did_change_workspace_folders,
    );
    h.request("workspace/executeCommand", execute_command);
    h.request("$loupe/navigate", navigate);
    h
}

// ============================================================================
// Lifecycle
// ============================================================================

fn initialize(
    state: &mut ServerState,
    param: InitializeParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    if let Some(config) = param.initialization_options {
        state.highlight_filter =
            HighlightFilter::new(&config.highlight.whitelist, &config.highlight.blacklist)
                .map_err(|err| HandlerError::Internal(err.to_string()))?;
        state.config = config;
    }
    state.config.client.link_support = param.capabilities.text_document.definition.link_support;
    info!(
        link_support = state.config.client.link_support,
        "initialized"
    );
    reply.success(&InitializeResult {
        capabilities: ServerCapabilities::default(),
    });
    Ok(())
}

fn initialized(_state: &mut ServerState, _params: &Value) -> Result<(), HandlerError> {
    debug!("client finished initialization");
    Ok(())
}

fn shutdown(
    state: &mut ServerState,
    _params: &Value,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    state.shutdown_requested = true;
    reply.success(&Value::Null);
    Ok(())
}

fn exit(state: &mut ServerState, _params: &Value) -> Result<(), HandlerError> {
    state.exit_code = Some(if state.shutdown_requested { 0 } else { 1 });
    Ok(())
}

// ============================================================================
// Document sync
// ============================================================================

fn did_open(state: &mut ServerState, param: DidOpenTextDocumentParam) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    state.wfiles.open(path.clone(), param.text_document.text);
    publish_file_state(state, &path);
    Ok(())
}

fn did_change(
    state: &mut ServerState,
    param: TextDocumentDidChangeParam,
) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    // Full sync: the last change carries the whole buffer.
    let mut changes = param.content_changes;
    if let Some(change) = changes.pop() {
        state.wfiles.change(&path, change.text);
    }
    publish_file_state(state, &path);
    Ok(())
}

fn did_save(state: &mut ServerState, param: TextDocumentParam) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    publish_file_state(state, &path);
    Ok(())
}

fn did_close(state: &mut ServerState, param: TextDocumentParam) -> Result<(), HandlerError> {
    state.wfiles.close(&param.text_document.uri.to_path());
    Ok(())
}

/// Re-derive and publish everything we compute for an open, indexed file.
fn publish_file_state(state: &ServerState, path: &str) {
    let Some(wfile) = state.wfiles.get(path) else {
        return;
    };
    let Some(file) = state.db.file(path) else {
        return;
    };
    highlight::emit_skipped_ranges(wfile, file, state.sink.as_ref());
    highlight::emit_semantic_highlight(
        &state.db,
        wfile,
        file,
        &state.config.highlight,
        &state.highlight_filter,
        state.sink.as_ref(),
    );
}

// ============================================================================
// Navigation
// ============================================================================

/// Clamp a wire position into the index coordinate space.
fn index_pos(position: LsPosition) -> Pos {
    Pos::new(
        LineNum::try_from(position.line).unwrap_or(LINE_NUM_MAX),
        position.character.min(i16::MAX as u32) as i16,
    )
}

/// Map an index range in some file onto the client's view of it.
fn ls_range_in(state: &ServerState, path: &str, range: Range) -> Option<LsRange> {
    match state.wfiles.get(path) {
        Some(wfile) => wfile.ls_range(range),
        None => ls_range_unmapped(range),
    }
}

fn push_spell_link(
    state: &ServerState,
    origin: Option<LsRange>,
    def: &SymbolDef,
    links: &mut Vec<LocationLink>,
) {
    let Some(spell) = &def.spell else { return };
    let Some(target) = ls_range_in(state, &spell.path, spell.range) else {
        return;
    };
    links.push(LocationLink {
        origin_selection_range: origin,
        target_uri: DocumentUri::from_path(&spell.path),
        target_range: target,
        target_selection_range: target,
    });
}

fn definition(
    state: &mut ServerState,
    param: TextDocumentPositionParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    let Some((file, wfile)) = state.find_or_fail(&path, reply)? else {
        return Ok(());
    };
    let pos = index_pos(param.position);
    let mut links = Vec::new();
    for occ in file.symbols_at(pos) {
        let Some(entry) = state.db.entry(occ.key) else {
            continue;
        };
        let origin = wfile.ls_range(occ.range);
        for def in &entry.defs {
            push_spell_link(state, origin, def, &mut links);
        }
    }
    reply.reply_location_link(links);
    Ok(())
}

fn type_definition(
    state: &mut ServerState,
    param: TextDocumentPositionParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    let Some((file, wfile)) = state.find_or_fail(&path, reply)? else {
        return Ok(());
    };
    let pos = index_pos(param.position);
    let mut links = Vec::new();
    for occ in file.symbols_at(pos) {
        let Some(entry) = state.db.entry(occ.key) else {
            continue;
        };
        let origin = wfile.ls_range(occ.range);
        let type_keys: Vec<SymbolKey> = match occ.key.kind {
            RefKind::Var => entry
                .defs
                .iter()
                .filter_map(|def| def.type_usr)
                .map(|usr| SymbolKey {
                    usr,
                    kind: RefKind::Type,
                })
                .collect(),
            RefKind::Type => vec![occ.key],
            _ => Vec::new(),
        };
        for key in type_keys {
            let Some(type_entry) = state.db.entry(key) else {
                continue;
            };
            for def in &type_entry.defs {
                push_spell_link(state, origin, def, &mut links);
            }
        }
    }
    reply.reply_location_link(links);
    Ok(())
}

fn implementation(
    state: &mut ServerState,
    param: TextDocumentPositionParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    let Some((file, wfile)) = state.find_or_fail(&path, reply)? else {
        return Ok(());
    };
    let pos = index_pos(param.position);
    let mut links = Vec::new();
    for occ in file.symbols_at(pos) {
        let Some(entry) = state.db.entry(occ.key) else {
            continue;
        };
        let origin = wfile.ls_range(occ.range);
        for usr in &entry.derived {
            let key = SymbolKey {
                usr: *usr,
                kind: occ.key.kind,
            };
            let Some(derived_entry) = state.db.entry(key) else {
                continue;
            };
            for def in &derived_entry.defs {
                push_spell_link(state, origin, def, &mut links);
            }
        }
    }
    reply.reply_location_link(links);
    Ok(())
}

fn references(
    state: &mut ServerState,
    param: TextDocumentPositionParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    let Some((file, _wfile)) = state.find_or_fail(&path, reply)? else {
        return Ok(());
    };
    let pos = index_pos(param.position);
    let keys: BTreeSet<SymbolKey> = file.symbols_at(pos).map(|occ| occ.key).collect();
    let mut locations = Vec::new();
    for f in state.db.files() {
        for occ in &f.symbols {
            if occ.refcount > 0 && keys.contains(&occ.key) {
                if let Some(range) = ls_range_in(state, &f.path, occ.range) {
                    locations.push(Location {
                        uri: DocumentUri::from_path(&f.path),
                        range,
                    });
                }
            }
        }
    }
    locations.sort();
    locations.dedup();
    locations.truncate(state.config.xref.max_num);
    reply.success(&locations);
    Ok(())
}

fn document_highlight(
    state: &mut ServerState,
    param: TextDocumentPositionParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    let Some((file, wfile)) = state.find_or_fail(&path, reply)? else {
        return Ok(());
    };
    let pos = index_pos(param.position);
    let keys: BTreeSet<SymbolKey> = file.symbols_at(pos).map(|occ| occ.key).collect();
    let highlights: Vec<DocumentHighlight> = file
        .symbols
        .iter()
        .filter(|occ| occ.refcount > 0 && keys.contains(&occ.key))
        .filter_map(|occ| wfile.ls_range(occ.range))
        .map(|range| DocumentHighlight { range })
        .collect();
    reply.success(&highlights);
    Ok(())
}

// ============================================================================
// Workspace
// ============================================================================

fn workspace_symbol(
    state: &mut ServerState,
    param: WorkspaceSymbolParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    let mut results = Vec::new();
    for (_, def) in state.db.name_search(&param.query, state.config.xref.max_num) {
        let Some(spell) = &def.spell else { continue };
        let Some(range) = ls_range_in(state, &spell.path, spell.range) else {
            continue;
        };
        results.push(SymbolInformation {
            name: def.name.clone(),
            kind: def.kind,
            location: Location {
                uri: DocumentUri::from_path(&spell.path),
                range,
            },
        });
    }
    reply.success(&results);
    Ok(())
}

fn did_change_configuration(_state: &mut ServerState, _params: &Value) -> Result<(), HandlerError> {
    // Configuration is fixed at initialize time; dynamic updates are
    // accepted and ignored.
    debug!("workspace configuration changed");
    Ok(())
}

fn did_change_watched_files(
    _state: &mut ServerState,
    param: DidChangeWatchedFilesParam,
) -> Result<(), HandlerError> {
    debug!(changes = param.changes.len(), "watched files changed");
    Ok(())
}

fn did_change_workspace_folders(
    _state: &mut ServerState,
    _params: &Value,
) -> Result<(), HandlerError> {
    debug!("workspace folders changed");
    Ok(())
}

fn execute_command(
    _state: &mut ServerState,
    param: ExecuteCommandParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    reply.error(
        ErrorCode::InvalidRequest,
        format!("unknown command {}", param.command),
    );
    Ok(())
}

// ============================================================================
// Extensions
// ============================================================================

/// Move between indexed symbol ranges: `"D"`/`"U"` step to the next or
/// previous range, `"R"` descends into the innermost range under the
/// cursor, `"L"` ascends to its enclosing range.
fn navigate(
    state: &mut ServerState,
    param: NavigateParam,
    reply: &mut ReplyOnce,
) -> Result<(), HandlerError> {
    let path = param.text_document.uri.to_path();
    let Some((file, wfile)) = state.find_or_fail(&path, reply)? else {
        return Ok(());
    };
    let pos = index_pos(param.position);
    let mut ranges: Vec<Range> = file
        .symbols
        .iter()
        .filter(|occ| occ.refcount > 0)
        .map(|occ| occ.range)
        .collect();
    ranges.sort();
    ranges.dedup();

    let innermost = |candidates: &mut dyn Iterator<Item = Range>| -> Option<Range> {
        candidates.max_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)))
    };
    let current = innermost(&mut ranges.iter().copied().filter(|r| r.contains(pos.line, pos.column)));

    let target = match param.direction.as_str() {
        "D" => ranges.iter().copied().find(|r| r.start > pos),
        "U" => ranges.iter().rev().copied().find(|r| r.start < pos),
        "R" => current.and_then(|c| {
            ranges
                .iter()
                .copied()
                .find(|r| *r != c && c.start <= r.start && r.end <= c.end)
        }),
        "L" => current.and_then(|c| {
            innermost(
                &mut ranges
                    .iter()
                    .copied()
                    .filter(|r| *r != c && r.start <= c.start && c.end <= r.end),
            )
        }),
        _ => None,
    };

    match target.and_then(|r| wfile.ls_range(r)) {
        Some(range) => reply.success(&Location {
            uri: param.text_document.uri.clone(),
            range,
        }),
        None => reply.success(&Value::Null),
    }
    Ok(())
}
