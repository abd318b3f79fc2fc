//! End-to-end dispatch flow: a built index snapshot, the full method
//! table, and a recording sink standing in for the transport.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};

use loupe::dispatch::MessageHandler;
use loupe::handlers;
use loupe::proto::{InMessage, OutMessage, RequestId};
use loupe::server;
use loupe::sink::OutboundSink;
use loupe::state::ServerState;
use loupe_core::index::{
    RefKind, SpellLocation, SymbolDef, SymbolIndex, SymbolKey, SymbolKind,
};
use loupe_core::position::{Pos, Range};

#[derive(Default)]
struct RecordingSink {
    messages: RefCell<Vec<OutMessage>>,
}

impl OutboundSink for RecordingSink {
    fn send(&self, message: OutMessage) {
        self.messages.borrow_mut().push(message);
    }
}

impl RecordingSink {
    fn drain_json(&self) -> Vec<Value> {
        self.messages
            .borrow_mut()
            .drain(..)
            .map(|m| serde_json::to_value(&m).unwrap())
            .collect()
    }
}

fn range(l1: u16, c1: i16, l2: u16, c2: i16) -> Range {
    Range::new(Pos::new(l1.into(), c1), Pos::new(l2.into(), c2))
}

fn def(name: &str, kind: SymbolKind, spell: Option<(&str, Range)>) -> SymbolDef {
    SymbolDef {
        name: name.to_string(),
        kind,
        parent_kind: SymbolKind::Namespace,
        storage: Default::default(),
        spell: spell.map(|(path, range)| SpellLocation {
            path: path.to_string(),
            range,
        }),
        type_usr: None,
    }
}

const MAIN: &str = "/w/a.cc";
const MAIN_TEXT: &str = "struct Widget {};\nWidget w;\nWidget make();\n";

/// Widget (type, usr 1) defined on line 0, used on lines 1 and 2; variable
/// `w` (usr 2) of type Widget; function `make` (usr 3).
fn fixture_index() -> SymbolIndex {
    let mut db = SymbolIndex::new();
    let widget = SymbolKey {
        usr: 1,
        kind: RefKind::Type,
    };
    let w = SymbolKey {
        usr: 2,
        kind: RefKind::Var,
    };
    let make = SymbolKey {
        usr: 3,
        kind: RefKind::Func,
    };
    db.define(
        widget,
        def("Widget", SymbolKind::Class, Some((MAIN, range(0, 7, 0, 13)))),
    );
    let mut w_def = def("w", SymbolKind::Variable, Some((MAIN, range(1, 7, 1, 8))));
    w_def.type_usr = Some(1);
    db.define(w, w_def);
    db.define(
        make,
        def("make", SymbolKind::Function, Some((MAIN, range(2, 7, 2, 11)))),
    );

    db.add_occurrence(MAIN, widget, range(0, 7, 0, 13), 1);
    db.add_occurrence(MAIN, widget, range(1, 0, 1, 6), 1);
    db.add_occurrence(MAIN, widget, range(2, 0, 2, 6), 1);
    db.add_occurrence(MAIN, w, range(1, 7, 1, 8), 1);
    db.add_occurrence(MAIN, make, range(2, 7, 2, 11), 1);
    db.add_file(MAIN).skipped_ranges.push(range(2, 0, 2, 14));
    db
}

fn fixture() -> (Rc<RecordingSink>, ServerState, MessageHandler) {
    let sink = Rc::new(RecordingSink::default());
    let mut state = ServerState::new(sink.clone());
    state.db = fixture_index();
    (sink, state, handlers::message_handler())
}

fn request(id: i64, method: &str, params: Value) -> InMessage {
    InMessage {
        id: Some(RequestId::Number(id)),
        method: method.to_string(),
        params,
    }
}

fn notification(method: &str, params: Value) -> InMessage {
    InMessage {
        id: None,
        method: method.to_string(),
        params,
    }
}

fn did_open(path: &str, text: &str) -> InMessage {
    notification(
        "textDocument/didOpen",
        json!({"textDocument": {"uri": format!("file://{path}"), "text": text}}),
    )
}

fn position_params(path: &str, line: u32, character: u32) -> Value {
    json!({
        "textDocument": {"uri": format!("file://{path}")},
        "position": {"line": line, "character": character}
    })
}

#[test]
fn did_open_publishes_skipped_ranges_and_highlight() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &did_open(MAIN, MAIN_TEXT))
        .unwrap();
    let messages = sink.drain_json();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["method"], "$loupe/publishSkippedRanges");
    assert_eq!(
        messages[0]["params"]["skippedRanges"][0]["start"]["line"],
        2
    );
    assert_eq!(messages[1]["method"], "$loupe/publishSemanticHighlight");
    let symbols = messages[1]["params"]["symbols"].as_array().unwrap();
    // Widget, w, and make all survive; everything is grouped per symbol.
    assert_eq!(symbols.len(), 3);
    let widget = &symbols[0];
    assert_eq!(widget["kind"], 5);
    assert_eq!(widget["ranges"].as_array().unwrap().len(), 3);
}

#[test]
fn definition_replies_locations_without_link_support() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &did_open(MAIN, MAIN_TEXT))
        .unwrap();
    sink.drain_json();

    // Cursor on the Widget use in "Widget w;".
    handler
        .run(
            &mut state,
            &request(1, "textDocument/definition", position_params(MAIN, 1, 2)),
        )
        .unwrap();
    let messages = sink.drain_json();
    assert_eq!(messages.len(), 1, "exactly one reply");
    let result = messages[0]["result"].as_array().unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["uri"], format!("file://{MAIN}"));
    assert_eq!(result[0]["range"]["start"]["character"], 7);
    assert!(result[0].get("targetUri").is_none());
}

#[test]
fn definition_replies_links_after_capability_negotiation() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(
            &mut state,
            &request(
                1,
                "initialize",
                json!({
                    "capabilities": {"textDocument": {"definition": {"linkSupport": true}}},
                    "initializationOptions": {"xref": {"maxNum": 50}}
                }),
            ),
        )
        .unwrap();
    handler
        .run(&mut state, &did_open(MAIN, MAIN_TEXT))
        .unwrap();
    sink.drain_json();

    handler
        .run(
            &mut state,
            &request(2, "textDocument/definition", position_params(MAIN, 1, 2)),
        )
        .unwrap();
    let messages = sink.drain_json();
    let result = messages[0]["result"].as_array().unwrap();
    assert_eq!(result[0]["targetUri"], format!("file://{MAIN}"));
    assert_eq!(result[0]["originSelectionRange"]["start"]["line"], 1);
}

#[test]
fn type_definition_follows_the_variable_type() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &did_open(MAIN, MAIN_TEXT))
        .unwrap();
    sink.drain_json();

    // Cursor on `w`.
    handler
        .run(
            &mut state,
            &request(1, "textDocument/typeDefinition", position_params(MAIN, 1, 7)),
        )
        .unwrap();
    let messages = sink.drain_json();
    let result = messages[0]["result"].as_array().unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["range"]["start"]["line"], 0);
    assert_eq!(result[0]["range"]["start"]["character"], 7);
}

#[test]
fn references_collects_all_occurrences() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &did_open(MAIN, MAIN_TEXT))
        .unwrap();
    sink.drain_json();

    handler
        .run(
            &mut state,
            &request(1, "textDocument/references", position_params(MAIN, 0, 8)),
        )
        .unwrap();
    let messages = sink.drain_json();
    let result = messages[0]["result"].as_array().unwrap();
    assert_eq!(result.len(), 3);
}

#[test]
fn document_highlight_lists_in_file_occurrences() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &did_open(MAIN, MAIN_TEXT))
        .unwrap();
    sink.drain_json();

    handler
        .run(
            &mut state,
            &request(
                1,
                "textDocument/documentHighlight",
                position_params(MAIN, 1, 2),
            ),
        )
        .unwrap();
    let messages = sink.drain_json();
    let result = messages[0]["result"].as_array().unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result[0]["range"]["start"]["line"], 0);
}

#[test]
fn navigate_moves_to_the_next_symbol_range() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &did_open(MAIN, MAIN_TEXT))
        .unwrap();
    sink.drain_json();

    handler
        .run(
            &mut state,
            &request(
                1,
                "$loupe/navigate",
                json!({
                    "textDocument": {"uri": format!("file://{MAIN}")},
                    "position": {"line": 0, "character": 8},
                    "direction": "D"
                }),
            ),
        )
        .unwrap();
    let messages = sink.drain_json();
    let result = &messages[0]["result"];
    assert_eq!(result["range"]["start"]["line"], 1);
    assert_eq!(result["range"]["start"]["character"], 0);
}

#[test]
fn workspace_symbol_searches_definition_names() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(
            &mut state,
            &request(1, "workspace/symbol", json!({"query": "widget"})),
        )
        .unwrap();
    let messages = sink.drain_json();
    let result = messages[0]["result"].as_array().unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["name"], "Widget");
    assert_eq!(result[0]["kind"], 5);
}

#[test]
fn unknown_request_gets_method_not_found() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &request(9, "textDocument/hover", json!({})))
        .unwrap();
    let messages = sink.drain_json();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["error"]["code"], -32601);
}

#[test]
fn malformed_params_get_invalid_params_with_path() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(
            &mut state,
            &request(
                9,
                "textDocument/definition",
                json!({"textDocument": {"uri": 1}, "position": {"line": 0, "character": 0}}),
            ),
        )
        .unwrap();
    let messages = sink.drain_json();
    assert_eq!(messages[0]["error"]["code"], -32602);
    let text = messages[0]["error"]["message"].as_str().unwrap();
    assert!(text.contains("textDocument.uri"), "{text}");
}

#[test]
fn unindexed_file_defers_then_fails_terminally() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &did_open("/w/b.cc", "int q;\n"))
        .unwrap();
    sink.drain_json();

    let msg = request(3, "textDocument/definition", position_params("/w/b.cc", 0, 4));
    let err = handler.run(&mut state, &msg).unwrap_err();
    assert_eq!(err.path, "/w/b.cc");
    assert!(sink.drain_json().is_empty(), "deferred, not replied");

    // The retry runs in the overdue state: no more indexing is coming.
    state.overdue = true;
    handler.run(&mut state, &msg).unwrap();
    let messages = sink.drain_json();
    assert_eq!(messages[0]["error"]["code"], -32600);
    assert_eq!(messages[0]["error"]["message"], "not indexed");
}

#[test]
fn shutdown_then_exit_reports_a_clean_exit() {
    let (sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &request(1, "shutdown", Value::Null))
        .unwrap();
    let messages = sink.drain_json();
    assert!(messages[0]["result"].is_null());
    handler
        .run(&mut state, &notification("exit", Value::Null))
        .unwrap();
    assert_eq!(state.exit_code, Some(0));
}

#[test]
fn exit_without_shutdown_reports_failure() {
    let (_sink, mut state, handler) = fixture();
    handler
        .run(&mut state, &notification("exit", Value::Null))
        .unwrap();
    assert_eq!(state.exit_code, Some(1));
}

#[test]
fn server_loop_processes_framed_messages_sequentially() {
    let (sink, mut state, handler) = fixture();
    let bodies = [
        json!({"jsonrpc": "2.0", "method": "textDocument/didOpen",
               "params": {"textDocument": {"uri": format!("file://{MAIN}"), "text": MAIN_TEXT}}}),
        json!({"jsonrpc": "2.0", "id": 1, "method": "textDocument/references",
               "params": position_params(MAIN, 0, 8)}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown"}),
        json!({"jsonrpc": "2.0", "method": "exit"}),
    ];
    let mut input = String::new();
    for body in &bodies {
        let body = serde_json::to_string(body).unwrap();
        input.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    }
    let mut reader = input.as_bytes();
    let code = server::run(&mut state, &handler, &mut reader);
    assert_eq!(code, 0);
    let messages = sink.drain_json();
    // Two notifications from didOpen, one references reply, one shutdown
    // reply.
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2]["id"], 1);
    assert_eq!(messages[3]["id"], 2);
}

#[test]
fn deferred_requests_are_retried_after_the_next_index_event() {
    let (sink, mut state, handler) = fixture();
    let open_b = json!({"jsonrpc": "2.0", "method": "textDocument/didOpen",
                        "params": {"textDocument": {"uri": "file:///w/b.cc", "text": "int q;\n"}}});
    let query_b = json!({"jsonrpc": "2.0", "id": 1, "method": "textDocument/definition",
                         "params": position_params("/w/b.cc", 0, 4)});
    let open_a = json!({"jsonrpc": "2.0", "method": "textDocument/didOpen",
                        "params": {"textDocument": {"uri": format!("file://{MAIN}"), "text": MAIN_TEXT}}});
    let exit = json!({"jsonrpc": "2.0", "method": "exit"});
    let mut input = String::new();
    for body in [&open_b, &query_b, &open_a, &exit] {
        let body = serde_json::to_string(body).unwrap();
        input.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    }
    let mut reader = input.as_bytes();
    server::run(&mut state, &handler, &mut reader);
    let messages = sink.drain_json();
    // The deferred definition request was retried after open_a and, with
    // the index still missing /w/b.cc, terminally rejected.
    let reply = messages
        .iter()
        .find(|m| m.get("id").and_then(Value::as_i64) == Some(1))
        .expect("deferred request eventually replied");
    assert_eq!(reply["error"]["message"], "not indexed");
}
