//! Semantic highlight computation.
//!
//! Given a file's indexed occurrences and its working buffer, compute a
//! set of per-symbol, non-overlapping display ranges and publish them as a
//! single notification. Nothing survives the call: every relevant
//! open/change event triggers a full recomputation.
//!
//! The pipeline has four steps:
//!
//! 1. **Eligibility + grouping**: filter occurrences by refcount and by
//!    symbol-kind specific rules, then group survivors by symbol into
//!    accumulators.
//! 2. **Scan-line overlap resolution**: sweep interval open/close events
//!    in sorted order, attributing each covered span to the last-opened,
//!    still-open interval. Sweep events refer to their accumulator by
//!    index, so growing the accumulator vector never invalidates them.
//! 3. **Byte-offset projection** (optional): one forward scan over the
//!    buffer converts line/column ranges to byte offsets, counting columns
//!    in Unicode code points.
//! 4. **Emission**: symbols with no surviving ranges are dropped and the
//!    rest leave through the outbound sink.

use std::collections::HashMap;

use loupe_core::config::{HighlightConfig, HighlightFilter};
use loupe_core::index::{FileIndex, RefKind, StorageClass, SymbolIndex, SymbolKey, SymbolKind};
use loupe_core::position::{LsPosition, LsRange};
use loupe_core::working_files::WorkingFile;

use crate::proto::{
    DocumentUri, HighlightSymbol, OffsetRange, PublishSemanticHighlightParams,
    PublishSkippedRangesParams, NOTIFY_SEMANTIC_HIGHLIGHT, NOTIFY_SKIPPED_RANGES,
};
use crate::sink::{notify, OutboundSink};

/// Publish the preprocessor-skipped spans recorded by the indexer.
pub fn emit_skipped_ranges(wfile: &WorkingFile, file: &FileIndex, sink: &dyn OutboundSink) {
    let params = PublishSkippedRangesParams {
        uri: DocumentUri::from_path(&wfile.path),
        skipped_ranges: file
            .skipped_ranges
            .iter()
            .filter_map(|range| wfile.ls_range(*range))
            .collect(),
    };
    notify(sink, NOTIFY_SKIPPED_RANGES, &params);
}

/// Compute and publish the semantic highlight for one file.
pub fn emit_semantic_highlight(
    db: &SymbolIndex,
    wfile: &WorkingFile,
    file: &FileIndex,
    config: &HighlightConfig,
    filter: &HighlightFilter,
    sink: &dyn OutboundSink,
) {
    if wfile.buffer.len() > config.large_file_size || !filter.matches(&file.path) {
        return;
    }

    let mut symbols = group_eligible(db, wfile, file);
    resolve_overlaps(&mut symbols);
    if !config.ls_ranges {
        resolve_offsets(&mut symbols, &wfile.buffer);
    }

    let symbols: Vec<HighlightSymbol> = symbols
        .into_iter()
        .filter(|s| !s.ranges.is_empty() || !s.ls_ranges.is_empty())
        .collect();
    let params = PublishSemanticHighlightParams {
        uri: DocumentUri::from_path(&wfile.path),
        symbols,
    };
    notify(sink, NOTIFY_SEMANTIC_HIGHLIGHT, &params);
}

// ============================================================================
// Step 1: eligibility and grouping
// ============================================================================

fn group_eligible(db: &SymbolIndex, wfile: &WorkingFile, file: &FileIndex) -> Vec<HighlightSymbol> {
    let mut grouped: HashMap<SymbolKey, usize> = HashMap::new();
    let mut symbols: Vec<HighlightSymbol> = Vec::new();

    for occ in &file.symbols {
        if occ.refcount <= 0 {
            continue;
        }
        let Some(entry) = db.entry(occ.key) else {
            continue;
        };
        let mut range = occ.range;
        let (kind, parent_kind, storage) = match occ.key.kind {
            RefKind::Func => {
                let Some(def) = entry.any_def() else { continue };
                // Overloadable operators are not highlighted.
                if def.name.starts_with("operator") {
                    continue;
                }
                // The name must literally be spelled at the occurrence:
                // syntactic positions (e.g. implicit constructor calls) keep
                // their range for navigation but are not highlighted.
                let concise = def.concise_name();
                let Some(line) = wfile.lines.get(range.start.line as usize) else {
                    continue;
                };
                let Ok(start_col) = usize::try_from(range.start.column) else {
                    continue;
                };
                let line = line.as_bytes();
                if start_col + concise.len() > line.len()
                    || &line[start_col..start_col + concise.len()] != concise.as_bytes()
                {
                    continue;
                }
                range.end.line = range.start.line;
                range.end.column = range.start.column + concise.len() as i16;
                (def.kind, def.parent_kind, def.storage)
            }
            RefKind::Type | RefKind::Var => {
                let mut kind = SymbolKind::Unknown;
                let mut parent_kind = SymbolKind::Unknown;
                let mut storage = StorageClass::None;
                if let Some(def) = entry.any_def() {
                    kind = def.kind;
                    storage = def.storage;
                }
                // Parent kind comes from the first definition with a
                // concrete spelling location, when there is one.
                if let Some(def) = entry.defs.iter().find(|d| d.spell.is_some()) {
                    parent_kind = def.parent_kind;
                }
                (kind, parent_kind, storage)
            }
            RefKind::Invalid | RefKind::File => continue,
        };

        let Some(loc) = wfile.ls_range(range) else {
            continue;
        };
        let idx = match grouped.get(&occ.key) {
            Some(idx) => *idx,
            None => {
                let idx = symbols.len();
                symbols.push(HighlightSymbol {
                    id: entry.id,
                    parent_kind,
                    kind,
                    storage,
                    ranges: Vec::new(),
                    ls_ranges: Vec::new(),
                });
                grouped.insert(occ.key, idx);
                idx
            }
        };
        symbols[idx].ls_ranges.push(loc);
    }
    symbols
}

// ============================================================================
// Step 2: scan-line overlap resolution
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ScanLineEvent {
    pos: LsPosition,
    /// The interval's other endpoint, the tie-break key for events sharing
    /// a position.
    end_pos: LsPosition,
    /// Interval id for open events; bitwise complement of the id for close
    /// events.
    id: i32,
    /// Index of the owning accumulator in the symbols vector.
    sym: usize,
    kind: SymbolKind,
}

/// Rewrite each symbol's collected ranges into a non-overlapping partition.
///
/// Each range becomes an open event and a close event. Events are swept in
/// sorted order while a stack tracks the currently open intervals; every
/// span between consecutive event positions is attributed to the interval
/// on top of the stack. Closes only mark their interval; actual removal is
/// deferred to the pop-before-use check, which re-exposes the next
/// still-open interval underneath.
fn resolve_overlaps(symbols: &mut [HighlightSymbol]) {
    let mut events: Vec<ScanLineEvent> = Vec::new();
    let mut next_id: i32 = 0;
    for (sym, symbol) in symbols.iter_mut().enumerate() {
        let kind = symbol.kind;
        for loc in symbol.ls_ranges.drain(..) {
            events.push(ScanLineEvent {
                pos: loc.start,
                end_pos: loc.end,
                id: next_id,
                sym,
                kind,
            });
            events.push(ScanLineEvent {
                pos: loc.end,
                end_pos: loc.end,
                id: !next_id,
                sym,
                kind,
            });
            next_id += 1;
        }
    }

    // Position ascending; among equal positions the wider interval (larger
    // other endpoint) first, so that of two ranges sharing a start the
    // narrower is opened later and wins the overlap; then kind ascending,
    // which sorts macro events after every ordinary kind; then interval id.
    events.sort_unstable_by(|a, b| {
        a.pos
            .cmp(&b.pos)
            .then_with(|| b.end_pos.cmp(&a.end_pos))
            .then_with(|| (a.kind as u8).cmp(&(b.kind as u8)))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut deleted = vec![false; next_id.max(0) as usize];
    let mut stack: Vec<ScanLineEvent> = Vec::new();
    let mut prev_pos: Option<LsPosition> = None;
    for ev in &events {
        while stack.last().is_some_and(|top| deleted[top.id as usize]) {
            stack.pop();
        }
        if let (Some(top), Some(prev)) = (stack.last(), prev_pos) {
            // Attribute [prev, ev.pos) to the interval on top of the stack;
            // empty spans are never emitted.
            if prev != ev.pos {
                symbols[top.sym].ls_ranges.push(LsRange {
                    start: prev,
                    end: ev.pos,
                });
            }
        }
        if ev.id >= 0 {
            stack.push(*ev);
        } else {
            deleted[(!ev.id) as usize] = true;
        }
        prev_pos = Some(ev.pos);
    }
}

// ============================================================================
// Step 3: byte-offset projection
// ============================================================================

/// Forward-only cursor converting (line, code-point column) positions to
/// byte offsets in one pass over the buffer.
struct OffsetCursor<'a> {
    buf: &'a [u8],
    line: u32,
    col: u32,
    byte: usize,
}

impl<'a> OffsetCursor<'a> {
    fn new(buffer: &'a str) -> OffsetCursor<'a> {
        OffsetCursor {
            buf: buffer.as_bytes(),
            line: 0,
            col: 0,
            byte: 0,
        }
    }

    /// Advance to the given position and return its byte offset, or `None`
    /// when the buffer ends (or the line does) before reaching it. Columns
    /// count code points: a multi-byte sequence advances the column by one
    /// and the byte cursor by its full encoded width.
    fn advance_to(&mut self, line: u32, col: u32) -> Option<usize> {
        if self.line < line {
            self.col = 0;
        }
        while self.line < line && self.byte < self.buf.len() {
            if self.buf[self.byte] == b'\n' {
                self.line += 1;
            }
            self.byte += 1;
        }
        if self.line < line {
            return None;
        }
        while self.col < col && self.byte < self.buf.len() && self.buf[self.byte] != b'\n' {
            self.col += 1;
            let lead = self.buf[self.byte];
            self.byte += 1;
            if lead >= 0x80 {
                // Skip 0b10xxxxxx continuation bytes as a unit.
                while self.byte < self.buf.len() && (0x80..0xC0).contains(&self.buf[self.byte]) {
                    self.byte += 1;
                }
            }
        }
        if self.col < col {
            None
        } else {
            Some(self.byte)
        }
    }
}

/// Replace every symbol's line/column ranges with byte-offset pairs.
///
/// Ranges are gathered across all symbols and sorted by start so a single
/// forward scan suffices; a range whose position the scan cannot reach is
/// dropped silently.
fn resolve_offsets(symbols: &mut [HighlightSymbol], buffer: &str) {
    let mut scratch: Vec<(LsRange, usize)> = Vec::new();
    for (sym, symbol) in symbols.iter_mut().enumerate() {
        for range in symbol.ls_ranges.drain(..) {
            scratch.push((range, sym));
        }
    }
    scratch.sort_unstable_by_key(|(range, _)| range.start);

    let mut cursor = OffsetCursor::new(buffer);
    for (range, sym) in scratch {
        let Some(begin) = cursor.advance_to(range.start.line, range.start.character) else {
            continue;
        };
        let Some(end) = cursor.advance_to(range.end.line, range.end.character) else {
            continue;
        };
        symbols[sym].ranges.push(OffsetRange(begin, end));
    }
}

// ============================================================================
// Tests
// ============================================================================
