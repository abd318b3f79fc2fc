//! The table of files the client currently has open.
//!
//! A working file carries the client's view of the buffer: the raw text
//! plus a line table used to map index-side positions onto it. Buffers are
//! rebuilt wholesale on every open/change event; nothing is diffed or
//! cached across events.

use std::collections::BTreeMap;

use crate::position::{LsPosition, LsRange, Range};

/// One open buffer.
#[derive(Debug, Clone)]
pub struct WorkingFile {
    pub path: String,
    pub buffer: String,
    /// The buffer split into lines, without terminators.
    pub lines: Vec<String>,
}

impl WorkingFile {
    pub fn new(path: String, buffer: String) -> WorkingFile {
        let lines = buffer.lines().map(str::to_owned).collect();
        WorkingFile {
            path,
            buffer,
            lines,
        }
    }

    /// Replace the buffer contents, rebuilding the line table.
    pub fn set_buffer(&mut self, text: String) {
        self.lines = text.lines().map(str::to_owned).collect();
        self.buffer = text;
    }

    /// Map an index range onto this buffer as a wire range.
    ///
    /// Returns `None` when the range is invalid or no longer fits the
    /// buffer's line table (the buffer may be newer than the index).
    pub fn ls_range(&self, range: Range) -> Option<LsRange> {
        if !range.start.valid() || !range.end.valid() {
            return None;
        }
        if range.start.line as usize >= self.lines.len()
            || range.end.line as usize >= self.lines.len()
        {
            return None;
        }
        Some(LsRange {
            start: LsPosition::new(u32::from(range.start.line), range.start.column as u32),
            end: LsPosition::new(u32::from(range.end.line), range.end.column as u32),
        })
    }
}

/// Convert an index range without a buffer to map against.
///
/// Used for locations in files the client does not have open; positions are
/// taken at face value.
pub fn ls_range_unmapped(range: Range) -> Option<LsRange> {
    if !range.start.valid() || !range.end.valid() {
        return None;
    }
    Some(LsRange {
        start: LsPosition::new(u32::from(range.start.line), range.start.column as u32),
        end: LsPosition::new(u32::from(range.end.line), range.end.column as u32),
    })
}

/// All open buffers, keyed by path.
#[derive(Debug, Default)]
pub struct WorkingFiles {
    files: BTreeMap<String, WorkingFile>,
}

impl WorkingFiles {
    pub fn new() -> WorkingFiles {
        WorkingFiles::default()
    }

    pub fn get(&self, path: &str) -> Option<&WorkingFile> {
        self.files.get(path)
    }

    pub fn open(&mut self, path: String, text: String) {
        self.files
            .insert(path.clone(), WorkingFile::new(path, text));
    }

    /// Replace the buffer of an open file. Unknown paths are ignored.
    pub fn change(&mut self, path: &str, text: String) {
        if let Some(file) = self.files.get_mut(path) {
            file.set_buffer(text);
        }
    }

    pub fn close(&mut self, path: &str) {
        self.files.remove(path);
    }
}
