//! Source positions and ranges for the symbol index.
//!
//! Two coordinate systems live side by side in loupe:
//!
//! - **Index positions** ([`Pos`], [`Range`]): compact, bit-packable values
//!   recorded by the indexing pipeline. Lines are 0-indexed; a column of
//!   `-1` is the invalid sentinel.
//! - **Wire positions** ([`LsPosition`], [`LsRange`]): the protocol-side
//!   line/character pairs exchanged with the client.
//!
//! The index types are deliberately small so that a [`Range`] packs into a
//! single machine word for hashing. The default layout uses 16-bit line
//! numbers; the `wide-lines` cargo feature switches to 32-bit lines for
//! very large generated files.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Line number type selected by the active layout.
#[cfg(not(feature = "wide-lines"))]
pub type LineNum = u16;
/// Line number type selected by the active layout.
#[cfg(feature = "wide-lines")]
pub type LineNum = u32;

/// Largest representable line number in the active layout.
pub const LINE_NUM_MAX: LineNum = LineNum::MAX;

#[cfg(not(feature = "wide-lines"))]
type PackedPos = u32;
#[cfg(feature = "wide-lines")]
type PackedPos = u64;

// ============================================================================
// Pos
// ============================================================================

/// A position in an indexed file: 0-indexed line and column.
///
/// The derived ordering is lexicographic over `(line, column)`, which is
/// the total order every consumer relies on. Equality and hashing consider
/// only the packed bit pattern, so equal positions hash identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pos {
    pub line: LineNum,
    /// Column, or `-1` when the position is invalid.
    pub column: i16,
}

impl Pos {
    /// Create a position. Columns are 0-indexed; pass a non-negative value.
    pub fn new(line: LineNum, column: i16) -> Pos {
        Pos { line, column }
    }

    /// A position is valid iff its column is non-negative.
    pub fn valid(self) -> bool {
        self.column >= 0
    }

    /// Parse the compact `"line:column"` encoding.
    ///
    /// Returns `None` for anything that does not parse; an invalid position
    /// (`column == -1`) is representable and round-trips.
    pub fn from_string(encoded: &str) -> Option<Pos> {
        let (line, column) = encoded.split_once(':')?;
        Some(Pos {
            line: line.parse().ok()?,
            column: column.parse().ok()?,
        })
    }

    fn packed(self) -> PackedPos {
        ((self.line as PackedPos) << 16) | (self.column as u16 as PackedPos)
    }
}

impl Hash for Pos {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.packed().hash(state);
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ============================================================================
// Range
// ============================================================================

/// A half-open span `[start, end)` in an indexed file.
///
/// Valid iff `start` is valid. Ordering is by `start`, tie-broken by `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Range {
    pub start: Pos,
    pub end: Pos,
}

impl Range {
    /// Create a range. The start must be a valid position.
    pub fn new(start: Pos, end: Pos) -> Range {
        debug_assert!(start.valid(), "range constructed with invalid start");
        Range { start, end }
    }

    pub fn valid(self) -> bool {
        self.start.valid()
    }

    /// Half-open containment check.
    pub fn contains(self, line: LineNum, column: i16) -> bool {
        let p = Pos { line, column };
        self.start <= p && p < self.end
    }

    /// Parse the compact `"l1:c1-l2:c2"` encoding.
    pub fn from_string(encoded: &str) -> Option<Range> {
        let (start, end) = encoded.split_once('-')?;
        Some(Range {
            start: Pos::from_string(start)?,
            end: Pos::from_string(end)?,
        })
    }
}

impl Hash for Range {
    #[cfg(not(feature = "wide-lines"))]
    fn hash<H: Hasher>(&self, state: &mut H) {
        let packed = ((self.start.packed() as u64) << 32) | self.end.packed() as u64;
        packed.hash(state);
    }

    #[cfg(feature = "wide-lines")]
    fn hash<H: Hasher>(&self, state: &mut H) {
        let packed = ((self.start.packed() as u128) << 64) | self.end.packed() as u128;
        packed.hash(state);
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// The packing above assumes these exact layouts.
#[cfg(not(feature = "wide-lines"))]
const _: () = assert!(std::mem::size_of::<Range>() == 8);
#[cfg(feature = "wide-lines")]
const _: () = assert!(std::mem::size_of::<Range>() == 16);

// ============================================================================
// Wire positions
// ============================================================================

/// Protocol-side position: 0-indexed line and character.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LsPosition {
    pub line: u32,
    pub character: u32,
}

/// Protocol-side half-open range.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LsRange {
    pub start: LsPosition,
    pub end: LsPosition,
}

impl LsPosition {
    pub fn new(line: u32, character: u32) -> LsPosition {
        LsPosition { line, character }
    }
}

impl LsRange {
    pub fn new(start: LsPosition, end: LsPosition) -> LsRange {
        LsRange { start, end }
    }
}

// ============================================================================
// Tests
// ============================================================================
