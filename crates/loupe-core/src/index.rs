//! Read-only view over the symbol index.
//!
//! The index itself is produced by an external indexing pipeline; this
//! module defines the query surface the server reads from plus the builder
//! surface the pipeline (and the tests) populate it through.
//!
//! A [`SymbolIndex`] is treated as an immutable snapshot: the pipeline
//! replaces it wholesale between messages, so the server side never locks.
//! That boundary is a documented contract, not something enforced here.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::position::{Pos, Range};

/// Unique symbol id assigned by the indexer, stable across files.
pub type Usr = u64;

// ============================================================================
// Kinds
// ============================================================================

/// Which symbol table an occurrence refers into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RefKind {
    Invalid = 0,
    File = 1,
    Func = 2,
    Type = 3,
    Var = 4,
}

/// Display kind of a symbol.
///
/// Values 1..=26 are the standard protocol symbol kinds; the high values
/// are loupe extensions. The numeric order doubles as the tie-break order
/// of the highlight scan-line sort, so `Macro` being last means macros
/// never visually override ordinary symbols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SymbolKind {
    #[default]
    Unknown = 0,
    File = 1,
    Module = 2,
    Namespace = 3,
    Package = 4,
    Class = 5,
    Method = 6,
    Property = 7,
    Field = 8,
    Constructor = 9,
    Enum = 10,
    Interface = 11,
    Function = 12,
    Variable = 13,
    Constant = 14,
    String = 15,
    Number = 16,
    Boolean = 17,
    Array = 18,
    Object = 19,
    Key = 20,
    Null = 21,
    EnumMember = 22,
    Struct = 23,
    Event = 24,
    Operator = 25,
    TypeParameter = 26,

    TypeAlias = 252,
    Parameter = 253,
    StaticMethod = 254,
    Macro = 255,
}

/// Storage class of a symbol definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StorageClass {
    #[default]
    None = 0,
    Extern = 1,
    Static = 2,
    PrivateExtern = 3,
    Auto = 4,
    Register = 5,
}

// Both kinds go over the wire as bare numbers.
impl Serialize for SymbolKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl Serialize for StorageClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

// ============================================================================
// Symbols
// ============================================================================

/// Identifies one symbol across the whole index. Usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolKey {
    pub usr: Usr,
    pub kind: RefKind,
}

/// Where a definition's name is spelled out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpellLocation {
    pub path: String,
    pub range: Range,
}

/// One definition of a symbol, as recorded by the indexer.
#[derive(Debug, Clone)]
pub struct SymbolDef {
    /// Short, unqualified name (may carry template arguments).
    pub name: String,
    pub kind: SymbolKind,
    pub parent_kind: SymbolKind,
    pub storage: StorageClass,
    /// Concrete spelling location, when the definition has one.
    pub spell: Option<SpellLocation>,
    /// For variables: the symbol of their type, when resolved.
    pub type_usr: Option<Usr>,
}

impl SymbolDef {
    /// The name with template arguments stripped.
    pub fn concise_name(&self) -> &str {
        match self.name.find('<') {
            Some(i) => &self.name[..i],
            None => &self.name,
        }
    }
}

/// All index data for one symbol: its stable id and its definitions.
#[derive(Debug, Clone, Default)]
pub struct SymbolEntry {
    /// Stable per-index id, used as the wire id of a highlight symbol.
    pub id: usize,
    pub defs: Vec<SymbolDef>,
    /// Symbols derived from this one (overrides, subclasses).
    pub derived: Vec<Usr>,
}

impl SymbolEntry {
    pub fn any_def(&self) -> Option<&SymbolDef> {
        self.defs.first()
    }
}

// ============================================================================
// Files
// ============================================================================

/// One concrete appearance of a symbol within a file.
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub key: SymbolKey,
    pub range: Range,
    /// Signed reference count; occurrences with count <= 0 are not
    /// display-worthy.
    pub refcount: i32,
}

/// Per-file slice of the index.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    pub path: String,
    pub symbols: Vec<Occurrence>,
    /// Preprocessor-skipped spans recorded by the indexer.
    pub skipped_ranges: Vec<Range>,
}

impl FileIndex {
    /// All occurrences whose range contains the position.
    pub fn symbols_at(&self, pos: Pos) -> impl Iterator<Item = &Occurrence> {
        self.symbols
            .iter()
            .filter(move |occ| occ.range.contains(pos.line, pos.column))
    }
}

// ============================================================================
// Index
// ============================================================================

/// The whole-index snapshot the server queries.
///
/// Tables are `BTreeMap`s so iteration order (and therefore every derived
/// result list) is deterministic.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    files: BTreeMap<String, FileIndex>,
    funcs: BTreeMap<Usr, SymbolEntry>,
    types: BTreeMap<Usr, SymbolEntry>,
    vars: BTreeMap<Usr, SymbolEntry>,
    next_id: usize,
}

impl SymbolIndex {
    pub fn new() -> SymbolIndex {
        SymbolIndex::default()
    }

    pub fn file(&self, path: &str) -> Option<&FileIndex> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileIndex> {
        self.files.values()
    }

    /// Look up the entry for a symbol key. `Invalid` and `File` keys have
    /// no table and resolve to `None`.
    pub fn entry(&self, key: SymbolKey) -> Option<&SymbolEntry> {
        self.table(key.kind)?.get(&key.usr)
    }

    fn table(&self, kind: RefKind) -> Option<&BTreeMap<Usr, SymbolEntry>> {
        match kind {
            RefKind::Func => Some(&self.funcs),
            RefKind::Type => Some(&self.types),
            RefKind::Var => Some(&self.vars),
            RefKind::Invalid | RefKind::File => None,
        }
    }

    fn table_mut(&mut self, kind: RefKind) -> Option<&mut BTreeMap<Usr, SymbolEntry>> {
        match kind {
            RefKind::Func => Some(&mut self.funcs),
            RefKind::Type => Some(&mut self.types),
            RefKind::Var => Some(&mut self.vars),
            RefKind::Invalid | RefKind::File => None,
        }
    }

    /// Case-insensitive substring search over definition names.
    pub fn name_search(&self, query: &str, limit: usize) -> Vec<(SymbolKey, &SymbolDef)> {
        let needle = query.to_lowercase();
        let mut out = Vec::new();
        for (kind, table) in [
            (RefKind::Func, &self.funcs),
            (RefKind::Type, &self.types),
            (RefKind::Var, &self.vars),
        ] {
            for (usr, entry) in table {
                let Some(def) = entry.any_def() else { continue };
                if needle.is_empty() || def.name.to_lowercase().contains(&needle) {
                    out.push((SymbolKey { usr: *usr, kind }, def));
                    if out.len() >= limit {
                        return out;
                    }
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Builder surface (used by the indexing pipeline and by tests)
    // ------------------------------------------------------------------

    /// Register a file, returning a handle to fill in its occurrences.
    pub fn add_file(&mut self, path: &str) -> &mut FileIndex {
        self.files.entry(path.to_string()).or_insert_with(|| FileIndex {
            path: path.to_string(),
            ..FileIndex::default()
        })
    }

    /// Record a definition for a symbol, assigning its stable id on first
    /// sight. Returns the id, or `None` for keys that have no table.
    pub fn define(&mut self, key: SymbolKey, def: SymbolDef) -> Option<usize> {
        let next_id = &mut self.next_id;
        let table = match key.kind {
            RefKind::Func => &mut self.funcs,
            RefKind::Type => &mut self.types,
            RefKind::Var => &mut self.vars,
            RefKind::Invalid | RefKind::File => return None,
        };
        let entry = table.entry(key.usr).or_insert_with(|| {
            let id = *next_id;
            *next_id += 1;
            SymbolEntry {
                id,
                ..SymbolEntry::default()
            }
        });
        entry.defs.push(def);
        Some(entry.id)
    }

    /// Record a derived relation (override, subclass) on a symbol.
    pub fn add_derived(&mut self, key: SymbolKey, derived: Usr) {
        if let Some(table) = self.table_mut(key.kind) {
            if let Some(entry) = table.get_mut(&key.usr) {
                entry.derived.push(derived);
            }
        }
    }

    /// Record an occurrence of a symbol in a file.
    pub fn add_occurrence(&mut self, path: &str, key: SymbolKey, range: Range, refcount: i32) {
        self.add_file(path).symbols.push(Occurrence {
            key,
            range,
            refcount,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
