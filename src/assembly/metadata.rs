//! Per code unit metadata.
//!
//! A code unit (one function body) refers to its constants and names by index. The
//! [`CodeUnitMetadata`] owns those tables together with the scalar header fields. Tables are
//! dedup-on-insert arenas: inserting a value that is already present returns its existing
//! index, and indices never move once handed out.
//!
//! Constants are compared by value *and* representation kind, so `Int(1)`, `Float(1.0)` and
//! `Bool(true)` occupy three distinct slots. Floats compare by their bit pattern.

use std::{
    borrow::Borrow,
    hash::{Hash, Hasher},
};

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use strum::{Display, EnumIter};

/// Identifies one of the metadata tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum TableKind {
    /// The constant pool
    #[strum(serialize = "constant")]
    Consts,
    /// Global / attribute names
    #[strum(serialize = "name")]
    Names,
    /// Local variable names
    #[strum(serialize = "local")]
    Locals,
    /// Free variable names
    #[strum(serialize = "free")]
    Frees,
    /// Cell variable names
    #[strum(serialize = "cell")]
    Cells,
}

/// A value stored in the constant pool.
#[derive(Debug, Clone)]
pub enum Constant {
    /// The absent value
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Immutable sequence of constants
    Tuple(Vec<Constant>),
    /// Host object that only the embedder can interpret, identified by a handle
    Object(String),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::None, Constant::None) => true,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) | (Constant::Object(a), Constant::Object(b)) => {
                a == b
            }
            (Constant::Bytes(a), Constant::Bytes(b)) => a == b,
            (Constant::Tuple(a), Constant::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::None => {}
            Constant::Bool(value) => value.hash(state),
            Constant::Int(value) => value.hash(state),
            Constant::Float(value) => value.to_bits().hash(state),
            Constant::Str(value) | Constant::Object(value) => value.hash(state),
            Constant::Bytes(value) => value.hash(state),
            Constant::Tuple(items) => items.hash(state),
        }
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Constant::Bool(value)
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Constant::Int(value)
    }
}

impl From<i32> for Constant {
    fn from(value: i32) -> Self {
        Constant::Int(i64::from(value))
    }
}

impl From<f64> for Constant {
    fn from(value: f64) -> Self {
        Constant::Float(value)
    }
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Constant::Str(value.to_string())
    }
}

impl From<String> for Constant {
    fn from(value: String) -> Self {
        Constant::Str(value)
    }
}

/// Ordered, dedup-on-insert table with stable indices.
///
/// A table built from an existing list keeps every entry, duplicates included, so indices
/// taken from encoded code stay valid; lookups return the first occurrence.
#[derive(Debug, Clone)]
pub struct Table<T> {
    items: Vec<T>,
    index: FxHashMap<T, u32>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Table {
            items: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<T: Clone + Eq + Hash> Table<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `value`, appending it first if it is not present yet.
    pub fn ensure(&mut self, value: T) -> u32 {
        if let Some(&index) = self.index.get(&value) {
            return index;
        }

        let index = u32::try_from(self.items.len()).unwrap_or(u32::MAX);
        self.index.insert(value.clone(), index);
        self.items.push(value);
        index
    }

    /// Index of the first entry equal to `value`.
    pub fn index_of<Q>(&self, value: &Q) -> Option<u32>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(value).copied()
    }

    /// `true` if an entry equal to `value` exists.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(value)
    }

    /// Entry at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get(usize::try_from(index).ok()?)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Entries in index order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Clone + Eq + Hash> From<Vec<T>> for Table<T> {
    fn from(items: Vec<T>) -> Self {
        let mut index = FxHashMap::default();
        for (position, item) in items.iter().enumerate() {
            index
                .entry(item.clone())
                .or_insert_with(|| u32::try_from(position).unwrap_or(u32::MAX));
        }
        Table { items, index }
    }
}

impl<T: Clone + Eq + Hash> FromIterator<T> for Table<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut table = Table::new();
        for item in iter {
            table.ensure(item);
        }
        table
    }
}

bitflags! {
    /// Header flags of a code unit. Bits without a name are preserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CodeFlags: u32 {
        /// Locals live in fast slots
        const OPTIMIZED = 0x0001;
        /// A fresh local namespace is created on entry
        const NEWLOCALS = 0x0002;
        /// Takes a variable positional argument list
        const VARARGS = 0x0004;
        /// Takes a variable keyword argument mapping
        const VARKEYWORDS = 0x0008;
        /// Defined inside another code unit
        const NESTED = 0x0010;
        /// Body is a generator
        const GENERATOR = 0x0020;
        /// Has neither free nor cell variables
        const NOFREE = 0x0040;
        /// Body is a coroutine
        const COROUTINE = 0x0080;

        const _ = !0;
    }
}

impl Default for CodeFlags {
    fn default() -> Self {
        CodeFlags::empty()
    }
}

/// Tables and header fields of one code unit.
#[derive(Debug, Clone, Default)]
pub struct CodeUnitMetadata {
    /// Name of the code unit
    pub name: String,
    /// File the code unit was compiled from
    pub filename: String,
    /// Position (source line) of the first instruction
    pub first_line: u32,
    /// Number of positional arguments
    pub argcount: u32,
    /// Number of positional-only arguments
    pub posonly_argcount: u32,
    /// Number of keyword-only arguments
    pub kwonly_argcount: u32,
    /// Number of local slots
    pub nlocals: u32,
    /// Declared maximum depth of the value stack
    pub stack_size: u32,
    /// Header flags
    pub flags: CodeFlags,
    /// Constant pool
    pub consts: Table<Constant>,
    /// Global and attribute names
    pub names: Table<String>,
    /// Local variable names, arguments first
    pub locals: Table<String>,
    /// Free variable names
    pub frees: Table<String>,
    /// Cell variable names
    pub cells: Table<String>,
}

impl CodeUnitMetadata {
    /// Creates metadata with empty tables.
    #[must_use]
    pub fn new(name: &str, filename: &str, first_line: u32) -> Self {
        CodeUnitMetadata {
            name: name.to_string(),
            filename: filename.to_string(),
            first_line,
            ..Default::default()
        }
    }

    /// Index of `value` in the constant pool, inserting it if needed.
    pub fn ensure_const(&mut self, value: impl Into<Constant>) -> u32 {
        self.consts.ensure(value.into())
    }

    /// Index of `name` in the name table, inserting it if needed.
    pub fn ensure_name(&mut self, name: &str) -> u32 {
        ensure_str(&mut self.names, name)
    }

    /// Index of `name` in the local table, inserting it if needed.
    ///
    /// The local slot count grows with the table.
    pub fn ensure_local(&mut self, name: &str) -> u32 {
        let index = ensure_str(&mut self.locals, name);
        self.nlocals = self.nlocals.max(index + 1);
        index
    }

    /// Index of `name` in the free table, inserting it if needed.
    pub fn ensure_free(&mut self, name: &str) -> u32 {
        ensure_str(&mut self.frees, name)
    }

    /// Index of `name` in the cell table, inserting it if needed.
    pub fn ensure_cell(&mut self, name: &str) -> u32 {
        ensure_str(&mut self.cells, name)
    }

    /// Operand index of a closure variable: cells come first, then frees.
    #[must_use]
    pub fn free_index(&self, name: &str) -> Option<u32> {
        if let Some(index) = self.cells.index_of(name) {
            return Some(index);
        }

        let cells = u32::try_from(self.cells.len()).ok()?;
        self.frees.index_of(name).map(|index| index + cells)
    }

    /// Inverse of [`CodeUnitMetadata::free_index`].
    #[must_use]
    pub fn free_name(&self, index: u32) -> Option<&str> {
        let cells = u32::try_from(self.cells.len()).ok()?;
        if index < cells {
            self.cells.get(index).map(String::as_str)
        } else {
            self.frees.get(index - cells).map(String::as_str)
        }
    }

    /// Number of entries in `table`. The free table reports cells and frees combined.
    #[must_use]
    pub fn table_len(&self, table: TableKind) -> usize {
        match table {
            TableKind::Consts => self.consts.len(),
            TableKind::Names => self.names.len(),
            TableKind::Locals => self.locals.len(),
            TableKind::Frees => self.cells.len() + self.frees.len(),
            TableKind::Cells => self.cells.len(),
        }
    }
}

fn ensure_str(table: &mut Table<String>, name: &str) -> u32 {
    match table.index_of(name) {
        Some(index) => index,
        None => table.ensure(name.to_string()),
    }
}
