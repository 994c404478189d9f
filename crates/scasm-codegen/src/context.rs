//! Tables owned by one compilation unit: strings, natives and statics.

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use crate::error::{CodeGenError, CodeGenResult};
use crate::CodeGenOptions;

/// String heap. Strings are null-terminated; a string's index is its byte offset.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    data: Vec<u8>,
    offsets: IndexMap<String, u32>,
}

impl StringTable {
    /// Offset of `s`, appending it on first use.
    pub fn add_or_get(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self.offsets.insert(s.to_owned(), offset);
        trace!(offset, string = s, "string added");
        offset
    }

    /// Heap bytes.
    pub fn as_bytes(&self) -> &[u8] { &self.data }

    /// Strings with their offsets, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> { self.offsets.iter().map(|(s, &o)| (s.as_str(), o)) }

    /// Number of distinct strings.
    pub fn len(&self) -> usize { self.offsets.len() }

    /// Whether the heap is empty.
    pub fn is_empty(&self) -> bool { self.offsets.is_empty() }
}

/// Native function hashes and the slots they occupy in the unit.
#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    names: IndexMap<String, u64>,
    slots: IndexSet<u64>,
}

impl NativeTable {
    /// Upper bound on slots (16-bit index).
    pub const MAX_SLOTS: usize = u16::MAX as usize + 1;

    /// Binds a native name to its hash.
    pub fn register(&mut self, name: impl Into<String>, hash: u64) { self.names.insert(name.into(), hash); }

    /// Hash of a registered name, or of a `0x...` literal.
    pub fn resolve(&self, name: &str) -> CodeGenResult<u64> {
        if let Some(&hash) = self.names.get(name) {
            return Ok(hash);
        }
        name.strip_prefix("0x")
            .or_else(|| name.strip_prefix("0X"))
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .ok_or_else(|| CodeGenError::UnknownNative(name.to_owned()))
    }

    /// Slot of `hash`, appending it on first use.
    pub fn add_or_get(&mut self, hash: u64) -> CodeGenResult<u16> {
        if let Some(slot) = self.slots.get_index_of(&hash) {
            return Ok(slot as u16);
        }
        if self.slots.len() >= Self::MAX_SLOTS {
            return Err(CodeGenError::NativeTableFull(self.slots.len()));
        }
        let (slot, _) = self.slots.insert_full(hash);
        trace!(slot, hash = format_args!("0x{hash:016X}"), "native added");
        Ok(slot as u16)
    }

    /// Hashes by slot.
    pub fn hashes(&self) -> Vec<u64> { self.slots.iter().copied().collect() }
}

/// Static variables laid out one after another.
#[derive(Debug, Clone, Default)]
pub struct StaticTable {
    offsets: IndexMap<String, u32>,
    size: u32,
}

impl StaticTable {
    /// Allocates `size` slots for `name` and returns its offset.
    pub fn declare(&mut self, name: impl Into<String>, size: u32) -> CodeGenResult<u32> {
        let name = name.into();
        if self.offsets.contains_key(&name) {
            return Err(CodeGenError::DuplicateStatic(name));
        }
        let offset = self.size;
        self.size += size;
        self.offsets.insert(name, offset);
        Ok(offset)
    }

    /// Offset of `name`.
    pub fn offset(&self, name: &str) -> CodeGenResult<u32> {
        self.offsets.get(name).copied().ok_or_else(|| CodeGenError::UnknownStatic(name.to_owned()))
    }

    /// Total slots.
    pub const fn size(&self) -> u32 { self.size }
}

/// Everything the assembler consults besides its own pages.
#[derive(Debug, Clone, Default)]
pub struct AssemblerContext {
    /// Code generation options.
    pub options: CodeGenOptions,
    /// String heap.
    pub strings: StringTable,
    /// Native slots.
    pub natives: NativeTable,
    /// Static layout.
    pub statics: StaticTable,
}

impl AssemblerContext {
    /// Empty context with the given options.
    pub fn new(options: CodeGenOptions) -> Self { Self { options, ..Self::default() } }
}
