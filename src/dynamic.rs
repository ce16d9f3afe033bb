//! The dynamic section: an ordered list of tag/value entries driving the
//! dynamic linker.

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

/// `d_tag`: which field of a dynamic entry is meaningful, and how the
/// paired value should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicTag {
    /// Terminates the dynamic section.
    Null,
    /// Value is a string-table offset naming a required shared library.
    Needed,
    /// Value is the virtual address of the procedure linkage table's GOT.
    PltGot,
    /// Value is the virtual address of the (SysV) hash table.
    Hash,
    /// Value is the virtual address of the dynamic string table.
    StringTable,
    /// Value is the virtual address of the dynamic symbol table.
    SymbolTable,
    /// Value is the virtual address of the relocation table.
    RelocationTable,
    /// Value is the total size in bytes of the relocation table.
    RelocationTableSize,
    /// Value is the size in bytes of one relocation table entry.
    RelocationEntrySize,
    /// Value is the total size in bytes of the dynamic string table.
    StringTableSize,
    /// Value is the size in bytes of one symbol table entry.
    SymbolEntrySize,
    /// Value is the virtual address of the initialization function.
    Init,
    /// Value is the virtual address of the termination function.
    Fini,
    /// Value is a string-table offset naming this object (`.so` name).
    SoName,
    /// Value is a string-table offset: the legacy library search path.
    RPath,
    /// Flag: symbol resolution starts with this object.
    Symbolic,
    /// Reserved for debugger use.
    Debug,
    /// Value is a string-table offset: the modern library search path.
    Runpath,
    /// Value is the virtual address of the GNU hash table.
    GnuHash,
    /// Any other tag, preserved byte-for-byte.
    Other(i64),
}

impl DynamicTag {
    fn from_i64(value: i64) -> Self {
        match value {
            0 => DynamicTag::Null,
            1 => DynamicTag::Needed,
            3 => DynamicTag::PltGot,
            4 => DynamicTag::Hash,
            5 => DynamicTag::StringTable,
            6 => DynamicTag::SymbolTable,
            7 => DynamicTag::RelocationTable,
            8 => DynamicTag::RelocationTableSize,
            9 => DynamicTag::RelocationEntrySize,
            10 => DynamicTag::StringTableSize,
            11 => DynamicTag::SymbolEntrySize,
            12 => DynamicTag::Init,
            13 => DynamicTag::Fini,
            14 => DynamicTag::SoName,
            15 => DynamicTag::RPath,
            16 => DynamicTag::Symbolic,
            21 => DynamicTag::Debug,
            29 => DynamicTag::Runpath,
            0x6fff_fef5 => DynamicTag::GnuHash,
            other => DynamicTag::Other(other),
        }
    }

    fn to_i64(self) -> i64 {
        match self {
            DynamicTag::Null => 0,
            DynamicTag::Needed => 1,
            DynamicTag::PltGot => 3,
            DynamicTag::Hash => 4,
            DynamicTag::StringTable => 5,
            DynamicTag::SymbolTable => 6,
            DynamicTag::RelocationTable => 7,
            DynamicTag::RelocationTableSize => 8,
            DynamicTag::RelocationEntrySize => 9,
            DynamicTag::StringTableSize => 10,
            DynamicTag::SymbolEntrySize => 11,
            DynamicTag::Init => 12,
            DynamicTag::Fini => 13,
            DynamicTag::SoName => 14,
            DynamicTag::RPath => 15,
            DynamicTag::Symbolic => 16,
            DynamicTag::Debug => 21,
            DynamicTag::Runpath => 29,
            DynamicTag::GnuHash => 0x6fff_fef5,
            DynamicTag::Other(v) => v,
        }
    }

    /// Whether this tag's value names a virtual address rather than a
    /// size, flag word, or index. These are exactly the entries the
    /// layout engine must patch when their referenced section moves.
    pub fn is_virtual_address(self) -> bool {
        matches!(
            self,
            DynamicTag::PltGot
                | DynamicTag::Hash
                | DynamicTag::StringTable
                | DynamicTag::SymbolTable
                | DynamicTag::RelocationTable
                | DynamicTag::Init
                | DynamicTag::Fini
                | DynamicTag::Debug
                | DynamicTag::GnuHash
        )
    }
}

/// One `(tag, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicEntry {
    /// Which field the entry carries.
    pub tag: DynamicTag,
    /// The value or pointer, interpretation depending on `tag`.
    pub value: u64,
}

/// The dynamic section (`.dynamic`): an ordered, `Null`-terminated list of
/// tag/value entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DynamicSection {
    entries: Vec<DynamicEntry>,
}

impl DynamicSection {
    /// Construct an empty (just-the-terminator) dynamic section.
    pub fn new() -> Self {
        Self {
            entries: vec![DynamicEntry {
                tag: DynamicTag::Null,
                value: 0,
            }],
        }
    }

    /// All entries, including the trailing `Null`.
    pub fn entries(&self) -> &[DynamicEntry] {
        &self.entries
    }

    /// Construct directly from a caller-supplied entry list (e.g. when
    /// building a synthetic image for testing). The caller is responsible
    /// for terminating the list with `(Null, 0)`.
    pub fn from_entries(entries: Vec<DynamicEntry>) -> Self {
        Self { entries }
    }

    /// Number of bytes this section serializes to: `entries * 2 * word_size`.
    pub fn byte_size(&self, layout: &Layout) -> u64 {
        self.entries.len() as u64 * 2 * layout.word_size()
    }

    /// First entry matching `tag`, if any.
    pub fn find(&self, tag: DynamicTag) -> Option<DynamicEntry> {
        self.entries.iter().copied().find(|e| e.tag == tag)
    }

    /// A non-empty section's last
    /// entry is `(Null, 0)`.
    pub fn seems_valid(&self) -> bool {
        match self.entries.last() {
            None => true,
            Some(e) => e.tag == DynamicTag::Null && e.value == 0,
        }
    }

    fn set_or_insert_before_null(&mut self, tag: DynamicTag, value: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.tag == tag) {
            entry.value = value;
            return;
        }
        let insert_at = self.entries.len().saturating_sub(1);
        self.entries.insert(insert_at, DynamicEntry { tag, value });
    }

    fn remove(&mut self, tag: DynamicTag) {
        self.entries.retain(|e| e.tag != tag);
    }

    /// Patch the value of the (first) entry matching `tag`. No-op if the
    /// tag is not present. Used by the layout engine to re-point
    /// virtual-address entries after a section moves.
    pub fn patch_value(&mut self, tag: DynamicTag, new_value: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.tag == tag) {
            entry.value = new_value;
        }
    }

    /// Set the run path: RPath and Runpath are synonyms on read; Runpath
    /// is preferred on write. `new_value` is the offset at which the new
    /// string has already been appended to the dynamic string table by
    /// the caller (the edit orchestrator), or `None` to remove the entry.
    pub fn set_run_path(&mut self, new_value: Option<u32>) {
        match new_value {
            Some(offset) => self.set_or_insert_before_null(DynamicTag::Runpath, offset as u64),
            None => self.remove(DynamicTag::Runpath),
        }
    }

    /// Current RUNPATH/RPATH string-table offset, preferring `Runpath`
    /// over the legacy `RPath` if both are present.
    pub fn run_path_offset(&self) -> Option<u32> {
        self.find(DynamicTag::Runpath)
            .or_else(|| self.find(DynamicTag::RPath))
            .map(|e| e.value as u32)
    }

    /// All string-table offsets named by `Needed` entries, in order.
    pub fn needed_offsets(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|e| e.tag == DynamicTag::Needed)
            .map(|e| e.value as u32)
            .collect()
    }

    /// Entry index, tag and current dynamic-string-table offset of every
    /// entry whose value names a string (`Needed`, `SoName`, `RPath`,
    /// `Runpath`). Used by the edit orchestrator to rebuild a compacted
    /// string table when the run path changes.
    pub fn string_referencing_entries(&self) -> impl Iterator<Item = (usize, DynamicTag, u32)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            matches!(
                e.tag,
                DynamicTag::Needed | DynamicTag::SoName | DynamicTag::RPath | DynamicTag::Runpath
            )
            .then_some((i, e.tag, e.value as u32))
        })
    }

    /// Overwrite the value field of the entry at `index`. Used after
    /// rebuilding the dynamic string table, to point surviving entries at
    /// their new offsets.
    pub fn set_entry_value(&mut self, index: usize, value: u64) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.value = value;
        }
    }
}

impl<R: Read> FromReader<R> for DynamicSection {
    fn from_reader(reader: &mut R, layout: &Layout) -> Result<Self> {
        let mut entries = Vec::new();
        loop {
            let tag_raw = layout.read_word(reader)? as i64;
            let value = layout.read_word(reader)?;
            let tag = DynamicTag::from_i64(tag_raw);
            let is_null = tag == DynamicTag::Null;
            entries.push(DynamicEntry { tag, value });
            if is_null {
                break;
            }
        }
        Ok(Self { entries })
    }
}

impl<W: Write> ToWriter<W> for DynamicSection {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        for entry in &self.entries {
            layout.write_word(writer, entry.tag.to_i64() as u64)?;
            layout.write_word(writer, entry.value)?;
        }
        Ok(())
    }
}

impl HasWrittenSize for DynamicSection {
    fn written_size(&self, layout: &Layout) -> u64 {
        self.byte_size(layout)
    }
}

impl DynamicSection {
    /// Read until the section header's declared size is exhausted, rather
    /// than relying solely on the `Null` terminator — a defensively
    /// truncated `.dynamic` (size shorter than its true content) is a
    /// malformed image, not a license to read past the section.
    pub fn from_reader_bounded(reader: &mut impl Read, layout: &Layout, size: u64) -> Result<Self> {
        let entry_size = 2 * layout.word_size();
        if entry_size == 0 || size % entry_size != 0 {
            return Err(Error::invalid_image(
                crate::error::ErrorContext::new(0, ".dynamic size"),
                "size is not a multiple of the entry size",
            ));
        }
        let count = size / entry_size;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let tag = DynamicTag::from_i64(layout.read_word(reader)? as i64);
            let value = layout.read_word(reader)?;
            let is_null = tag == DynamicTag::Null;
            entries.push(DynamicEntry { tag, value });
            if is_null {
                break;
            }
        }
        if entries.last().map(|e| e.tag) != Some(DynamicTag::Null) {
            entries.push(DynamicEntry {
                tag: DynamicTag::Null,
                value: 0,
            });
        }
        Ok(Self { entries })
    }
}
