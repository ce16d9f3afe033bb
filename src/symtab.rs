//! Symbol tables (`.symtab`, `.dynsym`).

use crate::error::Result;
use crate::file_all_headers::SectionIndexChangeMap;
use crate::header::SectionHeader;
use crate::layout::{Class, Layout};
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

/// Low 4 bits of `st_info`: what a symbol denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolType {
    /// Type not specified.
    NoType,
    /// Data object.
    Object,
    /// Function.
    Function,
    /// Associated with a section, no other meaning.
    Section,
    /// Name of the source file.
    File,
    /// Any other value, preserved byte-for-byte.
    Other(u8),
}

impl SymbolType {
    fn from_nibble(value: u8) -> Self {
        match value {
            0 => SymbolType::NoType,
            1 => SymbolType::Object,
            2 => SymbolType::Function,
            3 => SymbolType::Section,
            4 => SymbolType::File,
            other => SymbolType::Other(other),
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            SymbolType::NoType => 0,
            SymbolType::Object => 1,
            SymbolType::Function => 2,
            SymbolType::Section => 3,
            SymbolType::File => 4,
            SymbolType::Other(v) => v,
        }
    }
}

/// Section-header index reserved to mean "no section" (`SHN_UNDEF`).
pub const SHN_UNDEF: u16 = 0;
/// Start of the reserved section-header index range (`SHN_LORESERVE`).
pub const SHN_LORESERVE: u16 = 0xff00;

/// One symbol table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTableEntry {
    /// Offset of this symbol's name into the associated string table.
    pub name_offset: u32,
    /// Low 4 bits of `st_info`.
    pub symbol_type: SymbolType,
    /// High 4 bits of `st_info` (binding); preserved byte-for-byte.
    pub binding: u8,
    /// `st_other` (visibility); preserved byte-for-byte.
    pub other: u8,
    /// Section-header index this symbol is defined relative to.
    pub shndx: u16,
    /// Value: a virtual address if `shndx` names a section, otherwise
    /// format-specific.
    pub value: u64,
    /// Size in bytes of the object or function, 0 if unknown/inapplicable.
    pub size: u64,
}

impl SymbolTableEntry {
    /// Whether this symbol is "related to a section":
    /// `shndx` is neither `SHN_UNDEF` nor in the reserved range, meaning
    /// its `value` is that section's virtual address and must be patched
    /// if the section moves.
    pub fn is_section_related(&self) -> bool {
        self.shndx != SHN_UNDEF && self.shndx < SHN_LORESERVE
    }
}

impl<R: Read> FromReader<R> for SymbolTableEntry {
    fn from_reader(reader: &mut R, layout: &Layout) -> Result<Self> {
        match layout.class {
            Class::Elf64 => {
                let name_offset = layout.read_u32(reader)?;
                let info = {
                    let mut b = [0u8; 1];
                    reader.read_exact(&mut b).map_err(crate::error::Error::FileRead)?;
                    b[0]
                };
                let other = {
                    let mut b = [0u8; 1];
                    reader.read_exact(&mut b).map_err(crate::error::Error::FileRead)?;
                    b[0]
                };
                let shndx = layout.read_u16(reader)?;
                let value = layout.read_u64(reader)?;
                let size = layout.read_u64(reader)?;
                Ok(Self {
                    name_offset,
                    symbol_type: SymbolType::from_nibble(info & 0xf),
                    binding: info >> 4,
                    other,
                    shndx,
                    value,
                    size,
                })
            }
            Class::Elf32 => {
                let name_offset = layout.read_u32(reader)?;
                let value = u64::from(layout.read_u32(reader)?);
                let size = u64::from(layout.read_u32(reader)?);
                let info = {
                    let mut b = [0u8; 1];
                    reader.read_exact(&mut b).map_err(crate::error::Error::FileRead)?;
                    b[0]
                };
                let other = {
                    let mut b = [0u8; 1];
                    reader.read_exact(&mut b).map_err(crate::error::Error::FileRead)?;
                    b[0]
                };
                let shndx = layout.read_u16(reader)?;
                Ok(Self {
                    name_offset,
                    symbol_type: SymbolType::from_nibble(info & 0xf),
                    binding: info >> 4,
                    other,
                    shndx,
                    value,
                    size,
                })
            }
        }
    }
}

impl<W: Write> ToWriter<W> for SymbolTableEntry {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        let info = (self.binding << 4) | self.symbol_type.to_nibble();
        match layout.class {
            Class::Elf64 => {
                layout.write_u32(writer, self.name_offset)?;
                writer.write_all(&[info, self.other]).map_err(crate::error::Error::FileWrite)?;
                layout.write_u16(writer, self.shndx)?;
                layout.write_u64(writer, self.value)?;
                layout.write_u64(writer, self.size)?;
            }
            Class::Elf32 => {
                layout.write_u32(writer, self.name_offset)?;
                layout.write_u32(writer, self.value as u32)?;
                layout.write_u32(writer, self.size as u32)?;
                writer.write_all(&[info, self.other]).map_err(crate::error::Error::FileWrite)?;
                layout.write_u16(writer, self.shndx)?;
            }
        }
        Ok(())
    }
}

impl HasWrittenSize for SymbolTableEntry {
    fn written_size(&self, layout: &Layout) -> u64 {
        match layout.class {
            Class::Elf32 => 16,
            Class::Elf64 => 24,
        }
    }
}

/// A parsed `.symtab` or `.dynsym` section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolTableEntry>,
}

impl SymbolTable {
    /// Entries, in file order (index 0 is always the null symbol).
    pub fn entries(&self) -> &[SymbolTableEntry] {
        &self.entries
    }

    /// Mutable access, for the layout engine's patch passes.
    pub fn entries_mut(&mut self) -> &mut [SymbolTableEntry] {
        &mut self.entries
    }

    /// Parse `count` fixed-size entries.
    pub fn from_reader_with_count(
        reader: &mut impl Read,
        layout: &Layout,
        count: u64,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(SymbolTableEntry::from_reader(reader, layout)?);
        }
        Ok(Self { entries })
    }

    /// Remap every `shndx` through `index_change_map`, after the section
    /// header table has been sorted by file offset.
    pub fn update_section_indexes(&mut self, index_change_map: &SectionIndexChangeMap) {
        for entry in &mut self.entries {
            if entry.is_section_related() {
                entry.shndx = index_change_map.map(entry.shndx);
            }
        }
    }

    /// Patch the `value` of every symbol whose section was just moved, to
    /// that section's new virtual address.
    pub fn update_virtual_addresses(
        &mut self,
        moved_section_indexes: &[u16],
        section_header_table: &[SectionHeader],
    ) {
        for entry in &mut self.entries {
            if entry.is_section_related() && moved_section_indexes.contains(&entry.shndx) {
                if let Some(section) = section_header_table.get(entry.shndx as usize) {
                    entry.value = section.addr;
                }
            }
        }
    }
}

impl<W: Write> ToWriter<W> for SymbolTable {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        for entry in &self.entries {
            entry.to_writer(writer, layout)?;
        }
        Ok(())
    }
}

impl HasWrittenSize for SymbolTable {
    fn written_size(&self, layout: &Layout) -> u64 {
        self.entries.len() as u64
            * match layout.class {
                Class::Elf32 => 16,
                Class::Elf64 => 24,
            }
    }
}
