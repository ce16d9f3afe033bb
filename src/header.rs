//! Typed records for the file header, program headers and section headers
//! plus the enumerations that classify them.

use crate::error::{Error, ErrorContext, Result};
use crate::ident::Ident;
use crate::layout::Layout;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io::{Read, Write};

/// `e_type`: what kind of object file this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum ObjectFileType {
    /// No file type.
    None = 0,
    /// Relocatable object file. Not supported by the editor.
    Rel = 1,
    /// Executable file.
    Exec = 2,
    /// Shared object (or position-independent executable).
    Dyn = 3,
    /// Core dump. Not supported by the editor.
    Core = 4,
}

/// `e_machine`: target instruction set architecture. Only the handful of
/// machines this editor is likely to encounter carry a named variant;
/// everything else round-trips through [`Machine::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Machine {
    /// No machine.
    None,
    /// Intel 80386.
    X86,
    /// AMD x86-64.
    X86_64,
    /// ARM.
    Arm,
    /// ARM AArch64.
    Aarch64,
    /// Any other `e_machine` value, preserved byte-for-byte.
    Other(u16),
}

impl Machine {
    fn from_u16(value: u16) -> Self {
        match value {
            0 => Machine::None,
            3 => Machine::X86,
            62 => Machine::X86_64,
            40 => Machine::Arm,
            183 => Machine::Aarch64,
            other => Machine::Other(other),
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Machine::None => 0,
            Machine::X86 => 3,
            Machine::X86_64 => 62,
            Machine::Arm => 40,
            Machine::Aarch64 => 183,
            Machine::Other(v) => v,
        }
    }
}

/// The ELF file header (`Elf32_Ehdr` / `Elf64_Ehdr`), minus the
/// identification prefix which lives in [`crate::ident::Ident`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Object file type.
    pub object_type: ObjectFileType,
    /// Target machine.
    pub machine: Machine,
    /// Format version; always 1 for files this editor handles.
    pub version: u32,
    /// Virtual address of the entry point.
    pub entry: u64,
    /// File offset of the program header table.
    pub phoff: u64,
    /// File offset of the section header table.
    pub shoff: u64,
    /// Machine/OS-specific flags.
    pub flags: u32,
    /// Size in bytes of this header as encoded (`EI_NIDENT` + the fields
    /// above).
    pub ehsize: u16,
    /// Size in bytes of one program header table entry.
    pub phentsize: u16,
    /// Number of program header table entries.
    pub phnum: u16,
    /// Size in bytes of one section header table entry.
    pub shentsize: u16,
    /// Number of section header table entries.
    pub shnum: u16,
    /// Index into the section header table of the section-name string
    /// table.
    pub shstrndx: u16,
}

impl FileHeader {
    fn ehsize_for(layout: &Layout) -> u16 {
        (Ident::SIZE + match layout.class {
            crate::layout::Class::Elf32 => 36,
            crate::layout::Class::Elf64 => 48,
        }) as u16
    }

    fn phentsize_for(layout: &Layout) -> u16 {
        match layout.class {
            crate::layout::Class::Elf32 => 32,
            crate::layout::Class::Elf64 => 56,
        }
    }

    fn shentsize_for(layout: &Layout) -> u16 {
        match layout.class {
            crate::layout::Class::Elf32 => 40,
            crate::layout::Class::Elf64 => 64,
        }
    }

    /// `phentsize` this header currently reports. Used by the edit
    /// orchestrator to know how many bytes a new program
    /// header table entry needs.
    pub fn program_header_entry_size(&self) -> u64 {
        self.phentsize as u64
    }

    /// Local consistency check: `phnum`/`shnum` within range and header
    /// sizes match the class this file claims.
    pub fn seems_valid(&self, layout: &Layout) -> bool {
        self.ehsize == Self::ehsize_for(layout)
            && self.phentsize == Self::phentsize_for(layout)
            && self.shentsize == Self::shentsize_for(layout)
    }
}

impl<R: Read> FromReader<R> for FileHeader {
    fn from_reader(reader: &mut R, layout: &Layout) -> Result<Self> {
        let object_type_raw = layout.read_u16(reader)?;
        let object_type = ObjectFileType::from_u16(object_type_raw).ok_or_else(|| {
            Error::invalid_image(
                ErrorContext::new(16, "e_type"),
                format!("unknown object file type {object_type_raw}"),
            )
        })?;
        let machine = Machine::from_u16(layout.read_u16(reader)?);
        let version = layout.read_u32(reader)?;
        let entry = layout.read_word(reader)?;
        let phoff = layout.read_word(reader)?;
        let shoff = layout.read_word(reader)?;
        let flags = layout.read_u32(reader)?;
        let ehsize = layout.read_u16(reader)?;
        let phentsize = layout.read_u16(reader)?;
        let phnum = layout.read_u16(reader)?;
        let shentsize = layout.read_u16(reader)?;
        let shnum = layout.read_u16(reader)?;
        let shstrndx = layout.read_u16(reader)?;

        Ok(Self {
            object_type,
            machine,
            version,
            entry,
            phoff,
            shoff,
            flags,
            ehsize,
            phentsize,
            phnum,
            shentsize,
            shnum,
            shstrndx,
        })
    }
}

impl<W: Write> ToWriter<W> for FileHeader {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        layout.write_u16(writer, self.object_type as u16)?;
        layout.write_u16(writer, self.machine.to_u16())?;
        layout.write_u32(writer, self.version)?;
        layout.write_word(writer, self.entry)?;
        layout.write_word(writer, self.phoff)?;
        layout.write_word(writer, self.shoff)?;
        layout.write_u32(writer, self.flags)?;
        layout.write_u16(writer, self.ehsize)?;
        layout.write_u16(writer, self.phentsize)?;
        layout.write_u16(writer, self.phnum)?;
        layout.write_u16(writer, self.shentsize)?;
        layout.write_u16(writer, self.shnum)?;
        layout.write_u16(writer, self.shstrndx)?;
        Ok(())
    }
}

impl HasWrittenSize for FileHeader {
    fn written_size(&self, _layout: &Layout) -> u64 {
        self.ehsize as u64
    }
}

/// `p_type`: what kind of segment a program header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentType {
    /// Unused entry.
    Null,
    /// Loadable segment.
    Load,
    /// Dynamic linking information (`.dynamic`).
    Dynamic,
    /// Program interpreter path (`.interp`).
    Interpreter,
    /// Auxiliary information (note sections).
    Note,
    /// Entry for the program header table itself.
    ProgramHeaderTable,
    /// Thread-local storage template.
    Tls,
    /// GNU extension: exception-handling frame info.
    GnuEhFrame,
    /// GNU extension: stack executability/size hints.
    GnuStack,
    /// GNU extension: segment that should be read-only after relocation.
    GnuRelRo,
    /// Any other `p_type`, preserved byte-for-byte.
    Unknown(u32),
}

impl SegmentType {
    fn from_u32(value: u32) -> Self {
        match value {
            0 => SegmentType::Null,
            1 => SegmentType::Load,
            2 => SegmentType::Dynamic,
            3 => SegmentType::Interpreter,
            4 => SegmentType::Note,
            6 => SegmentType::ProgramHeaderTable,
            7 => SegmentType::Tls,
            0x6474_e550 => SegmentType::GnuEhFrame,
            0x6474_e551 => SegmentType::GnuStack,
            0x6474_e552 => SegmentType::GnuRelRo,
            other => SegmentType::Unknown(other),
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            SegmentType::Null => 0,
            SegmentType::Load => 1,
            SegmentType::Dynamic => 2,
            SegmentType::Interpreter => 3,
            SegmentType::Note => 4,
            SegmentType::ProgramHeaderTable => 6,
            SegmentType::Tls => 7,
            SegmentType::GnuEhFrame => 0x6474_e550,
            SegmentType::GnuStack => 0x6474_e551,
            SegmentType::GnuRelRo => 0x6474_e552,
            SegmentType::Unknown(v) => v,
        }
    }

    /// Whether a segment of this type is permitted to strictly contain
    /// sections.
    pub fn can_contain_sections(self) -> bool {
        matches!(
            self,
            SegmentType::Load
                | SegmentType::Dynamic
                | SegmentType::GnuRelRo
                | SegmentType::GnuStack
                | SegmentType::GnuEhFrame
                | SegmentType::Note
                | SegmentType::Tls
        )
    }
}

bitflags! {
    /// `p_flags`: segment permission bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u32 {
        /// Execute permission.
        const EXECUTE = 1;
        /// Write permission.
        const WRITE = 2;
        /// Read permission.
        const READ = 4;
    }
}

/// One program header / segment descriptor (`Elf32_Phdr` / `Elf64_Phdr`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramHeader {
    /// Segment type.
    pub segment_type: SegmentType,
    /// Permission flags.
    pub flags: SegmentFlags,
    /// File offset of the first byte of the segment.
    pub offset: u64,
    /// Virtual address the segment should be loaded at.
    pub vaddr: u64,
    /// Physical address (largely unused on modern systems; preserved
    /// byte-for-byte).
    pub paddr: u64,
    /// Number of bytes the segment occupies in the file.
    pub filesz: u64,
    /// Number of bytes the segment occupies in memory (`>= filesz`).
    pub memsz: u64,
    /// Required alignment; 0 or 1 mean "no alignment constraint".
    pub align: u64,
}

impl ProgramHeader {
    /// File-offset range `[offset, offset + filesz)`.
    pub fn file_range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.filesz
    }

    /// Virtual-address range `[vaddr, vaddr + memsz)`.
    pub fn vaddr_range(&self) -> std::ops::Range<u64> {
        self.vaddr..self.vaddr + self.memsz
    }

    /// `offset <= vaddr (mod
    /// page_size)` consistency and `filesz <= memsz` for Load segments.
    pub fn seems_valid(&self) -> bool {
        if self.filesz > self.memsz {
            return false;
        }
        if self.segment_type == SegmentType::Load {
            return self.offset % Layout::PAGE_SIZE == self.vaddr % Layout::PAGE_SIZE;
        }
        true
    }
}

impl<R: Read> FromReader<R> for ProgramHeader {
    fn from_reader(reader: &mut R, layout: &Layout) -> Result<Self> {
        use crate::layout::Class;
        match layout.class {
            Class::Elf64 => {
                let segment_type = SegmentType::from_u32(layout.read_u32(reader)?);
                let flags = SegmentFlags::from_bits_truncate(layout.read_u32(reader)?);
                let offset = layout.read_u64(reader)?;
                let vaddr = layout.read_u64(reader)?;
                let paddr = layout.read_u64(reader)?;
                let filesz = layout.read_u64(reader)?;
                let memsz = layout.read_u64(reader)?;
                let align = layout.read_u64(reader)?;
                Ok(Self {
                    segment_type,
                    flags,
                    offset,
                    vaddr,
                    paddr,
                    filesz,
                    memsz,
                    align,
                })
            }
            Class::Elf32 => {
                let segment_type = SegmentType::from_u32(layout.read_u32(reader)?);
                let offset = u64::from(layout.read_u32(reader)?);
                let vaddr = u64::from(layout.read_u32(reader)?);
                let paddr = u64::from(layout.read_u32(reader)?);
                let filesz = u64::from(layout.read_u32(reader)?);
                let memsz = u64::from(layout.read_u32(reader)?);
                let flags = SegmentFlags::from_bits_truncate(layout.read_u32(reader)?);
                let align = u64::from(layout.read_u32(reader)?);
                Ok(Self {
                    segment_type,
                    flags,
                    offset,
                    vaddr,
                    paddr,
                    filesz,
                    memsz,
                    align,
                })
            }
        }
    }
}

impl<W: Write> ToWriter<W> for ProgramHeader {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        use crate::layout::Class;
        match layout.class {
            Class::Elf64 => {
                layout.write_u32(writer, self.segment_type.to_u32())?;
                layout.write_u32(writer, self.flags.bits())?;
                layout.write_u64(writer, self.offset)?;
                layout.write_u64(writer, self.vaddr)?;
                layout.write_u64(writer, self.paddr)?;
                layout.write_u64(writer, self.filesz)?;
                layout.write_u64(writer, self.memsz)?;
                layout.write_u64(writer, self.align)?;
            }
            Class::Elf32 => {
                layout.write_u32(writer, self.segment_type.to_u32())?;
                layout.write_u32(writer, self.offset as u32)?;
                layout.write_u32(writer, self.vaddr as u32)?;
                layout.write_u32(writer, self.paddr as u32)?;
                layout.write_u32(writer, self.filesz as u32)?;
                layout.write_u32(writer, self.memsz as u32)?;
                layout.write_u32(writer, self.flags.bits())?;
                layout.write_u32(writer, self.align as u32)?;
            }
        }
        Ok(())
    }
}

impl HasWrittenSize for ProgramHeader {
    fn written_size(&self, layout: &Layout) -> u64 {
        FileHeader::phentsize_for(layout) as u64
    }
}

/// `sh_type`: what kind of contents a section holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionType {
    /// Unused entry.
    Null,
    /// Program-defined contents (code, read-only data, …).
    ProgramData,
    /// Symbol table.
    SymbolTable,
    /// String table.
    StringTable,
    /// Relocations with explicit addends.
    Rela,
    /// Dynamic linking information.
    Dynamic,
    /// Note section.
    Note,
    /// Occupies no file space (`.bss` and similar).
    NoBits,
    /// Relocations without explicit addends.
    Rel,
    /// Dynamic-linker-only symbol table.
    DynSym,
    /// Array of constructor function pointers.
    InitArray,
    /// Array of destructor function pointers.
    FiniArray,
    /// GNU hash table.
    GnuHash,
    /// GNU symbol version definitions.
    GnuVerDef,
    /// GNU symbol version requirements.
    GnuVerNeed,
    /// GNU per-symbol version table.
    GnuVerSym,
    /// Any other `sh_type`, preserved byte-for-byte.
    Other(u32),
}

impl SectionType {
    fn from_u32(value: u32) -> Self {
        match value {
            0 => SectionType::Null,
            1 => SectionType::ProgramData,
            2 => SectionType::SymbolTable,
            3 => SectionType::StringTable,
            4 => SectionType::Rela,
            6 => SectionType::Dynamic,
            7 => SectionType::Note,
            8 => SectionType::NoBits,
            9 => SectionType::Rel,
            11 => SectionType::DynSym,
            14 => SectionType::InitArray,
            15 => SectionType::FiniArray,
            0x6fff_fff6 => SectionType::GnuHash,
            0x6fff_fffd => SectionType::GnuVerDef,
            0x6fff_fffe => SectionType::GnuVerNeed,
            0x6fff_ffff => SectionType::GnuVerSym,
            other => SectionType::Other(other),
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            SectionType::Null => 0,
            SectionType::ProgramData => 1,
            SectionType::SymbolTable => 2,
            SectionType::StringTable => 3,
            SectionType::Rela => 4,
            SectionType::Dynamic => 6,
            SectionType::Note => 7,
            SectionType::NoBits => 8,
            SectionType::Rel => 9,
            SectionType::DynSym => 11,
            SectionType::InitArray => 14,
            SectionType::FiniArray => 15,
            SectionType::GnuHash => 0x6fff_fff6,
            SectionType::GnuVerDef => 0x6fff_fffd,
            SectionType::GnuVerNeed => 0x6fff_fffe,
            SectionType::GnuVerSym => 0x6fff_ffff,
            SectionType::Other(v) => v,
        }
    }
}

bitflags! {
    /// `sh_flags`: section attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u64 {
        /// Section is writable at runtime.
        const WRITE = 0x1;
        /// Section occupies memory during execution.
        const ALLOC = 0x2;
        /// Section contains executable instructions.
        const EXECINSTR = 0x4;
        /// Section holds thread-local storage.
        const TLS = 0x400;
    }
}

/// One section header (`Elf32_Shdr` / `Elf64_Shdr`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Offset of this section's name into the section-name string table.
    pub name_offset: u32,
    /// Resolved name, kept alongside the header for ergonomics (Data
    /// alignment).
    pub name: String,
    /// Section contents classification.
    pub section_type: SectionType,
    /// Attribute flags.
    pub flags: SectionFlags,
    /// Virtual address at which the section's first byte should reside, if
    /// the section is to appear in memory.
    pub addr: u64,
    /// File offset of the section's first byte (meaningless for `NoBits`).
    pub offset: u64,
    /// Size in bytes (in the file for most types; in memory for
    /// `NoBits`).
    pub size: u64,
    /// Section-header-table index whose meaning depends on `section_type`.
    pub link: u32,
    /// Extra info whose meaning depends on `section_type`.
    pub info: u32,
    /// Required address alignment.
    pub addralign: u64,
    /// Size of one entry, for sections holding fixed-size records (0
    /// otherwise).
    pub entsize: u64,
}

impl SectionHeader {
    /// File-offset range `[offset, offset + size)`. Meaningless for
    /// `NoBits` sections, which occupy no file space despite reporting a
    /// nonzero `size`.
    pub fn file_range(&self) -> std::ops::Range<u64> {
        if self.section_type == SectionType::NoBits {
            self.offset..self.offset
        } else {
            self.offset..self.offset + self.size
        }
    }

    /// Virtual-address range `[addr, addr + size)`, valid only when
    /// `ALLOC` is set.
    pub fn vaddr_range(&self) -> std::ops::Range<u64> {
        self.addr..self.addr + self.size
    }

    /// Whether this section occupies memory at runtime.
    pub fn allocates_memory(&self) -> bool {
        self.flags.contains(SectionFlags::ALLOC)
    }
}

impl<R: Read> FromReader<R> for SectionHeader {
    fn from_reader(reader: &mut R, layout: &Layout) -> Result<Self> {
        use crate::layout::Class;
        let name_offset = layout.read_u32(reader)?;
        let section_type = SectionType::from_u32(layout.read_u32(reader)?);
        let (flags, addr, offset, size, link, info, addralign, entsize) = match layout.class {
            Class::Elf64 => {
                let flags = layout.read_u64(reader)?;
                let addr = layout.read_u64(reader)?;
                let offset = layout.read_u64(reader)?;
                let size = layout.read_u64(reader)?;
                let link = layout.read_u32(reader)?;
                let info = layout.read_u32(reader)?;
                let addralign = layout.read_u64(reader)?;
                let entsize = layout.read_u64(reader)?;
                (flags, addr, offset, size, link, info, addralign, entsize)
            }
            Class::Elf32 => {
                let flags = u64::from(layout.read_u32(reader)?);
                let addr = u64::from(layout.read_u32(reader)?);
                let offset = u64::from(layout.read_u32(reader)?);
                let size = u64::from(layout.read_u32(reader)?);
                let link = layout.read_u32(reader)?;
                let info = layout.read_u32(reader)?;
                let addralign = u64::from(layout.read_u32(reader)?);
                let entsize = u64::from(layout.read_u32(reader)?);
                (flags, addr, offset, size, link, info, addralign, entsize)
            }
        };
        Ok(Self {
            name_offset,
            name: String::new(),
            section_type,
            flags: SectionFlags::from_bits_truncate(flags),
            addr,
            offset,
            size,
            link,
            info,
            addralign,
            entsize,
        })
    }
}

impl<W: Write> ToWriter<W> for SectionHeader {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        use crate::layout::Class;
        layout.write_u32(writer, self.name_offset)?;
        layout.write_u32(writer, self.section_type.to_u32())?;
        match layout.class {
            Class::Elf64 => {
                layout.write_u64(writer, self.flags.bits())?;
                layout.write_u64(writer, self.addr)?;
                layout.write_u64(writer, self.offset)?;
                layout.write_u64(writer, self.size)?;
                layout.write_u32(writer, self.link)?;
                layout.write_u32(writer, self.info)?;
                layout.write_u64(writer, self.addralign)?;
                layout.write_u64(writer, self.entsize)?;
            }
            Class::Elf32 => {
                layout.write_u32(writer, self.flags.bits() as u32)?;
                layout.write_u32(writer, self.addr as u32)?;
                layout.write_u32(writer, self.offset as u32)?;
                layout.write_u32(writer, self.size as u32)?;
                layout.write_u32(writer, self.link)?;
                layout.write_u32(writer, self.info)?;
                layout.write_u32(writer, self.addralign as u32)?;
                layout.write_u32(writer, self.entsize as u32)?;
            }
        }
        Ok(())
    }
}

impl HasWrittenSize for SectionHeader {
    fn written_size(&self, layout: &Layout) -> u64 {
        FileHeader::shentsize_for(layout) as u64
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Class, DataEncoding};

    fn layout() -> Layout {
        Layout::new(Class::Elf64, DataEncoding::Lsb)
    }

    #[test]
    fn program_header_round_trips() {
        let ph = ProgramHeader {
            segment_type: SegmentType::Load,
            flags: SegmentFlags::READ | SegmentFlags::EXECUTE,
            offset: 0,
            vaddr: 0,
            paddr: 0,
            filesz: 0x1000,
            memsz: 0x1000,
            align: 0x1000,
        };
        let mut buf = Vec::new();
        ph.to_writer(&mut buf, &layout()).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let parsed = ProgramHeader::from_reader(&mut cursor, &layout()).unwrap();
        assert_eq!(ph, parsed);
        assert!(parsed.seems_valid());
    }

    #[test]
    fn load_segment_requires_offset_vaddr_congruence() {
        let ph = ProgramHeader {
            segment_type: SegmentType::Load,
            flags: SegmentFlags::READ,
            offset: 1,
            vaddr: 0,
            paddr: 0,
            filesz: 0,
            memsz: 0,
            align: 0x1000,
        };
        assert!(!ph.seems_valid());
    }

    #[test]
    fn section_header_round_trips_and_classifies_nobits() {
        let sh = SectionHeader {
            name_offset: 1,
            name: ".bss".into(),
            section_type: SectionType::NoBits,
            flags: SectionFlags::WRITE | SectionFlags::ALLOC,
            addr: 0x4000,
            offset: 0x500,
            size: 0x100,
            link: 0,
            info: 0,
            addralign: 8,
            entsize: 0,
        };
        let mut buf = Vec::new();
        sh.to_writer(&mut buf, &layout()).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let mut parsed = SectionHeader::from_reader(&mut cursor, &layout()).unwrap();
        parsed.name = sh.name.clone();
        assert_eq!(sh, parsed);
        assert_eq!(parsed.file_range(), 0x500..0x500);
    }
}
