//! Human-readable renderings of the data model: per-structure `Display`
//! impls plus a whole-file layout dump, in the spirit of `readelf`. Pure
//! presentation — nothing here feeds back into parsing or editing.

use crate::dynamic::{DynamicSection, DynamicTag};
use crate::gnu_hash::GnuHashTable;
use crate::header::{FileHeader, Machine, ObjectFileType, ProgramHeader, SectionHeader, SectionType, SegmentType};
use crate::note::NoteSectionTable;
use crate::strtab::StringTable;
use crate::symtab::SymbolTable;
use std::fmt;

/// `PT_*` name as it appears in `readelf -l` output.
pub fn segment_type_name(segment_type: SegmentType) -> &'static str {
    match segment_type {
        SegmentType::Null => "PT_NULL",
        SegmentType::Load => "PT_LOAD",
        SegmentType::Dynamic => "PT_DYNAMIC",
        SegmentType::Interpreter => "PT_INTERP",
        SegmentType::Note => "PT_NOTE",
        SegmentType::ProgramHeaderTable => "PT_PHDR",
        SegmentType::Tls => "PT_TLS",
        SegmentType::GnuEhFrame => "PT_GNU_EH_FRAME",
        SegmentType::GnuStack => "PT_GNU_STACK",
        SegmentType::GnuRelRo => "PT_GNU_RELRO",
        SegmentType::Unknown(_) => "unknown",
    }
}

/// One-line description of what a segment type is for.
pub fn describe_segment_type(segment_type: SegmentType) -> &'static str {
    match segment_type {
        SegmentType::Null => "unused program header table entry",
        SegmentType::Load => "loadable segment",
        SegmentType::Dynamic => "dynamic linking information",
        SegmentType::Interpreter => "interpreter information",
        SegmentType::Note => "auxiliary information",
        SegmentType::ProgramHeaderTable => "program header table itself",
        SegmentType::Tls => "thread-local storage template",
        SegmentType::GnuEhFrame => "GNU extension: exception-handling frame info",
        SegmentType::GnuStack => "GNU extension: stack executability hint",
        SegmentType::GnuRelRo => "GNU extension: read-only after relocation",
        SegmentType::Unknown(_) => "unknown",
    }
}

/// One-line description of what a section type holds.
pub fn describe_section_type(section_type: SectionType) -> &'static str {
    match section_type {
        SectionType::Null => "unused",
        SectionType::ProgramData => "program data",
        SectionType::SymbolTable => "symbol table",
        SectionType::StringTable => "string table",
        SectionType::Rela => "relocation entries with addends",
        SectionType::Dynamic => "dynamic linking information",
        SectionType::Note => "notes",
        SectionType::NoBits => "program space with no data (bss)",
        SectionType::Rel => "relocation entries without addends",
        SectionType::DynSym => "dynamic linker symbol table",
        SectionType::InitArray => "array of constructors",
        SectionType::FiniArray => "array of destructors",
        SectionType::GnuHash => "GNU hash table",
        SectionType::GnuVerDef => "symbol versions provided",
        SectionType::GnuVerNeed => "symbol versions required",
        SectionType::GnuVerSym => "symbol version table",
        SectionType::Other(_) => "other/OS-specific",
    }
}

fn describe_object_file_type(t: ObjectFileType) -> &'static str {
    match t {
        ObjectFileType::None => "NONE (no file type)",
        ObjectFileType::Rel => "REL (relocatable file)",
        ObjectFileType::Exec => "EXEC (executable file)",
        ObjectFileType::Dyn => "DYN (shared object)",
        ObjectFileType::Core => "CORE (core file)",
    }
}

fn describe_machine(m: Machine) -> String {
    match m {
        Machine::None => "none".to_owned(),
        Machine::X86 => "Intel 80386".to_owned(),
        Machine::X86_64 => "AMD x86-64".to_owned(),
        Machine::Arm => "ARM".to_owned(),
        Machine::Aarch64 => "ARM AArch64".to_owned(),
        Machine::Other(v) => format!("unknown (0x{v:x})"),
    }
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Object file type: {}", describe_object_file_type(self.object_type))?;
        writeln!(f, "Machine: {}", describe_machine(self.machine))?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Entry point address: 0x{:x}", self.entry)?;
        writeln!(f, "Start of program headers: {} (bytes into file)", self.phoff)?;
        writeln!(f, "Start of section headers: {} (bytes into file)", self.shoff)?;
        writeln!(f, "Flags: 0x{:x}", self.flags)?;
        writeln!(f, "Size of this header: {} (bytes)", self.ehsize)?;
        writeln!(f, "Size of program headers: {} (bytes)", self.phentsize)?;
        writeln!(f, "Number of program headers: {}", self.phnum)?;
        writeln!(f, "Size of section headers: {} (bytes)", self.shentsize)?;
        writeln!(f, "Number of section headers: {}", self.shnum)?;
        write!(f, "Section header string table index: {}", self.shstrndx)
    }
}

impl fmt::Display for ProgramHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", segment_type_name(self.segment_type), describe_segment_type(self.segment_type))?;
        writeln!(f, "  offset in file: 0x{:x} ({} bytes)", self.offset, self.offset)?;
        writeln!(f, "  virtual address: 0x{:x}", self.vaddr)?;
        writeln!(f, "  physical address: 0x{:x}", self.paddr)?;
        writeln!(f, "  size in file: {} bytes", self.filesz)?;
        writeln!(f, "  size in memory: {} bytes", self.memsz)?;
        writeln!(f, "  flags: {:?}", self.flags)?;
        write!(f, "  alignment: 0x{:x}", self.align)
    }
}

impl fmt::Display for SectionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {}", self.name_offset, self.name)?;
        writeln!(f, "  type: {:?} ({})", self.section_type, describe_section_type(self.section_type))?;
        writeln!(f, "  flags: {:?}", self.flags)?;
        writeln!(f, "  address: 0x{:x}", self.addr)?;
        writeln!(f, "  offset in file: 0x{:x}", self.offset)?;
        writeln!(f, "  size: {} bytes", self.size)?;
        writeln!(f, "  link: {}", self.link)?;
        writeln!(f, "  info: {}", self.info)?;
        writeln!(f, "  address alignment: 0x{:x}", self.addralign)?;
        write!(f, "  entry size: {} bytes", self.entsize)
    }
}

fn describe_dynamic_tag(tag: DynamicTag) -> String {
    match tag {
        DynamicTag::Null => "end of the dynamic array".to_owned(),
        DynamicTag::Needed => "string table offset naming a needed library".to_owned(),
        DynamicTag::PltGot => "DT_PLTGOT".to_owned(),
        DynamicTag::Hash => "DT_HASH".to_owned(),
        DynamicTag::StringTable => "address of the dynamic string table".to_owned(),
        DynamicTag::SymbolTable => "DT_SYMTAB: address of the dynamic symbol table".to_owned(),
        DynamicTag::RelocationTable => "DT_RELA: address of the relocation table".to_owned(),
        DynamicTag::RelocationTableSize => "DT_RELASZ: size of the relocation table".to_owned(),
        DynamicTag::RelocationEntrySize => "DT_RELAENT: size of a relocation entry".to_owned(),
        DynamicTag::StringTableSize => "size of the dynamic string table".to_owned(),
        DynamicTag::SymbolEntrySize => "DT_SYMENT: size of a symbol table entry".to_owned(),
        DynamicTag::Init => "DT_INIT: address of the initialization function".to_owned(),
        DynamicTag::Fini => "DT_FINI: address of the termination function".to_owned(),
        DynamicTag::SoName => "string table offset naming this shared object".to_owned(),
        DynamicTag::RPath => "string table offset naming the (legacy) search path".to_owned(),
        DynamicTag::Symbolic => "DT_SYMBOLIC".to_owned(),
        DynamicTag::Debug => "DT_DEBUG".to_owned(),
        DynamicTag::Runpath => "string table offset naming the search path".to_owned(),
        DynamicTag::GnuHash => "DT_GNU_HASH".to_owned(),
        DynamicTag::Other(v) => format!("unknown (0x{v:x})"),
    }
}

/// Render every entry of a `.dynamic` section, one per line. String-table
/// offsets are shown numerically; resolving them to names is the caller's
/// job (it needs the associated `.dynstr`, which this function doesn't
/// have).
pub fn describe_dynamic_section(section: &DynamicSection) -> String {
    let mut out = String::from("Dynamic section:");
    for entry in section.entries() {
        out.push_str(&format!("\n  tag: {:?} ({})\n    value: {} (0x{:x})", entry.tag, describe_dynamic_tag(entry.tag), entry.value, entry.value));
    }
    out
}

/// Render a string table's raw bytes with embedded NULs spelled out as
/// `\0`, the way a hex-dump tool would for a quick eyeball check.
pub fn describe_string_table(table: &StringTable) -> String {
    table
        .as_bytes()
        .iter()
        .map(|&b| if b == 0 { "\\0".to_owned() } else { (b as char).to_string() })
        .collect()
}

/// Render every symbol table entry, one per line.
pub fn describe_symbol_table(table: &SymbolTable) -> String {
    let mut out = String::new();
    for entry in table.entries() {
        out.push_str(&format!(
            "\nname index: {}, value: 0x{:x}, size: {}, type: {:?}, shndx: {}",
            entry.name_offset, entry.value, entry.size, entry.symbol_type, entry.shndx
        ));
    }
    out
}

/// Render a `.gnu.hash` table's header fields and arrays.
pub fn describe_gnu_hash_table(table: &GnuHashTable) -> String {
    let mut out = format!(
        "GNU hash table:\n nbuckets: {}, symoffset: {}, bloom_size: {}, bloom_shift: {}",
        table.nbuckets, table.symoffset, table.bloom_size, table.bloom_shift
    );
    out.push_str("\n bloom array:");
    for entry in &table.bloom {
        out.push_str(&format!("\n  0x{entry:x}"));
    }
    out.push_str("\n buckets array:");
    for entry in &table.buckets {
        out.push_str(&format!("\n  {entry} (0x{entry:x})"));
    }
    out.push_str("\n chain array:");
    for entry in &table.chain {
        out.push_str(&format!("\n  0x{entry:x}"));
    }
    out
}

/// Render every note record in a note section table.
pub fn describe_note_section_table(table: &NoteSectionTable) -> String {
    let mut out = String::new();
    for note in table.notes() {
        out.push_str(&format!("\nowner: {}\ntype: {} (0x{:x})", note.name, note.note_type, note.note_type));
        for (i, chunk) in note.description.chunks(4).enumerate() {
            let mut word_bytes = [0u8; 4];
            word_bytes[..chunk.len()].copy_from_slice(chunk);
            let word = u32::from_le_bytes(word_bytes);
            out.push_str(&format!("\n word {i}: {word} (0x{word:x})"));
        }
    }
    out
}

/// Whether a section's file-offset range falls within the range claimed
/// by a segment that allocates memory for its sections. A simplified,
/// display-only approximation of the loader's stricter containment rule —
/// good enough to label a layout dump, not used by the edit orchestrator.
fn section_belongs_to_segment(section: &SectionHeader, segment: &ProgramHeader) -> bool {
    if !segment.segment_type.can_contain_sections() {
        return false;
    }
    if section.section_type == SectionType::Null {
        return false;
    }
    if section.size == 0 {
        return false;
    }
    if section.allocates_memory() {
        let section_range = section.vaddr_range();
        let segment_range = segment.vaddr_range();
        section_range.start >= segment_range.start && section_range.end <= segment_range.end
    } else {
        let section_range = section.file_range();
        let segment_range = segment.file_range();
        section_range.start >= segment_range.start && section_range.end <= segment_range.end
    }
}

/// `readelf -l`'s "Section to Segment mapping" table: one line per
/// segment, listing the names of the sections it covers.
pub fn section_segment_mapping(program_headers: &[ProgramHeader], section_headers: &[SectionHeader]) -> String {
    let mut out = String::from("Section to segment mapping:");
    for (i, segment) in program_headers.iter().enumerate() {
        out.push_str(&format!("\n{:02} {:16}", i, segment_type_name(segment.segment_type)));
        for section in section_headers {
            if section_belongs_to_segment(section, segment) {
                out.push_str(&format!(" {}", section.name));
            }
        }
    }
    out
}
