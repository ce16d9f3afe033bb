//! The in-memory ELF model: ties the layout engine together with the
//! parsed contents of every section, and implements the run-path edit
//! orchestrator on top of it.

use crate::dynamic::{DynamicSection, DynamicTag};
use crate::error::{Error, Result};
use crate::file_all_headers::{FileAllHeaders, MoveSectionAlignment};
use crate::got::GlobalOffsetTable;
use crate::gnu_hash::GnuHashTable;
use crate::header::{FileHeader, ObjectFileType, ProgramHeader, SectionHeader, SectionType};
use crate::ident::Ident;
use crate::interp::ProgramInterpreterSection;
use crate::layout::Layout;
use crate::note::NoteSectionTable;
use crate::strtab::StringTable;
use crate::symtab::SymbolTable;
use crate::traits::{FromReader, ToWriter};
use std::io::Cursor;

/// The parsed contents of one section. Every variant round-trips
/// byte-for-byte; `Raw` is the opaque fallback for section kinds this
/// editor does not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionContent {
    /// Occupies no file space (`.bss` and similar).
    NoBits,
    /// Preserved byte-for-byte, uninterpreted.
    Raw(Vec<u8>),
    /// `.dynamic`.
    Dynamic(DynamicSection),
    /// Any string table (`.dynstr`, `.shstrtab`, …).
    StringTable(StringTable),
    /// `.symtab` or `.dynsym`.
    SymbolTable(SymbolTable),
    /// `.gnu.hash`.
    GnuHash(GnuHashTable),
    /// `.interp`.
    Interp(ProgramInterpreterSection),
    /// A note section (there may be several).
    Note(NoteSectionTable),
    /// `.got` or `.got.plt`.
    Got(GlobalOffsetTable),
}

impl SectionContent {
    fn to_writer(&self, writer: &mut impl std::io::Write, layout: &Layout) -> Result<()> {
        match self {
            SectionContent::NoBits => Ok(()),
            SectionContent::Raw(bytes) => writer.write_all(bytes).map_err(Error::FileWrite),
            SectionContent::Dynamic(d) => d.to_writer(writer, layout),
            SectionContent::StringTable(s) => s.to_writer(writer, layout),
            SectionContent::SymbolTable(s) => s.to_writer(writer, layout),
            SectionContent::GnuHash(g) => g.to_writer(writer, layout),
            SectionContent::Interp(i) => i.to_writer(writer, layout),
            SectionContent::Note(n) => n.to_writer(writer, layout),
            SectionContent::Got(g) => g.to_writer(writer, layout),
        }
    }
}

/// The full in-memory model of an ELF file: identification, the layout
/// engine's arena, and every section's parsed content.
#[derive(Debug, Clone)]
pub struct ElfFile {
    ident: Ident,
    layout: Layout,
    headers: FileAllHeaders,
    contents: Vec<SectionContent>,
}

fn write_at(buf: &mut Vec<u8>, offset: u64, bytes: &[u8]) {
    let end = offset as usize + bytes.len();
    if buf.len() < end {
        buf.resize(end, 0);
    }
    buf[offset as usize..end].copy_from_slice(bytes);
}

impl ElfFile {
    /// Parse a full ELF image from `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let ident = Ident::from_reader(&mut cursor)?;
        if !ident.seems_valid() {
            return Err(Error::invalid_image(
                crate::error::ErrorContext::new(0, "e_ident"),
                "identification prefix failed local consistency check",
            ));
        }
        let layout = ident.layout();
        let file_header = FileHeader::from_reader(&mut cursor, &layout)?;
        if !file_header.seems_valid(&layout) {
            return Err(Error::invalid_image(
                crate::error::ErrorContext::new(Ident::SIZE, "file header"),
                "header/entry sizes do not match the declared class",
            ));
        }
        if matches!(file_header.object_type, ObjectFileType::Rel | ObjectFileType::Core) {
            return Err(Error::UnsupportedImage(
                "relocatable objects and core dumps are not supported".into(),
            ));
        }

        let mut program_headers = Vec::with_capacity(file_header.phnum as usize);
        for i in 0..file_header.phnum as u64 {
            let mut c = Cursor::new(data);
            c.set_position(file_header.phoff + i * file_header.phentsize as u64);
            program_headers.push(ProgramHeader::from_reader(&mut c, &layout)?);
        }

        let mut section_headers = Vec::with_capacity(file_header.shnum as usize);
        for i in 0..file_header.shnum as u64 {
            let mut c = Cursor::new(data);
            c.set_position(file_header.shoff + i * file_header.shentsize as u64);
            section_headers.push(SectionHeader::from_reader(&mut c, &layout)?);
        }

        if let Some(shstrtab_header) = section_headers.get(file_header.shstrndx as usize) {
            let range = shstrtab_header.file_range();
            let bytes = data
                .get(range.start as usize..range.end as usize)
                .ok_or_else(|| {
                    Error::invalid_image(
                        crate::error::ErrorContext::new(range.start, ".shstrtab"),
                        "section-name string table out of bounds",
                    )
                })?;
            let shstrtab = StringTable::from_bytes(bytes.to_vec());
            for section in &mut section_headers {
                section.name = shstrtab.get(section.name_offset).unwrap_or("").to_owned();
            }
        }

        let mut headers = FileAllHeaders::new(file_header, program_headers, section_headers);
        headers.index_known_headers();

        let dynstr_index = headers.dynstr_section_index();
        let mut contents = Vec::with_capacity(headers.section_headers.len());
        for (index, section) in headers.section_headers.iter().enumerate() {
            if section.section_type == SectionType::NoBits {
                contents.push(SectionContent::NoBits);
                continue;
            }
            let range = section.file_range();
            let bytes = data.get(range.start as usize..range.end as usize).ok_or_else(|| {
                Error::invalid_image(
                    crate::error::ErrorContext::new(range.start, &section.name),
                    "section contents out of bounds",
                )
            })?;
            let mut c = Cursor::new(bytes);

            let content = if section.section_type == SectionType::Dynamic {
                SectionContent::Dynamic(DynamicSection::from_reader_bounded(&mut c, &layout, section.size)?)
            } else if section.section_type == SectionType::StringTable {
                SectionContent::StringTable(StringTable::from_reader(&mut c, &layout)?)
            } else if matches!(section.section_type, SectionType::SymbolTable | SectionType::DynSym) {
                let entry_size = if section.entsize != 0 {
                    section.entsize
                } else {
                    match layout.class {
                        crate::layout::Class::Elf32 => 16,
                        crate::layout::Class::Elf64 => 24,
                    }
                };
                let count = section.size / entry_size.max(1);
                SectionContent::SymbolTable(SymbolTable::from_reader_with_count(&mut c, &layout, count)?)
            } else if section.section_type == SectionType::GnuHash {
                SectionContent::GnuHash(GnuHashTable::from_reader_bounded(&mut c, &layout, section.size)?)
            } else if section.name == ".interp" {
                SectionContent::Interp(ProgramInterpreterSection::from_reader(&mut c, &layout)?)
            } else if section.section_type == SectionType::Note {
                SectionContent::Note(NoteSectionTable::from_reader_bounded(&mut c, &layout, section.size)?)
            } else if (section.name == ".got" || section.name == ".got.plt") && section.size > 0 {
                let count = section.size / layout.word_size().max(1);
                SectionContent::Got(GlobalOffsetTable::from_reader_with_count(&mut c, &layout, count)?)
            } else {
                SectionContent::Raw(bytes.to_vec())
            };

            if Some(index) == dynstr_index {
                log::debug!("identified dynamic string table at section index {index}");
            }
            contents.push(content);
        }

        Ok(Self {
            ident,
            layout,
            headers,
            contents,
        })
    }

    /// Serialize the model back to bytes, reflecting every edit applied so
    /// far. All-or-nothing: this only runs once [`Self::seems_valid`]
    /// holds.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if !self.seems_valid() {
            return Err(Error::invalid_image(
                crate::error::ErrorContext::new(0, "file model"),
                "global layout invariants do not hold, refusing to serialize",
            ));
        }

        let file_end = self.headers.find_global_file_end();
        let mut buf = vec![0u8; file_end as usize];

        let mut ident_buf = Vec::new();
        self.ident.to_writer(&mut ident_buf)?;
        write_at(&mut buf, 0, &ident_buf);

        let mut header_buf = Vec::new();
        self.headers.file_header.to_writer(&mut header_buf, &self.layout)?;
        write_at(&mut buf, Ident::SIZE, &header_buf);

        for (i, ph) in self.headers.program_headers.iter().enumerate() {
            let mut phbuf = Vec::new();
            ph.to_writer(&mut phbuf, &self.layout)?;
            write_at(
                &mut buf,
                self.headers.file_header.phoff + i as u64 * self.headers.file_header.phentsize as u64,
                &phbuf,
            );
        }

        for (i, sh) in self.headers.section_headers.iter().enumerate() {
            let mut shbuf = Vec::new();
            sh.to_writer(&mut shbuf, &self.layout)?;
            write_at(
                &mut buf,
                self.headers.file_header.shoff + i as u64 * self.headers.file_header.shentsize as u64,
                &shbuf,
            );

            if sh.section_type == SectionType::NoBits {
                continue;
            }
            let mut content_buf = Vec::new();
            self.contents[i].to_writer(&mut content_buf, &self.layout)?;
            write_at(&mut buf, sh.offset, &content_buf);
        }

        Ok(buf)
    }

    /// Global consistency: table counts agree with the file header and
    /// program/section headers are internally well-formed. A full
    /// structural re-validation against every field would re-derive what
    /// the layout engine already guarantees by construction; this check
    /// is the one invariant that can be violated by careless direct
    /// field mutation.
    pub fn seems_valid(&self) -> bool {
        self.headers.seems_valid()
    }

    /// The machine (instruction set) this file was built for.
    pub fn machine(&self) -> crate::header::Machine {
        self.headers.file_header.machine
    }

    /// The platform this file was built for: always `Linux`/`Elf`, with
    /// the processor ISA derived from the machine field.
    pub fn platform(&self) -> crate::platform::Platform {
        use crate::header::Machine;
        use crate::platform::{Compiler, ExecutableFileFormat, OperatingSystem, Platform, ProcessorISA};
        let processor_isa = match self.machine() {
            Machine::X86 => ProcessorISA::X86_32,
            Machine::X86_64 => ProcessorISA::X86_64,
            _ => ProcessorISA::Unknown,
        };
        Platform::new(OperatingSystem::Linux, ExecutableFileFormat::Elf, Compiler::Unknown, processor_isa)
    }

    /// Whether this file is an executable or a shared object — the only
    /// two object types the editor operates on.
    pub fn is_executable_or_shared_library(&self) -> bool {
        matches!(
            self.headers.file_header.object_type,
            ObjectFileType::Exec | ObjectFileType::Dyn
        )
    }

    /// Heuristic debug-symbol detection: a non-empty `.symtab` is present.
    /// `.dynsym` does not count — it exists in every dynamically linked
    /// binary regardless of whether debug info was stripped.
    pub fn contains_debug_symbols(&self) -> bool {
        self.headers
            .section_headers
            .iter()
            .position(|s| s.section_type == SectionType::SymbolTable)
            .map(|i| matches!(&self.contents[i], SectionContent::SymbolTable(t) if !t.entries().is_empty()))
            .unwrap_or(false)
    }

    /// Whether any segment or section carries a `p_type`/`sh_type` this
    /// editor does not recognize (the `SegmentType::Unknown`/
    /// `SectionType::Other` fallback variants). The editor preserves such
    /// headers byte-for-byte regardless, but `Config::lenient = false`
    /// asks the caller's open to fail fast on them rather than proceed.
    pub fn contains_unrecognized_header_kinds(&self) -> bool {
        self.headers
            .program_headers
            .iter()
            .any(|p| matches!(p.segment_type, crate::header::SegmentType::Unknown(_)))
            || self
                .headers
                .section_headers
                .iter()
                .any(|s| matches!(s.section_type, SectionType::Other(_)))
    }

    /// A human-readable dump of the whole file: identification, file
    /// header, every program and section header, the section-to-segment
    /// mapping, and the parsed content of each well-known section
    /// present. Meant for troubleshooting, not parsed by anything.
    pub fn describe_layout(&self) -> String {
        use crate::diagnostics;

        let mut out = String::new();
        out.push_str(&self.ident.to_string());
        out.push_str("\n\n");
        out.push_str(&self.headers.file_header.to_string());
        out.push_str("\n\nProgram Headers:");
        for (i, header) in self.headers.program_headers.iter().enumerate() {
            out.push_str(&format!("\n[{i}] {header}"));
        }
        out.push_str("\n\nSection Headers:");
        for (i, header) in self.headers.section_headers.iter().enumerate() {
            out.push_str(&format!("\n[{i}] {header}"));
        }
        out.push_str("\n\n");
        out.push_str(&diagnostics::section_segment_mapping(&self.headers.program_headers, &self.headers.section_headers));

        if let Some(dynamic) = self.dynamic() {
            out.push_str("\n\n");
            out.push_str(&diagnostics::describe_dynamic_section(dynamic));
        }
        if let Some(i) = self.headers.interp_section_index() {
            if let SectionContent::Interp(interp) = &self.contents[i] {
                out.push_str(&format!("\n\nProgram interpreter: {}", interp.path));
            }
        }
        for (i, header) in self.headers.section_headers.iter().enumerate() {
            match (&header.section_type, &self.contents[i]) {
                (SectionType::SymbolTable, SectionContent::SymbolTable(table)) | (SectionType::DynSym, SectionContent::SymbolTable(table)) => {
                    out.push_str(&format!("\n\nSymbol table '{}':", header.name));
                    out.push_str(&diagnostics::describe_symbol_table(table));
                }
                (SectionType::GnuHash, SectionContent::GnuHash(table)) => {
                    out.push_str("\n\n");
                    out.push_str(&diagnostics::describe_gnu_hash_table(table));
                }
                (SectionType::Note, SectionContent::Note(table)) => {
                    out.push_str(&format!("\n\nNotes in '{}':", header.name));
                    out.push_str(&diagnostics::describe_note_section_table(table));
                }
                _ => {}
            }
        }
        out
    }

    fn dynamic(&self) -> Option<&DynamicSection> {
        self.headers.dynamic_section_index().and_then(|i| match &self.contents[i] {
            SectionContent::Dynamic(d) => Some(d),
            _ => None,
        })
    }

    fn dynstr(&self) -> Option<&StringTable> {
        self.headers.dynstr_section_index().and_then(|i| match &self.contents[i] {
            SectionContent::StringTable(s) => Some(s),
            _ => None,
        })
    }

    /// Current RUNPATH/RPATH value, if the file has a `.dynamic` section
    /// and a Runpath or RPath entry.
    pub fn get_run_path(&self) -> Result<Option<String>> {
        let (Some(dynamic), Some(dynstr)) = (self.dynamic(), self.dynstr()) else {
            return Ok(None);
        };
        match dynamic.run_path_offset() {
            Some(offset) => Ok(Some(dynstr.get(offset)?.to_owned())),
            None => Ok(None),
        }
    }

    /// Every `NEEDED` library name, in dynamic-section order.
    pub fn get_needed_shared_libraries(&self) -> Result<Vec<String>> {
        let (Some(dynamic), Some(dynstr)) = (self.dynamic(), self.dynstr()) else {
            return Ok(Vec::new());
        };
        dynamic
            .needed_offsets()
            .into_iter()
            .map(|offset| dynstr.get(offset).map(|s| s.to_owned()))
            .collect()
    }

    /// Edit orchestrator: the ten-step strategy for setting the run path.
    pub fn set_run_path(&mut self, new_value: &str) -> Result<()> {
        if self.get_run_path()?.as_deref() == Some(new_value) {
            log::debug!("runpath already set to the requested value, nothing to do");
            return Ok(());
        }

        let dynamic_index = self
            .headers
            .dynamic_section_index()
            .ok_or_else(|| Error::UnsupportedImage("file has no .dynamic section".into()))?;
        let dynstr_index = self
            .headers
            .dynstr_section_index()
            .ok_or_else(|| Error::UnsupportedImage("file has no dynamic string table".into()))?;

        let original_dynamic_vaddr = self.headers.section_headers[dynamic_index].addr;
        let old_dynamic_size = self.headers.section_headers[dynamic_index].size;
        let old_dynstr_size = self.headers.section_headers[dynstr_index].size;

        // Step 1: apply the string change. The dynamic string table is
        // rebuilt from scratch rather than appended to: every other
        // string still referenced by a `Needed`/`SoName`/`RPath` entry is
        // re-added in ascending order of its *current* offset (which
        // reproduces the original table's compacted layout byte-for-byte
        // when no referenced string changes length), then the new run
        // path is appended. This is what lets a same-or-shorter run path
        // leave `.dynstr` unchanged in size instead of growing it on
        // every edit.
        let mut refs: Vec<(usize, u32)> = match &self.contents[dynamic_index] {
            SectionContent::Dynamic(d) => d
                .string_referencing_entries()
                .filter(|&(_, tag, _)| tag != DynamicTag::Runpath)
                .map(|(i, _, offset)| (i, offset))
                .collect(),
            _ => return Err(Error::UnsupportedImage(".dynamic section has wrong kind".into())),
        };
        let old_dynstr = match &self.contents[dynstr_index] {
            SectionContent::StringTable(s) => s.clone(),
            _ => return Err(Error::UnsupportedImage("dynamic string table has wrong kind".into())),
        };
        refs.sort_by_key(|&(_, offset)| offset);

        let mut new_table = StringTable::new();
        let mut patched_values = Vec::with_capacity(refs.len());
        for (index, old_string_offset) in refs {
            let s = old_dynstr.get(old_string_offset)?;
            let new_string_offset = new_table.append(s);
            patched_values.push((index, new_string_offset));
        }
        let new_offset = if new_value.is_empty() {
            None
        } else {
            Some(new_table.append(new_value))
        };
        let new_dynstr_size = new_table.len();

        {
            let SectionContent::Dynamic(dynamic) = &mut self.contents[dynamic_index] else {
                unreachable!()
            };
            for (index, string_offset) in patched_values {
                dynamic.set_entry_value(index, string_offset as u64);
            }
            dynamic.set_run_path(new_offset);
            dynamic.patch_value(DynamicTag::StringTableSize, new_dynstr_size);
        }
        self.contents[dynstr_index] = SectionContent::StringTable(new_table);

        let new_dynamic_size = match &self.contents[dynamic_index] {
            SectionContent::Dynamic(d) => d.byte_size(&self.layout),
            _ => unreachable!(),
        };

        self.headers.section_headers[dynamic_index].size = new_dynamic_size;
        self.headers.section_headers[dynstr_index].size = new_dynstr_size;
        if let Some(ph) = self.headers.dynamic_program_header_index() {
            self.headers.program_headers[ph].filesz = new_dynamic_size;
            self.headers.program_headers[ph].memsz = new_dynamic_size;
        }

        // Step 2: does anything overflow its current place? Shrinking
        // never triggers movement.
        let dynamic_grew = new_dynamic_size > old_dynamic_size;
        let dynstr_grew = new_dynstr_size > old_dynstr_size;
        if !dynamic_grew && !dynstr_grew {
            log::debug!("runpath edit fits in place, no section relocation required");
            return Ok(());
        }

        // Step 3: find how many leading sections must move to free one
        // new program header entry.
        let phentsize = self.headers.file_header.phentsize as u64;
        let k = self.headers.count_of_sections_to_move_to_free(phentsize);
        log::debug!("runpath edit requires relocation: freeing {phentsize} bytes needs {k} leading sections to move");

        // Step 4: sort section headers by file offset, remap shndx.
        let change_map = self.headers.sort_section_headers_by_file_offset();
        let mut reordered = vec![SectionContent::NoBits; self.contents.len()];
        for (old_index, content) in self.contents.drain(..).enumerate() {
            reordered[change_map.map(old_index as u16) as usize] = content;
        }
        self.contents = reordered;
        for content in &mut self.contents {
            if let SectionContent::SymbolTable(table) = content {
                table.update_section_indexes(&change_map);
            }
        }

        let Some(dynamic_index) = self.headers.dynamic_section_index() else {
            return Err(Error::invalid_image(
                crate::error::ErrorContext::new(0, ".dynamic"),
                "dynamic section index lost across a sort that only reorders entries",
            ));
        };
        let Some(dynstr_index) = self.headers.dynstr_section_index() else {
            return Err(Error::invalid_image(
                crate::error::ErrorContext::new(0, ".dynstr"),
                "dynamic string table index lost across a sort that only reorders entries",
            ));
        };

        // Step 5
        if k >= self.headers.section_headers.len() {
            return Err(Error::MoveSection(
                "too few sections to free a new program header entry".into(),
            ));
        }

        // Step 6: move the first k-1 leading sections (skipping null).
        let mut moved_indexes: Vec<u16> = Vec::new();
        let mut first_move = true;
        let mut i = 1usize;
        while i < k {
            let alignment = if first_move {
                MoveSectionAlignment::NextPage
            } else {
                MoveSectionAlignment::SectionAlignment
            };
            if self.headers.section_headers[i].section_type == SectionType::Note {
                let moved = self.headers.move_note_sections_to_end(alignment);
                moved_indexes.extend(moved.iter().map(|&x| x as u16));
                i += moved.len().max(1);
            } else {
                self.headers.move_section_to_end(i, alignment);
                moved_indexes.push(i as u16);
                i += 1;
            }
            first_move = false;
        }

        // Step 7 / 8: move .dynamic / .dynstr if they grew. Unlike step 6's
        // leading sections, these always align to the section's own
        // alignment, never to a fresh page.
        if dynamic_grew {
            self.headers
                .move_section_to_end(dynamic_index, MoveSectionAlignment::SectionAlignment);
            moved_indexes.push(dynamic_index as u16);
        }
        if dynstr_grew {
            self.headers
                .move_section_to_end(dynstr_index, MoveSectionAlignment::SectionAlignment);
            moved_indexes.push(dynstr_index as u16);
        }

        // Step 9: patch cross-references against the moved sections.
        for content in &mut self.contents {
            if let SectionContent::SymbolTable(table) = content {
                table.update_virtual_addresses(&moved_indexes, &self.headers.section_headers);
            }
        }
        if dynamic_grew {
            let new_vaddr = self.headers.section_headers[dynamic_index].addr;
            log::debug!(".dynamic relocated from vaddr 0x{original_dynamic_vaddr:x} to 0x{new_vaddr:x}");
            for content in &mut self.contents {
                if let SectionContent::Got(got) = content {
                    if got.holds_dynamic_section_address(original_dynamic_vaddr) {
                        got.patch_dynamic_section_address(new_vaddr);
                    }
                }
            }
        }
        if dynstr_grew {
            let new_vaddr = self.headers.section_headers[dynstr_index].addr;
            if let SectionContent::Dynamic(dynamic) = &mut self.contents[dynamic_index] {
                dynamic.patch_value(DynamicTag::StringTable, new_vaddr);
            }
        }
        if let Some(gnu_hash_index) = self.headers.gnu_hash_section_index() {
            if moved_indexes.contains(&(gnu_hash_index as u16)) {
                let new_vaddr = self.headers.section_headers[gnu_hash_index].addr;
                if let SectionContent::Dynamic(dynamic) = &mut self.contents[dynamic_index] {
                    dynamic.patch_value(DynamicTag::GnuHash, new_vaddr);
                }
            }
        }

        // Step 10: synthesize the new PT_LOAD consuming the freed entry.
        if !moved_indexes.is_empty() {
            let section_indexes: Vec<usize> = moved_indexes.iter().map(|&i| i as usize).collect();
            let load = self.headers.synthesize_load_segment(&section_indexes);
            self.headers.program_headers.push(load);
            self.headers.file_header.phnum = self.headers.program_headers.len() as u16;
        }
        self.headers.index_known_headers();

        if !self.seems_valid() {
            return Err(Error::invalid_image(
                crate::error::ErrorContext::new(0, "post-edit layout"),
                "layout invariants failed after editing the run path",
            ));
        }

        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{SectionFlags, SegmentFlags, SegmentType};
    use crate::layout::{Class, DataEncoding};

    /// Builds a small, synthetic but structurally valid ELF64 LE shared
    /// object in memory: file header, one PT_LOAD and one PT_DYNAMIC, and
    /// three sections (null, `.dynstr`, `.dynamic`), with a RUNPATH
    /// already present. No checked-in binary corpus was retrieved with
    /// this crate's reference pack, so tests build their own fixtures.
    struct Fixture {
        bytes: Vec<u8>,
    }

    impl Fixture {
        fn build(run_path: Option<&str>) -> Self {
            let layout = Layout::new(Class::Elf64, DataEncoding::Lsb);

            let mut dynstr = StringTable::new();
            let soname_offset = dynstr.append("libfixture.so.1");
            let run_path_offset = run_path.map(|p| dynstr.append(p));

            let mut dynamic = DynamicSection::from_entries(vec![
                crate::dynamic::DynamicEntry {
                    tag: DynamicTag::StringTable,
                    value: 0, // patched below once laid out
                },
                crate::dynamic::DynamicEntry {
                    tag: DynamicTag::SoName,
                    value: soname_offset as u64,
                },
                crate::dynamic::DynamicEntry {
                    tag: DynamicTag::StringTableSize,
                    value: dynstr.len(), // patched below once the run path is set
                },
                crate::dynamic::DynamicEntry {
                    tag: DynamicTag::Null,
                    value: 0,
                },
            ]);
            dynamic.set_run_path(run_path_offset);
            dynamic.patch_value(DynamicTag::StringTableSize, dynstr.len());

            let ehsize = 64u64;
            let phentsize = 56u64;
            let phnum = 2u64;
            let shentsize = 64u64;
            let shnum = 3u64;

            let phoff = ehsize;
            let shoff_placeholder = 0u64; // computed after sizing sections

            let dynstr_bytes_len = dynstr.len();
            let dynamic_bytes_len = dynamic.byte_size(&layout);

            let headers_end = phoff + phnum * phentsize;
            let dynstr_offset = headers_end;
            let dynamic_offset = dynstr_offset + dynstr_bytes_len;
            let section_data_end = dynamic_offset + dynamic_bytes_len;
            let shoff = section_data_end;

            // patch the StringTable dynamic-entry tag to a "virtual
            // address" consistent with file offset (identity mapping for
            // this fixture, vaddr == offset).
            dynamic.patch_value(DynamicTag::StringTable, dynstr_offset);

            let file_header = FileHeader {
                object_type: ObjectFileType::Dyn,
                machine: crate::header::Machine::X86_64,
                version: 1,
                entry: 0,
                phoff,
                shoff,
                flags: 0,
                ehsize: ehsize as u16,
                phentsize: phentsize as u16,
                phnum: phnum as u16,
                shentsize: shentsize as u16,
                shnum: shnum as u16,
                shstrndx: 0,
            };

            let program_headers = vec![
                ProgramHeader {
                    segment_type: SegmentType::Load,
                    flags: SegmentFlags::READ | SegmentFlags::WRITE,
                    offset: 0,
                    vaddr: 0,
                    paddr: 0,
                    filesz: section_data_end,
                    memsz: section_data_end,
                    align: Layout::PAGE_SIZE,
                },
                ProgramHeader {
                    segment_type: SegmentType::Dynamic,
                    flags: SegmentFlags::READ | SegmentFlags::WRITE,
                    offset: dynamic_offset,
                    vaddr: dynamic_offset,
                    paddr: dynamic_offset,
                    filesz: dynamic_bytes_len,
                    memsz: dynamic_bytes_len,
                    align: 8,
                },
            ];

            let section_headers = vec![
                SectionHeader {
                    name_offset: 0,
                    name: String::new(),
                    section_type: SectionType::Null,
                    flags: SectionFlags::empty(),
                    addr: 0,
                    offset: 0,
                    size: 0,
                    link: 0,
                    info: 0,
                    addralign: 0,
                    entsize: 0,
                },
                SectionHeader {
                    name_offset: 0,
                    name: ".dynstr".into(),
                    section_type: SectionType::StringTable,
                    flags: SectionFlags::ALLOC,
                    addr: dynstr_offset,
                    offset: dynstr_offset,
                    size: dynstr_bytes_len,
                    link: 0,
                    info: 0,
                    addralign: 1,
                    entsize: 0,
                },
                SectionHeader {
                    name_offset: 0,
                    name: ".dynamic".into(),
                    section_type: SectionType::Dynamic,
                    flags: SectionFlags::ALLOC | SectionFlags::WRITE,
                    addr: dynamic_offset,
                    offset: dynamic_offset,
                    size: dynamic_bytes_len,
                    link: 1,
                    info: 0,
                    addralign: 8,
                    entsize: 16,
                },
            ];

            let mut buf = vec![0u8; shoff_placeholder as usize];
            let mut ident_buf = Vec::new();
            Ident {
                class: Class::Elf64,
                data_encoding: DataEncoding::Lsb,
                version: crate::ident::IdentifierVersion::Current,
                os_abi: crate::ident::OsAbi::SystemV,
                abi_version: 0,
            }
            .to_writer(&mut ident_buf)
            .unwrap();
            write_at(&mut buf, 0, &ident_buf);

            let mut header_buf = Vec::new();
            file_header.to_writer(&mut header_buf, &layout).unwrap();
            write_at(&mut buf, Ident::SIZE, &header_buf);

            for (i, ph) in program_headers.iter().enumerate() {
                let mut b = Vec::new();
                ph.to_writer(&mut b, &layout).unwrap();
                write_at(&mut buf, phoff + i as u64 * phentsize, &b);
            }

            for (i, sh) in section_headers.iter().enumerate() {
                let mut b = Vec::new();
                sh.to_writer(&mut b, &layout).unwrap();
                write_at(&mut buf, shoff + i as u64 * shentsize, &b);
            }

            write_at(&mut buf, dynstr_offset, dynstr.as_bytes());
            let mut dynamic_buf = Vec::new();
            dynamic.to_writer(&mut dynamic_buf, &layout).unwrap();
            write_at(&mut buf, dynamic_offset, &dynamic_buf);

            Self { bytes: buf }
        }
    }

    #[test]
    fn parses_synthetic_fixture_and_reads_run_path() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        assert!(model.is_executable_or_shared_library());
        assert_eq!(model.get_run_path().unwrap().as_deref(), Some("/opt/libA"));
    }

    #[test]
    fn s3_same_length_replacement_does_not_relocate() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let mut model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        let original_dynamic_offset = model.headers.section_headers[model.headers.dynamic_section_index().unwrap()].offset;
        model.set_run_path("/opt/libB").unwrap();
        assert_eq!(model.get_run_path().unwrap().as_deref(), Some("/opt/libB"));
        assert_eq!(
            model.headers.section_headers[model.headers.dynamic_section_index().unwrap()].offset,
            original_dynamic_offset
        );
    }

    #[test]
    fn s1_shrinking_string_does_not_relocate_and_shrinks_dynstr() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let mut model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        let original_shoff = model.headers.file_header.shoff;
        let original_phoff = model.headers.file_header.phoff;
        model.set_run_path("/opt").unwrap();
        assert_eq!(model.get_run_path().unwrap().as_deref(), Some("/opt"));
        assert_eq!(model.headers.file_header.shoff, original_shoff);
        assert_eq!(model.headers.file_header.phoff, original_phoff);
        let dynstr_index = model.headers.dynstr_section_index().unwrap();
        // leading NUL (1) + "libfixture.so.1\0" (16, untouched) + "/opt\0" (5).
        assert_eq!(model.headers.section_headers[dynstr_index].size, 22);
    }

    #[test]
    fn rebuild_preserves_soname_and_updates_string_table_size_entry() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let mut model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        model.set_run_path("/opt/libB").unwrap();

        let dynamic_index = model.headers.dynamic_section_index().unwrap();
        let SectionContent::Dynamic(dynamic) = &model.contents[dynamic_index] else {
            unreachable!("fixture always parses .dynamic as SectionContent::Dynamic")
        };
        let soname_offset = dynamic.find(DynamicTag::SoName).unwrap().value as u32;
        let dynstr_index = model.headers.dynstr_section_index().unwrap();
        let SectionContent::StringTable(dynstr) = &model.contents[dynstr_index] else {
            unreachable!("fixture always parses .dynstr as SectionContent::StringTable")
        };
        assert_eq!(dynstr.get(soname_offset).unwrap(), "libfixture.so.1");

        let strsz = dynamic.find(DynamicTag::StringTableSize).unwrap().value;
        assert_eq!(strsz, dynstr.len());
    }

    #[test]
    fn growing_run_path_relocates_and_adds_a_load_segment() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let mut model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        let original_phnum = model.headers.file_header.phnum;
        model.set_run_path(&"x".repeat(10_000)).unwrap();
        assert!(model.headers.file_header.phnum > original_phnum);
        assert!(model.seems_valid());
        let round_tripped = model.to_bytes().unwrap();
        let reparsed = ElfFile::from_bytes(&round_tripped).unwrap();
        assert_eq!(reparsed.get_run_path().unwrap().unwrap().len(), 10_000);
    }

    #[test]
    fn identity_edit_is_a_no_op() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let mut model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        let current = model.get_run_path().unwrap().unwrap();
        model.set_run_path(&current).unwrap();
        let reserialized = model.to_bytes().unwrap();
        assert_eq!(reserialized, fixture.bytes);
    }

    #[test]
    fn round_trip_read_back_matches_model() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        let serialized = model.to_bytes().unwrap();
        assert_eq!(serialized, fixture.bytes);
    }

    #[test]
    fn recognizes_well_known_header_kinds_as_not_unrecognized() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        assert!(!model.contains_unrecognized_header_kinds());
    }

    #[test]
    fn flags_an_opaque_segment_type_as_unrecognized() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let mut model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        model.headers.program_headers.push(ProgramHeader {
            segment_type: SegmentType::Unknown(0x6000_0001),
            flags: SegmentFlags::READ,
            offset: 0,
            vaddr: 0,
            paddr: 0,
            filesz: 0,
            memsz: 0,
            align: 1,
        });
        assert!(model.contains_unrecognized_header_kinds());
    }

    #[test]
    fn describe_layout_mentions_sections_segments_and_run_path() {
        let fixture = Fixture::build(Some("/opt/libA"));
        let model = ElfFile::from_bytes(&fixture.bytes).unwrap();
        let description = model.describe_layout();
        assert!(description.contains("PT_LOAD"));
        assert!(description.contains("PT_DYNAMIC"));
        assert!(description.contains(".dynstr"));
        assert!(description.contains("Dynamic section"));
    }
}
