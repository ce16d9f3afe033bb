//! The layout engine: the arena that owns every header and
//! section, and the operations that keep the invariant graph between them
//! consistent as sections are relocated.
//!
//! ELF's header graph is cyclic by nature (`PT_DYNAMIC` points at
//! `.dynamic`, `.dynamic` points at `.dynstr` by virtual address, symbols
//! point at sections by index). Rather than model that with shared
//! ownership, everything lives in flat `Vec`s here and every reference is
//! an integer index; cached "where is the X header" lookups are just
//! `Option<usize>` fields recomputed whenever the section header table is
//! replaced or reordered.

use crate::header::{FileHeader, ProgramHeader, SectionHeader, SectionType, SegmentFlags, SegmentType};
use crate::layout::{align_up, next_file_offset, Layout};
use crate::offset_range::OffsetRange;

/// Maps old section-header-table indices to new ones after a sort. Built
/// incrementally from the swaps a selection sort performs, so it is
/// guaranteed to be a bijection on `[0, shnum)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionIndexChangeMap {
    old_to_new: Vec<u16>,
}

impl SectionIndexChangeMap {
    fn identity(count: usize) -> Self {
        Self {
            old_to_new: (0..count as u16).collect(),
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        for entry in &mut self.old_to_new {
            if *entry as usize == a {
                *entry = b as u16;
            } else if *entry as usize == b {
                *entry = a as u16;
            }
        }
    }

    /// Map an old section-header-table index to its new one. Indices
    /// outside `[0, shnum)` (e.g. `SHN_UNDEF`, reserved indices) pass
    /// through unchanged.
    pub fn map(&self, old_index: u16) -> u16 {
        self.old_to_new
            .get(old_index as usize)
            .copied()
            .unwrap_or(old_index)
    }
}

/// Alignment strategy for "move section to end".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveSectionAlignment {
    /// Align to the section's own `addralign`.
    SectionAlignment,
    /// Align to the next page boundary (used for the first section moved,
    /// since it anchors a new `PT_LOAD`).
    NextPage,
}

/// The arena: file header, program header table, section header table,
/// plus cached indices of the headers the editor cares about.
#[derive(Debug, Clone)]
pub struct FileAllHeaders {
    /// The ELF file header.
    pub file_header: FileHeader,
    /// Program header table (segments).
    pub program_headers: Vec<ProgramHeader>,
    /// Section header table.
    pub section_headers: Vec<SectionHeader>,

    dynamic_section_index: Option<usize>,
    dynstr_section_index: Option<usize>,
    got_section_index: Option<usize>,
    got_plt_section_index: Option<usize>,
    interp_section_index: Option<usize>,
    gnu_hash_section_index: Option<usize>,

    dynamic_program_header_index: Option<usize>,
    interp_program_header_index: Option<usize>,
    note_program_header_index: Option<usize>,
    phdr_program_header_index: Option<usize>,
    gnu_relro_program_header_index: Option<usize>,
}

impl FileAllHeaders {
    /// Build the arena from already-parsed headers, then compute the
    /// cached indices.
    pub fn new(file_header: FileHeader, program_headers: Vec<ProgramHeader>, section_headers: Vec<SectionHeader>) -> Self {
        let mut headers = Self {
            file_header,
            program_headers,
            section_headers,
            dynamic_section_index: None,
            dynstr_section_index: None,
            got_section_index: None,
            got_plt_section_index: None,
            interp_section_index: None,
            gnu_hash_section_index: None,
            dynamic_program_header_index: None,
            interp_program_header_index: None,
            note_program_header_index: None,
            phdr_program_header_index: None,
            gnu_relro_program_header_index: None,
        };
        headers.index_known_headers();
        headers
    }

    /// Recompute every cached index. Called after construction and after
    /// any structural change to either table.
    pub fn index_known_headers(&mut self) {
        self.dynamic_section_index = self
            .section_headers
            .iter()
            .position(|s| s.section_type == SectionType::Dynamic);
        self.dynstr_section_index = self.dynamic_section_index.and_then(|i| {
            let link = self.section_headers[i].link as usize;
            self.section_headers.get(link).map(|_| link)
        });
        self.got_section_index = self.section_headers.iter().position(|s| s.name == ".got");
        self.got_plt_section_index = self
            .section_headers
            .iter()
            .position(|s| s.name == ".got.plt");
        self.interp_section_index = self.section_headers.iter().position(|s| s.name == ".interp");
        self.gnu_hash_section_index = self
            .section_headers
            .iter()
            .position(|s| s.section_type == SectionType::GnuHash);

        self.dynamic_program_header_index = self
            .program_headers
            .iter()
            .position(|p| p.segment_type == SegmentType::Dynamic);
        self.interp_program_header_index = self
            .program_headers
            .iter()
            .position(|p| p.segment_type == SegmentType::Interpreter);
        self.note_program_header_index = self
            .program_headers
            .iter()
            .position(|p| p.segment_type == SegmentType::Note);
        self.phdr_program_header_index = self
            .program_headers
            .iter()
            .position(|p| p.segment_type == SegmentType::ProgramHeaderTable);
        self.gnu_relro_program_header_index = self
            .program_headers
            .iter()
            .position(|p| p.segment_type == SegmentType::GnuRelRo);
    }

    /// Index of `.dynamic` in the section header table, if present.
    pub fn dynamic_section_index(&self) -> Option<usize> {
        self.dynamic_section_index
    }

    /// Index of `.dynstr` (the dynamic string table) in the section header
    /// table, if present.
    pub fn dynstr_section_index(&self) -> Option<usize> {
        self.dynstr_section_index
    }

    /// Index of `.got.plt` in the section header table, if present.
    pub fn got_plt_section_index(&self) -> Option<usize> {
        self.got_plt_section_index
    }

    /// Index of `.got` in the section header table, if present.
    pub fn got_section_index(&self) -> Option<usize> {
        self.got_section_index
    }

    /// Index of `.interp` in the section header table, if present.
    pub fn interp_section_index(&self) -> Option<usize> {
        self.interp_section_index
    }

    /// Index of `.gnu.hash` in the section header table, if present.
    pub fn gnu_hash_section_index(&self) -> Option<usize> {
        self.gnu_hash_section_index
    }

    /// Index of the `PT_DYNAMIC` program header, if present.
    pub fn dynamic_program_header_index(&self) -> Option<usize> {
        self.dynamic_program_header_index
    }

    /// Index of the `PT_NOTE` program header, if present.
    pub fn note_program_header_index(&self) -> Option<usize> {
        self.note_program_header_index
    }

    /// Indices of every section of type `Note`.
    pub fn note_section_indexes(&self) -> Vec<usize> {
        self.section_headers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.section_type == SectionType::Note)
            .map(|(i, _)| i)
            .collect()
    }

    /// File header, program header table and section header table are
    /// mutually consistent in count.
    pub fn seems_valid(&self) -> bool {
        self.file_header.phnum as usize == self.program_headers.len()
            && self.file_header.shnum as usize == self.section_headers.len()
    }

    /// Sort the section header table by ascending file offset (stable),
    /// remapping `link`/`info` fields that are section-header-table
    /// indices and `shstrndx`, and returning the resulting
    /// [`SectionIndexChangeMap`]. Implemented as a selection sort: with at
    /// most a few dozen sections this is never a bottleneck, and building
    /// the change map from the swaps performed is simpler than inverting
    /// a general permutation afterwards.
    pub fn sort_section_headers_by_file_offset(&mut self) -> SectionIndexChangeMap {
        let n = self.section_headers.len();
        let mut change_map = SectionIndexChangeMap::identity(n);

        let shstrndx_offset = self
            .section_headers
            .get(self.file_header.shstrndx as usize)
            .map(|s| s.offset);

        for i in 0..n {
            let mut min_index = i;
            for j in (i + 1)..n {
                if self.section_headers[j].offset < self.section_headers[min_index].offset {
                    min_index = j;
                }
            }
            if min_index != i {
                self.section_headers.swap(i, min_index);
                change_map.swap(i, min_index);
            }
        }

        for section in &mut self.section_headers {
            section.link = change_map.map(section.link as u16) as u32;
            if matches!(
                section.section_type,
                SectionType::Rela | SectionType::Rel | SectionType::SymbolTable | SectionType::DynSym
            ) {
                section.info = change_map.map(section.info as u16) as u32;
            }
        }

        if let Some(offset) = shstrndx_offset {
            if let Some(new_index) = self.section_headers.iter().position(|s| s.offset == offset) {
                self.file_header.shstrndx = new_index as u16;
            }
        }

        self.index_known_headers();
        change_map
    }

    /// Last byte addressed by any program header, section header, or the
    /// header tables themselves.
    pub fn find_global_file_end(&self) -> u64 {
        let mut end = self.file_header.ehsize as u64;
        end = end.max(
            self.file_header.phoff
                + self.file_header.phnum as u64 * self.file_header.phentsize as u64,
        );
        end = end.max(
            self.file_header.shoff
                + self.file_header.shnum as u64 * self.file_header.shentsize as u64,
        );
        for section in &self.section_headers {
            end = end.max(OffsetRange::from_section_header(section).end());
        }
        for segment in &self.program_headers {
            end = end.max(OffsetRange::from_program_header(segment).end());
        }
        end
    }

    /// Highest virtual address addressed by any section.
    pub fn find_global_vaddr_end(&self) -> u64 {
        self.section_headers
            .iter()
            .filter(|s| s.allocates_memory())
            .map(|s| s.addr + s.size)
            .max()
            .unwrap_or(0)
    }

    /// Count of leading sections (after the null section at index 0) that
    /// must be relocated to free at least `needed` bytes immediately after
    /// the file header, accumulating section sizes and the holes between
    /// them.
    pub fn count_of_sections_to_move_to_free(&self, needed: u64) -> usize {
        let mut freed = 0u64;
        let mut count = 0usize;
        let mut previous_end = self.file_header.ehsize as u64;

        for section in self.section_headers.iter().skip(1) {
            if section.offset == 0 {
                continue;
            }
            let range = OffsetRange::from_section_header(section);
            let hole = range.begin().saturating_sub(previous_end);
            freed += hole + range.byte_count();
            previous_end = range.end();
            count += 1;
            if freed >= needed {
                break;
            }
        }
        count
    }

    /// Relocate the section at `section_index` to end-of-file under
    /// `alignment`, moving its covering segment in lock-step when that
    /// segment is one of `.dynamic`/`.interp`'s dedicated `PT_*` entries.
    /// Returns the section's new file offset.
    pub fn move_section_to_end(&mut self, section_index: usize, alignment: MoveSectionAlignment) -> u64 {
        let file_end = self.find_global_file_end();
        let vaddr_end = self.find_global_vaddr_end();

        let addralign = self.section_headers[section_index].addralign.max(1);
        let align = match alignment {
            MoveSectionAlignment::SectionAlignment => addralign,
            MoveSectionAlignment::NextPage => Layout::PAGE_SIZE,
        };

        let new_vaddr = align_up(vaddr_end, align);
        let new_offset = next_file_offset(file_end, new_vaddr, Layout::PAGE_SIZE);

        let allocates = self.section_headers[section_index].allocates_memory();
        self.section_headers[section_index].offset = new_offset;
        if allocates {
            self.section_headers[section_index].addr = new_vaddr;
        }

        if Some(section_index) == self.dynamic_section_index {
            if let Some(ph_index) = self.dynamic_program_header_index {
                let size = self.section_headers[section_index].size;
                self.program_headers[ph_index].offset = new_offset;
                self.program_headers[ph_index].vaddr = new_vaddr;
                self.program_headers[ph_index].paddr = new_vaddr;
                self.program_headers[ph_index].filesz = size;
                self.program_headers[ph_index].memsz = size;
            }
        }
        if Some(section_index) == self.interp_section_index {
            if let Some(ph_index) = self.interp_program_header_index {
                let size = self.section_headers[section_index].size;
                self.program_headers[ph_index].offset = new_offset;
                self.program_headers[ph_index].vaddr = new_vaddr;
                self.program_headers[ph_index].paddr = new_vaddr;
                self.program_headers[ph_index].filesz = size;
                self.program_headers[ph_index].memsz = size;
            }
        }

        new_offset
    }

    /// Relocate every section of type `Note` as one contiguous group,
    /// then resize `PT_NOTE` to exactly cover the new range. Returns the
    /// indexes of the moved sections.
    pub fn move_note_sections_to_end(&mut self, alignment: MoveSectionAlignment) -> Vec<usize> {
        let indexes = self.note_section_indexes();
        if indexes.is_empty() {
            return indexes;
        }

        let mut first_alignment = alignment;
        let mut first_new_offset = 0u64;
        let mut first_new_vaddr = 0u64;
        for (i, &index) in indexes.iter().enumerate() {
            let new_offset = self.move_section_to_end(index, first_alignment);
            if i == 0 {
                first_new_offset = new_offset;
                first_new_vaddr = self.section_headers[index].addr;
            }
            first_alignment = MoveSectionAlignment::SectionAlignment;
        }

        if let (Some(ph_index), Some(&last)) = (self.note_program_header_index, indexes.last()) {
            let end = OffsetRange::from_section_header(&self.section_headers[last]).end();
            let size = end - first_new_offset;
            self.program_headers[ph_index].offset = first_new_offset;
            self.program_headers[ph_index].vaddr = first_new_vaddr;
            self.program_headers[ph_index].paddr = first_new_vaddr;
            self.program_headers[ph_index].filesz = size;
            self.program_headers[ph_index].memsz = size;
        }

        indexes
    }

    /// Synthesize a new `PT_LOAD` covering every section named by
    /// `section_indexes`: offset/vaddr are the minima across the set,
    /// file/mem size spans to the last section's end, permissions are
    /// read (plus write if any covered section is writable), alignment is
    /// the page size.
    pub fn synthesize_load_segment(&self, section_indexes: &[usize]) -> ProgramHeader {
        let mut min_offset = u64::MAX;
        let mut min_vaddr = u64::MAX;
        let mut max_end = 0u64;
        let mut writable = false;

        for &index in section_indexes {
            let section = &self.section_headers[index];
            min_offset = min_offset.min(section.offset);
            min_vaddr = min_vaddr.min(section.addr);
            max_end = max_end.max(OffsetRange::from_section_header(section).end());
            writable = writable || section.flags.contains(crate::header::SectionFlags::WRITE);
        }

        let mut flags = SegmentFlags::READ;
        if writable {
            flags |= SegmentFlags::WRITE;
        }

        let size = max_end - min_offset;
        ProgramHeader {
            segment_type: SegmentType::Load,
            flags,
            offset: min_offset,
            vaddr: min_vaddr,
            paddr: min_vaddr,
            filesz: size,
            memsz: size,
            align: Layout::PAGE_SIZE,
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ObjectFileType, SectionFlags};

    fn file_header() -> FileHeader {
        FileHeader {
            object_type: ObjectFileType::Dyn,
            machine: crate::header::Machine::X86_64,
            version: 1,
            entry: 0,
            phoff: 64,
            shoff: 500,
            flags: 0,
            ehsize: 64,
            phentsize: 56,
            phnum: 0,
            shentsize: 64,
            shnum: 3,
            shstrndx: 0,
        }
    }

    fn section(name: &str, section_type: SectionType, offset: u64, link: u32) -> SectionHeader {
        SectionHeader {
            name_offset: 0,
            name: name.into(),
            section_type,
            flags: SectionFlags::ALLOC,
            addr: offset,
            offset,
            size: 16,
            link,
            info: 0,
            addralign: 8,
            entsize: 0,
        }
    }

    // S6: sorting [null, dynamic(offset=100, link=2), dynstr(offset=50)]
    // yields [null, dynstr(offset=50, link=0), dynamic(offset=100, link=1)].
    #[test]
    fn s6_sort_reorders_by_offset_and_remaps_link() {
        let mut headers = FileAllHeaders::new(
            file_header(),
            vec![],
            vec![
                section("", SectionType::Null, 0, 0),
                section(".dynamic", SectionType::Dynamic, 100, 2),
                section(".dynstr", SectionType::StringTable, 50, 0),
            ],
        );
        let _ = headers.sort_section_headers_by_file_offset();
        assert_eq!(headers.section_headers[0].section_type, SectionType::Null);
        assert_eq!(headers.section_headers[1].name, ".dynstr");
        assert_eq!(headers.section_headers[2].name, ".dynamic");
        assert_eq!(headers.section_headers[2].link, 1);
    }

    #[test]
    fn change_map_is_a_bijection() {
        let mut headers = FileAllHeaders::new(
            file_header(),
            vec![],
            vec![
                section("", SectionType::Null, 0, 0),
                section(".b", SectionType::ProgramData, 200, 0),
                section(".a", SectionType::ProgramData, 100, 0),
            ],
        );
        let map = headers.sort_section_headers_by_file_offset();
        let mut seen = std::collections::HashSet::new();
        for old in 0..3u16 {
            assert!(seen.insert(map.map(old)));
        }
    }

    #[test]
    fn count_of_sections_to_move_accumulates_sizes_and_holes() {
        let headers = FileAllHeaders::new(
            FileHeader {
                shnum: 3,
                ..file_header()
            },
            vec![],
            vec![
                section("", SectionType::Null, 0, 0),
                section(".a", SectionType::ProgramData, 64, 0),
                section(".b", SectionType::ProgramData, 80, 0),
            ],
        );
        // Need 16 bytes; first section alone (offset 64, size 16, no hole
        // since it starts exactly at ehsize=64) already frees enough.
        assert_eq!(headers.count_of_sections_to_move_to_free(16), 1);
    }

    #[test]
    fn move_section_to_end_advances_past_file_end() {
        let mut headers = FileAllHeaders::new(
            FileHeader {
                shnum: 2,
                ..file_header()
            },
            vec![],
            vec![
                section("", SectionType::Null, 0, 0),
                section(".dynstr", SectionType::StringTable, 64, 0),
            ],
        );
        let old_end = headers.find_global_file_end();
        let new_offset = headers.move_section_to_end(1, MoveSectionAlignment::NextPage);
        assert!(new_offset >= old_end);
        assert_eq!(new_offset % Layout::PAGE_SIZE, headers.section_headers[1].addr % Layout::PAGE_SIZE);
    }

    #[test]
    fn synthesize_load_segment_spans_covered_sections() {
        let headers = FileAllHeaders::new(
            FileHeader {
                shnum: 2,
                ..file_header()
            },
            vec![],
            vec![
                section("", SectionType::Null, 0, 0),
                section(".dynstr", SectionType::StringTable, 0x2000, 0),
            ],
        );
        let load = headers.synthesize_load_segment(&[1]);
        assert_eq!(load.segment_type, SegmentType::Load);
        assert_eq!(load.offset, 0x2000);
        assert_eq!(load.filesz, 16);
    }

}
