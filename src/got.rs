//! Global offset table sections (`.got`, `.got.plt`).

use crate::error::Result;
use crate::layout::Layout;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

/// An array of address-sized words. By convention the first entry of
/// `.got.plt` holds the virtual address of the dynamic section; this
/// table tracks that fact so the edit orchestrator can patch it in step 9
/// when `.dynamic` moves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlobalOffsetTable {
    entries: Vec<u64>,
}

impl GlobalOffsetTable {
    /// The raw words.
    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    /// Parse `count` address-sized words.
    pub fn from_reader_with_count(
        reader: &mut impl Read,
        layout: &Layout,
        count: u64,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(layout.read_word(reader)?);
        }
        Ok(Self { entries })
    }

    /// Whether the first entry currently equals `dynamic_section_vaddr`,
    /// i.e. this table "contains the dynamic section address" and
    /// must be patched if that section moves.
    pub fn holds_dynamic_section_address(&self, dynamic_section_vaddr: u64) -> bool {
        self.entries.first() == Some(&dynamic_section_vaddr)
    }

    /// Patch the first entry to `new_vaddr`. Only called after
    /// [`Self::holds_dynamic_section_address`] confirmed the table tracks
    /// it.
    pub fn patch_dynamic_section_address(&mut self, new_vaddr: u64) {
        if let Some(first) = self.entries.first_mut() {
            *first = new_vaddr;
        }
    }
}

impl<W: Write> ToWriter<W> for GlobalOffsetTable {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        for entry in &self.entries {
            layout.write_word(writer, *entry)?;
        }
        Ok(())
    }
}

impl HasWrittenSize for GlobalOffsetTable {
    fn written_size(&self, layout: &Layout) -> u64 {
        self.entries.len() as u64 * layout.word_size()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Class, DataEncoding};

    #[test]
    fn detects_and_patches_dynamic_section_address() {
        let mut got = GlobalOffsetTable {
            entries: vec![0x403000, 0, 0],
        };
        assert!(got.holds_dynamic_section_address(0x403000));
        got.patch_dynamic_section_address(0x9000);
        assert_eq!(got.entries()[0], 0x9000);
        assert!(!got.holds_dynamic_section_address(0x403000));
    }

    #[test]
    fn round_trips_words() {
        let layout = Layout::new(Class::Elf64, DataEncoding::Lsb);
        let got = GlobalOffsetTable {
            entries: vec![1, 2, 3],
        };
        let mut buf = Vec::new();
        got.to_writer(&mut buf, &layout).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let parsed = GlobalOffsetTable::from_reader_with_count(&mut cursor, &layout, 3).unwrap();
        assert_eq!(got, parsed);
    }
}
