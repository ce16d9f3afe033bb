//! The GNU hash table (`.gnu.hash`).

use crate::error::Result;
use crate::layout::{Class, Layout};
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

/// Parsed `.gnu.hash` section. The editor never modifies its contents; it
/// only needs to know the section's size in order to relocate it as a
/// whole unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnuHashTable {
    /// Number of hash buckets.
    pub nbuckets: u32,
    /// Index of the first symbol covered by the hash table.
    pub symoffset: u32,
    /// Number of bloom-filter words.
    pub bloom_size: u32,
    /// Bloom-filter shift amount.
    pub bloom_shift: u32,
    /// Bloom-filter words, width depends on class (64-bit words for
    /// class-64, 32-bit for class-32).
    pub bloom: Vec<u64>,
    /// One entry per bucket.
    pub buckets: Vec<u32>,
    /// Chain entries, one per covered symbol beyond `symoffset`.
    pub chain: Vec<u32>,
}

impl GnuHashTable {
    /// Parse a `.gnu.hash` table whose total declared size is `size`
    /// bytes; the chain length is derived from whatever remains after the
    /// fixed-size header, buckets and bloom words.
    pub fn from_reader_bounded(reader: &mut impl Read, layout: &Layout, size: u64) -> Result<Self> {
        let nbuckets = layout.read_u32(reader)?;
        let symoffset = layout.read_u32(reader)?;
        let bloom_size = layout.read_u32(reader)?;
        let bloom_shift = layout.read_u32(reader)?;

        let bloom_word_size: u64 = match layout.class {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        };
        let mut bloom = Vec::with_capacity(bloom_size as usize);
        for _ in 0..bloom_size {
            bloom.push(match layout.class {
                Class::Elf32 => u64::from(layout.read_u32(reader)?),
                Class::Elf64 => layout.read_u64(reader)?,
            });
        }

        let mut buckets = Vec::with_capacity(nbuckets as usize);
        for _ in 0..nbuckets {
            buckets.push(layout.read_u32(reader)?);
        }

        let header_and_bloom_and_buckets =
            16 + bloom_size as u64 * bloom_word_size + nbuckets as u64 * 4;
        let chain_bytes = size.saturating_sub(header_and_bloom_and_buckets);
        let chain_count = chain_bytes / 4;
        let mut chain = Vec::with_capacity(chain_count as usize);
        for _ in 0..chain_count {
            chain.push(layout.read_u32(reader)?);
        }

        Ok(Self {
            nbuckets,
            symoffset,
            bloom_size,
            bloom_shift,
            bloom,
            buckets,
            chain,
        })
    }
}

impl<W: Write> ToWriter<W> for GnuHashTable {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        layout.write_u32(writer, self.nbuckets)?;
        layout.write_u32(writer, self.symoffset)?;
        layout.write_u32(writer, self.bloom_size)?;
        layout.write_u32(writer, self.bloom_shift)?;
        for word in &self.bloom {
            match layout.class {
                Class::Elf32 => layout.write_u32(writer, *word as u32)?,
                Class::Elf64 => layout.write_u64(writer, *word)?,
            }
        }
        for bucket in &self.buckets {
            layout.write_u32(writer, *bucket)?;
        }
        for chain_entry in &self.chain {
            layout.write_u32(writer, *chain_entry)?;
        }
        Ok(())
    }
}

impl HasWrittenSize for GnuHashTable {
    fn written_size(&self, layout: &Layout) -> u64 {
        let bloom_word_size: u64 = match layout.class {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        };
        16 + self.bloom.len() as u64 * bloom_word_size
            + self.buckets.len() as u64 * 4
            + self.chain.len() as u64 * 4
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DataEncoding;

    #[test]
    fn round_trips_through_bounded_reader() {
        let layout = Layout::new(Class::Elf64, DataEncoding::Lsb);
        let table = GnuHashTable {
            nbuckets: 1,
            symoffset: 1,
            bloom_size: 1,
            bloom_shift: 6,
            bloom: vec![0xff],
            buckets: vec![1],
            chain: vec![0x1234_5678],
        };
        let mut buf = Vec::new();
        table.to_writer(&mut buf, &layout).unwrap();
        let size = table.written_size(&layout);
        let mut cursor = std::io::Cursor::new(buf);
        let parsed = GnuHashTable::from_reader_bounded(&mut cursor, &layout, size).unwrap();
        assert_eq!(table, parsed);
    }
}
