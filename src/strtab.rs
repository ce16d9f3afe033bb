//! Bounded byte vector of NUL-terminated names.

use crate::error::{Error, ErrorContext, Result};
use crate::layout::Layout;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

/// A string table: a byte buffer whose first byte is always `\0`, holding
/// NUL-terminated strings addressed by byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringTable {
    bytes: Vec<u8>,
}

impl StringTable {
    /// Construct an empty string table: a single NUL byte (the empty
    /// string at offset 0).
    pub fn new() -> Self {
        Self { bytes: vec![0] }
    }

    /// Wrap already-decoded bytes. `bytes[0]` must be `0`; callers that
    /// cannot guarantee this should go through [`FromReader`] instead.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Raw bytes, as they will be serialized.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total byte count. Always `>= 1`.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// A string table is never truly "empty": it always holds at least the
    /// leading NUL.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Look up the NUL-terminated string starting at `offset`.
    pub fn get(&self, offset: u32) -> Result<&str> {
        let start = offset as usize;
        let bytes = self.bytes.get(start..).ok_or_else(|| {
            Error::invalid_image(
                ErrorContext::new(offset as u64, "string table entry"),
                "offset past end of string table",
            )
        })?;
        let end = bytes.iter().position(|&b| b == 0).ok_or_else(|| {
            Error::invalid_image(
                ErrorContext::new(offset as u64, "string table entry"),
                "no NUL terminator before end of string table",
            )
        })?;
        std::str::from_utf8(&bytes[..end]).map_err(|_| {
            Error::invalid_image(
                ErrorContext::new(offset as u64, "string table entry"),
                "invalid UTF-8",
            )
        })
    }

    /// Append `s` (NUL-terminated) and return its offset. Strings are
    /// never de-duplicated: common linkers emit duplicate strings and
    /// re-writing tools are expected to tolerate (and in this case,
    /// reproduce) that.
    pub fn append(&mut self, s: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        offset
    }
}

impl<R: Read> FromReader<R> for StringTable {
    fn from_reader(reader: &mut R, _layout: &Layout) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(Error::FileRead)?;
        if bytes.first() != Some(&0) {
            return Err(Error::invalid_image(
                ErrorContext::new(0, "string table"),
                "first byte of a string table must be NUL",
            ));
        }
        Ok(Self { bytes })
    }
}

impl<W: Write> ToWriter<W> for StringTable {
    fn to_writer(&self, writer: &mut W, _layout: &Layout) -> Result<()> {
        writer.write_all(&self.bytes).map_err(Error::FileWrite)
    }
}

impl HasWrittenSize for StringTable {
    fn written_size(&self, _layout: &Layout) -> u64 {
        self.len()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_is_just_the_leading_nul() {
        let table = StringTable::new();
        assert_eq!(table.as_bytes(), &[0]);
        assert_eq!(table.get(0).unwrap(), "");
    }

    #[test]
    fn append_returns_offset_and_does_not_dedup() {
        let mut table = StringTable::new();
        let a = table.append("/opt/libA");
        let b = table.append("/opt/libA");
        assert_ne!(a, b, "strings are not de-duplicated");
        assert_eq!(table.get(a).unwrap(), "/opt/libA");
        assert_eq!(table.get(b).unwrap(), "/opt/libA");
    }

    #[test]
    fn rejects_missing_leading_nul() {
        let layout = Layout::new(crate::layout::Class::Elf64, crate::layout::DataEncoding::Lsb);
        let mut cursor = std::io::Cursor::new(vec![b'x', 0]);
        assert!(StringTable::from_reader(&mut cursor, &layout).is_err());
    }
}
