//! Byte codec: reading and writing 16/32/64-bit integers
//! over a bounded byte span, in either word width and either byte order.

use crate::error::{Error, ErrorContext, Result};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io::{Read, Write};

/// ELF word-size class: 32-bit or 64-bit. Determines whether addresses,
/// offsets and a handful of other fields are 4 or 8 bytes wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum Class {
    /// `ELFCLASS32`.
    Elf32 = 1,
    /// `ELFCLASS64`.
    Elf64 = 2,
}

impl Class {
    /// Width in bytes of an address/offset-sized field under this class.
    pub fn word_size(self) -> u64 {
        match self {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        }
    }

    /// Decode from the raw `e_ident[EI_CLASS]` byte.
    pub fn from_byte(value: u8, offset: u64) -> Result<Self> {
        Class::from_u8(value).ok_or(Error::InvalidClass {
            value,
            context: ErrorContext::new(offset, "e_ident[EI_CLASS]"),
        })
    }
}

/// ELF byte order: little-endian (the overwhelming majority of targets) or
/// big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum DataEncoding {
    /// `ELFDATA2LSB`.
    Lsb = 1,
    /// `ELFDATA2MSB`.
    Msb = 2,
}

impl DataEncoding {
    /// Decode from the raw `e_ident[EI_DATA]` byte.
    pub fn from_byte(value: u8, offset: u64) -> Result<Self> {
        DataEncoding::from_u8(value).ok_or(Error::InvalidDataEncoding {
            value,
            context: ErrorContext::new(offset, "e_ident[EI_DATA]"),
        })
    }
}

/// The pair of facts — word-size class and byte order — that every
/// multi-byte field in an ELF file must be decoded with. Threaded by
/// reference into every [`crate::traits::FromReader`]/[`crate::traits::ToWriter`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    /// Word-size class of the file this layout describes.
    pub class: Class,
    /// Byte order of the file this layout describes.
    pub data_encoding: DataEncoding,
}

impl Layout {
    /// Page size used to constrain segment alignment on x86 and x86-64.
    pub const PAGE_SIZE: u64 = 0x1000;

    /// Construct a layout from an already-known class and encoding.
    pub fn new(class: Class, data_encoding: DataEncoding) -> Self {
        Self {
            class,
            data_encoding,
        }
    }

    /// Byte width of an address/offset-sized field (`Elf32_{Addr,Off}` vs
    /// `Elf64_{Addr,Off}`).
    pub fn word_size(&self) -> u64 {
        self.class.word_size()
    }

    fn read_exact(&self, reader: &mut impl Read, buf: &mut [u8], what: &str) -> Result<()> {
        reader.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::invalid_image(ErrorContext::new(0, what), "unexpected end of stream")
            } else {
                Error::FileRead(e)
            }
        })
    }

    /// Read a 16-bit unsigned integer.
    pub fn read_u16(&self, reader: &mut impl Read) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(reader, &mut buf, "u16 field")?;
        Ok(match self.data_encoding {
            DataEncoding::Lsb => u16::from_le_bytes(buf),
            DataEncoding::Msb => u16::from_be_bytes(buf),
        })
    }

    /// Read a 32-bit unsigned integer.
    pub fn read_u32(&self, reader: &mut impl Read) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(reader, &mut buf, "u32 field")?;
        Ok(match self.data_encoding {
            DataEncoding::Lsb => u32::from_le_bytes(buf),
            DataEncoding::Msb => u32::from_be_bytes(buf),
        })
    }

    /// Read a 64-bit unsigned integer.
    pub fn read_u64(&self, reader: &mut impl Read) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(reader, &mut buf, "u64 field")?;
        Ok(match self.data_encoding {
            DataEncoding::Lsb => u64::from_le_bytes(buf),
            DataEncoding::Msb => u64::from_be_bytes(buf),
        })
    }

    /// Read an address/offset-sized field, widened to `u64` regardless of
    /// class.
    pub fn read_word(&self, reader: &mut impl Read) -> Result<u64> {
        match self.class {
            Class::Elf32 => self.read_u32(reader).map(u64::from),
            Class::Elf64 => self.read_u64(reader),
        }
    }

    /// Write a 16-bit unsigned integer.
    pub fn write_u16(&self, writer: &mut impl Write, value: u16) -> Result<()> {
        let buf = match self.data_encoding {
            DataEncoding::Lsb => value.to_le_bytes(),
            DataEncoding::Msb => value.to_be_bytes(),
        };
        writer.write_all(&buf).map_err(Error::FileWrite)
    }

    /// Write a 32-bit unsigned integer.
    pub fn write_u32(&self, writer: &mut impl Write, value: u32) -> Result<()> {
        let buf = match self.data_encoding {
            DataEncoding::Lsb => value.to_le_bytes(),
            DataEncoding::Msb => value.to_be_bytes(),
        };
        writer.write_all(&buf).map_err(Error::FileWrite)
    }

    /// Write a 64-bit unsigned integer.
    pub fn write_u64(&self, writer: &mut impl Write, value: u64) -> Result<()> {
        let buf = match self.data_encoding {
            DataEncoding::Lsb => value.to_le_bytes(),
            DataEncoding::Msb => value.to_be_bytes(),
        };
        writer.write_all(&buf).map_err(Error::FileWrite)
    }

    /// Write an address/offset-sized field, narrowing from `u64` according
    /// to class. Values that do not fit in 32 bits under a class-32 layout
    /// are truncated, matching the native word width.
    pub fn write_word(&self, writer: &mut impl Write, value: u64) -> Result<()> {
        match self.class {
            Class::Elf32 => self.write_u32(writer, value as u32),
            Class::Elf64 => self.write_u64(writer, value),
        }
    }
}

/// Round `value` up to the next multiple of `align` (`align` need not be a
/// power of two, though in practice it always is here).
pub fn align_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    let rem = value % align;
    if rem == 0 {
        value
    } else {
        value + (align - rem)
    }
}

/// Smallest file offset `>= after` that is congruent to `vaddr` modulo
/// `page_size`, as required of `PT_LOAD` segments (`offset ≡ vaddr (mod
/// page_size)`).
pub fn next_file_offset(after: u64, vaddr: u64, page_size: u64) -> u64 {
    let target_rem = vaddr % page_size;
    let after_rem = after % page_size;
    if after_rem <= target_rem {
        after - after_rem + target_rem
    } else {
        after - after_rem + page_size + target_rem
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u32_little_endian() {
        let layout = Layout::new(Class::Elf64, DataEncoding::Lsb);
        let mut buf = Vec::new();
        layout.write_u32(&mut buf, 0xdead_beef).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(layout.read_u32(&mut cursor).unwrap(), 0xdead_beef);
    }

    #[test]
    fn round_trips_u64_big_endian() {
        let layout = Layout::new(Class::Elf64, DataEncoding::Msb);
        let mut buf = Vec::new();
        layout.write_u64(&mut buf, 0x0123_4567_89ab_cdef).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(
            cursor.get_ref()[0],
            0x01,
            "big-endian encodes the most significant byte first"
        );
        assert_eq!(
            layout.read_u64(&mut cursor).unwrap(),
            0x0123_4567_89ab_cdef
        );
    }

    #[test]
    fn word_narrows_to_class_32() {
        let layout = Layout::new(Class::Elf32, DataEncoding::Lsb);
        let mut buf = Vec::new();
        layout.write_word(&mut buf, 0x1_0000_0001).unwrap();
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0x1001, 0x1000), 0x2000);
        assert_eq!(align_up(0x1000, 0x1000), 0x1000);
        assert_eq!(align_up(0, 0x1000), 0);
    }

    #[test]
    fn next_file_offset_matches_vaddr_modulo_page_size() {
        let off = next_file_offset(0x2050, 0x403000, 0x1000);
        assert_eq!(off % 0x1000, 0x403000 % 0x1000);
        assert!(off >= 0x2050);
    }
}
