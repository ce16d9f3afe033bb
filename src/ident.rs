//! The 16-byte `e_ident` prefix and the
//! OS/ABI classification it carries.

use crate::error::{Error, ErrorContext, Result};
use crate::layout::{Class, DataEncoding, Layout};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io::{Read, Write};

/// Magic bytes every ELF file begins with.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

const EI_NIDENT: usize = 16;

/// OS/ABI byte (`e_ident[EI_OSABI]`). Only the values this editor is likely
/// to encounter in the wild are distinguished; everything else round-trips
/// opaquely via [`OsAbi::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsAbi {
    /// `ELFOSABI_NONE` / `ELFOSABI_SYSV`.
    SystemV,
    /// `ELFOSABI_LINUX`.
    Linux,
    /// `ELFOSABI_GNU`.
    Gnu,
    /// Any other value, preserved byte-for-byte.
    Other(u8),
}

impl OsAbi {
    fn from_byte(value: u8) -> Self {
        match value {
            0 => OsAbi::SystemV,
            3 => OsAbi::Gnu,
            64 => OsAbi::Linux,
            other => OsAbi::Other(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            OsAbi::SystemV => 0,
            OsAbi::Gnu => 3,
            OsAbi::Linux => 64,
            OsAbi::Other(v) => v,
        }
    }
}

/// ELF version byte, `e_ident[EI_VERSION]`. Only `Current` (1) has ever been
/// assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum IdentifierVersion {
    /// `EV_CURRENT`.
    Current = 1,
}

/// The fixed 16-byte identification prefix that opens every ELF file:
/// magic, class, data encoding, version, OS/ABI, ABI version, and padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    /// Word-size class.
    pub class: Class,
    /// Byte order.
    pub data_encoding: DataEncoding,
    /// Format version (always `Current` for files this editor handles).
    pub version: IdentifierVersion,
    /// OS/ABI classification.
    pub os_abi: OsAbi,
    /// ABI version, OS/ABI-specific; preserved byte-for-byte.
    pub abi_version: u8,
}

impl Ident {
    /// Size of the encoded identification prefix: always 16 bytes,
    /// independent of class.
    pub const SIZE: u64 = EI_NIDENT as u64;

    /// Parse the identification prefix from the first 16 bytes of `reader`.
    /// Unlike every other structure in the data model this does not take a
    /// [`Layout`] — it is what *produces* one.
    pub fn from_reader(reader: &mut impl Read) -> Result<Self> {
        let mut buf = [0u8; EI_NIDENT];
        reader
            .read_exact(&mut buf)
            .map_err(|_| Error::invalid_image(ErrorContext::new(0, "e_ident"), "file too short for ELF identification"))?;

        if buf[0..4] != ELF_MAGIC {
            return Err(Error::invalid_image(
                ErrorContext::new(0, "e_ident magic"),
                format!("bad magic bytes {:02x?}", &buf[0..4]),
            ));
        }

        let class = Class::from_byte(buf[4], 4)?;
        let data_encoding = DataEncoding::from_byte(buf[5], 5)?;
        let version = IdentifierVersion::from_u8(buf[6]).ok_or(Error::InvalidIdentifierVersion {
            value: buf[6],
            context: ErrorContext::new(6, "e_ident[EI_VERSION]"),
        })?;
        let os_abi = OsAbi::from_byte(buf[7]);
        let abi_version = buf[8];

        Ok(Self {
            class,
            data_encoding,
            version,
            os_abi,
            abi_version,
        })
    }

    /// Derive the [`Layout`] (class + data encoding) this identification
    /// implies; every subsequent structure in the file is decoded with it.
    pub fn layout(&self) -> Layout {
        Layout::new(self.class, self.data_encoding)
    }

    /// Serialize back to 16 bytes.
    pub fn to_writer(&self, writer: &mut impl Write) -> Result<()> {
        let mut buf = [0u8; EI_NIDENT];
        buf[0..4].copy_from_slice(&ELF_MAGIC);
        buf[4] = self.class as u8;
        buf[5] = self.data_encoding as u8;
        buf[6] = self.version as u8;
        buf[7] = self.os_abi.to_byte();
        buf[8] = self.abi_version;
        writer.write_all(&buf).map_err(Error::FileWrite)
    }

    /// Local consistency check: magic already implied by successful parse,
    /// so this only guards the version byte.
    pub fn seems_valid(&self) -> bool {
        matches!(self.version, IdentifierVersion::Current)
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ELF {} {:?} version {:?}, OS/ABI {:?}",
            match self.class {
                Class::Elf32 => "32-bit",
                Class::Elf64 => "64-bit",
            },
            self.data_encoding,
            self.version,
            self.os_abi
        )
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        vec![0x7f, b'E', b'L', b'F', 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]
    }

    #[test]
    fn parses_valid_ident() {
        let mut cursor = std::io::Cursor::new(sample_bytes());
        let ident = Ident::from_reader(&mut cursor).unwrap();
        assert_eq!(ident.class, Class::Elf64);
        assert_eq!(ident.data_encoding, DataEncoding::Lsb);
        assert!(ident.seems_valid());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_bytes();
        bytes[0] = 0;
        let mut cursor = std::io::Cursor::new(bytes);
        assert!(Ident::from_reader(&mut cursor).is_err());
    }

    #[test]
    fn round_trips_through_writer() {
        let mut cursor = std::io::Cursor::new(sample_bytes());
        let ident = Ident::from_reader(&mut cursor).unwrap();
        let mut out = Vec::new();
        ident.to_writer(&mut out).unwrap();
        assert_eq!(out, sample_bytes());
    }
}
