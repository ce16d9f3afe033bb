//! The program interpreter path (`.interp`).

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

/// A single NUL-terminated path string naming the dynamic linker to
/// invoke, e.g. `/lib64/ld-linux-x86-64.so.2`. Relocated as a whole unit
/// if the layout engine needs the space it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInterpreterSection {
    /// The interpreter path, without its trailing NUL.
    pub path: String,
}

impl ProgramInterpreterSection {
    /// Size in bytes, including the trailing NUL.
    pub fn byte_size(&self) -> u64 {
        self.path.len() as u64 + 1
    }
}

impl<R: Read> FromReader<R> for ProgramInterpreterSection {
    fn from_reader(reader: &mut R, _layout: &Layout) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(Error::FileRead)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let path = std::str::from_utf8(&bytes[..end])
            .map_err(|_| {
                Error::invalid_image(
                    crate::error::ErrorContext::new(0, ".interp"),
                    "invalid UTF-8 in interpreter path",
                )
            })?
            .to_owned();
        Ok(Self { path })
    }
}

impl<W: Write> ToWriter<W> for ProgramInterpreterSection {
    fn to_writer(&self, writer: &mut W, _layout: &Layout) -> Result<()> {
        writer.write_all(self.path.as_bytes()).map_err(Error::FileWrite)?;
        writer.write_all(&[0]).map_err(Error::FileWrite)
    }
}

impl HasWrittenSize for ProgramInterpreterSection {
    fn written_size(&self, _layout: &Layout) -> u64 {
        self.byte_size()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Class, DataEncoding};

    #[test]
    fn round_trips_path() {
        let layout = Layout::new(Class::Elf64, DataEncoding::Lsb);
        let interp = ProgramInterpreterSection {
            path: "/lib64/ld-linux-x86-64.so.2".into(),
        };
        let mut buf = Vec::new();
        interp.to_writer(&mut buf, &layout).unwrap();
        assert_eq!(buf.len() as u64, interp.byte_size());
        let mut cursor = std::io::Cursor::new(buf);
        let parsed = ProgramInterpreterSection::from_reader(&mut cursor, &layout).unwrap();
        assert_eq!(interp, parsed);
    }
}
