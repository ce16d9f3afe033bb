//! Note sections: parsed mainly so `PT_NOTE` can be
//! recomputed after the notes are relocated as a group.

use crate::error::Result;
use crate::layout::{align_up, Layout};
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

/// One note record: `name_size`, `description_size`, `type`, a
/// NUL-terminated name padded to a 4-byte boundary, then
/// `description_size` bytes of (4-byte-padded) description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// The note's owner name, e.g. `"GNU"`.
    pub name: String,
    /// Note type, meaning is owner-specific.
    pub note_type: u32,
    /// Raw description bytes.
    pub description: Vec<u8>,
}

fn padded_len(len: usize) -> usize {
    align_up(len as u64, 4) as usize
}

impl<R: Read> FromReader<R> for Note {
    fn from_reader(reader: &mut R, layout: &Layout) -> Result<Self> {
        let name_size = layout.read_u32(reader)? as usize;
        let desc_size = layout.read_u32(reader)? as usize;
        let note_type = layout.read_u32(reader)?;

        let mut name_buf = vec![0u8; padded_len(name_size)];
        reader
            .read_exact(&mut name_buf)
            .map_err(crate::error::Error::FileRead)?;
        let name = String::from_utf8_lossy(&name_buf[..name_size.saturating_sub(1)]).into_owned();

        let mut description = vec![0u8; padded_len(desc_size)];
        reader
            .read_exact(&mut description)
            .map_err(crate::error::Error::FileRead)?;
        description.truncate(desc_size);

        Ok(Self {
            name,
            note_type,
            description,
        })
    }
}

impl<W: Write> ToWriter<W> for Note {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        let name_size = self.name.len() + 1;
        layout.write_u32(writer, name_size as u32)?;
        layout.write_u32(writer, self.description.len() as u32)?;
        layout.write_u32(writer, self.note_type)?;

        let mut name_buf = vec![0u8; padded_len(name_size)];
        name_buf[..self.name.len()].copy_from_slice(self.name.as_bytes());
        writer.write_all(&name_buf).map_err(crate::error::Error::FileWrite)?;

        let mut desc_buf = vec![0u8; padded_len(self.description.len())];
        desc_buf[..self.description.len()].copy_from_slice(&self.description);
        writer.write_all(&desc_buf).map_err(crate::error::Error::FileWrite)?;
        Ok(())
    }
}

impl HasWrittenSize for Note {
    fn written_size(&self, _layout: &Layout) -> u64 {
        (12 + padded_len(self.name.len() + 1) + padded_len(self.description.len())) as u64
    }
}

/// All notes belonging to one note section (there may be several note
/// sections; each is parsed independently).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NoteSectionTable {
    notes: Vec<Note>,
}

impl NoteSectionTable {
    /// The notes, in file order.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Parse notes until `size` bytes have been consumed.
    pub fn from_reader_bounded(reader: &mut impl Read, layout: &Layout, size: u64) -> Result<Self> {
        let mut notes = Vec::new();
        let mut remaining = Vec::with_capacity(size as usize);
        let mut limited = reader.take(size);
        limited.read_to_end(&mut remaining).map_err(crate::error::Error::FileRead)?;
        let mut cursor = std::io::Cursor::new(remaining);
        while (cursor.position()) < size {
            notes.push(Note::from_reader(&mut cursor, layout)?);
        }
        Ok(Self { notes })
    }
}

impl<W: Write> ToWriter<W> for NoteSectionTable {
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        for note in &self.notes {
            note.to_writer(writer, layout)?;
        }
        Ok(())
    }
}

impl HasWrittenSize for NoteSectionTable {
    fn written_size(&self, layout: &Layout) -> u64 {
        self.notes.iter().map(|n| n.written_size(layout)).sum()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Class, DataEncoding};

    #[test]
    fn round_trips_build_id_style_note() {
        let layout = Layout::new(Class::Elf64, DataEncoding::Lsb);
        let note = Note {
            name: "GNU".into(),
            note_type: 3,
            description: vec![0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 1],
        };
        let mut buf = Vec::new();
        note.to_writer(&mut buf, &layout).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let parsed = Note::from_reader(&mut cursor, &layout).unwrap();
        assert_eq!(note, parsed);
    }

    #[test]
    fn table_reads_multiple_notes_until_size_exhausted() {
        let layout = Layout::new(Class::Elf64, DataEncoding::Lsb);
        let a = Note {
            name: "GNU".into(),
            note_type: 3,
            description: vec![1, 2, 3, 4],
        };
        let b = Note {
            name: "GNU".into(),
            note_type: 1,
            description: vec![5, 6, 7, 8],
        };
        let mut buf = Vec::new();
        a.to_writer(&mut buf, &layout).unwrap();
        b.to_writer(&mut buf, &layout).unwrap();
        let size = buf.len() as u64;
        let mut cursor = std::io::Cursor::new(buf);
        let table = NoteSectionTable::from_reader_bounded(&mut cursor, &layout, size).unwrap();
        assert_eq!(table.notes().len(), 2);
        assert_eq!(table.notes()[0], a);
        assert_eq!(table.notes()[1], b);
    }
}
