//! File I/O shell: opens a file, reports and resizes its
//! size, and hands out byte spans backed by a memory mapping. A mapping is
//! remembered across calls and only replaced when the newly requested span
//! is not already covered by the current one (same offset, size no larger).

use crate::error::{Error, Result};
use memmap2::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::path::Path;

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::ReadOnly(m) => m,
            Mapping::ReadWrite(m) => m,
        }
    }
}

/// A remembered mapping: the file size it was taken against, plus the
/// mapping itself. `map_if_required` only replaces this when the file has
/// changed size since.
struct CurrentMap {
    size: u64,
    mapping: Mapping,
}

/// Whether a file is open for read-only queries or read-write editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Queries only; any write attempt is a programming error.
    ReadOnly,
    /// Queries and edits; `resize_file` and a writable mapping are available.
    ReadWrite,
}

/// Owns one open file handle, its size, and at most one live memory mapping.
pub struct FileIoShell {
    file: File,
    mode: OpenMode,
    current: Option<CurrentMap>,
}

impl FileIoShell {
    /// Open `path` for reading only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).map_err(Error::FileOpen)?;
        Ok(Self {
            file,
            mode: OpenMode::ReadOnly,
            current: None,
        })
    }

    /// Open `path` for reading and writing.
    pub fn open_read_write(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(Error::FileOpen)?;
        Ok(Self {
            file,
            mode: OpenMode::ReadWrite,
            current: None,
        })
    }

    /// Which mode this file was opened in.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Current size of the underlying file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        self.file.metadata().map(|m| m.len()).map_err(Error::FileRead)
    }

    /// Grow or shrink the file to exactly `new_size` bytes. Invalidates any
    /// current mapping, since its previous offset/size may no longer be
    /// valid against the new file length.
    pub fn resize_file(&mut self, new_size: u64) -> Result<()> {
        if self.mode != OpenMode::ReadWrite {
            return Err(Error::FileWrite(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "file was opened read-only",
            )));
        }
        self.current = None;
        self.file.set_len(new_size).map_err(Error::FileWrite)
    }

    /// Whether the live mapping (which always spans the whole file, from
    /// offset 0) needs to be replaced: either there isn't one yet, or the
    /// file has changed size since it was taken (a resize invalidates it
    /// directly, see `resize_file`, but a mapping can also be made stale by
    /// the file being rewritten out from under this shell).
    fn needs_remap(&self, file_size: u64) -> bool {
        match &self.current {
            None => true,
            Some(current) => current.size != file_size,
        }
    }

    /// Release the current mapping, if any. Must be called before a caller
    /// reopens the same shell against a different file.
    pub fn unmap(&mut self) {
        self.current = None;
    }

    /// Return a byte span covering `[offset, offset + size)`, remapping
    /// only if the previous mapping (if any) doesn't already cover this
    /// exact offset with at least this many bytes.
    pub fn map_if_required(&mut self, offset: u64, size: u64) -> Result<&[u8]> {
        let file_size = self.file_size()?;
        if offset.checked_add(size).map(|end| end > file_size).unwrap_or(true) {
            return Err(Error::FileRead(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "requested span exceeds file size",
            )));
        }

        if self.needs_remap(file_size) {
            self.current = None;
            let mapping = match self.mode {
                OpenMode::ReadOnly => unsafe {
                    Mmap::map(&self.file).map_err(Error::FileRead).map(Mapping::ReadOnly)?
                },
                OpenMode::ReadWrite => unsafe {
                    MmapMut::map_mut(&self.file)
                        .map_err(Error::FileRead)
                        .map(Mapping::ReadWrite)?
                },
            };
            self.current = Some(CurrentMap { size: file_size, mapping });
        }

        let Some(current) = self.current.as_ref() else {
            return Err(Error::FileRead(std::io::Error::new(std::io::ErrorKind::Other, "mapping was not established")));
        };
        let start = offset as usize;
        let end = start + size as usize;
        current
            .mapping
            .bytes()
            .get(start..end)
            .ok_or_else(|| Error::FileRead(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "mapping too small")))
    }

    /// Read the whole file into an owned buffer without keeping a mapping
    /// alive — the shape the model parser and serializer use, since they
    /// hold the full image in memory regardless.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let span = self.map_if_required(0, self.file_size()?)?;
        Ok(span.to_vec())
    }

    /// Overwrite the whole file with `bytes`, resizing first if needed.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        self.unmap();
        self.resize_file(bytes.len() as u64)?;
        self.file.seek(SeekFrom::Start(0)).map_err(Error::FileWrite)?;
        self.file.write_all(bytes).map_err(Error::FileWrite)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_full_file_contents() {
        let temp = write_temp(b"hello world");
        let mut shell = FileIoShell::open_read_only(temp.path()).unwrap();
        assert_eq!(shell.file_size().unwrap(), 11);
        assert_eq!(shell.read_to_vec().unwrap(), b"hello world");
    }

    #[test]
    fn repeated_identical_request_reuses_the_mapping() {
        let temp = write_temp(b"0123456789");
        let mut shell = FileIoShell::open_read_only(temp.path()).unwrap();
        let file_size = shell.file_size().unwrap();
        assert!(shell.needs_remap(file_size));
        let first = shell.map_if_required(0, 4).unwrap().to_vec();
        assert!(!shell.needs_remap(file_size));
        let second = shell.map_if_required(0, 4).unwrap().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn write_all_resizes_and_overwrites() {
        let temp = write_temp(b"aaaaaaaaaa");
        let mut shell = FileIoShell::open_read_write(temp.path()).unwrap();
        shell.write_all(b"short").unwrap();
        assert_eq!(shell.file_size().unwrap(), 5);
        let mut shell = FileIoShell::open_read_only(temp.path()).unwrap();
        assert_eq!(shell.read_to_vec().unwrap(), b"short");
    }
}
