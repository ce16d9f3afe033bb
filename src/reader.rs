//! The read-only public façade: open a file once, ask it a handful of
//! questions, close it. ELF and PE backends dispatch through the small
//! `OpenedImage` enum below.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::io::FileIoShell;
use crate::model::ElfFile;
use crate::pe::PeImage;
use crate::platform::Platform;
use std::path::Path;

enum OpenedImage {
    Elf(ElfFile),
    Pe { image: PeImage, bytes: Vec<u8> },
}

impl OpenedImage {
    fn detect(bytes: Vec<u8>, config: &Config) -> Result<Self> {
        if PeImage::looks_like_pe(&bytes) {
            let image = PeImage::from_bytes(&bytes)?;
            Ok(OpenedImage::Pe { image, bytes })
        } else {
            let elf = ElfFile::from_bytes(&bytes)?;
            if !config.lenient && elf.contains_unrecognized_header_kinds() {
                return Err(Error::UnsupportedImage(
                    "file contains unrecognized segment or section kinds and Config::lenient is false".into(),
                ));
            }
            Ok(OpenedImage::Elf(elf))
        }
    }

    fn platform(&self) -> Platform {
        match self {
            OpenedImage::Elf(elf) => elf.platform(),
            OpenedImage::Pe { image, .. } => image.platform(),
        }
    }

    fn is_executable_or_shared_library(&self) -> bool {
        match self {
            OpenedImage::Elf(elf) => elf.is_executable_or_shared_library(),
            OpenedImage::Pe { image, .. } => image.is_executable_or_shared_library(),
        }
    }

    fn contains_debug_symbols(&self) -> bool {
        match self {
            OpenedImage::Elf(elf) => elf.contains_debug_symbols(),
            OpenedImage::Pe { image, .. } => image.contains_debug_symbols(),
        }
    }

    fn get_needed_shared_libraries(&self) -> Result<Vec<String>> {
        match self {
            OpenedImage::Elf(elf) => elf.get_needed_shared_libraries(),
            OpenedImage::Pe { image, bytes } => image.get_needed_shared_libraries(bytes),
        }
    }

    fn get_run_path(&self) -> Result<Option<String>> {
        match self {
            OpenedImage::Elf(elf) => elf.get_run_path(),
            OpenedImage::Pe { .. } => Ok(None),
        }
    }

    fn describe_layout(&self) -> String {
        match self {
            OpenedImage::Elf(elf) => elf.describe_layout(),
            OpenedImage::Pe { image, .. } => image.describe_layout(),
        }
    }
}

/// Opens one executable file at a time and answers read-only queries
/// about it. Not `Send`/`Sync`: a single instance owns one file's
/// resources exclusively.
#[derive(Default)]
pub struct Reader {
    opened: Option<OpenedImage>,
}

impl Reader {
    /// Construct a reader with no file open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path`, optionally validating it against `config`'s expected
    /// platform. A platform mismatch is a fatal open error.
    pub fn open(&mut self, path: impl AsRef<Path>, config: &Config) -> Result<()> {
        let mut shell = FileIoShell::open_read_only(path)?;
        let bytes = shell.read_to_vec()?;
        let opened = OpenedImage::detect(bytes, config)?;

        if let Some(expected) = &config.expected_platform {
            let actual = opened.platform();
            if !actual.is_compatible_with(expected) {
                return Err(Error::UnsupportedImage(format!(
                    "file platform {actual:?} does not match expected platform {expected:?}"
                )));
            }
        }

        self.opened = Some(opened);
        Ok(())
    }

    /// Whether a file is currently open.
    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    /// Close the currently open file, if any.
    pub fn close(&mut self) {
        self.opened = None;
    }

    fn opened(&self) -> Result<&OpenedImage> {
        self.opened
            .as_ref()
            .ok_or_else(|| Error::UnsupportedImage("no file is open".into()))
    }

    /// The platform of the currently open file.
    pub fn get_file_platform(&self) -> Result<Platform> {
        Ok(self.opened()?.platform())
    }

    /// Whether the open file is an executable or a shared library — the
    /// only two shapes this crate operates on.
    pub fn is_executable_or_shared_library(&self) -> Result<bool> {
        Ok(self.opened()?.is_executable_or_shared_library())
    }

    /// Heuristic debug-symbol presence.
    pub fn contains_debug_symbols(&self) -> Result<bool> {
        Ok(self.opened()?.contains_debug_symbols())
    }

    /// Every needed shared library name, in file order.
    pub fn get_needed_shared_libraries(&self) -> Result<Vec<String>> {
        self.opened()?.get_needed_shared_libraries()
    }

    /// The current RUNPATH/RPATH value, or `None` for formats that don't
    /// support one (PE) or files that don't set one.
    pub fn get_run_path(&self) -> Result<Option<String>> {
        self.opened()?.get_run_path()
    }

    /// A human-readable dump of the open file's headers and sections, for
    /// troubleshooting. Format and wording are not a stable interface.
    pub fn describe_layout(&self) -> Result<String> {
        Ok(self.opened()?.describe_layout())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn reports_not_open_before_opening_anything() {
        let reader = Reader::new();
        assert!(!reader.is_open());
        assert!(reader.get_file_platform().is_err());
    }

    #[test]
    fn rejects_a_file_that_is_neither_elf_nor_pe() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"not an executable").unwrap();
        temp.flush().unwrap();
        let mut reader = Reader::new();
        assert!(reader.open(temp.path(), &Config::builder().build()).is_err());
    }
}
