//! The read-write public façade: everything [`crate::reader::Reader`] can
//! do, plus `set_run_path`. PE files silently ignore `set_run_path` rather
//! than erroring, since the format has no embedded search-path concept to
//! set.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::io::FileIoShell;
use crate::model::ElfFile;
use crate::pe::PeImage;
use crate::platform::Platform;
use std::path::{Path, PathBuf};

enum OpenedImage {
    Elf(ElfFile),
    Pe(PeImage),
}

/// Opens one executable file read-write at a time, allows editing its
/// RUNPATH (ELF only), and writes the result back on request.
#[derive(Default)]
pub struct Writer {
    path: Option<PathBuf>,
    opened: Option<OpenedImage>,
}

impl Writer {
    /// Construct a writer with no file open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` for editing, optionally validating it against
    /// `config`'s expected platform.
    pub fn open(&mut self, path: impl AsRef<Path>, config: &Config) -> Result<()> {
        let mut shell = FileIoShell::open_read_only(path.as_ref())?;
        let bytes = shell.read_to_vec()?;

        let (opened, platform) = if PeImage::looks_like_pe(&bytes) {
            let image = PeImage::from_bytes(&bytes)?;
            let platform = image.platform();
            (OpenedImage::Pe(image), platform)
        } else {
            let elf = ElfFile::from_bytes(&bytes)?;
            if !config.lenient && elf.contains_unrecognized_header_kinds() {
                return Err(Error::UnsupportedImage(
                    "file contains unrecognized segment or section kinds and Config::lenient is false".into(),
                ));
            }
            let platform = elf.platform();
            (OpenedImage::Elf(elf), platform)
        };

        if let Some(expected) = &config.expected_platform {
            if !platform.is_compatible_with(expected) {
                return Err(Error::UnsupportedImage(format!(
                    "file platform {platform:?} does not match expected platform {expected:?}"
                )));
            }
        }

        self.path = Some(path.as_ref().to_path_buf());
        self.opened = Some(opened);
        Ok(())
    }

    /// Whether a file is currently open.
    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    /// Close the currently open file, if any, discarding any unwritten
    /// edits still held in memory.
    pub fn close(&mut self) {
        self.path = None;
        self.opened = None;
    }

    fn opened(&self) -> Result<&OpenedImage> {
        self.opened
            .as_ref()
            .ok_or_else(|| Error::UnsupportedImage("no file is open".into()))
    }

    /// Whether the open file is an executable or a shared library.
    pub fn is_executable_or_shared_library(&self) -> Result<bool> {
        Ok(match self.opened()? {
            OpenedImage::Elf(elf) => elf.is_executable_or_shared_library(),
            OpenedImage::Pe(pe) => pe.is_executable_or_shared_library(),
        })
    }

    /// The current RUNPATH/RPATH value, or `None` for PE.
    pub fn get_run_path(&self) -> Result<Option<String>> {
        match self.opened()? {
            OpenedImage::Elf(elf) => elf.get_run_path(),
            OpenedImage::Pe(_) => Ok(None),
        }
    }

    /// Set the RUNPATH to `new_value` and write the result back to disk.
    /// For formats that don't support a run path (PE) this does nothing.
    pub fn set_run_path(&mut self, new_value: &str) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::UnsupportedImage("no file is open".into()))?;
        match self
            .opened
            .as_mut()
            .ok_or_else(|| Error::UnsupportedImage("no file is open".into()))?
        {
            OpenedImage::Pe(_) => Ok(()),
            OpenedImage::Elf(elf) => {
                elf.set_run_path(new_value)?;
                let bytes = elf.to_bytes()?;
                let mut shell = FileIoShell::open_read_write(path)?;
                shell.write_all(&bytes)
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_not_open_before_opening_anything() {
        let writer = Writer::new();
        assert!(!writer.is_open());
        assert!(writer.get_run_path().is_err());
    }

    #[test]
    fn set_run_path_requires_an_open_file() {
        let mut writer = Writer::new();
        assert!(writer.set_run_path("/opt").is_err());
    }
}
