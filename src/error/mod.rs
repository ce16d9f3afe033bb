//! Error taxonomy for reading, editing and writing executable images.
//!
//! Every fallible operation in this crate returns [`Result`]. Variants are
//! grouped along the lines a caller actually needs to branch on: a malformed
//! byte stream (`InvalidImage`), a well-formed image this editor does not
//! support (`UnsupportedImage`), a layout edit that ran out of room to work
//! with (`MoveSection`), and the three I/O failure kinds.

use std::io;

/// Points at the place in a byte stream an error was detected, so a
/// diagnostic can say more than "invalid value".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorContext {
    /// Byte offset within the file (or sub-span) where the problem was found.
    pub offset: u64,
    /// Short human-readable label for what was being read, e.g. `"e_ident"`.
    pub what: String,
}

impl ErrorContext {
    /// Build a context pointing at `offset` with the label `what`.
    pub fn new(offset: u64, what: impl Into<String>) -> Self {
        Self {
            offset,
            what: what.into(),
        }
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at offset 0x{:x} while reading {}", self.offset, self.what)
    }
}

/// Error type for every public and internal operation in this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The byte stream does not parse as a well-formed ELF or PE image.
    #[error("invalid image ({context}): {reason}")]
    InvalidImage {
        /// Where the parse failed.
        context: ErrorContext,
        /// What was wrong.
        reason: String,
    },

    /// The image parses but is a shape this editor does not handle, e.g. a
    /// relocatable object, or a file whose platform does not match what the
    /// caller expected.
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    /// A section could not be relocated to end-of-file: either there were
    /// too few leading sections to free the bytes a new program header
    /// needs, or the section has no known move strategy.
    #[error("cannot move section: {0}")]
    MoveSection(String),

    /// Failed to open the target file.
    #[error("failed to open file: {0}")]
    FileOpen(#[source] io::Error),

    /// Failed to read from the target file (or its memory mapping).
    #[error("failed to read file: {0}")]
    FileRead(#[source] io::Error),

    /// Failed to write to the target file (or resize/remap it).
    #[error("failed to write file: {0}")]
    FileWrite(#[source] io::Error),

    /// Invalid value for the ELF class byte (`e_ident[EI_CLASS]`).
    #[error("invalid ELF class {value} ({context})")]
    InvalidClass {
        /// The offending byte.
        value: u8,
        /// Where it was read.
        context: ErrorContext,
    },

    /// Invalid value for the ELF data-encoding byte (`e_ident[EI_DATA]`).
    #[error("invalid ELF data encoding {value} ({context})")]
    InvalidDataEncoding {
        /// The offending byte.
        value: u8,
        /// Where it was read.
        context: ErrorContext,
    },

    /// Invalid value for the ELF identifier version byte.
    #[error("invalid ELF identifier version {value} ({context})")]
    InvalidIdentifierVersion {
        /// The offending byte.
        value: u8,
        /// Where it was read.
        context: ErrorContext,
    },

}

impl Error {
    /// Convenience constructor for [`Error::InvalidImage`].
    pub fn invalid_image(context: ErrorContext, reason: impl Into<String>) -> Self {
        Error::InvalidImage {
            context,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
