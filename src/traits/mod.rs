//! Reader/writer traits shared by every structure in the data model.
//!
//! Class and encoding are runtime facts of the opened file, not
//! compile-time ones, so they are threaded through as a
//! [`crate::layout::Layout`] value rather than generic parameters.

use crate::error::Result;
use crate::layout::Layout;
use std::io::{Read, Write};

/// Decode `Self` from `reader`, interpreting multi-byte fields according to
/// `layout`.
pub trait FromReader<R>
where
    R: Read,
    Self: Sized,
{
    /// Read one value, advancing `reader` past its encoded bytes.
    fn from_reader(reader: &mut R, layout: &Layout) -> Result<Self>;
}

/// Encode `Self` to `writer`, interpreting multi-byte fields according to
/// `layout`.
pub trait ToWriter<W>
where
    W: Write,
{
    /// Write one value, advancing `writer` past the encoded bytes.
    fn to_writer(&self, writer: &mut W, layout: &Layout) -> Result<()>;
}

/// Report how many bytes [`ToWriter::to_writer`] will emit for this value
/// under `layout`, without actually writing anything.
pub trait HasWrittenSize {
    /// Size in bytes this value serializes to under `layout`.
    fn written_size(&self, layout: &Layout) -> u64;
}
