//! A RUNPATH/RPATH editor for ELF shared libraries and executables, with
//! read-only support for inspecting PE/COFF DLLs and executables.
//!
//! ```no_run
//! use elf::{Config, Reader, Writer};
//!
//! let mut reader = Reader::new();
//! reader.open("/usr/bin/ls", &Config::builder().build())?;
//! if let Some(rpath) = reader.get_run_path()? {
//!     println!("current run path: {rpath}");
//! }
//! reader.close();
//!
//! let mut writer = Writer::new();
//! writer.open("/usr/bin/ls", &Config::builder().build())?;
//! writer.set_run_path("/opt/myapp/lib")?;
//! # Ok::<(), elf::Error>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod dynamic;
pub mod error;
pub mod file_all_headers;
pub mod gnu_hash;
pub mod got;
pub mod header;
pub mod ident;
pub mod interp;
pub mod io;
pub mod layout;
pub mod model;
pub mod note;
pub mod offset_range;
pub mod pe;
pub mod platform;
pub mod reader;
pub mod strtab;
pub mod symtab;
pub mod traits;
pub mod writer;

pub use config::Config;
pub use error::{Error, Result};
pub use model::ElfFile;
pub use platform::Platform;
pub use reader::Reader;
pub use writer::Writer;
