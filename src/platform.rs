//! Platform identification: the `(OS, executable format,
//! compiler, processor ISA)` tuple a caller can ask the Reader/Writer to
//! validate an opened file against, and that `get_file_platform()` reports
//! back.

/// Operating system a binary targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingSystem {
    /// Linux and other ELF-consuming Unix-likes.
    Linux,
    /// Windows.
    Windows,
    /// Not determined, or determined to be none of the above.
    Unknown,
}

/// On-disk executable format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutableFileFormat {
    /// System-V ELF.
    Elf,
    /// Windows PE/COFF.
    Pe,
    /// Not determined.
    Unknown,
}

/// Toolchain that produced the binary. Not load-bearing for any editing
/// decision; carried for diagnostics and ignored by [`Platform::eq`] in the
/// sense that callers comparing platforms for compatibility should compare
/// `operating_system`/`file_format`/`processor_isa`, not this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compiler {
    /// GNU toolchain (gcc/binutils/glibc).
    Gcc,
    /// LLVM/Clang toolchain.
    Clang,
    /// Microsoft Visual C++.
    Msvc,
    /// Not determined.
    Unknown,
}

/// Processor instruction set architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorISA {
    /// 32-bit x86.
    X86_32,
    /// 64-bit x86 (AMD64/Intel 64).
    X86_64,
    /// Not determined.
    Unknown,
}

/// The platform a binary was built for, or that a caller expects an opened
/// file to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    /// Target operating system.
    pub operating_system: OperatingSystem,
    /// On-disk format.
    pub file_format: ExecutableFileFormat,
    /// Toolchain that produced the binary, where known.
    pub compiler: Compiler,
    /// Target processor ISA.
    pub processor_isa: ProcessorISA,
}

impl Platform {
    /// Construct a platform value.
    pub fn new(
        operating_system: OperatingSystem,
        file_format: ExecutableFileFormat,
        compiler: Compiler,
        processor_isa: ProcessorISA,
    ) -> Self {
        Self {
            operating_system,
            file_format,
            compiler,
            processor_isa,
        }
    }

    /// The native platform of the host this crate is compiled for. Used as
    /// the default `expected` platform when a caller does not supply one.
    pub fn native_platform() -> Self {
        let operating_system = if cfg!(target_os = "windows") {
            OperatingSystem::Windows
        } else if cfg!(target_os = "linux") {
            OperatingSystem::Linux
        } else {
            OperatingSystem::Unknown
        };
        let file_format = if cfg!(target_os = "windows") {
            ExecutableFileFormat::Pe
        } else if cfg!(target_os = "linux") {
            ExecutableFileFormat::Elf
        } else {
            ExecutableFileFormat::Unknown
        };
        let processor_isa = if cfg!(target_pointer_width = "64") {
            ProcessorISA::X86_64
        } else {
            ProcessorISA::X86_32
        };
        Self::new(operating_system, file_format, Compiler::Unknown, processor_isa)
    }

    /// A platform carrying no information: unknown OS and unknown format.
    pub fn null() -> Self {
        Self::new(
            OperatingSystem::Unknown,
            ExecutableFileFormat::Unknown,
            Compiler::Unknown,
            ProcessorISA::Unknown,
        )
    }

    /// Whether this value carries no usable information.
    pub fn is_null(&self) -> bool {
        self.operating_system == OperatingSystem::Unknown || self.file_format == ExecutableFileFormat::Unknown
    }

    /// Whether files of this platform's format may carry a RUNPATH/RPATH.
    /// True only for ELF: PE has no analogous embedded search-path concept.
    pub fn supports_run_path(&self) -> bool {
        self.file_format == ExecutableFileFormat::Elf
    }

    /// Compatibility check ignoring `compiler`, the way a caller validating
    /// "did I open the file I expected" would want: same OS, same format,
    /// same ISA.
    pub fn is_compatible_with(&self, expected: &Platform) -> bool {
        self.operating_system == expected.operating_system
            && self.file_format == expected.file_format
            && self.processor_isa == expected.processor_isa
    }
}
