//! End-to-end exercise of the public façade against a real file on disk,
//! the way a caller would: build a small synthetic ELF shared object,
//! write it out, then drive it through [`elf::Reader`] and [`elf::Writer`]
//! exactly as an external caller would, with no access to crate internals.

use elf::dynamic::{DynamicEntry, DynamicSection, DynamicTag};
use elf::header::{FileHeader, Machine, ObjectFileType, ProgramHeader, SectionFlags, SectionHeader, SectionType, SegmentFlags, SegmentType};
use elf::ident::{Ident, IdentifierVersion, OsAbi};
use elf::layout::{Class, DataEncoding, Layout};
use elf::strtab::StringTable;
use elf::traits::ToWriter;
use elf::{Config, Reader, Writer};
use std::io::Write as _;

fn write_at(buf: &mut Vec<u8>, offset: u64, bytes: &[u8]) {
    let end = offset as usize + bytes.len();
    if buf.len() < end {
        buf.resize(end, 0);
    }
    buf[offset as usize..end].copy_from_slice(bytes);
}

/// A minimal but structurally valid ELF64 LE shared object: one `PT_LOAD`,
/// one `PT_DYNAMIC`, and three sections (null, `.dynstr`, `.dynamic`),
/// with `run_path` (if given) set as `DT_RUNPATH`.
fn build_elf(run_path: Option<&str>) -> Vec<u8> {
    let layout = Layout::new(Class::Elf64, DataEncoding::Lsb);

    let mut dynstr = StringTable::new();
    let run_path_offset = run_path.map(|p| dynstr.append(p));

    let mut dynamic = DynamicSection::from_entries(vec![
        DynamicEntry {
            tag: DynamicTag::StringTable,
            value: 0,
        },
        DynamicEntry {
            tag: DynamicTag::Null,
            value: 0,
        },
    ]);
    dynamic.set_run_path(run_path_offset);

    let ehsize = 64u64;
    let phentsize = 56u64;
    let phnum = 2u64;
    let shentsize = 64u64;
    let shnum = 3u64;

    let phoff = ehsize;
    let dynstr_bytes_len = dynstr.len();
    let dynamic_bytes_len = dynamic.byte_size(&layout);

    let headers_end = phoff + phnum * phentsize;
    let dynstr_offset = headers_end;
    let dynamic_offset = dynstr_offset + dynstr_bytes_len;
    let section_data_end = dynamic_offset + dynamic_bytes_len;
    let shoff = section_data_end;

    dynamic.patch_value(DynamicTag::StringTable, dynstr_offset);

    let file_header = FileHeader {
        object_type: ObjectFileType::Dyn,
        machine: Machine::X86_64,
        version: 1,
        entry: 0,
        phoff,
        shoff,
        flags: 0,
        ehsize: ehsize as u16,
        phentsize: phentsize as u16,
        phnum: phnum as u16,
        shentsize: shentsize as u16,
        shnum: shnum as u16,
        shstrndx: 0,
    };

    let program_headers = vec![
        ProgramHeader {
            segment_type: SegmentType::Load,
            flags: SegmentFlags::READ | SegmentFlags::WRITE,
            offset: 0,
            vaddr: 0,
            paddr: 0,
            filesz: section_data_end,
            memsz: section_data_end,
            align: Layout::PAGE_SIZE,
        },
        ProgramHeader {
            segment_type: SegmentType::Dynamic,
            flags: SegmentFlags::READ | SegmentFlags::WRITE,
            offset: dynamic_offset,
            vaddr: dynamic_offset,
            paddr: dynamic_offset,
            filesz: dynamic_bytes_len,
            memsz: dynamic_bytes_len,
            align: 8,
        },
    ];

    let section_headers = vec![
        SectionHeader {
            name_offset: 0,
            name: String::new(),
            section_type: SectionType::Null,
            flags: SectionFlags::empty(),
            addr: 0,
            offset: 0,
            size: 0,
            link: 0,
            info: 0,
            addralign: 0,
            entsize: 0,
        },
        SectionHeader {
            name_offset: 0,
            name: ".dynstr".into(),
            section_type: SectionType::StringTable,
            flags: SectionFlags::ALLOC,
            addr: dynstr_offset,
            offset: dynstr_offset,
            size: dynstr_bytes_len,
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        },
        SectionHeader {
            name_offset: 0,
            name: ".dynamic".into(),
            section_type: SectionType::Dynamic,
            flags: SectionFlags::ALLOC | SectionFlags::WRITE,
            addr: dynamic_offset,
            offset: dynamic_offset,
            size: dynamic_bytes_len,
            link: 1,
            info: 0,
            addralign: 8,
            entsize: 16,
        },
    ];

    let mut buf = Vec::new();

    let mut ident_buf = Vec::new();
    Ident {
        class: Class::Elf64,
        data_encoding: DataEncoding::Lsb,
        version: IdentifierVersion::Current,
        os_abi: OsAbi::SystemV,
        abi_version: 0,
    }
    .to_writer(&mut ident_buf)
    .unwrap();
    write_at(&mut buf, 0, &ident_buf);

    let mut header_buf = Vec::new();
    file_header.to_writer(&mut header_buf, &layout).unwrap();
    write_at(&mut buf, Ident::SIZE, &header_buf);

    for (i, ph) in program_headers.iter().enumerate() {
        let mut b = Vec::new();
        ph.to_writer(&mut b, &layout).unwrap();
        write_at(&mut buf, phoff + i as u64 * phentsize, &b);
    }

    for (i, sh) in section_headers.iter().enumerate() {
        let mut b = Vec::new();
        sh.to_writer(&mut b, &layout).unwrap();
        write_at(&mut buf, shoff + i as u64 * shentsize, &b);
    }

    write_at(&mut buf, dynstr_offset, dynstr.as_bytes());
    let mut dynamic_buf = Vec::new();
    dynamic.to_writer(&mut dynamic_buf, &layout).unwrap();
    write_at(&mut buf, dynamic_offset, &dynamic_buf);

    buf
}

#[test]
fn reader_opens_a_real_file_and_reports_its_run_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&build_elf(Some("/opt/myapp/lib"))).unwrap();
    file.flush().unwrap();

    let mut reader = Reader::new();
    reader.open(file.path(), &Config::builder().build()).unwrap();
    assert!(reader.is_executable_or_shared_library().unwrap());
    assert_eq!(reader.get_run_path().unwrap().as_deref(), Some("/opt/myapp/lib"));

    let layout_dump = reader.describe_layout().unwrap();
    assert!(layout_dump.contains(".dynstr"));
    assert!(layout_dump.contains("PT_DYNAMIC"));
}

#[test]
fn writer_sets_run_path_and_persists_it_to_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&build_elf(Some("/opt/old"))).unwrap();
    file.flush().unwrap();

    let mut writer = Writer::new();
    writer.open(file.path(), &Config::builder().build()).unwrap();
    assert_eq!(writer.get_run_path().unwrap().as_deref(), Some("/opt/old"));
    writer.set_run_path("/opt/new/lib").unwrap();
    writer.close();

    let mut reader = Reader::new();
    reader.open(file.path(), &Config::builder().build()).unwrap();
    assert_eq!(reader.get_run_path().unwrap().as_deref(), Some("/opt/new/lib"));
}

#[test]
fn writer_same_length_run_path_does_not_relocate_dynstr() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&build_elf(Some("/opt/libA"))).unwrap();
    file.flush().unwrap();

    let before_len = file.path().metadata().unwrap().len();

    let mut writer = Writer::new();
    writer.open(file.path(), &Config::builder().build()).unwrap();
    writer.set_run_path("/opt/libB").unwrap();
    writer.close();

    let after_len = file.path().metadata().unwrap().len();
    assert_eq!(before_len, after_len, "same-length run path must not relocate any section");

    let mut reader = Reader::new();
    reader.open(file.path(), &Config::builder().build()).unwrap();
    assert_eq!(reader.get_run_path().unwrap().as_deref(), Some("/opt/libB"));
}

#[test]
fn writer_grows_run_path_beyond_original_free_space() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&build_elf(Some("/opt/a"))).unwrap();
    file.flush().unwrap();

    let mut writer = Writer::new();
    writer.open(file.path(), &Config::builder().build()).unwrap();
    let long_path = "/opt/".to_owned() + &"x".repeat(4096);
    writer.set_run_path(&long_path).unwrap();
    writer.close();

    let mut reader = Reader::new();
    reader.open(file.path(), &Config::builder().build()).unwrap();
    assert_eq!(reader.get_run_path().unwrap().as_deref(), Some(long_path.as_str()));
}

#[test]
fn reader_rejects_a_platform_mismatch() {
    use elf::platform::{Compiler, ExecutableFileFormat, OperatingSystem, Platform, ProcessorISA};

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&build_elf(None)).unwrap();
    file.flush().unwrap();

    let expected = Platform::new(OperatingSystem::Windows, ExecutableFileFormat::Pe, Compiler::Unknown, ProcessorISA::X86_64);
    let config = Config::builder().expected_platform(expected).build();

    let mut reader = Reader::new();
    assert!(reader.open(file.path(), &config).is_err());
}
