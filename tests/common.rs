#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use arfile::{Archive, ArchivedFile, Dialect, Modifiers};
use object::write::{self, Object};
use object::{
    Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope,
};

/// Creates the temporary directory for a test.
pub fn create_tmp_dir(test_name: &str) -> PathBuf {
    let tmpdir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(test_name);
    match fs::remove_dir_all(&tmpdir) {
        Ok(_) => {}
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                panic!("Failed to delete directory: {:?}", tmpdir);
            }
        }
    }
    fs::create_dir_all(&tmpdir).unwrap();
    tmpdir
}

pub fn add_file_with_functions_to_object(
    object: &mut Object<'_>,
    file_name: &[u8],
    func_names: &[&[u8]],
) {
    object.add_file_symbol(file_name.to_vec());

    let text = object.section_id(write::StandardSection::Text);
    object.append_section_data(text, &[1; 32], 4);

    for func_name in func_names {
        let offset = object.append_section_data(text, &[1; 32], 4);

        object.add_symbol(write::Symbol {
            name: func_name.to_vec(),
            value: offset,
            size: 32,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: write::SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
    }
}

fn build_object(format: BinaryFormat, file_name: &[u8], func_names: &[&[u8]]) -> Vec<u8> {
    let mut object = Object::new(format, Architecture::X86_64, Endianness::Little);
    add_file_with_functions_to_object(&mut object, file_name, func_names);
    object.write().unwrap()
}

/// A 64-bit little-endian ELF object exporting the given functions.
pub fn elf_object(file_name: &[u8], func_names: &[&[u8]]) -> Vec<u8> {
    build_object(BinaryFormat::Elf, file_name, func_names)
}

/// An x86-64 Mach-O object exporting the given functions.
pub fn macho_object(file_name: &[u8], func_names: &[&[u8]]) -> Vec<u8> {
    build_object(BinaryFormat::MachO, file_name, func_names)
}

/// An AMD64 COFF object exporting the given functions.
pub fn coff_object(file_name: &[u8], func_names: &[&[u8]]) -> Vec<u8> {
    build_object(BinaryFormat::Coff, file_name, func_names)
}

/// Deterministic modifiers with the symbol table on.
pub fn modifiers() -> Modifiers {
    Modifiers::default()
}

/// Build an in-memory archive from `(name, bytes)` pairs and serialise it.
pub fn write_archive_bytes(
    dialect: Dialect,
    modifiers: Modifiers,
    members: &[(&str, &[u8])],
) -> Vec<u8> {
    let mut archive = Archive::new(dialect, modifiers);
    for (name, bytes) in members {
        archive
            .insert_member(ArchivedFile::new(name.as_bytes(), bytes.to_vec()))
            .unwrap();
    }
    archive.write_to_vec().unwrap()
}
