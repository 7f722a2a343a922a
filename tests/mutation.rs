//! Insert, delete, move, extract and the thin-archive behaviours.

use std::path::Path;

use arfile::{read_archive, Archive, ArchivedFile, Dialect, Error, Modifiers, SymbolOwner};
use pretty_assertions::assert_eq;

mod common;

fn in_memory(members: &[(&str, &[u8])]) -> Archive {
    let mut archive = Archive::new(Dialect::Gnu, common::modifiers());
    for (name, bytes) in members {
        archive
            .insert_member(ArchivedFile::new(name.as_bytes(), bytes.to_vec()))
            .unwrap();
    }
    archive
}

#[test]
fn insert_replaces_in_place() {
    let first = common::elf_object(b"a.c", &[b"old_symbol"]);
    let replacement = common::elf_object(b"a.c", &[b"new_symbol"]);
    let other = common::elf_object(b"b.c", &[b"other"]);

    let mut archive = in_memory(&[("a.o", first.as_slice()), ("b.o", other.as_slice())]);
    archive
        .insert_member(ArchivedFile::new(&b"a.o"[..], replacement.clone()))
        .unwrap();

    assert_eq!(archive.members().len(), 2);
    assert_eq!(archive.members()[0].name, b"a.o");
    assert_eq!(archive.members()[0].data, replacement);
    assert_eq!(archive.members()[1].name, b"b.o");

    // The replaced member's symbols are gone; the new ones target its slot.
    let names: Vec<&[u8]> = archive.symbols().iter().map(|s| s.name.as_slice()).collect();
    assert!(names.contains(&&b"new_symbol"[..]));
    assert!(names.contains(&&b"other"[..]));
    assert!(!names.contains(&&b"old_symbol"[..]));
    for symbol in archive.symbols() {
        if symbol.name == b"new_symbol" {
            assert_eq!(symbol.owner, SymbolOwner::Resolved(0));
        }
    }
}

#[test]
fn delete_rewires_symbol_owners() {
    let a = common::elf_object(b"a.c", &[b"func_a"]);
    let b = common::elf_object(b"b.c", &[b"func_b"]);
    let c = common::elf_object(b"c.c", &[b"func_c"]);

    let mut archive = in_memory(&[("a.o", a.as_slice()), ("b.o", b.as_slice()), ("c.o", c.as_slice())]);
    archive.delete(&[b"b.o".to_vec()]).unwrap();

    assert_eq!(archive.members().len(), 2);
    assert_eq!(archive.members()[0].name, b"a.o");
    assert_eq!(archive.members()[1].name, b"c.o");

    let symbols = archive.symbols();
    assert_eq!(symbols.len(), 2);
    assert_eq!(symbols[0].name, b"func_a");
    assert_eq!(symbols[0].owner, SymbolOwner::Resolved(0));
    assert_eq!(symbols[1].name, b"func_c");
    assert_eq!(symbols[1].owner, SymbolOwner::Resolved(1));
}

#[test]
fn delete_equals_never_having_inserted() {
    let a = common::elf_object(b"a.c", &[b"func_a"]);
    let b = common::elf_object(b"b.c", &[b"func_b"]);
    let c = common::elf_object(b"c.c", &[b"func_c"]);

    let mut deleted = in_memory(&[("a.o", a.as_slice()), ("b.o", b.as_slice()), ("c.o", c.as_slice())]);
    deleted.delete(&[b"b.o".to_vec()]).unwrap();
    let deleted = deleted.write_to_vec().unwrap();

    let never_inserted = in_memory(&[("a.o", a.as_slice()), ("c.o", c.as_slice())])
        .write_to_vec()
        .unwrap();
    assert_eq!(deleted, never_inserted);
}

#[test]
fn delete_of_missing_name_is_harmless() {
    let a = common::elf_object(b"a.c", &[b"func_a"]);
    let mut archive = in_memory(&[("a.o", a.as_slice())]);
    archive.delete(&[b"nope.o".to_vec()]).unwrap();
    assert_eq!(archive.members().len(), 1);
}

#[test]
fn move_to_end_preserves_relative_order() {
    let mut archive = in_memory(&[
        ("a.o", &b"aa"[..]),
        ("b.o", &b"bb"[..]),
        ("c.o", &b"cc"[..]),
        ("d.o", &b"dd"[..]),
    ]);
    archive
        .move_to_end(&[b"b.o".to_vec(), b"a.o".to_vec()])
        .unwrap();

    let names: Vec<&[u8]> = archive.list().collect();
    assert_eq!(names, [&b"c.o"[..], &b"d.o"[..], &b"b.o"[..], &b"a.o"[..]]);
    // The map still locates every member after the permutation.
    assert_eq!(archive.position_of(b"a.o"), Some(3));
    assert_eq!(archive.position_of(b"c.o"), Some(0));
}

#[test]
fn move_rewires_symbol_owners() {
    let a = common::elf_object(b"a.c", &[b"func_a"]);
    let b = common::elf_object(b"b.c", &[b"func_b"]);
    let mut archive = in_memory(&[("a.o", a.as_slice()), ("b.o", b.as_slice())]);
    archive.move_to_end(&[b"a.o".to_vec()]).unwrap();

    for symbol in archive.symbols() {
        let owner = match symbol.owner {
            SymbolOwner::Resolved(index) => index,
            other => panic!("unexpected owner {other:?}"),
        };
        let member = &archive.members()[owner];
        if symbol.name == b"func_a" {
            assert_eq!(member.name, b"a.o");
        } else {
            assert_eq!(member.name, b"b.o");
        }
    }
}

#[test]
fn quick_append_allows_duplicate_basenames() {
    let tmpdir = common::create_tmp_dir("quick_append_allows_duplicate_basenames");
    let path = tmpdir.join("a.o");
    std::fs::write(&path, b"one").unwrap();

    let mut archive = Archive::create(tmpdir.join("lib.a"), Dialect::Gnu, common::modifiers());
    archive.quick_append(&[path.clone()]).unwrap();
    std::fs::write(&path, b"two").unwrap();
    archive.quick_append(&[path]).unwrap();

    assert_eq!(archive.members().len(), 2);
    assert_eq!(archive.members()[0].data, b"one");
    assert_eq!(archive.members()[1].data, b"two");
    // The basename map keeps pointing at the first occurrence.
    assert_eq!(archive.position_of(b"a.o"), Some(0));
}

#[test]
fn extract_writes_member_files() {
    let tmpdir = common::create_tmp_dir("extract_writes_member_files");
    let object_path = tmpdir.join("a.o");
    std::fs::write(&object_path, b"payload bytes").unwrap();

    let archive_path = tmpdir.join("lib.a");
    let mut archive = Archive::create(&archive_path, Dialect::Gnu, common::modifiers());
    archive.insert(&[object_path.clone()]).unwrap();
    archive.save().unwrap();

    std::fs::remove_file(&object_path).unwrap();
    let mut archive = Archive::open(&archive_path, common::modifiers()).unwrap();
    archive.extract(&[]).unwrap();
    assert_eq!(std::fs::read(&object_path).unwrap(), b"payload bytes");
}

#[test]
fn thin_archives_reference_sibling_files() {
    let tmpdir = common::create_tmp_dir("thin_archives_reference_sibling_files");
    let object_path = tmpdir.join("a.o");
    let object = common::elf_object(b"a.c", &[b"foo"]);
    std::fs::write(&object_path, &object).unwrap();

    let archive_path = tmpdir.join("lib.a");
    let mut archive = Archive::create(&archive_path, Dialect::GnuThin, common::modifiers());
    archive.insert(&[object_path.clone()]).unwrap();
    archive.save().unwrap();

    let bytes = std::fs::read(&archive_path).unwrap();
    assert_eq!(&bytes[..8], b"!<thin>\n");
    // The payload stays out of the archive.
    assert!(!bytes.windows(4).any(|w| w == b"\x7fELF"));

    // Reading resolves the member against the sibling file.
    let reloaded = Archive::open(&archive_path, common::modifiers()).unwrap();
    assert_eq!(reloaded.members()[0].data, object);
}

#[test]
fn extracting_from_thin_fails() {
    let tmpdir = common::create_tmp_dir("extracting_from_thin_fails");
    let object_path = tmpdir.join("a.o");
    std::fs::write(&object_path, common::elf_object(b"a.c", &[b"foo"])).unwrap();

    let mut archive =
        Archive::create(tmpdir.join("lib.a"), Dialect::GnuThin, common::modifiers());
    archive.insert(&[object_path.clone()]).unwrap();
    archive.save().unwrap();

    std::fs::remove_file(&object_path).unwrap();
    let err = archive.extract(&[b"a.o".to_vec()]);
    assert!(matches!(err, Err(Error::ExtractingFromThin)));
}

#[test]
fn update_only_skips_older_files() {
    let tmpdir = common::create_tmp_dir("update_only_skips_older_files");
    let object_path = tmpdir.join("a.o");
    std::fs::write(&object_path, b"original").unwrap();

    let archive_path = tmpdir.join("lib.a");
    let mut archive = Archive::create(&archive_path, Dialect::Gnu, common::modifiers());
    archive.insert(&[object_path.clone()]).unwrap();
    archive.save().unwrap();

    // The archive is now at least as new as the object, so an update-only
    // insert leaves the member alone.
    let mut modifiers = common::modifiers();
    modifiers.update_only = true;
    let mut reopened = Archive::open(&archive_path, modifiers).unwrap();
    reopened.insert(&[object_path.clone()]).unwrap();
    assert_eq!(reopened.members().len(), 1);
    assert_eq!(reopened.members()[0].data, b"original");

    // A genuinely newer file goes through.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    std::fs::write(&object_path, b"newer contents").unwrap();
    reopened.insert(&[object_path]).unwrap();
    assert_eq!(reopened.members().len(), 1);
    assert_eq!(reopened.members()[0].data, b"newer contents");
}

#[test]
fn print_operations_stream_model_state() {
    let a = common::elf_object(b"a.c", &[b"func_a"]);
    let mut archive = in_memory(&[("a.o", a.as_slice()), ("plain.txt", &b"hello "[..])]);

    let mut names = Vec::new();
    archive.print_names(&mut names).unwrap();
    assert_eq!(names, b"a.o\nplain.txt\n");

    let mut contents = Vec::new();
    archive.print_contents(&mut contents).unwrap();
    assert!(contents.ends_with(b"hello "));

    let mut symbols = Vec::new();
    archive.print_symbols(&mut symbols).unwrap();
    assert_eq!(symbols, b"func_a\n");
}

#[test]
fn saved_archive_reopens_identically() {
    let tmpdir = common::create_tmp_dir("saved_archive_reopens_identically");
    for name in ["a.o", "b.o"] {
        std::fs::write(
            tmpdir.join(name),
            common::elf_object(name.as_bytes(), &[b"shared"]),
        )
        .unwrap();
    }

    let archive_path = tmpdir.join("lib.a");
    let mut archive = Archive::create(&archive_path, Dialect::Gnu, common::modifiers());
    archive
        .insert(&[tmpdir.join("a.o"), tmpdir.join("b.o")])
        .unwrap();
    archive.save().unwrap();

    let first = std::fs::read(&archive_path).unwrap();
    let mut reopened = Archive::open(&archive_path, common::modifiers()).unwrap();
    assert_eq!(reopened.dialect(), Dialect::Gnu);
    reopened.save().unwrap();
    let second = std::fs::read(&archive_path).unwrap();
    assert_eq!(first, second);

    // Duplicate symbol names are permitted and preserved.
    let parsed = read_archive(&first, Path::new("."), Modifiers::default()).unwrap();
    let shared: Vec<_> = parsed
        .symbols()
        .iter()
        .filter(|s| s.name == b"shared")
        .collect();
    assert_eq!(shared.len(), 2);
    assert_eq!(shared[0].owner, SymbolOwner::Resolved(0));
    assert_eq!(shared[1].owner, SymbolOwner::Resolved(1));
}
