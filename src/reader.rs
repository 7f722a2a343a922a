//! Archive parsing: bytes in, archive model out.
//!
//! Parsing runs in two phases. The preamble phase recognises the archive-wide
//! tables (GNU symbol index, GNU long-names table, COFF linker members, BSD
//! `__.SYMDEF` directory on the first member); the member loop then walks the
//! 60-byte headers. Symbol entries observed in the preamble carry raw file
//! offsets until the member loop has recorded where every member header
//! lives, at which point they are resolved to member indices.

use std::collections::HashMap;
use std::path::Path;

use crate::archive::{
    path_from_bytes, Archive, ArchivedFile, Dialect, Modifiers, SymbolOwner, SymbolRef,
    HEADER_SIZE, MAGIC, NANOS_PER_SEC, TERMINATOR, THIN_MAGIC,
};
use crate::buffer::{parse_decimal, parse_decimal_prefix, Bytes, Endian};
use crate::error::{Error, IoContext, ParseError, Result};

const SYMDEF_MAGICS: [&[u8]; 4] = [
    b"__.SYMDEF",
    b"__.SYMDEF SORTED",
    b"__.SYMDEF_64",
    b"__.SYMDEF_64 SORTED",
];

/// A parsed 60-byte member header.
struct Header {
    name: [u8; 16],
    date: u64,
    uid: u64,
    gid: u64,
    mode: u64,
    size: u64,
}

fn read_header(data: &[u8], pos: usize) -> Result<Header> {
    let raw = data
        .get(pos..pos + HEADER_SIZE as usize)
        .ok_or(ParseError::MalformedArchive)?;
    if raw[58..60] != TERMINATOR {
        return Err(ParseError::MalformedArchive.into());
    }
    Ok(Header {
        name: raw[..16].try_into().unwrap(),
        date: parse_decimal(&raw[16..28])?,
        uid: parse_decimal(&raw[28..34])?,
        gid: parse_decimal(&raw[34..40])?,
        mode: parse_decimal(&raw[40..48])?,
        size: parse_decimal(&raw[48..58])?,
    })
}

/// Record a GNU-family cue; contradicting an established BSD inference is a
/// structural error.
fn cue_gnu(dialect: &mut Dialect) -> Result<()> {
    match *dialect {
        Dialect::Ambiguous => {
            *dialect = Dialect::Gnu;
            Ok(())
        }
        Dialect::Gnu | Dialect::GnuThin | Dialect::Gnu64 | Dialect::Coff => Ok(()),
        Dialect::Bsd | Dialect::Darwin | Dialect::Darwin64 => {
            Err(ParseError::MalformedArchive.into())
        }
    }
}

/// Record a BSD-family cue.
fn cue_bsd(dialect: &mut Dialect) -> Result<()> {
    match *dialect {
        Dialect::Ambiguous => {
            *dialect = Dialect::Bsd;
            Ok(())
        }
        Dialect::Bsd | Dialect::Darwin | Dialect::Darwin64 => Ok(()),
        Dialect::Gnu | Dialect::GnuThin | Dialect::Gnu64 | Dialect::Coff => {
            Err(ParseError::MalformedArchive.into())
        }
    }
}

/// Look up a `/NNN` name in the long-names table. The entry runs to the next
/// newline and must close with a slash.
fn long_name(names: &[u8], offset: u64) -> Result<&[u8]> {
    let offset = usize::try_from(offset).map_err(|_| ParseError::Overflow)?;
    let tail = names.get(offset..).ok_or(ParseError::MalformedArchive)?;
    let end = memchr::memchr(b'\n', tail).ok_or(ParseError::MalformedArchive)?;
    if end == 0 || tail[end - 1] != b'/' {
        return Err(ParseError::MalformedArchive.into());
    }
    Ok(&tail[..end - 1])
}

/// Parse a GNU symbol index: a big-endian count, that many big-endian member
/// offsets, then the null-terminated names.
fn parse_gnu_index(payload: &[u8], wide: bool, symbols: &mut Vec<SymbolRef>) -> Result<()> {
    let mut b = Bytes(payload);
    let count = if wide {
        b.read_u64(Endian::Big)
    } else {
        b.read_u32(Endian::Big).map(u64::from)
    }
    .ok_or(ParseError::MalformedArchive)?;

    let entry_size = if wide { 8 } else { 4 };
    if count.checked_mul(entry_size).map_or(true, |n| n > b.len() as u64) {
        return Err(ParseError::MalformedArchive.into());
    }
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let offset = if wide {
            b.read_u64(Endian::Big)
        } else {
            b.read_u32(Endian::Big).map(u64::from)
        }
        .unwrap();
        offsets.push(offset);
    }

    let names = b.0;
    let mut cursor = 0;
    for offset in offsets {
        let end =
            memchr::memchr(0, &names[cursor..]).ok_or(ParseError::MalformedArchive)?;
        symbols.push(SymbolRef {
            name: names[cursor..cursor + end].to_vec(),
            owner: SymbolOwner::Pending(offset),
        });
        cursor += end + 1;
    }
    Ok(())
}

/// Parse a BSD `__.SYMDEF` directory: a ranlib byte length, packed
/// `(name_offset, member_offset)` pairs, then the length-prefixed string
/// blob. Integers use the host byte order, as written.
fn parse_bsd_symdef(payload: &[u8], wide: bool, symbols: &mut Vec<SymbolRef>) -> Result<()> {
    let mut b = Bytes(payload);
    let read_len = |b: &mut Bytes<'_>| {
        if wide {
            b.read_u64(Endian::NATIVE)
        } else {
            b.read_u32(Endian::NATIVE).map(u64::from)
        }
    };

    let ranlib_len = read_len(&mut b).ok_or(ParseError::MalformedArchive)?;
    let entry_size = if wide { 16 } else { 8 };
    let count = ranlib_len / entry_size;
    if ranlib_len > b.len() as u64 {
        return Err(ParseError::MalformedArchive.into());
    }
    let mut pairs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_offset = read_len(&mut b).unwrap();
        let member_offset = read_len(&mut b).unwrap();
        pairs.push((name_offset, member_offset));
    }
    // A ranlib length that is not a whole number of entries leaves slack.
    b.skip((ranlib_len - count * entry_size) as usize)
        .ok_or(ParseError::MalformedArchive)?;

    let strings_len = read_len(&mut b).ok_or(ParseError::MalformedArchive)?;
    let strings = b
        .read_bytes(usize::try_from(strings_len).map_err(|_| ParseError::Overflow)?)
        .ok_or(ParseError::MalformedArchive)?;
    for (name_offset, member_offset) in pairs {
        let name = Bytes(strings)
            .read_cstr_at(usize::try_from(name_offset).map_err(|_| ParseError::Overflow)?)
            .ok_or(ParseError::MalformedArchive)?;
        symbols.push(SymbolRef {
            name: name.to_vec(),
            owner: SymbolOwner::Pending(member_offset),
        });
    }
    Ok(())
}

fn strip_trailing_nuls(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&c| c != 0) {
        Some(last) => &name[..=last],
        None => &[],
    }
}

/// Parse an archive from raw bytes.
///
/// `dir` is the directory containing the archive; thin-archive payloads are
/// dereferenced against it. An empty input yields an empty archive.
pub fn read_archive(data: &[u8], dir: &Path, modifiers: Modifiers) -> Result<Archive> {
    let mut archive = Archive::new(Dialect::Ambiguous, modifiers);
    archive.dir = dir.to_path_buf();
    if data.is_empty() {
        return Ok(archive);
    }

    let magic = data.get(..8).ok_or(ParseError::NotArchive)?;
    let thin = if magic == MAGIC {
        false
    } else if magic == THIN_MAGIC {
        true
    } else {
        return Err(ParseError::NotArchive.into());
    };
    if thin {
        archive.dialect = Dialect::GnuThin;
    }

    let mut pos = 8usize;
    let mut long_names: &[u8] = &[];
    let mut seen_gnu_index = false;

    // Preamble: recognise the archive-wide tables. Anything else leaves the
    // cursor where it was and falls through to the member loop.
    while data.len() >= pos + HEADER_SIZE as usize {
        let name = &data[pos..pos + 16];
        let is_names_table = name.starts_with(b"//");
        let is_wide_index = name.starts_with(b"/SYM64/") && name[7] == b' ';
        let is_index = name[0] == b'/' && name[1] == b' ';
        if !is_names_table && !is_wide_index && !is_index {
            break;
        }

        let header = read_header(data, pos)?;
        let size = usize::try_from(header.size).map_err(|_| ParseError::Overflow)?;
        let payload = data
            .get(pos + HEADER_SIZE as usize..pos + HEADER_SIZE as usize + size)
            .ok_or(ParseError::MalformedArchive)?;

        if is_names_table {
            cue_gnu(&mut archive.dialect)?;
            long_names = payload;
        } else if is_wide_index {
            cue_gnu(&mut archive.dialect)?;
            archive.dialect = Dialect::Gnu64;
            parse_gnu_index(payload, true, &mut archive.symbols)?;
            seen_gnu_index = true;
        } else if !seen_gnu_index {
            cue_gnu(&mut archive.dialect)?;
            parse_gnu_index(payload, false, &mut archive.symbols)?;
            seen_gnu_index = true;
        } else {
            // A second `/` member is the COFF second linker member; the
            // symbols were already collected from the first.
            archive.dialect = Dialect::Coff;
        }

        pos += HEADER_SIZE as usize + size;
        if pos % 2 == 1 {
            pos += 1;
        }
    }

    // Member loop.
    let mut header_offsets: Vec<(u64, usize)> = Vec::new();
    let mut first_member = true;
    while pos < data.len() {
        if pos % 2 == 1 {
            // Records start at even offsets; skip the pad byte.
            pos += 1;
            if pos >= data.len() {
                break;
            }
        }
        let header_offset = pos as u64;
        let header = read_header(data, pos)?;
        pos += HEADER_SIZE as usize;
        let mut payload_len = usize::try_from(header.size).map_err(|_| ParseError::Overflow)?;

        let name: Vec<u8>;
        let mut bsd_inline_name = false;
        if header.name.starts_with(b"#1/") && header.name[3].is_ascii_digit() {
            cue_bsd(&mut archive.dialect)?;
            let (len, _) = parse_decimal_prefix(&header.name[3..])?;
            let len = usize::try_from(len).map_err(|_| ParseError::Overflow)?;
            if len > payload_len {
                return Err(ParseError::MalformedArchive.into());
            }
            let raw = data
                .get(pos..pos + len)
                .ok_or(ParseError::MalformedArchive)?;
            name = strip_trailing_nuls(raw).to_vec();
            pos += len;
            payload_len -= len;
            bsd_inline_name = true;
        } else if header.name[0] == b'/' && header.name[1].is_ascii_digit() {
            cue_gnu(&mut archive.dialect)?;
            let (offset, _) = parse_decimal_prefix(&header.name[1..])?;
            name = long_name(long_names, offset)?.to_vec();
        } else if header.name[0] == b'/' {
            // Symbol tables only appear in the preamble.
            return Err(ParseError::MalformedArchive.into());
        } else if let Some(end) = memchr::memchr(b'/', &header.name) {
            cue_gnu(&mut archive.dialect)?;
            name = header.name[..end].to_vec();
        } else {
            let end = memchr::memchr(b' ', &header.name).unwrap_or(header.name.len());
            name = header.name[..end].to_vec();
        }

        // The first member of a BSD archive may be the symbol directory,
        // recognised by the magic at the head of its payload area.
        if first_member && SYMDEF_MAGICS.contains(&name.as_slice()) {
            let only_bsd_cue = bsd_inline_name || archive.dialect == Dialect::Ambiguous;
            if only_bsd_cue {
                cue_bsd(&mut archive.dialect)?;
                let wide = name.starts_with(b"__.SYMDEF_64");
                if wide {
                    archive.dialect = Dialect::Darwin64;
                }
                let payload = data
                    .get(pos..pos + payload_len)
                    .ok_or(ParseError::MalformedArchive)?;
                parse_bsd_symdef(payload, wide, &mut archive.symbols)?;
                pos += payload_len;
                first_member = false;
                continue;
            }
        }
        first_member = false;

        let payload = if thin {
            let path = archive.dir.join(path_from_bytes(&name));
            std::fs::read(&path).map_err(Error::io(IoContext::Reading, path))?
        } else {
            let payload = data
                .get(pos..pos + payload_len)
                .ok_or(ParseError::MalformedArchive)?;
            pos += payload_len;
            payload.to_vec()
        };

        let member = ArchivedFile {
            name,
            data: payload,
            mtime: i128::from(header.date) * NANOS_PER_SEC,
            uid: header.uid as u32,
            gid: header.gid as u32,
            mode: header.mode as u32,
        };
        let index = archive.push_member(member);
        header_offsets.push((header_offset, index));
    }

    // Offset resolution: rewrite raw file offsets to member indices.
    let by_offset: HashMap<u64, usize> = header_offsets.into_iter().collect();
    for symbol in &mut archive.symbols {
        if let SymbolOwner::Pending(offset) = symbol.owner {
            symbol.owner = match by_offset.get(&offset) {
                Some(&index) => SymbolOwner::Resolved(index),
                None => SymbolOwner::Unresolved,
            };
        }
    }

    if archive.output_dialect == Dialect::Ambiguous {
        archive.output_dialect = archive.dialect;
    }
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Dialect;

    fn parse(data: &[u8]) -> Archive {
        read_archive(data, Path::new("."), Modifiers::default()).unwrap()
    }

    #[test]
    fn empty_input() {
        let archive = parse(b"");
        assert_eq!(archive.dialect(), Dialect::Ambiguous);
        assert!(archive.members().is_empty());
    }

    #[test]
    fn magic_only() {
        let archive = parse(b"!<arch>\n");
        assert!(archive.members().is_empty());
        assert!(archive.symbols().is_empty());
    }

    #[test]
    fn not_an_archive() {
        let err = read_archive(b"!<arch!\nxxxx", Path::new("."), Modifiers::default());
        assert!(matches!(
            err,
            Err(Error::Parse(ParseError::NotArchive))
        ));
        let err = read_archive(b"!<ar", Path::new("."), Modifiers::default());
        assert!(matches!(
            err,
            Err(Error::Parse(ParseError::NotArchive))
        ));
    }

    #[test]
    fn gnu_kind_from_tables() {
        let data = b"\
            !<arch>\n\
            //                                              4         `\n\
            0000";
        assert_eq!(parse(data).dialect(), Dialect::Gnu);

        let data = b"\
            !<arch>\n\
            /               0           0     0     0       4         `\n\
            \x00\x00\x00\x00";
        assert_eq!(parse(data).dialect(), Dialect::Gnu);
    }

    #[test]
    fn gnu_names() {
        let data = b"\
            !<arch>\n\
            //                                              18        `\n\
            0123456789abcdef/\n\
            s p a c e/      0           0     0     644     4         `\n\
            0000\
            0123456789abcde/0           0     0     644     3         `\n\
            odd\n\
            /0              0           0     0     644     4         `\n\
            even";
        let archive = parse(data);
        assert_eq!(archive.dialect(), Dialect::Gnu);
        let members = archive.members();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].name, b"s p a c e");
        assert_eq!(members[0].data, b"0000");
        assert_eq!(members[1].name, b"0123456789abcde");
        assert_eq!(members[1].data, b"odd");
        assert_eq!(members[2].name, b"0123456789abcdef");
        assert_eq!(members[2].data, b"even");
    }

    #[test]
    fn bsd_names() {
        let data = b"\
            !<arch>\n\
            0123456789abcde 0           0     0     644     3         `\n\
            odd\n\
            #1/16           0           0     0     644     20        `\n\
            0123456789abcdefeven";
        let archive = parse(data);
        assert_eq!(archive.dialect(), Dialect::Bsd);
        let members = archive.members();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, b"0123456789abcde");
        assert_eq!(members[0].data, b"odd");
        assert_eq!(members[1].name, b"0123456789abcdef");
        assert_eq!(members[1].data, b"even");
    }

    #[test]
    fn gnu_symbol_index() {
        // One symbol, "foo", defined by the member whose header starts at
        // file offset 80.
        let data = b"\
            !<arch>\n\
            /               0           0     0     0       12        `\n\
            \x00\x00\x00\x01\x00\x00\x00\x50foo\x00\
            a.o/            0           0     0     644     4         `\n\
            0000";
        let archive = parse(data);
        assert_eq!(archive.dialect(), Dialect::Gnu);
        assert_eq!(archive.members().len(), 1);
        assert_eq!(archive.symbols().len(), 1);
        assert_eq!(archive.symbols()[0].name, b"foo");
        assert_eq!(archive.symbols()[0].owner, SymbolOwner::Resolved(0));
    }

    #[test]
    fn gnu_symbol_index_unresolved_offset() {
        let data = b"\
            !<arch>\n\
            /               0           0     0     0       12        `\n\
            \x00\x00\x00\x01\x00\x00\x00\x10foo\x00\
            a.o/            0           0     0     644     4         `\n\
            0000";
        let archive = parse(data);
        assert_eq!(archive.symbols()[0].owner, SymbolOwner::Unresolved);
    }

    #[test]
    fn mixed_dialect_cues_rejected() {
        // A GNU long-name reference inside a BSD archive.
        let data = b"\
            !<arch>\n\
            #1/4            0           0     0     644     8         `\n\
            a.o\x000000\
            /0              0           0     0     644     4         `\n\
            0000";
        let err = read_archive(data, Path::new("."), Modifiers::default());
        assert!(matches!(
            err,
            Err(Error::Parse(ParseError::MalformedArchive))
        ));
    }

    #[test]
    fn truncated_member_rejected() {
        let data = b"\
            !<arch>\n\
            a.o/            0           0     0     644     100       `\n\
            short";
        let err = read_archive(data, Path::new("."), Modifiers::default());
        assert!(matches!(
            err,
            Err(Error::Parse(ParseError::MalformedArchive))
        ));
    }
}
