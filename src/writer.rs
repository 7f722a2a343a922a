// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! Archive serialisation.
//!
//! Every dialect shares the same skeleton: magic, archive-wide tables,
//! then the members in insertion order. The tables and per-member headers
//! differ, as do alignment and padding bytes.

use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::alignment::{align_to, offset_to_alignment};
use crate::archive::{
    Archive, Dialect, SymbolOwner, HEADER_SIZE, MAGIC, MAX_MEMBER_SIZE, THIN_MAGIC,
};
use crate::buffer::Endian;
use crate::error::{Error, IoContext, ParseError, Result};
use crate::ops::rebuild_symbol_table;

fn print_rest_of_member_header(out: &mut Vec<u8>, mtime: u64, uid: u32, gid: u32, mode: u32, size: u64) {
    // The format has only 6 chars for uid and gid. Truncate if the stored
    // values don't fit.
    write!(
        out,
        "{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
        mtime,
        uid % 1_000_000,
        gid % 1_000_000,
        mode,
        size
    )
    .unwrap();
}

/// `name_field` is the finished 16-byte-or-shorter name slot, trailing
/// slash included.
fn print_gnu_member_header(
    out: &mut Vec<u8>,
    name_field: &[u8],
    mtime: u64,
    uid: u32,
    gid: u32,
    mode: u32,
    size: u64,
) {
    out.extend_from_slice(name_field);
    out.resize(out.len() + (16 - name_field.len()), b' ');
    print_rest_of_member_header(out, mtime, uid, gid, mode, size);
}

/// Emit a BSD header at absolute position `pos`, followed by the inline
/// name padded with NULs so the payload starts on an 8-byte boundary.
fn print_bsd_member_header(
    out: &mut Vec<u8>,
    pos: u64,
    name: &[u8],
    mtime: u64,
    uid: u32,
    gid: u32,
    mode: u32,
    size: u64,
) {
    let pad = offset_to_alignment(pos + HEADER_SIZE + name.len() as u64, 8);
    let name_with_padding = name.len() as u64 + pad;
    write!(out, "#1/{:<13}", name_with_padding).unwrap();
    print_rest_of_member_header(out, mtime, uid, gid, mode, name_with_padding + size);
    out.extend_from_slice(name);
    out.resize(out.len() + pad as usize, 0);
}

/// The string table carries no metadata; every field but the name and size
/// stays blank.
fn print_string_table_header(out: &mut Vec<u8>, size: u64) {
    write!(out, "{:<48}{:<10}`\n", "//", size).unwrap();
}

fn write_int(out: &mut Vec<u8>, value: u64, wide: bool, endian: Endian) {
    if wide {
        out.extend_from_slice(&match endian {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        });
    } else {
        let value = value as u32;
        out.extend_from_slice(&match endian {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        });
    }
}

fn now_secs(use_real: bool) -> u64 {
    if !use_real {
        return 0;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn out<W: Write>(w: &mut W, bytes: &[u8], path: &Path) -> Result<()> {
    w.write_all(bytes)
        .map_err(|source| Error::Io {
            context: IoContext::Writing,
            path: path.to_path_buf(),
            source,
        })
}

/// Serialise the archive in its output dialect.
///
/// When `build_symbol_table` is set, the symbol directory is rebuilt from
/// scratch by re-running the extractors over every member first. Returns
/// the final cursor position so file-backed callers can truncate.
pub fn write_archive_to_stream<W: Write + Seek>(archive: &mut Archive, w: &mut W) -> Result<u64> {
    let mut dialect = archive.output_dialect;
    if dialect == Dialect::Ambiguous {
        dialect = Dialect::host_default();
    }
    let thin = dialect.is_thin();
    let path = archive
        .path
        .clone()
        .unwrap_or_else(|| PathBuf::from("<archive>"));

    if archive.modifiers.build_symbol_table {
        rebuild_symbol_table(archive)?;
    }

    // Emission order: insertion order, or a stable sort by name.
    let mut emitted: Vec<(&[u8], usize)> = archive
        .symbols
        .iter()
        .filter_map(|s| match s.owner {
            SymbolOwner::Resolved(index) => Some((s.name.as_slice(), index)),
            SymbolOwner::Pending(_) | SymbolOwner::Unresolved => None,
        })
        .collect();
    if archive.modifiers.sort_symbol_table {
        emitted.sort_by(|a, b| a.0.cmp(b.0));
    }

    let mut sym_names: Vec<u8> = Vec::new();
    let mut name_offsets: Vec<u64> = Vec::with_capacity(emitted.len());
    for (name, _) in &emitted {
        name_offsets.push(sym_names.len() as u64);
        sym_names.extend_from_slice(name);
        sym_names.push(0);
    }

    let symtab_mtime = now_secs(archive.modifiers.use_real_timestamps_and_ids);
    let wide = dialect.is_64_bit();
    let pad_byte = dialect.padding_byte();

    if dialect.is_bsd_like() {
        let int_size: u64 = if wide { 8 } else { 4 };
        let emit_symdef =
            archive.modifiers.build_symbol_table && (!emitted.is_empty() || dialect.is_darwin());
        let symdef_name: &[u8] = if wide {
            b"__.SYMDEF_64"
        } else {
            b"__.SYMDEF\0\0\0"
        };

        let ranlib_len = emitted.len() as u64 * 2 * int_size;
        let symdef_unpadded = int_size + ranlib_len + int_size + sym_names.len() as u64;
        let symdef_pad = offset_to_alignment(symdef_unpadded, dialect.record_alignment());
        let symdef_size = symdef_unpadded + symdef_pad;

        let offset_to_files = if emit_symdef {
            8 + HEADER_SIZE + symdef_name.len() as u64 + symdef_size
        } else {
            8
        };

        // Per-member headers carry the inline name, so sizes and offsets
        // must account for it.
        let mut headers: Vec<Vec<u8>> = Vec::with_capacity(archive.members.len());
        let mut member_offsets: Vec<u64> = Vec::with_capacity(archive.members.len());
        let mut tail_pads: Vec<u64> = Vec::with_capacity(archive.members.len());
        let mut pos = offset_to_files;
        for member in &archive.members {
            let payload_pad = if dialect.is_darwin() {
                offset_to_alignment(member.size(), dialect.payload_alignment())
            } else {
                0
            };
            let tail_pad = offset_to_alignment(member.size() + payload_pad, 2);
            let size = member.size() + payload_pad;
            if size > MAX_MEMBER_SIZE {
                return Err(ParseError::Overflow.into());
            }
            let mut header = Vec::with_capacity(HEADER_SIZE as usize + 16);
            print_bsd_member_header(
                &mut header,
                pos,
                &member.name,
                member.mtime_secs(),
                member.uid,
                member.gid,
                member.mode,
                size,
            );
            member_offsets.push(pos);
            pos += header.len() as u64 + size + tail_pad;
            headers.push(header);
            tail_pads.push(payload_pad + tail_pad);
        }

        out(w, &MAGIC, &path)?;
        if emit_symdef {
            let mut blob = Vec::with_capacity(HEADER_SIZE as usize + symdef_size as usize + 16);
            print_bsd_member_header(&mut blob, 8, symdef_name, symtab_mtime, 0, 0, 0, symdef_size);
            write_int(&mut blob, ranlib_len, wide, Endian::NATIVE);
            for (&(_, index), &name_offset) in emitted.iter().zip(&name_offsets) {
                write_int(&mut blob, name_offset, wide, Endian::NATIVE);
                write_int(&mut blob, member_offsets[index], wide, Endian::NATIVE);
            }
            write_int(&mut blob, sym_names.len() as u64, wide, Endian::NATIVE);
            blob.extend_from_slice(&sym_names);
            blob.resize(blob.len() + symdef_pad as usize, 0);
            out(w, &blob, &path)?;
        }
        for (header, member, tail) in headers
            .iter()
            .zip(&archive.members)
            .zip(&tail_pads)
            .map(|((h, m), t)| (h, m, t))
        {
            out(w, header, &path)?;
            out(w, &member.data, &path)?;
            out(w, &vec![pad_byte; *tail as usize], &path)?;
        }
    } else {
        // GNU family; COFF uses the same layout with no dedicated directory.
        let mut long_names: Vec<u8> = Vec::new();
        let mut long_name_offsets: std::collections::HashMap<&[u8], u64> =
            std::collections::HashMap::new();
        let mut name_fields: Vec<Vec<u8>> = Vec::with_capacity(archive.members.len());
        for member in &archive.members {
            if thin || member.name.len() >= 16 {
                let offset = *long_name_offsets
                    .entry(member.name.as_slice())
                    .or_insert_with(|| {
                        let offset = long_names.len() as u64;
                        long_names.extend_from_slice(&member.name);
                        long_names.extend_from_slice(b"/\n");
                        offset
                    });
                let mut field = Vec::with_capacity(16);
                write!(field, "/{}", offset).unwrap();
                name_fields.push(field);
            } else {
                let mut field = member.name.clone();
                field.push(b'/');
                name_fields.push(field);
            }
        }

        let entry_size: u64 = if wide { 8 } else { 4 };
        let emit_symtab = archive.modifiers.build_symbol_table && !emitted.is_empty();
        let symtab_unpadded = entry_size + emitted.len() as u64 * entry_size + sym_names.len() as u64;
        let symtab_pad = offset_to_alignment(symtab_unpadded, 2);
        let symtab_size = symtab_unpadded + symtab_pad;
        let strtab_size = align_to(long_names.len() as u64, 2);

        let mut offset_to_files = 8;
        if emit_symtab {
            offset_to_files += HEADER_SIZE + symtab_size;
        }
        if !long_names.is_empty() {
            offset_to_files += HEADER_SIZE + strtab_size;
        }

        let mut headers: Vec<Vec<u8>> = Vec::with_capacity(archive.members.len());
        let mut member_offsets: Vec<u64> = Vec::with_capacity(archive.members.len());
        let mut tail_pads: Vec<u64> = Vec::with_capacity(archive.members.len());
        let mut pos = offset_to_files;
        for (member, name_field) in archive.members.iter().zip(&name_fields) {
            let size = member.size();
            if size > MAX_MEMBER_SIZE {
                return Err(ParseError::Overflow.into());
            }
            let tail_pad = if thin { 0 } else { offset_to_alignment(size, 2) };
            let mut header = Vec::with_capacity(HEADER_SIZE as usize);
            print_gnu_member_header(
                &mut header,
                name_field,
                member.mtime_secs(),
                member.uid,
                member.gid,
                member.mode,
                size,
            );
            member_offsets.push(pos);
            pos += HEADER_SIZE + if thin { 0 } else { size + tail_pad };
            headers.push(header);
            tail_pads.push(if thin { 0 } else { tail_pad });
        }

        out(w, if thin { &THIN_MAGIC } else { &MAGIC }, &path)?;
        if emit_symtab {
            let mut blob = Vec::with_capacity(HEADER_SIZE as usize + symtab_size as usize);
            let table_name: &[u8] = if wide { b"/SYM64/" } else { b"/" };
            print_gnu_member_header(&mut blob, table_name, symtab_mtime, 0, 0, 0, symtab_size);
            write_int(&mut blob, emitted.len() as u64, wide, Endian::Big);
            for &(_, index) in &emitted {
                write_int(&mut blob, member_offsets[index], wide, Endian::Big);
            }
            blob.extend_from_slice(&sym_names);
            blob.resize(blob.len() + symtab_pad as usize, 0);
            out(w, &blob, &path)?;
        }
        if !long_names.is_empty() {
            let mut blob = Vec::with_capacity(HEADER_SIZE as usize + strtab_size as usize);
            print_string_table_header(&mut blob, strtab_size);
            blob.extend_from_slice(&long_names);
            blob.resize(blob.len() + (strtab_size - long_names.len() as u64) as usize, b'\n');
            out(w, &blob, &path)?;
        }
        for ((header, member), tail) in headers.iter().zip(&archive.members).zip(&tail_pads) {
            out(w, header, &path)?;
            if !thin {
                out(w, &member.data, &path)?;
                out(w, &vec![pad_byte; *tail as usize], &path)?;
            }
        }
    }

    w.flush().map_err(|source| Error::Io {
        context: IoContext::Writing,
        path: path.clone(),
        source,
    })?;
    w.stream_position().map_err(|source| Error::Io {
        context: IoContext::Seeking,
        path,
        source,
    })
}
