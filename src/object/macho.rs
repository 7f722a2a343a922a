//! Mach-O symbol extraction.

use crate::buffer::{Bytes, Endian};
use crate::error::ObjectError;

const MH_MAGIC: u32 = 0xfeed_face;
const MH_MAGIC_64: u32 = 0xfeed_facf;
const MH_CIGAM: u32 = 0xcefa_edfe;
const MH_CIGAM_64: u32 = 0xcffa_edfe;

const LC_SYMTAB: u32 = 0x2;

const N_EXT: u8 = 0x01;
const N_TYPE: u8 = 0x0e;
const N_SECT: u8 = 0x0e;

pub(crate) fn is_macho(magic: &[u8]) -> bool {
    let magic = Endian::Little.u32(magic.try_into().unwrap());
    matches!(magic, MH_MAGIC | MH_MAGIC_64 | MH_CIGAM | MH_CIGAM_64)
}

/// Walk the load commands to `LC_SYMTAB` and emit every symbol marked both
/// external and defined in a section.
pub(crate) fn symbols(data: &[u8], emit: &mut dyn FnMut(&[u8])) -> Result<(), ObjectError> {
    let mut header = Bytes(data);
    let magic = header.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;
    let is_64 = match magic {
        MH_MAGIC => false,
        MH_MAGIC_64 => true,
        // Byte-swapped files come from an opposite-endian host.
        MH_CIGAM | MH_CIGAM_64 => return Err(ObjectError::NotSupportedMachine),
        _ => return Err(ObjectError::NotObject),
    };

    header.skip(12).ok_or(ObjectError::NotObject)?; // cputype, cpusubtype, filetype
    let ncmds = header.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;
    let sizeofcmds = header.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;
    let header_size = if is_64 { 32 } else { 28 };

    let mut commands = Bytes(
        Bytes(data)
            .read_bytes_at(header_size, sizeofcmds as usize)
            .ok_or(ObjectError::NotObject)?,
    );
    for _ in 0..ncmds {
        let cmd = commands.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;
        let cmdsize = commands.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;
        let body_size = (cmdsize as usize)
            .checked_sub(8)
            .ok_or(ObjectError::NotObject)?;
        let mut body = Bytes(commands.read_bytes(body_size).ok_or(ObjectError::NotObject)?);
        if cmd != LC_SYMTAB {
            continue;
        }

        let symoff = body.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;
        let nsyms = body.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;
        let stroff = body.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;
        let strsize = body.read_u32(Endian::Little).ok_or(ObjectError::NotObject)?;

        let strings = Bytes(data)
            .read_bytes_at(stroff as usize, strsize as usize)
            .ok_or(ObjectError::NotObject)?;
        let nlist_size = if is_64 { 16 } else { 12 };
        let mut table = Bytes(
            Bytes(data)
                .read_bytes_at(symoff as usize, nsyms as usize * nlist_size)
                .ok_or(ObjectError::NotObject)?,
        );
        for _ in 0..nsyms {
            let mut nlist = Bytes(table.read_bytes(nlist_size).unwrap());
            let n_strx = nlist.read_u32(Endian::Little).unwrap();
            let n_type = nlist.read_u8().unwrap();
            if n_type & N_EXT == 0 || n_type & N_TYPE != N_SECT {
                continue;
            }
            let name = Bytes(strings)
                .read_cstr_at(n_strx as usize)
                .ok_or(ObjectError::NotObject)?;
            emit(name);
        }
        return Ok(());
    }
    Ok(())
}
