//! ELF symbol extraction, 64-bit little-endian only.

use crate::buffer::{Bytes, Endian};
use crate::error::ObjectError;

const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;

const SHT_SYMTAB: u32 = 2;

const SHN_UNDEF: u16 = 0;
const SHN_LORESERVE: u16 = 0xff00;

const STB_GLOBAL: u8 = 1;
const STB_WEAK: u8 = 2;

struct SectionHeader {
    sh_type: u32,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
}

fn read_section_header(data: &[u8], shoff: u64, shentsize: u64, index: u64) -> Option<SectionHeader> {
    let offset = shoff.checked_add(index.checked_mul(shentsize)?)?;
    let mut b = Bytes(data.get(usize::try_from(offset).ok()?..)?);
    b.skip(4)?; // sh_name
    let sh_type = b.read_u32(Endian::Little)?;
    b.skip(16)?; // sh_flags, sh_addr
    let sh_offset = b.read_u64(Endian::Little)?;
    let sh_size = b.read_u64(Endian::Little)?;
    let sh_link = b.read_u32(Endian::Little)?;
    Some(SectionHeader {
        sh_type,
        sh_offset,
        sh_size,
        sh_link,
    })
}

/// Walk the section headers to the symbol table and emit every defined
/// global or weak symbol name.
pub(crate) fn symbols(data: &[u8], emit: &mut dyn FnMut(&[u8])) -> Result<(), ObjectError> {
    let ident = data.get(..16).ok_or(ObjectError::NotObject)?;
    if ident[4] != ELFCLASS64 || ident[5] != ELFDATA2LSB {
        return Err(ObjectError::NotSupportedMachine);
    }

    let mut header = Bytes(data.get(16..64).ok_or(ObjectError::NotObject)?);
    header.skip(24).ok_or(ObjectError::NotObject)?; // e_type..e_phoff
    let shoff = header.read_u64(Endian::Little).ok_or(ObjectError::NotObject)?;
    header.skip(10).ok_or(ObjectError::NotObject)?; // e_flags, e_ehsize, e_phentsize, e_phnum
    let shentsize = u64::from(header.read_u16(Endian::Little).ok_or(ObjectError::NotObject)?);
    let shnum = u64::from(header.read_u16(Endian::Little).ok_or(ObjectError::NotObject)?);
    if shoff == 0 || shentsize < 64 {
        return Ok(());
    }

    for i in 0..shnum {
        let section = read_section_header(data, shoff, shentsize, i).ok_or(ObjectError::NotObject)?;
        if section.sh_type != SHT_SYMTAB {
            continue;
        }
        let strtab = read_section_header(data, shoff, shentsize, u64::from(section.sh_link))
            .ok_or(ObjectError::NotObject)?;
        let strings = read_range(data, strtab.sh_offset, strtab.sh_size)?;
        let table = read_range(data, section.sh_offset, section.sh_size)?;

        let mut table = Bytes(table);
        while table.len() >= 24 {
            let mut sym = Bytes(table.read_bytes(24).unwrap());
            let st_name = sym.read_u32(Endian::Little).unwrap();
            let st_info = sym.read_u8().unwrap();
            sym.skip(1).unwrap(); // st_other
            let st_shndx = sym.read_u16(Endian::Little).unwrap();

            let binding = st_info >> 4;
            if binding != STB_GLOBAL && binding != STB_WEAK {
                continue;
            }
            if st_shndx == SHN_UNDEF || st_shndx >= SHN_LORESERVE {
                continue;
            }
            let name = Bytes(strings)
                .read_cstr_at(st_name as usize)
                .ok_or(ObjectError::NotObject)?;
            emit(name);
        }
        return Ok(());
    }
    Ok(())
}

fn read_range(data: &[u8], offset: u64, size: u64) -> Result<&[u8], ObjectError> {
    let offset = usize::try_from(offset).map_err(|_| ObjectError::NotObject)?;
    let size = usize::try_from(size).map_err(|_| ObjectError::NotObject)?;
    Bytes(data)
        .read_bytes_at(offset, size)
        .ok_or(ObjectError::NotObject)
}
