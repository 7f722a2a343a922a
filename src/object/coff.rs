//! COFF symbol extraction, AMD64 only.

use crate::buffer::{Bytes, Endian};
use crate::error::ObjectError;

pub(crate) const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

const IMAGE_SYM_CLASS_EXTERNAL: u8 = 2;

/// COFF symbol records are 18 bytes, packed.
const SYMBOL_SIZE: usize = 18;
const FILE_HEADER_SIZE: usize = 20;

/// COFF has no leading magic; a buffer is treated as COFF only when its
/// first bytes decode as a file header for a machine we support.
pub(crate) fn is_plausible(data: &[u8]) -> bool {
    let mut header = Bytes(data);
    if data.len() < FILE_HEADER_SIZE {
        return false;
    }
    header.read_u16(Endian::Little) == Some(IMAGE_FILE_MACHINE_AMD64)
}

/// Emit each symbol with external storage class, skipping the auxiliary
/// records that trail other symbols.
pub(crate) fn symbols(data: &[u8], emit: &mut dyn FnMut(&[u8])) -> Result<(), ObjectError> {
    let mut header = Bytes(data.get(..FILE_HEADER_SIZE).ok_or(ObjectError::NotObject)?);
    let machine = header.read_u16(Endian::Little).unwrap();
    if machine != IMAGE_FILE_MACHINE_AMD64 {
        return Err(ObjectError::NotSupportedMachine);
    }
    header.skip(6).unwrap(); // number_of_sections, time_date_stamp
    let symtab_offset = header.read_u32(Endian::Little).unwrap();
    let nsyms = header.read_u32(Endian::Little).unwrap();
    if symtab_offset == 0 || nsyms == 0 {
        return Ok(());
    }

    let table = Bytes(data)
        .read_bytes_at(symtab_offset as usize, nsyms as usize * SYMBOL_SIZE)
        .ok_or(ObjectError::NotObject)?;
    // The string table follows the symbol records; its leading u32 length
    // includes itself.
    let strings_offset = symtab_offset as usize + nsyms as usize * SYMBOL_SIZE;
    let strings = {
        let mut b = Bytes(data.get(strings_offset..).unwrap_or(&[]));
        match b.read_u32(Endian::Little) {
            Some(length) if length >= 4 => Bytes(data)
                .read_bytes_at(strings_offset, length as usize)
                .ok_or(ObjectError::NotObject)?,
            _ => &[],
        }
    };

    let mut table = Bytes(table);
    let mut index = 0u32;
    while index < nsyms {
        let mut record = Bytes(table.read_bytes(SYMBOL_SIZE).unwrap());
        let name_field = record.read_bytes(8).unwrap();
        record.skip(8).unwrap(); // value, section_number, type
        let storage_class = record.read_u8().unwrap();
        let num_aux = record.read_u8().unwrap();

        if storage_class == IMAGE_SYM_CLASS_EXTERNAL {
            let name = if name_field[..4] == [0, 0, 0, 0] {
                // Long names encode as four zero bytes and a string-table
                // offset.
                let offset = Endian::Little.u32(name_field[4..8].try_into().unwrap());
                Bytes(strings)
                    .read_cstr_at(offset as usize)
                    .ok_or(ObjectError::NotObject)?
            } else {
                // Inline names are null-padded to 8 bytes.
                match name_field.iter().position(|&c| c == 0) {
                    Some(end) => &name_field[..end],
                    None => name_field,
                }
            };
            emit(name);
        }

        // Auxiliary records occupy symbol slots.
        for _ in 0..num_aux {
            table.read_bytes(SYMBOL_SIZE).ok_or(ObjectError::NotObject)?;
        }
        index += 1 + u32::from(num_aux);
    }
    Ok(())
}
