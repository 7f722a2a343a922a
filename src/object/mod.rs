//! Object-file symbol extraction.
//!
//! Each extractor parses just enough of its format to enumerate the
//! externally visible symbols a member defines. Emitted names are copied by
//! the callback; the object buffer is only borrowed for the duration of the
//! call.

pub(crate) mod coff;
pub(crate) mod elf;
pub(crate) mod macho;

use crate::error::ObjectError;

const ELF_MAGIC: [u8; 4] = *b"\x7fELF";
const BITCODE_MAGIC: [u8; 4] = *b"BC\xc0\xde";

/// Enumerate the defined external symbols of an object file, invoking
/// `emit` once per name.
///
/// Buffers with an unrecognised leading magic contribute no symbols unless
/// they decode as a plausible COFF header. Bitcode members are accepted but
/// contribute nothing.
pub(crate) fn extract_symbols(
    data: &[u8],
    emit: &mut dyn FnMut(&[u8]),
) -> Result<(), ObjectError> {
    let Some(magic) = data.get(..4) else {
        return Ok(());
    };
    if magic == ELF_MAGIC {
        elf::symbols(data, emit)
    } else if macho::is_macho(magic) {
        macho::symbols(data, emit)
    } else if magic == BITCODE_MAGIC {
        tracing::warn!("bitcode member, no symbols will be indexed");
        Ok(())
    } else if coff::is_plausible(data) {
        coff::symbols(data, emit)
    } else {
        Ok(())
    }
}
