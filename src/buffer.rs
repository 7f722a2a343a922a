//! Bounds-checked byte cursors and the ASCII decimal fields used by archive
//! headers.
//!
//! Object-file and archive records are decoded field by field rather than by
//! casting in-memory layouts, so endianness is always explicit.

use crate::error::ParseError;

/// Byte order selector for multi-byte integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

impl Endian {
    /// The byte order of the host, used by the BSD ranlib tables.
    pub(crate) const NATIVE: Endian = if cfg!(target_endian = "big") {
        Endian::Big
    } else {
        Endian::Little
    };

    #[inline]
    pub(crate) fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }

    #[inline]
    pub(crate) fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }

    #[inline]
    pub(crate) fn u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        }
    }
}

/// A newtype for byte slices with panic-free cursor methods.
///
/// Reads advance the cursor; `None` means the input was too short.
#[derive(Default, Clone, Copy)]
pub(crate) struct Bytes<'data>(pub &'data [u8]);

impl<'data> Bytes<'data> {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub(crate) fn skip(&mut self, count: usize) -> Option<()> {
        match self.0.get(count..) {
            Some(tail) => {
                self.0 = tail;
                Some(())
            }
            None => {
                self.0 = &[];
                None
            }
        }
    }

    #[inline]
    pub(crate) fn read_bytes(&mut self, count: usize) -> Option<&'data [u8]> {
        match (self.0.get(..count), self.0.get(count..)) {
            (Some(head), Some(tail)) => {
                self.0 = tail;
                Some(head)
            }
            _ => {
                self.0 = &[];
                None
            }
        }
    }

    #[inline]
    pub(crate) fn read_bytes_at(mut self, offset: usize, count: usize) -> Option<&'data [u8]> {
        self.skip(offset)?;
        self.read_bytes(count)
    }

    #[inline]
    pub(crate) fn read_u8(&mut self) -> Option<u8> {
        let head = self.read_bytes(1)?;
        Some(head[0])
    }

    #[inline]
    pub(crate) fn read_u16(&mut self, endian: Endian) -> Option<u16> {
        let head = self.read_bytes(2)?;
        Some(endian.u16(head.try_into().unwrap()))
    }

    #[inline]
    pub(crate) fn read_u32(&mut self, endian: Endian) -> Option<u32> {
        let head = self.read_bytes(4)?;
        Some(endian.u32(head.try_into().unwrap()))
    }

    #[inline]
    pub(crate) fn read_u64(&mut self, endian: Endian) -> Option<u64> {
        let head = self.read_bytes(8)?;
        Some(endian.u64(head.try_into().unwrap()))
    }

    /// Read a NUL-terminated string starting at `offset`, excluding the
    /// terminator.
    pub(crate) fn read_cstr_at(self, offset: usize) -> Option<&'data [u8]> {
        let tail = self.0.get(offset..)?;
        let end = memchr::memchr(0, tail)?;
        Some(&tail[..end])
    }
}

/// Parse a trailing-space-padded ASCII decimal header field.
///
/// An all-blank field reads as zero, which is how empty metadata slots are
/// encoded in string-table and symbol-table member headers.
pub(crate) fn parse_decimal(field: &[u8]) -> Result<u64, ParseError> {
    let mut result: u64 = 0;
    for &c in field {
        match c {
            b'0'..=b'9' => {
                result = result
                    .checked_mul(10)
                    .and_then(|r| r.checked_add(u64::from(c - b'0')))
                    .ok_or(ParseError::Overflow)?;
            }
            b' ' => break,
            _ => return Err(ParseError::InvalidCharacter),
        }
    }
    Ok(result)
}

/// Parse the leading decimal run of a name field such as `/123` or `#1/20`,
/// returning the value and the number of digit bytes consumed.
pub(crate) fn parse_decimal_prefix(field: &[u8]) -> Result<(u64, usize), ParseError> {
    let len = field
        .iter()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(field.len());
    if len == 0 {
        return Err(ParseError::InvalidCharacter);
    }
    Ok((parse_decimal(&field[..len])?, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_fields() {
        assert_eq!(parse_decimal(b"1234      "), Ok(1234));
        assert_eq!(parse_decimal(b"0         "), Ok(0));
        assert_eq!(parse_decimal(b"          "), Ok(0));
        assert_eq!(parse_decimal(b"12x4"), Err(ParseError::InvalidCharacter));
        assert_eq!(
            parse_decimal(b"99999999999999999999"),
            Err(ParseError::Overflow)
        );
    }

    #[test]
    fn decimal_prefixes() {
        assert_eq!(parse_decimal_prefix(b"123/abc"), Ok((123, 3)));
        assert_eq!(parse_decimal_prefix(b"7"), Ok((7, 1)));
        assert!(parse_decimal_prefix(b"/12").is_err());
    }

    #[test]
    fn cursor_reads() {
        let mut b = Bytes(&[1, 0, 0, 0, 0xff, 0xfe]);
        assert_eq!(b.read_u32(Endian::Little), Some(1));
        assert_eq!(b.read_u16(Endian::Big), Some(0xfffe));
        assert_eq!(b.read_u8(), None);
    }

    #[test]
    fn cstr_reads() {
        let b = Bytes(b"foo\0bar\0");
        assert_eq!(b.read_cstr_at(0), Some(&b"foo"[..]));
        assert_eq!(b.read_cstr_at(4), Some(&b"bar"[..]));
        assert_eq!(b.read_cstr_at(8), None);
    }
}
