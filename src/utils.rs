//! Low-level byte helpers shared by the catalog parser and the key loader.
//!
//! Wii U structures are big-endian throughout, so only big-endian readers
//! are provided. Each reader consumes exactly the bytes it promises or
//! returns an error.

use std::io::Read;

use crate::{Error, Result};

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Verify that the next big-endian `u32` equals `expected`.
///
/// Returns [`Error::BadMagic`] on mismatch.
#[inline]
pub(crate) fn magic_u32<R: Read>(r: &mut R, expected: u32) -> Result<()> {
    if be_u32(r)? != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Extract a null-terminated UTF-8 string from a byte slice.
///
/// Returns [`Error::Parse`] if no null byte is found.
#[inline]
pub(crate) fn null_string(buf: &[u8]) -> Result<String> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::Parse("unterminated entry path"))?;
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Write a big-endian `u32` at `offset`.
#[inline]
pub(crate) fn put_be_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn magic_mismatch_is_reported() {
        let mut r = Cursor::new([0x01, 0x01, 0x08, 0x00]);
        assert!(matches!(magic_u32(&mut r, 0x0101_0900), Err(Error::BadMagic)));
        let mut r = Cursor::new([0x01, 0x01, 0x08, 0x00]);
        magic_u32(&mut r, 0x0101_0800).unwrap();
    }

    #[test]
    fn null_string_requires_terminator() {
        assert_eq!(null_string(b"/a/b\0junk").unwrap(), "/a/b");
        assert!(matches!(null_string(b"/a/b"), Err(Error::Parse(_))));
    }
}
