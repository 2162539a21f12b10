//! Unsigned varint encoding.
//!
//! Little-endian base-128: each byte carries 7 payload bits and the MSB is
//! set while more bytes follow. This is the scalar encoding used for every
//! integer field and length prefix in the claim wire format.

use crate::error::WireError;
use bytes::{BufMut, BytesMut};

/// Number of bytes `value` occupies when varint-encoded.
pub fn uvarint_len(value: u64) -> usize {
    let mut v = value;
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

/// Append the varint encoding of `value` to `buf`.
pub fn put_uvarint(buf: &mut BytesMut, value: u64) {
    let mut v = value;
    loop {
        let mut byte = (v & 0x7F) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if v == 0 {
            break;
        }
    }
}

/// Decode a varint from `buf` starting at index `start`.
///
/// Returns the value and the index just past the last consumed byte. Running
/// off the end of the buffer is [`WireError::Truncated`]; a value that does
/// not fit in 64 bits is [`WireError::Overflow`].
pub fn get_uvarint(buf: &[u8], start: usize) -> Result<(u64, usize), WireError> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    let mut idx = start;
    loop {
        if shift >= 64 {
            return Err(WireError::Overflow);
        }
        let byte = *buf.get(idx).ok_or(WireError::Truncated)?;
        idx += 1;
        // The tenth byte only has room for the top bit of a u64.
        if shift == 63 && (byte & 0x7F) > 1 {
            return Err(WireError::Overflow);
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, idx));
        }
        shift += 7;
    }
}
