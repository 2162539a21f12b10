//! Tagged field writer and order-agnostic field reader.
//!
//! Every field in the wire format is preceded by a varint tag
//! `(field_number << 3) | wire_type`. This format only ever emits wire
//! type 0 (varint scalar) and wire type 2 (length-delimited block). The
//! reader here is the single scan mechanism shared by every message decoder,
//! so unknown-field tolerance lives in exactly one place.

use crate::error::WireError;
use crate::varint::{get_uvarint, put_uvarint};
use bytes::{BufMut, BytesMut};

/// Varint scalar wire type.
pub const WIRE_VARINT: u64 = 0;
/// Length-delimited block wire type.
pub const WIRE_LEN: u64 = 2;

fn tag(number: u32, wire_type: u64) -> u64 {
    (u64::from(number) << 3) | wire_type
}

/// Writer appending tagged fields to a `BytesMut`.
pub struct FieldWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> FieldWriter<'a> {
    /// Create a writer over `buf`.
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    /// Append a varint-encoded scalar field.
    pub fn varint_field(&mut self, number: u32, value: u64) -> &mut Self {
        put_uvarint(self.buf, tag(number, WIRE_VARINT));
        put_uvarint(self.buf, value);
        self
    }

    /// Append a length-delimited field (nested message or raw bytes).
    pub fn bytes_field(&mut self, number: u32, bytes: &[u8]) -> &mut Self {
        put_uvarint(self.buf, tag(number, WIRE_LEN));
        put_uvarint(self.buf, bytes.len() as u64);
        self.buf.put_slice(bytes);
        self
    }
}

/// One field yielded by [`FieldReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawField<'a> {
    /// Field number from the tag.
    pub number: u32,
    /// Decoded field payload.
    pub value: FieldValue<'a>,
}

/// Decoded field payload, by wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// Wire type 0 scalar.
    Varint(u64),
    /// Wire type 2 block, borrowed from the input buffer.
    Bytes(&'a [u8]),
}

/// Iterator over the tagged fields of an encoded message.
///
/// Scans from the start of the buffer to its end. Callers match on field
/// numbers and ignore the ones they do not know. Wire types other than 0
/// and 2 are skipped a byte at a time (best effort; this format never
/// emits them). A truncated varint or a declared length running past the
/// end of the buffer stops the scan with an error.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> FieldReader<'a> {
    /// Create a reader over a complete encoded message.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    fn next_field(&mut self) -> Result<Option<RawField<'a>>, WireError> {
        while self.pos < self.buf.len() {
            let (tag, next) = get_uvarint(self.buf, self.pos)?;
            self.pos = next;
            let number = (tag >> 3) as u32;
            match tag & 0x7 {
                WIRE_VARINT => {
                    let (value, next) = get_uvarint(self.buf, self.pos)?;
                    self.pos = next;
                    return Ok(Some(RawField {
                        number,
                        value: FieldValue::Varint(value),
                    }));
                }
                WIRE_LEN => {
                    let (len, next) = get_uvarint(self.buf, self.pos)?;
                    let len = usize::try_from(len).map_err(|_| WireError::Truncated)?;
                    let end = next
                        .checked_add(len)
                        .filter(|&end| end <= self.buf.len())
                        .ok_or(WireError::Truncated)?;
                    let bytes = &self.buf[next..end];
                    self.pos = end;
                    return Ok(Some(RawField {
                        number,
                        value: FieldValue::Bytes(bytes),
                    }));
                }
                _ => {
                    // Unsupported wire type: resume scanning at the next byte.
                    continue;
                }
            }
        }
        Ok(None)
    }
}

impl<'a> Iterator for FieldReader<'a> {
    type Item = Result<RawField<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_field() {
            Ok(Some(field)) => Some(Ok(field)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
