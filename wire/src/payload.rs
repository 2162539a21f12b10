//! Chunk transfer and response payload messages.
//!
//! [`PayloadBuf`] carries one chunk of a larger byte stream together with
//! its offset/total accounting; [`RespPayload`] wraps a status code and an
//! optional chunk on the inbound side.

use crate::error::WireError;
use crate::field::{FieldReader, FieldValue, FieldWriter};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Result status carried by claim responses
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// Operation succeeded
    Success = 0,
    /// Generic failure
    Fail = 1,
    /// Peer rejected a parameter
    InvalidParam = 2,
    /// Peer was not in a state that allows the operation
    InvalidState = 3,
    /// Peer ran out of memory
    NoMemory = 4,
}

impl TryFrom<u64> for ClaimStatus {
    type Error = WireError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClaimStatus::Success),
            1 => Ok(ClaimStatus::Fail),
            2 => Ok(ClaimStatus::InvalidParam),
            3 => Ok(ClaimStatus::InvalidState),
            4 => Ok(ClaimStatus::NoMemory),
            _ => Err(WireError::Status(value)),
        }
    }
}

/// One chunk of a larger byte stream
///
/// The codec does not enforce `payload.len() <= total_len - offset`; chunk
/// accounting is the sender's responsibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadBuf {
    /// Byte offset of this chunk within the whole stream
    pub offset: u64,
    /// Chunk bytes
    pub payload: Bytes,
    /// Total length of the whole stream in bytes
    pub total_len: u64,
}

const F_OFFSET: u32 = 1;
const F_PAYLOAD: u32 = 2;
const F_TOTAL_LEN: u32 = 3;

impl PayloadBuf {
    /// Create a new chunk
    pub fn new(offset: u64, payload: Bytes, total_len: u64) -> Self {
        Self {
            offset,
            payload,
            total_len,
        }
    }

    /// Encode to bytes, fields in ascending field-number order
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 16);
        FieldWriter::new(&mut buf)
            .varint_field(F_OFFSET, self.offset)
            .bytes_field(F_PAYLOAD, &self.payload)
            .varint_field(F_TOTAL_LEN, self.total_len);
        buf.freeze()
    }

    /// Decode from bytes
    ///
    /// Field order is not assumed; absent fields keep their defaults and
    /// unknown fields are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut out = Self::default();
        for field in FieldReader::new(bytes) {
            let field = field?;
            match (field.number, field.value) {
                (F_OFFSET, FieldValue::Varint(v)) => out.offset = v,
                (F_PAYLOAD, FieldValue::Bytes(b)) => out.payload = Bytes::copy_from_slice(b),
                (F_TOTAL_LEN, FieldValue::Varint(v)) => out.total_len = v,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Status plus optional chunk carried by an inbound response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespPayload {
    /// Peer-reported status; absent on the wire means [`ClaimStatus::Success`]
    pub status: ClaimStatus,
    /// Response chunk, if the peer attached one
    pub buf: Option<PayloadBuf>,
}

const F_STATUS: u32 = 1;
const F_BUF: u32 = 2;

impl RespPayload {
    /// Decode from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        // Field omission means the zero value, so status starts at Success.
        let mut status = ClaimStatus::Success;
        let mut buf = None;
        for field in FieldReader::new(bytes) {
            let field = field?;
            match (field.number, field.value) {
                (F_STATUS, FieldValue::Varint(v)) => status = ClaimStatus::try_from(v)?,
                (F_BUF, FieldValue::Bytes(b)) => buf = Some(PayloadBuf::decode(b)?),
                _ => {}
            }
        }
        Ok(Self { status, buf })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_buf_roundtrip() {
        let buf = PayloadBuf::new(3, Bytes::from_static(b"DE"), 5);
        let decoded = PayloadBuf::decode(&buf.encode()).unwrap();
        assert_eq!(decoded, buf);
    }

    #[test]
    fn test_empty_payload_buf() {
        let encoded = PayloadBuf::default().encode();
        assert_eq!(encoded.to_vec(), vec![8, 0, 18, 0, 24, 0]);
        assert_eq!(PayloadBuf::decode(&encoded).unwrap(), PayloadBuf::default());
    }

    #[test]
    fn test_decode_empty_input_yields_defaults() {
        let decoded = PayloadBuf::decode(&[]).unwrap();
        assert_eq!(decoded, PayloadBuf::default());
    }

    #[test]
    fn test_unknown_field_tolerance() {
        let buf = PayloadBuf::new(7, Bytes::from_static(b"abc"), 10);
        let mut bytes = BytesMut::from(&buf.encode()[..]);
        FieldWriter::new(&mut bytes)
            .varint_field(9, 12345)
            .bytes_field(12, b"??");
        assert_eq!(PayloadBuf::decode(&bytes).unwrap(), buf);
    }

    #[test]
    fn test_decode_is_order_agnostic() {
        let mut bytes = BytesMut::new();
        FieldWriter::new(&mut bytes)
            .varint_field(F_TOTAL_LEN, 9)
            .bytes_field(F_PAYLOAD, b"xyz")
            .varint_field(F_OFFSET, 6);
        let decoded = PayloadBuf::decode(&bytes).unwrap();
        assert_eq!(decoded, PayloadBuf::new(6, Bytes::from_static(b"xyz"), 9));
    }

    #[test]
    fn test_resp_payload_default_status() {
        // Only a buf field: status must default to Success.
        let inner = PayloadBuf::new(0, Bytes::from_static(b"ok"), 2).encode();
        let mut bytes = BytesMut::new();
        FieldWriter::new(&mut bytes).bytes_field(F_BUF, &inner);

        let resp = RespPayload::decode(&bytes).unwrap();
        assert_eq!(resp.status, ClaimStatus::Success);
        assert_eq!(resp.buf.unwrap().payload, Bytes::from_static(b"ok"));
    }

    #[test]
    fn test_resp_payload_status_only() {
        let mut bytes = BytesMut::new();
        FieldWriter::new(&mut bytes).varint_field(F_STATUS, 3);
        let resp = RespPayload::decode(&bytes).unwrap();
        assert_eq!(resp.status, ClaimStatus::InvalidState);
        assert!(resp.buf.is_none());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut bytes = BytesMut::new();
        FieldWriter::new(&mut bytes).varint_field(F_STATUS, 99);
        assert!(matches!(
            RespPayload::decode(&bytes),
            Err(WireError::Status(99))
        ));
    }

    #[test]
    fn test_truncated_nested_buf() {
        // buf field declaring more bytes than present.
        let bytes = [18, 5, 8, 0];
        assert!(matches!(
            RespPayload::decode(&bytes),
            Err(WireError::Truncated)
        ));
    }
}
