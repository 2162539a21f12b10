//! Top-level claim message: command builders and response decoding.
//!
//! Outbound commands carry the message type plus an optional encoded
//! [`PayloadBuf`] in field 10; inbound responses carry a [`RespPayload`] in
//! field 11. Start, continuation, and abort commands attach an empty but
//! present chunk because the peer firmware expects field 10 on every
//! command, not an omitted one.

use crate::error::WireError;
use crate::field::{FieldReader, FieldValue, FieldWriter};
use crate::payload::{ClaimStatus, PayloadBuf, RespPayload};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Claim message types, paired command/response values
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimMessageType {
    /// Start command
    CmdClaimStart = 0,
    /// Start response
    RespClaimStart = 1,
    /// Init command
    CmdClaimInit = 2,
    /// Init response
    RespClaimInit = 3,
    /// Verify command
    CmdClaimVerify = 4,
    /// Verify response
    RespClaimVerify = 5,
    /// Abort command
    CmdClaimAbort = 6,
    /// Abort response
    RespClaimAbort = 7,
}

impl TryFrom<u64> for ClaimMessageType {
    type Error = WireError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClaimMessageType::CmdClaimStart),
            1 => Ok(ClaimMessageType::RespClaimStart),
            2 => Ok(ClaimMessageType::CmdClaimInit),
            3 => Ok(ClaimMessageType::RespClaimInit),
            4 => Ok(ClaimMessageType::CmdClaimVerify),
            5 => Ok(ClaimMessageType::RespClaimVerify),
            6 => Ok(ClaimMessageType::CmdClaimAbort),
            7 => Ok(ClaimMessageType::RespClaimAbort),
            _ => Err(WireError::MessageType(value)),
        }
    }
}

const F_MSG: u32 = 1;
const F_CMD_PAYLOAD: u32 = 10;
const F_RESP_PAYLOAD: u32 = 11;

fn encode_command(msg: ClaimMessageType, cmd_payload: Option<&PayloadBuf>) -> Bytes {
    let encoded = cmd_payload.map(PayloadBuf::encode);
    let mut buf = BytesMut::with_capacity(encoded.as_ref().map_or(0, Bytes::len) + 8);
    let mut writer = FieldWriter::new(&mut buf);
    writer.varint_field(F_MSG, msg as u64);
    if let Some(payload) = encoded {
        writer.bytes_field(F_CMD_PAYLOAD, &payload);
    }
    buf.freeze()
}

/// Build the Start command with the empty-but-present chunk the peer expects.
pub fn build_start() -> Bytes {
    encode_command(ClaimMessageType::CmdClaimStart, Some(&PayloadBuf::default()))
}

/// Build an Init command carrying `data` as a single chunk.
pub fn build_init(data: &str) -> Bytes {
    let payload = Bytes::copy_from_slice(data.as_bytes());
    let total_len = payload.len() as u64;
    encode_command(
        ClaimMessageType::CmdClaimInit,
        Some(&PayloadBuf::new(0, payload, total_len)),
    )
}

/// Build an Init continuation: ask for the next piece of the previously
/// started response, attaching no new data.
pub fn build_init_continuation() -> Bytes {
    encode_command(ClaimMessageType::CmdClaimInit, Some(&PayloadBuf::default()))
}

/// Build a Verify command carrying one certificate chunk.
///
/// `offset` and `chunk_size` are byte counts into the certificate's UTF-8
/// encoding, and `total_len` is its byte length. A chunk never extends past
/// the end of the certificate: an `offset` at or past the end produces an
/// empty chunk, which the session treats as transfer complete.
pub fn build_verify(certificate: &str, offset: usize, chunk_size: usize) -> Bytes {
    let cert = certificate.as_bytes();
    let end = cert.len().min(offset.saturating_add(chunk_size));
    let chunk = if offset >= cert.len() {
        &[][..]
    } else {
        &cert[offset..end]
    };
    encode_command(
        ClaimMessageType::CmdClaimVerify,
        Some(&PayloadBuf::new(
            offset as u64,
            Bytes::copy_from_slice(chunk),
            cert.len() as u64,
        )),
    )
}

/// Build the Abort command.
pub fn build_abort() -> Bytes {
    encode_command(ClaimMessageType::CmdClaimAbort, Some(&PayloadBuf::default()))
}

/// Decoded inbound claim message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimResponse {
    /// Message type; defaults to [`ClaimMessageType::RespClaimStart`] when
    /// the field is absent
    pub msg: ClaimMessageType,
    /// Response payload, if present
    pub resp: Option<RespPayload>,
}

impl ClaimResponse {
    /// Decode a response from raw bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut msg = ClaimMessageType::RespClaimStart;
        let mut resp = None;
        for field in FieldReader::new(bytes) {
            let field = field?;
            match (field.number, field.value) {
                (F_MSG, FieldValue::Varint(v)) => msg = ClaimMessageType::try_from(v)?,
                (F_RESP_PAYLOAD, FieldValue::Bytes(b)) => {
                    resp = Some(RespPayload::decode(b)?);
                }
                _ => {}
            }
        }
        Ok(Self { msg, resp })
    }

    fn buf(&self) -> Option<&PayloadBuf> {
        self.resp.as_ref().and_then(|r| r.buf.as_ref())
    }

    /// UTF-8 contents of the response chunk; empty when no chunk is present.
    pub fn payload_str(&self) -> Result<String, WireError> {
        match self.buf() {
            Some(buf) => String::from_utf8(buf.payload.to_vec()).map_err(|_| WireError::Utf8),
            None => Ok(String::new()),
        }
    }

    /// Chunk offset, 0 when no chunk is present.
    pub fn offset(&self) -> u64 {
        self.buf().map_or(0, |b| b.offset)
    }

    /// Total stream length, 0 when no chunk is present.
    pub fn total_len(&self) -> u64 {
        self.buf().map_or(0, |b| b.total_len)
    }

    /// True only when a response payload is present and reports success.
    /// An absent payload is not success.
    pub fn is_success(&self) -> bool {
        self.resp
            .as_ref()
            .is_some_and(|r| r.status == ClaimStatus::Success)
    }
}
