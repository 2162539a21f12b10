//! Tag/wire-type binary codec for the device claim handshake.
//!
//! This crate implements, by hand, the minimal subset of a length-prefixed
//! tag/wire-type encoding used by the claim protocol: varint scalars
//! (wire type 0) and length-delimited blocks (wire type 2). No schema
//! compiler is involved; the few message shapes are encoded and decoded
//! directly.
//!
//! ## Wire Format
//!
//! ```text
//! tag     = varint((field_number << 3) | wire_type)
//! varint  = little-endian base-128, MSB of each byte is the continuation bit
//!
//! ClaimPayload   field 1  = msg (varint, ClaimMessageType)
//!                field 10 = cmd_payload  (len-delimited PayloadBuf)
//!                field 11 = resp_payload (len-delimited RespPayload)
//! PayloadBuf     field 1  = offset    (varint)
//!                field 2  = payload   (len-delimited raw bytes)
//!                field 3  = total_len (varint)
//! RespPayload    field 1  = status (varint, ClaimStatus)
//!                field 2  = buf    (len-delimited PayloadBuf)
//! ```
//!
//! Decoders scan fields in any order and ignore unknown field numbers, so
//! the peer firmware may extend its messages without breaking older readers.
//! An absent field always decodes to its zero value.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod field;
pub mod message;
pub mod payload;
pub mod varint;

// Re-export main types
pub use error::WireError;
pub use field::{FieldReader, FieldValue, FieldWriter, RawField, WIRE_LEN, WIRE_VARINT};
pub use message::{
    build_abort, build_init, build_init_continuation, build_start, build_verify, ClaimMessageType,
    ClaimResponse,
};
pub use payload::{ClaimStatus, PayloadBuf, RespPayload};
pub use varint::{get_uvarint, put_uvarint, uvarint_len};
