//! Wire protocol error types.

use thiserror::Error;

/// Wire decode errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Input ended before a varint or length-delimited block completed
    #[error("truncated input")]
    Truncated,

    /// Varint does not fit in 64 bits
    #[error("varint overflow")]
    Overflow,

    /// Unknown claim status value
    #[error("unknown status {0}")]
    Status(u64),

    /// Unknown message type value
    #[error("unknown message type {0}")]
    MessageType(u64),

    /// Payload bytes are not valid UTF-8
    #[error("payload is not valid utf-8")]
    Utf8,
}
