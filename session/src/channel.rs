//! External byte channel seam.
//!
//! The session owns no I/O. Each handshake step hands one encoded claim
//! message to the channel and awaits the peer's reply bytes; the channel is
//! responsible for framing, so one call maps to exactly one message each way.

use async_trait::async_trait;
use bytes::Bytes;

/// Half-duplex request/response byte channel to the device being claimed.
///
/// Implementations perform exactly one exchange per call. The session is
/// single-flight: it never issues a second exchange before the previous one
/// resolves.
#[async_trait]
pub trait ClaimChannel: Send {
    /// Send one encoded claim message and await the peer's response bytes.
    async fn exchange(&mut self, frame: Bytes) -> anyhow::Result<Bytes>;
}
