//! Session error types.

use crate::session::SessionState;
use claim_wire::{ClaimStatus, WireError};
use thiserror::Error;

/// Errors that terminate a claim session or reject an operation
#[derive(Error, Debug)]
pub enum SessionError {
    /// A response failed to decode
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The peer reported a non-success status
    #[error("peer reported status {0:?}")]
    Status(ClaimStatus),

    /// The underlying channel failed to complete an exchange
    #[error("channel error: {0}")]
    Channel(#[source] anyhow::Error),

    /// The caller's signing hook failed
    #[error("csr signing failed: {0}")]
    Signer(#[source] anyhow::Error),

    /// An operation was invoked from the wrong session state
    #[error("{op} is not valid in state {state:?}")]
    InvalidState {
        /// Operation that was rejected
        op: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// Verify was invoked with an empty certificate
    #[error("certificate is empty")]
    EmptyCertificate,

    /// The peer returned an empty chunk while claiming more data remains
    #[error("peer made no transfer progress")]
    Stalled,
}
