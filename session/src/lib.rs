//! Claim handshake state machine over an external byte channel.
//!
//! This crate drives the multi-round handshake that issues a verified
//! identity certificate to an embedded device: Start, an Init loop that
//! pulls the device's certificate signing request in chunks, a caller-side
//! signing step, and a Verify loop that pushes the signed certificate back
//! in chunks. Message encoding lives in `claim-wire`; all byte transfer is
//! delegated to a caller-supplied [`ClaimChannel`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use claim_session::{ClaimChannel, ClaimSession, CsrSigner, SessionConfig};
//!
//! # async fn example(mut channel: impl ClaimChannel, signer: impl CsrSigner) -> anyhow::Result<()> {
//! let mut session = ClaimSession::new(SessionConfig::default());
//!
//! session.start(&mut channel).await?;
//! let csr = session.fetch_csr(&mut channel).await?;
//! let certificate = signer.sign(&csr).await?;
//! session.verify(&mut channel, &certificate).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod session;

// Re-export main types
pub use channel::ClaimChannel;
pub use error::SessionError;
pub use session::{ClaimSession, CsrSigner, SessionConfig, SessionState, DEFAULT_CHUNK_SIZE};
