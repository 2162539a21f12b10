//! Claim handshake state machine.
//!
//! Sequences Start → Init (repeating while the peer has more CSR bytes) →
//! Verify (repeating while certificate bytes remain) over an external
//! [`ClaimChannel`], producing and consuming the messages from `claim-wire`.
//! One instance drives one claim attempt for one device; instances are not
//! shared across concurrent attempts.

use crate::channel::ClaimChannel;
use crate::error::SessionError;
use async_trait::async_trait;
use bytes::Bytes;
use claim_wire::{
    build_abort, build_init, build_init_continuation, build_start, build_verify, ClaimResponse,
    ClaimStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Default certificate chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Tunables for a claim session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Certificate bytes sent per Verify message
    pub chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Claim session lifecycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No message sent yet
    Idle,
    /// Start command in flight
    Starting,
    /// Pulling the CSR from the device
    Initializing,
    /// Awaiting or pushing the signed certificate
    Verifying,
    /// Certificate fully transferred
    Completed,
    /// A decode error, channel error, or non-success status ended the session
    Failed,
    /// Abort was requested
    Aborted,
}

impl SessionState {
    /// True for `Completed`, `Failed`, and `Aborted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Caller-supplied signing hook for the CSR produced by the Init leg.
#[async_trait]
pub trait CsrSigner: Send + Sync {
    /// Sign `csr` and return the certificate to install on the device.
    async fn sign(&self, csr: &str) -> anyhow::Result<String>;
}

/// Sequential, single-flight driver for one claim attempt.
///
/// All byte transfer is delegated to the channel; the session only builds
/// the next message from the fields of the previous response. There is no
/// automatic retry: any decode error, channel error, or non-success status
/// moves the session to [`SessionState::Failed`] and surfaces the error.
pub struct ClaimSession {
    config: SessionConfig,
    state: SessionState,
    init_data: String,
}

impl ClaimSession {
    /// Create an idle session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            init_data: String::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mark the session failed and hand the error back to the caller.
    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(state = ?self.state, error = %err, "claim session failed");
        self.state = SessionState::Failed;
        err
    }

    fn expect_state(&self, op: &'static str, want: SessionState) -> Result<(), SessionError> {
        if self.state == want {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    /// One exchange: send a command, decode the reply, require success.
    async fn exchange<C: ClaimChannel>(
        &mut self,
        channel: &mut C,
        frame: Bytes,
    ) -> Result<ClaimResponse, SessionError> {
        let reply = match channel.exchange(frame).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(SessionError::Channel(e))),
        };
        let resp = match ClaimResponse::decode(&reply) {
            Ok(resp) => resp,
            Err(e) => return Err(self.fail(SessionError::Wire(e))),
        };
        if !resp.is_success() {
            let status = resp.resp.as_ref().map_or(ClaimStatus::Fail, |r| r.status);
            return Err(self.fail(SessionError::Status(status)));
        }
        Ok(resp)
    }

    /// Send the Start command and record the peer's initiate data.
    ///
    /// On success the session moves to [`SessionState::Initializing`] and
    /// the response's payload string is carried into the first Init.
    pub async fn start<C: ClaimChannel>(&mut self, channel: &mut C) -> Result<(), SessionError> {
        self.expect_state("start", SessionState::Idle)?;
        self.state = SessionState::Starting;
        debug!("claim start");
        let resp = self.exchange(channel, build_start()).await?;
        self.init_data = match resp.payload_str() {
            Ok(data) => data,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.state = SessionState::Initializing;
        Ok(())
    }

    /// Run the Init loop and return the device's accumulated CSR.
    ///
    /// Sends Init with the Start response's data first, then continuations
    /// while `offset + len(chunk) < total_len`. On success the session moves
    /// to [`SessionState::Verifying`] and awaits a certificate via
    /// [`verify`](Self::verify).
    pub async fn fetch_csr<C: ClaimChannel>(
        &mut self,
        channel: &mut C,
    ) -> Result<String, SessionError> {
        self.expect_state("fetch_csr", SessionState::Initializing)?;
        let mut csr = String::new();
        let mut frame = build_init(&self.init_data);
        loop {
            let resp = self.exchange(channel, frame).await?;
            let chunk = match resp.payload_str() {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.fail(e.into())),
            };
            let offset = resp.offset();
            let total = resp.total_len();
            trace!(offset, total, chunk_len = chunk.len(), "init chunk");
            let done = offset + chunk.len() as u64 >= total;
            if chunk.is_empty() && !done {
                // A well-behaved peer always makes progress.
                return Err(self.fail(SessionError::Stalled));
            }
            csr.push_str(&chunk);
            if done {
                break;
            }
            frame = build_init_continuation();
        }
        debug!(csr_len = csr.len(), "csr complete");
        self.state = SessionState::Verifying;
        Ok(csr)
    }

    /// Push the signed certificate to the device in bounded chunks.
    ///
    /// `certificate` must be non-empty. On success the session moves to
    /// [`SessionState::Completed`].
    pub async fn verify<C: ClaimChannel>(
        &mut self,
        channel: &mut C,
        certificate: &str,
    ) -> Result<(), SessionError> {
        self.expect_state("verify", SessionState::Verifying)?;
        if certificate.is_empty() {
            return Err(SessionError::EmptyCertificate);
        }
        let total = certificate.len();
        let mut offset = 0usize;
        loop {
            trace!(offset, total, "verify chunk");
            let frame = build_verify(certificate, offset, self.config.chunk_size);
            self.exchange(channel, frame).await?;
            offset = total.min(offset + self.config.chunk_size);
            if offset >= total {
                break;
            }
        }
        self.state = SessionState::Completed;
        debug!("claim completed");
        Ok(())
    }

    /// Send a best-effort Abort notification.
    ///
    /// Valid from any non-terminal state. The local transition to
    /// [`SessionState::Aborted`] is unconditional: a non-success reply, an
    /// undecodable reply, or a channel failure is logged and otherwise
    /// ignored.
    pub async fn abort<C: ClaimChannel>(&mut self, channel: &mut C) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::InvalidState {
                op: "abort",
                state: self.state,
            });
        }
        debug!(state = ?self.state, "claim abort");
        match channel.exchange(build_abort()).await {
            Ok(reply) => match ClaimResponse::decode(&reply) {
                Ok(resp) if resp.is_success() => {}
                Ok(_) => warn!("peer did not acknowledge abort"),
                Err(e) => warn!(error = %e, "undecodable abort reply"),
            },
            Err(e) => warn!(error = %e, "abort notification failed"),
        }
        self.state = SessionState::Aborted;
        Ok(())
    }

    /// Drive the full handshake: Start, Init, caller-side signing, Verify.
    pub async fn run<C: ClaimChannel, S: CsrSigner>(
        &mut self,
        channel: &mut C,
        signer: &S,
    ) -> Result<(), SessionError> {
        self.start(channel).await?;
        let csr = self.fetch_csr(channel).await?;
        let certificate = match signer.sign(&csr).await {
            Ok(certificate) => certificate,
            Err(e) => return Err(self.fail(SessionError::Signer(e))),
        };
        self.verify(channel, &certificate).await
    }
}

impl Default for ClaimSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use claim_wire::{ClaimMessageType, FieldWriter, PayloadBuf};
    use std::collections::VecDeque;

    /// Channel fed with pre-encoded replies, recording what was sent.
    struct ScriptedChannel {
        replies: VecDeque<anyhow::Result<Bytes>>,
        sent: Vec<Bytes>,
    }

    impl ScriptedChannel {
        fn new(replies: Vec<anyhow::Result<Bytes>>) -> Self {
            Self {
                replies: replies.into(),
                sent: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ClaimChannel for ScriptedChannel {
        async fn exchange(&mut self, frame: Bytes) -> anyhow::Result<Bytes> {
            self.sent.push(frame);
            self.replies
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    struct TestSigner;

    #[async_trait]
    impl CsrSigner for TestSigner {
        async fn sign(&self, csr: &str) -> anyhow::Result<String> {
            Ok(format!("CERT[{csr}]"))
        }
    }

    fn resp(msg: ClaimMessageType, status: u64, buf: Option<(u64, &[u8], u64)>) -> Bytes {
        let mut inner = BytesMut::new();
        let mut writer = FieldWriter::new(&mut inner);
        writer.varint_field(1, status);
        if let Some((offset, payload, total_len)) = buf {
            let encoded =
                PayloadBuf::new(offset, Bytes::copy_from_slice(payload), total_len).encode();
            writer.bytes_field(2, &encoded);
        }
        let mut out = BytesMut::new();
        FieldWriter::new(&mut out)
            .varint_field(1, msg as u64)
            .bytes_field(11, &inner);
        out.freeze()
    }

    #[tokio::test]
    async fn test_full_claim_roundtrip() {
        let mut channel = ScriptedChannel::new(vec![
            Ok(resp(
                ClaimMessageType::RespClaimStart,
                0,
                Some((0, b"initiate-data", 13)),
            )),
            Ok(resp(
                ClaimMessageType::RespClaimInit,
                0,
                Some((0, b"CSR-PART-1", 20)),
            )),
            Ok(resp(
                ClaimMessageType::RespClaimInit,
                0,
                Some((10, b"CSR-PART-2", 20)),
            )),
            Ok(resp(ClaimMessageType::RespClaimVerify, 0, None)),
            Ok(resp(ClaimMessageType::RespClaimVerify, 0, None)),
        ]);

        let mut session = ClaimSession::new(SessionConfig { chunk_size: 16 });
        session.start(&mut channel).await.unwrap();
        assert_eq!(session.state(), SessionState::Initializing);

        let csr = session.fetch_csr(&mut channel).await.unwrap();
        assert_eq!(csr, "CSR-PART-1CSR-PART-2");
        assert_eq!(session.state(), SessionState::Verifying);

        // 22-byte certificate with 16-byte chunks: two Verify exchanges.
        session.verify(&mut channel, "0123456789ABCDEF012345").await.unwrap();
        assert_eq!(session.state(), SessionState::Completed);

        // 1 start + 2 init + 2 verify
        assert_eq!(channel.sent.len(), 5);
        assert_eq!(channel.sent[0], build_start());
        assert_eq!(channel.sent[1], build_init("initiate-data"));
        assert_eq!(channel.sent[2], build_init_continuation());
    }

    #[tokio::test]
    async fn test_run_with_signer() {
        let mut channel = ScriptedChannel::new(vec![
            Ok(resp(
                ClaimMessageType::RespClaimStart,
                0,
                Some((0, b"d", 1)),
            )),
            Ok(resp(
                ClaimMessageType::RespClaimInit,
                0,
                Some((0, b"my-csr", 6)),
            )),
            Ok(resp(ClaimMessageType::RespClaimVerify, 0, None)),
        ]);

        let mut session = ClaimSession::default();
        session.run(&mut channel, &TestSigner).await.unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        // CERT[my-csr] is under one chunk: single Verify exchange.
        assert_eq!(channel.sent.len(), 3);
    }

    #[tokio::test]
    async fn test_peer_failure_status() {
        let mut channel = ScriptedChannel::new(vec![Ok(resp(
            ClaimMessageType::RespClaimStart,
            1,
            None,
        ))]);

        let mut session = ClaimSession::default();
        let err = session.start(&mut channel).await.unwrap_err();
        assert!(matches!(err, SessionError::Status(ClaimStatus::Fail)));
        assert_eq!(session.state(), SessionState::Failed);

        // A failed session rejects further legs.
        let err = session.fetch_csr(&mut channel).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_missing_resp_payload_is_not_success() {
        // A reply with no resp_payload at all must fail the start leg.
        let mut out = BytesMut::new();
        FieldWriter::new(&mut out)
            .varint_field(1, ClaimMessageType::RespClaimStart as u64);
        let mut channel = ScriptedChannel::new(vec![Ok(out.freeze())]);

        let mut session = ClaimSession::default();
        let err = session.start(&mut channel).await.unwrap_err();
        assert!(matches!(err, SessionError::Status(ClaimStatus::Fail)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_malformed_reply_fails_session() {
        // Tag then a varint that never terminates.
        let mut channel =
            ScriptedChannel::new(vec![Ok(Bytes::from_static(&[8, 0x80]))]);

        let mut session = ClaimSession::default();
        let err = session.start(&mut channel).await.unwrap_err();
        assert!(matches!(err, SessionError::Wire(_)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_channel_error_fails_session() {
        let mut channel = ScriptedChannel::new(vec![Err(anyhow::anyhow!("link down"))]);

        let mut session = ClaimSession::default();
        let err = session.start(&mut channel).await.unwrap_err();
        assert!(matches!(err, SessionError::Channel(_)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_preconditions() {
        let mut channel = ScriptedChannel::new(vec![]);
        let mut session = ClaimSession::default();

        let err = session.verify(&mut channel, "cert").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState { op: "verify", .. }
        ));

        let err = session.fetch_csr(&mut channel).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState { op: "fetch_csr", .. }
        ));

        // Preconditions are checked before any message is built.
        assert!(channel.sent.is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_empty_certificate_rejected() {
        let mut channel = ScriptedChannel::new(vec![
            Ok(resp(ClaimMessageType::RespClaimStart, 0, Some((0, b"", 0)))),
            Ok(resp(
                ClaimMessageType::RespClaimInit,
                0,
                Some((0, b"csr", 3)),
            )),
        ]);

        let mut session = ClaimSession::default();
        session.start(&mut channel).await.unwrap();
        session.fetch_csr(&mut channel).await.unwrap();

        let err = session.verify(&mut channel, "").await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyCertificate));
        // The session stays in Verifying; the caller may retry with a
        // real certificate.
        assert_eq!(session.state(), SessionState::Verifying);
    }

    #[tokio::test]
    async fn test_abort_is_unconditional() {
        // Channel failure must not prevent the Aborted transition.
        let mut channel = ScriptedChannel::new(vec![Err(anyhow::anyhow!("link down"))]);

        let mut session = ClaimSession::default();
        session.abort(&mut channel).await.unwrap();
        assert_eq!(session.state(), SessionState::Aborted);

        // Terminal states reject a second abort.
        let err = session.abort(&mut channel).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_stalled_init_loop() {
        let mut channel = ScriptedChannel::new(vec![
            Ok(resp(ClaimMessageType::RespClaimStart, 0, Some((0, b"", 0)))),
            // Empty chunk while claiming 10 bytes remain: no progress.
            Ok(resp(ClaimMessageType::RespClaimInit, 0, Some((0, b"", 10)))),
        ]);

        let mut session = ClaimSession::default();
        session.start(&mut channel).await.unwrap();
        let err = session.fetch_csr(&mut channel).await.unwrap_err();
        assert!(matches!(err, SessionError::Stalled));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_verify_chunk_count_exact_multiple() {
        let mut channel = ScriptedChannel::new(vec![
            Ok(resp(ClaimMessageType::RespClaimStart, 0, Some((0, b"", 0)))),
            Ok(resp(
                ClaimMessageType::RespClaimInit,
                0,
                Some((0, b"csr", 3)),
            )),
            Ok(resp(ClaimMessageType::RespClaimVerify, 0, None)),
            Ok(resp(ClaimMessageType::RespClaimVerify, 0, None)),
        ]);

        // Certificate length an exact multiple of chunk_size must not send
        // a trailing empty chunk.
        let mut session = ClaimSession::new(SessionConfig { chunk_size: 2 });
        session.start(&mut channel).await.unwrap();
        session.fetch_csr(&mut channel).await.unwrap();
        session.verify(&mut channel, "ABCD").await.unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(channel.sent.len(), 4);
    }
}
