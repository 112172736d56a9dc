
use bytes::Bytes;
use log::warn;
use rand::RngCore;

use crate::content::ContentSource;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::option::{srtcp_replay_protection, srtp_replay_protection};
use crate::protection_profile::ProtectionProfile;
use crate::transport::DtlsRole;

/// A proposed or accepted SRTP suite plus master key material, as carried by
/// a session description crypto attribute. `key` is the raw master key
/// followed by the master salt (30 bytes for the AES_CM_128 suites).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoParams {
    pub tag: u32,
    pub suite: String,
    pub key: Vec<u8>,
}

impl CryptoParams {
    /// Generates params with fresh random key material for building a local
    /// offer or answer.
    pub fn generate(tag: u32, suite: &str) -> Result<CryptoParams> {
        let profile = ProtectionProfile::from_suite_name(suite)
            .ok_or_else(|| Error::NoSuchProfile(suite.to_owned()))?;

        let mut key = vec![0u8; profile.master_len()];
        rand::rng().fill_bytes(&mut key);

        Ok(CryptoParams {
            tag,
            suite: suite.to_owned(),
            key,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NegotiationState {
    Init,
    SentOffer,
    ReceivedOffer,
    SentProvisionalAnswer,
    ReceivedProvisionalAnswer,
    Active,
}

/// CryptoNegotiator is the SRTP filter of a channel: it negotiates the
/// cipher/key state through in-band SDES crypto attributes or installs keys
/// exported from a completed DTLS handshake, and applies the resulting
/// contexts to outbound (`protect`) and inbound (`unprotect`) packets.
///
/// The two keying origins are mutually exclusive: once DTLS-SRTP keys are
/// installed, SDES negotiation is rejected until the channel is torn down.
pub struct CryptoNegotiator {
    state: NegotiationState,
    offered: Vec<CryptoParams>,
    dtls_keyed: bool,

    /// Replay-protection window for the receive contexts; `None` disables
    /// replay checks (the default, matching the transport stack defaults).
    replay_protection_window: Option<usize>,

    send_context: Option<Context>,
    recv_context: Option<Context>,

    /// Separate contexts used only when the RTCP transport was keyed by its
    /// own DTLS handshake. SDES keying covers RTP and RTCP with one pair.
    rtcp_send_context: Option<Context>,
    rtcp_recv_context: Option<Context>,
}

impl Default for CryptoNegotiator {
    fn default() -> Self {
        CryptoNegotiator::new()
    }
}

impl CryptoNegotiator {
    pub fn new() -> Self {
        CryptoNegotiator {
            state: NegotiationState::Init,
            offered: vec![],
            dtls_keyed: false,
            replay_protection_window: None,
            send_context: None,
            recv_context: None,
            rtcp_send_context: None,
            rtcp_recv_context: None,
        }
    }

    pub fn with_replay_protection(window: usize) -> Self {
        CryptoNegotiator {
            replay_protection_window: Some(window),
            ..CryptoNegotiator::new()
        }
    }

    /// True once either keying origin installed send and receive contexts.
    pub fn is_active(&self) -> bool {
        self.send_context.is_some() && self.recv_context.is_some()
    }

    pub fn is_dtls_keyed(&self) -> bool {
        self.dtls_keyed
    }

    /// Stores an offered crypto list. Legal from the initial state or from
    /// an active one (renegotiation).
    pub fn set_offer(&mut self, offered: &[CryptoParams], source: ContentSource) -> Result<()> {
        if self.dtls_keyed {
            return Err(Error::DtlsSrtpActive);
        }
        match self.state {
            NegotiationState::Init | NegotiationState::Active => {}
            _ => return Err(Error::CryptoNegotiationState),
        }

        self.offered = offered.to_vec();
        self.state = match source {
            ContentSource::Local => NegotiationState::SentOffer,
            ContentSource::Remote => NegotiationState::ReceivedOffer,
        };
        Ok(())
    }

    /// Applies a provisional answer. An empty list keeps the negotiation
    /// pending (the final answer may still select a suite); a non-empty one
    /// installs contexts but leaves the offer open for the final answer.
    pub fn set_provisional_answer(
        &mut self,
        answer: &[CryptoParams],
        source: ContentSource,
    ) -> Result<()> {
        if self.dtls_keyed {
            return Err(Error::DtlsSrtpActive);
        }
        if !self.expect_answer(source) {
            return Err(Error::CryptoNegotiationState);
        }
        if answer.is_empty() {
            return Ok(());
        }

        let (send_params, recv_params, profile) = self.negotiate_answer(answer, source)?;
        self.apply_params(&send_params, &recv_params, profile)?;
        self.state = match source {
            ContentSource::Local => NegotiationState::SentProvisionalAnswer,
            ContentSource::Remote => NegotiationState::ReceivedProvisionalAnswer,
        };
        Ok(())
    }

    /// Applies a final answer, installing the negotiated contexts.
    pub fn set_answer(&mut self, answer: &[CryptoParams], source: ContentSource) -> Result<()> {
        if self.dtls_keyed {
            return Err(Error::DtlsSrtpActive);
        }
        if !self.expect_answer(source) {
            return Err(Error::CryptoNegotiationState);
        }
        if answer.is_empty() && self.offered.is_empty() {
            // Negotiation concluded without crypto on either side.
            self.state = NegotiationState::Init;
            return Ok(());
        }

        let (send_params, recv_params, profile) = self.negotiate_answer(answer, source)?;
        self.apply_params(&send_params, &recv_params, profile)?;
        self.offered.clear();
        self.state = NegotiationState::Active;
        Ok(())
    }

    /// Whether an answer from `source` matches the stored offer's parity:
    /// a local offer is answered by the remote and vice versa. A provisional
    /// answer may be superseded by a final one from the same side.
    fn expect_answer(&self, source: ContentSource) -> bool {
        matches!(
            (self.state, source),
            (NegotiationState::SentOffer, ContentSource::Remote)
                | (NegotiationState::ReceivedOffer, ContentSource::Local)
                | (NegotiationState::SentProvisionalAnswer, ContentSource::Local)
                | (NegotiationState::ReceivedProvisionalAnswer, ContentSource::Remote)
        )
    }

    /// Selects the first answer entry whose suite matches a stored offer
    /// entry and which this endpoint supports. Send keys are ours: the offer
    /// entry if we offered, the answer entry if we answered.
    fn negotiate_answer(
        &self,
        answer: &[CryptoParams],
        answer_source: ContentSource,
    ) -> Result<(CryptoParams, CryptoParams, ProtectionProfile)> {
        for ans in answer {
            let profile = match ProtectionProfile::from_suite_name(&ans.suite) {
                Some(p) => p,
                None => continue,
            };
            if let Some(off) = self.offered.iter().find(|o| o.suite == ans.suite) {
                let (send_params, recv_params) = match answer_source {
                    // They answered our offer: we encrypt with what we offered.
                    ContentSource::Remote => (off.clone(), ans.clone()),
                    // We answered their offer: we encrypt with our answer.
                    ContentSource::Local => (ans.clone(), off.clone()),
                };
                return Ok((send_params, recv_params, profile));
            }
        }
        Err(Error::NoMatchingCrypto)
    }

    fn apply_params(
        &mut self,
        send_params: &CryptoParams,
        recv_params: &CryptoParams,
        profile: ProtectionProfile,
    ) -> Result<()> {
        let send_context = Self::make_context(&send_params.key, profile, None)?;
        let recv_context =
            Self::make_context(&recv_params.key, profile, self.replay_protection_window)?;

        self.send_context = Some(send_context);
        self.recv_context = Some(recv_context);
        // SDES keying covers RTP and RTCP with the same contexts.
        self.rtcp_send_context = None;
        self.rtcp_recv_context = None;
        Ok(())
    }

    fn make_context(
        master: &[u8],
        profile: ProtectionProfile,
        replay_window: Option<usize>,
    ) -> Result<Context> {
        if master.len() != profile.master_len() {
            return Err(Error::InvalidCryptoParams(format!(
                "master key material must be len {}, got {}",
                profile.master_len(),
                master.len()
            )));
        }
        let (key, salt) = master.split_at(profile.key_len());
        let (srtp_opt, srtcp_opt) = match replay_window {
            Some(window) => (
                Some(srtp_replay_protection(window)),
                Some(srtcp_replay_protection(window)),
            ),
            None => (None, None),
        };
        Context::new(key, salt, profile, srtp_opt, srtcp_opt)
    }

    /// Installs RTP contexts from DTLS-exported keying material. Each half
    /// is `key_len + salt_len` bytes, client half first; the server role
    /// sends with the server half and receives with the client half.
    pub fn set_rtp_params_from_dtls_export(
        &mut self,
        suite: &str,
        client_write: &[u8],
        server_write: &[u8],
        role: DtlsRole,
    ) -> Result<()> {
        let (send_context, recv_context) =
            self.derive_dtls_contexts(suite, client_write, server_write, role)?;

        self.send_context = Some(send_context);
        self.recv_context = Some(recv_context);
        self.mark_dtls_keyed();
        Ok(())
    }

    /// Installs the separate RTCP contexts used when the RTCP transport ran
    /// its own DTLS handshake.
    pub fn set_rtcp_params_from_dtls_export(
        &mut self,
        suite: &str,
        client_write: &[u8],
        server_write: &[u8],
        role: DtlsRole,
    ) -> Result<()> {
        let (send_context, recv_context) =
            self.derive_dtls_contexts(suite, client_write, server_write, role)?;

        self.rtcp_send_context = Some(send_context);
        self.rtcp_recv_context = Some(recv_context);
        self.mark_dtls_keyed();
        Ok(())
    }

    fn derive_dtls_contexts(
        &self,
        suite: &str,
        client_write: &[u8],
        server_write: &[u8],
        role: DtlsRole,
    ) -> Result<(Context, Context)> {
        let profile = ProtectionProfile::from_suite_name(suite)
            .ok_or_else(|| Error::NoSuchProfile(suite.to_owned()))?;

        let half = profile.master_len();
        if client_write.len() != half {
            return Err(Error::KeyingMaterialLength(half, client_write.len()));
        }
        if server_write.len() != half {
            return Err(Error::KeyingMaterialLength(half, server_write.len()));
        }

        let (send_half, recv_half) = match role {
            DtlsRole::Server => (server_write, client_write),
            DtlsRole::Client => (client_write, server_write),
        };

        let send_context = Self::make_context(send_half, profile, None)?;
        let recv_context = Self::make_context(recv_half, profile, self.replay_protection_window)?;
        Ok((send_context, recv_context))
    }

    fn mark_dtls_keyed(&mut self) {
        self.dtls_keyed = true;
        if !self.offered.is_empty() {
            warn!("discarding pending SDES crypto offer, DTLS-SRTP keying took over");
            self.offered.clear();
        }
        self.state = NegotiationState::Active;
    }

    /// Encrypts an outbound packet in the negotiated context. The caller
    /// treats any failure as drop-and-report, never as channel-fatal.
    pub fn protect(&mut self, packet: &[u8], is_rtcp: bool) -> Result<Bytes> {
        if is_rtcp {
            match self.rtcp_send_context.as_mut().or(self.send_context.as_mut()) {
                Some(ctx) => ctx.encrypt_rtcp(packet),
                None => Err(Error::SrtpNotActive),
            }
        } else {
            match self.send_context.as_mut() {
                Some(ctx) => ctx.encrypt_rtp(packet),
                None => Err(Error::SrtpNotActive),
            }
        }
    }

    /// Decrypts an inbound packet. A failure means "drop the packet", never
    /// "tear down the channel".
    pub fn unprotect(&mut self, packet: &[u8], is_rtcp: bool) -> Result<Bytes> {
        if is_rtcp {
            match self.rtcp_recv_context.as_mut().or(self.recv_context.as_mut()) {
                Some(ctx) => ctx.decrypt_rtcp(packet),
                None => Err(Error::SrtpNotActive),
            }
        } else {
            match self.recv_context.as_mut() {
                Some(ctx) => ctx.decrypt_rtp(packet),
                None => Err(Error::SrtpNotActive),
            }
        }
    }
}
