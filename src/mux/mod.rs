
use crate::content::ContentSource;
use crate::demux::is_rtcp_packet;
use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum MuxState {
    #[default]
    Init,
    SentOffer,
    ReceivedOffer,
    SentProvisionalAnswer,
    ReceivedProvisionalAnswer,
    Active,
}

/// RtcpMuxNegotiator tracks the offer/answer negotiation of whether RTCP
/// packets share the RTP transport (RFC 5761).
///
/// Activation is terminal: once a final answer enables muxing the separate
/// RTCP transport is retired for good, and later attempts to negotiate it
/// back are rejected.
#[derive(Debug, Default)]
pub struct RtcpMuxNegotiator {
    state: MuxState,
    offer_enabled: bool,
}

impl RtcpMuxNegotiator {
    pub fn new() -> Self {
        RtcpMuxNegotiator::default()
    }

    pub fn is_active(&self) -> bool {
        self.state == MuxState::Active
    }

    pub fn set_offer(&mut self, enabled: bool, source: ContentSource) -> Result<()> {
        if self.state == MuxState::Active {
            // Mux can't be taken back once active.
            return if enabled {
                Ok(())
            } else {
                Err(Error::RtcpMuxRenegotiation)
            };
        }
        if !self.expect_offer(source) {
            return Err(Error::RtcpMuxNegotiationState);
        }

        self.offer_enabled = enabled;
        self.state = match source {
            ContentSource::Local => MuxState::SentOffer,
            ContentSource::Remote => MuxState::ReceivedOffer,
        };
        Ok(())
    }

    /// A provisional answer never commits: only a final answer activates
    /// muxing. A pranswer declining mux leaves the offer pending, since the
    /// final answer might still accept it.
    pub fn set_provisional_answer(&mut self, enabled: bool, source: ContentSource) -> Result<()> {
        if self.state == MuxState::Active {
            return if enabled {
                Ok(())
            } else {
                Err(Error::RtcpMuxRenegotiation)
            };
        }
        if !self.expect_answer(source) {
            return Err(Error::RtcpMuxNegotiationState);
        }
        if enabled && !self.offer_enabled {
            return Err(Error::RtcpMuxNotOffered);
        }
        if enabled {
            self.state = match source {
                ContentSource::Local => MuxState::SentProvisionalAnswer,
                ContentSource::Remote => MuxState::ReceivedProvisionalAnswer,
            };
        }
        // A pranswer declining mux leaves the offer pending untouched.
        Ok(())
    }

    pub fn set_answer(&mut self, enabled: bool, source: ContentSource) -> Result<()> {
        if self.state == MuxState::Active {
            return if enabled {
                Ok(())
            } else {
                Err(Error::RtcpMuxRenegotiation)
            };
        }
        if !self.expect_answer(source) {
            return Err(Error::RtcpMuxNegotiationState);
        }
        if enabled && !self.offer_enabled {
            self.state = MuxState::Init;
            return Err(Error::RtcpMuxNotOffered);
        }

        self.state = if enabled && self.offer_enabled {
            MuxState::Active
        } else {
            MuxState::Init
        };
        Ok(())
    }

    fn expect_offer(&self, source: ContentSource) -> bool {
        matches!(
            (self.state, source),
            (MuxState::Init, _)
                | (MuxState::SentOffer, ContentSource::Local)
                | (MuxState::ReceivedOffer, ContentSource::Remote)
        )
    }

    fn expect_answer(&self, source: ContentSource) -> bool {
        matches!(
            (self.state, source),
            (MuxState::SentOffer, ContentSource::Remote)
                | (MuxState::ReceivedOffer, ContentSource::Local)
                | (MuxState::SentProvisionalAnswer, ContentSource::Local)
                | (MuxState::ReceivedProvisionalAnswer, ContentSource::Remote)
        )
    }

    /// Classifies a packet arriving on the shared RTP transport: true when
    /// muxing is active and the packet type byte is in the RTCP range.
    pub fn demux_rtcp(&self, buf: &[u8]) -> bool {
        self.is_active() && is_rtcp_packet(buf)
    }
}
