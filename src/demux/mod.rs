
use std::collections::HashSet;

use byteorder::{BigEndian, ByteOrder};
use log::trace;

/// Packet-type classification per RFC 5761 §4 / RFC 7983: an RTP/RTCP packet
/// is RTCP when its second byte is in [192..=223].
pub(crate) fn is_rtcp_packet(buf: &[u8]) -> bool {
    // Not long enough to determine RTP/RTCP
    if buf.len() < 4 {
        return false;
    }

    let rtcp_packet_type = buf[1];
    (192..=223).contains(&rtcp_packet_type)
}

/// Payload type of an RTP packet, peeked from the raw (possibly still
/// SRTP-protected) header.
pub(crate) fn rtp_payload_type(buf: &[u8]) -> Option<u8> {
    if buf.len() < 2 {
        return None;
    }
    Some(buf[1] & 0x7f)
}

/// SSRC of an RTP packet, peeked from the raw header.
pub(crate) fn rtp_ssrc(buf: &[u8]) -> Option<u32> {
    if buf.len() < 12 {
        return None;
    }
    Some(BigEndian::read_u32(&buf[8..12]))
}

/// Sender SSRC of an RTCP packet, peeked from the raw header.
pub(crate) fn rtcp_ssrc(buf: &[u8]) -> Option<u32> {
    if buf.len() < 8 {
        return None;
    }
    Some(BigEndian::read_u32(&buf[4..8]))
}

/// BundleDemuxer decides which packets belong to this channel when several
/// logical media sections share one transport.
///
/// Acceptance works on the raw bytes before SRTP unprotect: the payload type
/// and SSRC fields are outside the encrypted region. RTP packets are accepted
/// by payload type or by an SSRC learned from an earlier payload-type match;
/// RTCP packets are accepted by their sender SSRC. A demuxer with no
/// configured payload types accepts everything (bundling is off).
#[derive(Debug, Default)]
pub struct BundleDemuxer {
    payload_types: HashSet<u8>,
    ssrcs: HashSet<u32>,
}

impl BundleDemuxer {
    pub fn new() -> Self {
        BundleDemuxer::default()
    }

    pub fn add_payload_type(&mut self, payload_type: u8) {
        self.payload_types.insert(payload_type);
    }

    pub fn clear_payload_types(&mut self) {
        self.payload_types.clear();
    }

    pub fn has_payload_type(&self, payload_type: u8) -> bool {
        self.payload_types.contains(&payload_type)
    }

    /// Whether this channel accepts the packet. Learns the SSRC of RTP
    /// packets accepted by payload type, so later packets (and RTCP reports
    /// about them) keep matching.
    pub fn demux(&mut self, buf: &[u8], is_rtcp: bool) -> bool {
        if self.payload_types.is_empty() {
            // No bundling in effect.
            return true;
        }

        if is_rtcp {
            return match rtcp_ssrc(buf) {
                Some(ssrc) => self.ssrcs.contains(&ssrc),
                None => false,
            };
        }

        if let Some(ssrc) = rtp_ssrc(buf) {
            if self.ssrcs.contains(&ssrc) {
                return true;
            }
            if let Some(pt) = rtp_payload_type(buf) {
                if self.payload_types.contains(&pt) {
                    trace!("bundle demux learned ssrc={ssrc} from payload type {pt}");
                    self.ssrcs.insert(ssrc);
                    return true;
                }
            }
        }

        false
    }
}
