use std::fmt;

use crate::crypto::CryptoParams;
use crate::streams::StreamParams;

/// Which side of the session a description (or a crypto/mux parameter set)
/// originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Local,
    Remote,
}

/// The four legal points in session-description negotiation at which content
/// parameters can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationAction {
    Offer,
    ProvisionalAnswer,
    Answer,
    Update,
}

/// ContentDirection indicates the direction of media flow, expressed in the
/// local endpoint's frame: the session layer mirrors a remote description's
/// direction attribute before it reaches the channel, so `SendOnly` always
/// means "this endpoint may send".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ContentDirection {
    Inactive,

    /// SendOnly indicates media flows away from this endpoint only.
    SendOnly,

    /// RecvOnly indicates media flows toward this endpoint only.
    RecvOnly,

    /// SendRecv indicates media flows in both directions.
    #[default]
    SendRecv,
}

const CONTENT_DIRECTION_INACTIVE_STR: &str = "inactive";
const CONTENT_DIRECTION_SENDONLY_STR: &str = "sendonly";
const CONTENT_DIRECTION_RECVONLY_STR: &str = "recvonly";
const CONTENT_DIRECTION_SENDRECV_STR: &str = "sendrecv";

impl fmt::Display for ContentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ContentDirection::Inactive => write!(f, "{CONTENT_DIRECTION_INACTIVE_STR}"),
            ContentDirection::SendOnly => write!(f, "{CONTENT_DIRECTION_SENDONLY_STR}"),
            ContentDirection::RecvOnly => write!(f, "{CONTENT_DIRECTION_RECVONLY_STR}"),
            ContentDirection::SendRecv => write!(f, "{CONTENT_DIRECTION_SENDRECV_STR}"),
        }
    }
}

impl ContentDirection {
    pub fn can_send(&self) -> bool {
        matches!(
            *self,
            ContentDirection::SendOnly | ContentDirection::SendRecv
        )
    }

    pub fn can_recv(&self) -> bool {
        matches!(
            *self,
            ContentDirection::RecvOnly | ContentDirection::SendRecv
        )
    }
}

/// The media type a content description (and its codec list) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Data,
}

/// A negotiated codec entry, passed through to the media collaborator
/// without interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpCodec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub kind: MediaKind,
}

/// An RTP header extension (uri/id pair) to be configured on the media
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeaderExtension {
    pub uri: String,
    pub id: u16,
}

/// The slice of a session description that concerns one media channel:
/// everything `set_local_content`/`set_remote_content` need.
#[derive(Debug, Clone)]
pub struct MediaContentDescription {
    pub kind: MediaKind,

    /// When true, the channel refuses to send or receive unprotected media
    /// from the moment this content is applied.
    pub crypto_required: bool,
    pub cryptos: Vec<CryptoParams>,
    pub rtcp_mux: bool,
    pub streams: Vec<StreamParams>,
    pub direction: ContentDirection,
    pub codecs: Vec<RtpCodec>,
    pub rtp_header_extensions: Vec<RtpHeaderExtension>,
    pub max_send_bandwidth_bps: Option<u32>,
}

impl MediaContentDescription {
    pub fn new(kind: MediaKind) -> Self {
        MediaContentDescription {
            kind,
            crypto_required: false,
            cryptos: vec![],
            rtcp_mux: false,
            streams: vec![],
            direction: ContentDirection::SendRecv,
            codecs: vec![],
            rtp_header_extensions: vec![],
            max_send_bandwidth_bps: None,
        }
    }
}
