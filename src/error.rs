use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("SRTP master key must be len {0}, got {1}")]
    SrtpMasterKeyLength(usize, usize),
    #[error("SRTP master salt must be len {0}, got {1}")]
    SrtpSaltLength(usize, usize),
    #[error("no such SRTP protection profile: {0}")]
    NoSuchProfile(String),
    #[error("index_over_kdr > 0 is not supported yet")]
    UnsupportedIndexOverKdr,

    #[error("SDES crypto rejected, DTLS-SRTP keying is active")]
    DtlsSrtpActive,
    #[error("no mutually acceptable crypto suite in offer/answer")]
    NoMatchingCrypto,
    #[error("crypto negotiation driven in unexpected state")]
    CryptoNegotiationState,
    #[error("invalid crypto params: {0}")]
    InvalidCryptoParams(String),
    #[error("SRTP is not active")]
    SrtpNotActive,
    #[error("transport did not negotiate an SRTP cipher")]
    DtlsNoSrtpCipher,
    #[error("transport DTLS role is not decided")]
    DtlsRoleUnknown,
    #[error("DTLS keying material must be len {0}, got {1}")]
    KeyingMaterialLength(usize, usize),

    #[error("srtp ssrc={0} index={1}: duplicated")]
    SrtpSsrcDuplicated(u32, u16),
    #[error("srtcp ssrc={0} index={1}: duplicated")]
    SrtcpSsrcDuplicated(u32, usize),
    #[error("too short SRTP packet: only {0} bytes, expected > {1} bytes")]
    SrtpTooSmall(usize, usize),
    #[error("too short SRTCP packet: only {0} bytes, expected > {1} bytes")]
    SrtcpTooSmall(usize, usize),
    #[error("failed to verify rtp auth tag")]
    RtpFailedToVerifyAuthTag,
    #[error("too short auth tag: only {0} bytes, expected {1} bytes")]
    RtcpInvalidLengthAuthTag(usize, usize),
    #[error("failed to verify rtcp auth tag")]
    RtcpFailedToVerifyAuthTag,

    #[error("rtcp mux cannot be disabled once active")]
    RtcpMuxRenegotiation,
    #[error("rtcp mux negotiation driven in unexpected state")]
    RtcpMuxNegotiationState,
    #[error("rtcp mux answer enables mux that was not offered")]
    RtcpMuxNotOffered,

    #[error("duplicate ssrc {0}")]
    DuplicateSsrc(u32),
    #[error("ssrc {0} not found")]
    SsrcNotFound(u32),
    #[error("stream {0} has an empty ssrc set")]
    EmptySsrcs(String),
    #[error("stream {0} not found")]
    StreamNotFound(String),

    #[error("packet size {0} out of bounds")]
    PacketSizeInvalid(usize),
    #[error("transport is not writable")]
    NotWritable,
    #[error("srtp required but not active")]
    SrtpRequired,
    #[error("channel closed")]
    ChannelClosed,
    #[error("codec list does not match channel media type")]
    MediaKindMismatch,
    #[error("content negotiation failed: {0}")]
    ContentNegotiation(String),

    #[error("{0}")]
    Util(#[from] util::Error),
    #[error("{0}")]
    Rtcp(#[from] rtcp::Error),
    #[error("{0}")]
    Other(String),
}

/// flatten_errs flattens the errors collected by a best-effort
/// negotiation pass into a single error.
pub(crate) fn flatten_errs(errs: Vec<Error>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.iter().map(|e| e.to_string()).collect();
        Err(Error::ContentNegotiation(errs_strs.join("; ")))
    }
}
