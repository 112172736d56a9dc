use thiserror::Error;

use crate::error::Result;

/// Minimum length of an RTP packet the channel will touch.
pub const RTP_MIN_PACKET_LEN: usize = 12;
/// Minimum length of an RTCP packet the channel will touch.
pub const RTCP_MIN_PACKET_LEN: usize = 4;
/// Maximum length of any packet the channel will touch.
pub const MAX_PACKET_LEN: usize = 2048;

/// The exporter label both peers use when deriving SRTP keys from a DTLS
/// handshake, per RFC 5764.
pub const DTLS_SRTP_EXPORTER_LABEL: &str = "EXTRACTOR-dtls_srtp";

/// Negotiated DTLS role of this endpoint on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    Client,
    Server,
}

/// Per-packet options handed to the transport with each send.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketOptions {
    pub dscp: u8,
    pub packet_id: Option<u16>,
}

/// The transient/fatal split of a transport write failure.
#[derive(Debug, Error, PartialEq)]
pub enum TransportWriteError {
    /// The socket cannot take more data right now; the channel clears its
    /// ready-to-send flag and the packet is dropped without being an error
    /// to the sender.
    #[error("transport would block")]
    WouldBlock,
    #[error("os error: {0}")]
    Os(i32),
}

/// The contract the underlying ICE/DTLS packet transport fulfills toward the
/// channel. The transport's own connectivity machinery is out of scope; the
/// channel only consumes these calls plus the writable/ready-to-send/packet
/// signals its owner forwards through the channel handle.
pub trait PacketTransport: Send {
    /// Hands bytes to the wire. Non-blocking; a full socket reports
    /// `TransportWriteError::WouldBlock`.
    fn send_packet(
        &mut self,
        packet: &[u8],
        options: &PacketOptions,
    ) -> std::result::Result<usize, TransportWriteError>;

    fn writable(&self) -> bool;

    /// Whether DTLS completed on this transport, which makes DTLS-SRTP the
    /// keying origin for the channel.
    fn is_dtls_active(&self) -> bool;

    /// The SRTP cipher suite negotiated inside the DTLS handshake, if any.
    fn srtp_cipher(&self) -> Option<String>;

    /// RFC 5705 keying-material export from the DTLS connection.
    fn export_keying_material(
        &self,
        label: &str,
        context: &[u8],
        use_context: bool,
        out_len: usize,
    ) -> Result<Vec<u8>>;

    /// The DTLS role this endpoint ended up with, once decided.
    fn ssl_role(&self) -> Option<DtlsRole>;

    /// Restricts the SRTP cipher suites the transport may negotiate in its
    /// DTLS handshake. Returns false if the transport cannot apply them.
    fn set_srtp_ciphers(&mut self, suites: &[&str]) -> bool;
}
