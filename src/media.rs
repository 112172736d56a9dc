use bytes::Bytes;

use crate::channel::MediaSendInterface;
use crate::content::{RtpCodec, RtpHeaderExtension};
use crate::streams::StreamParams;

/// The contract the media payload logic (voice/video/data engine) fulfills
/// toward the channel. The channel owns the collaborator and invokes it only
/// from the worker context; implementations need no internal locking for
/// these calls.
pub trait MediaChannel: Send {
    /// Gives the collaborator its way back into the channel for sending;
    /// called once at channel creation.
    fn set_interface(&mut self, iface: MediaSendInterface);

    /// Plaintext packet, already demultiplexed and unprotected.
    fn on_packet_received(&mut self, packet: &Bytes, timestamp_us: i64, is_rtcp: bool);

    fn set_playout(&mut self, playout: bool);

    fn set_send(&mut self, send: bool);

    fn set_recv_codecs(&mut self, codecs: &[RtpCodec]) -> bool;

    fn set_send_codecs(&mut self, codecs: &[RtpCodec]) -> bool;

    fn set_recv_rtp_header_extensions(&mut self, extensions: &[RtpHeaderExtension]);

    fn set_send_rtp_header_extensions(&mut self, extensions: &[RtpHeaderExtension]);

    fn add_send_stream(&mut self, stream: &StreamParams) -> bool;

    fn remove_send_stream(&mut self, ssrc: u32) -> bool;

    fn add_recv_stream(&mut self, stream: &StreamParams) -> bool;

    fn remove_recv_stream(&mut self, ssrc: u32) -> bool;

    fn set_max_send_bandwidth(&mut self, bps: u32) -> bool;

    fn mute_stream(&mut self, ssrc: u32, mute: bool) -> bool;

    /// Backpressure signal: false when the selected transport reported a
    /// would-block condition, true when it drained again.
    fn on_ready_to_send(&mut self, ready: bool);
}
