use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::channel::MediaSendInterface;
use crate::content::{RtpCodec, RtpHeaderExtension};
use crate::error::{Error, Result};
use crate::media::MediaChannel;
use crate::streams::StreamParams;
use crate::transport::{DtlsRole, PacketOptions, PacketTransport, TransportWriteError};

#[derive(Default)]
pub(crate) struct FakeTransportState {
    pub sent: Vec<Vec<u8>>,
    pub writable: bool,
    pub dtls_active: bool,
    pub srtp_cipher: Option<String>,
    pub keying_material: Option<Vec<u8>>,
    pub role: Option<DtlsRole>,
    pub would_block: bool,
    pub fail_export: bool,
    pub export_calls: usize,
    pub srtp_ciphers: Vec<String>,
}

/// Transport double with shared state, so tests keep observing it after the
/// boxed instance moves into the channel.
#[derive(Default, Clone)]
pub(crate) struct FakeTransport {
    pub state: Arc<Mutex<FakeTransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport::default()
    }

    /// A transport that completed a DTLS handshake with the given role and
    /// deterministic keying material.
    pub fn with_dtls(role: DtlsRole, material: Vec<u8>) -> Self {
        let t = FakeTransport::new();
        {
            let mut state = t.state.lock().unwrap();
            state.dtls_active = true;
            state.role = Some(role);
            state.srtp_cipher = Some("AES_CM_128_HMAC_SHA1_80".to_owned());
            state.keying_material = Some(material);
        }
        t
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().sent.last().cloned()
    }

    pub fn set_would_block(&self, would_block: bool) {
        self.state.lock().unwrap().would_block = would_block;
    }
}

impl PacketTransport for FakeTransport {
    fn send_packet(
        &mut self,
        packet: &[u8],
        _options: &PacketOptions,
    ) -> std::result::Result<usize, TransportWriteError> {
        let mut state = self.state.lock().unwrap();
        if state.would_block {
            return Err(TransportWriteError::WouldBlock);
        }
        state.sent.push(packet.to_vec());
        Ok(packet.len())
    }

    fn writable(&self) -> bool {
        self.state.lock().unwrap().writable
    }

    fn is_dtls_active(&self) -> bool {
        self.state.lock().unwrap().dtls_active
    }

    fn srtp_cipher(&self) -> Option<String> {
        self.state.lock().unwrap().srtp_cipher.clone()
    }

    fn export_keying_material(
        &self,
        _label: &str,
        _context: &[u8],
        _use_context: bool,
        out_len: usize,
    ) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.export_calls += 1;
        if state.fail_export {
            return Err(Error::Other("keying material export failed".to_owned()));
        }
        match &state.keying_material {
            Some(material) => Ok(material.clone()),
            None => Ok((0..out_len).map(|i| i as u8).collect()),
        }
    }

    fn ssl_role(&self) -> Option<DtlsRole> {
        self.state.lock().unwrap().role
    }

    fn set_srtp_ciphers(&mut self, suites: &[&str]) -> bool {
        let mut state = self.state.lock().unwrap();
        state.srtp_ciphers = suites.iter().map(|s| (*s).to_owned()).collect();
        true
    }
}

#[derive(Default)]
pub(crate) struct FakeMediaState {
    pub packets: Vec<(Vec<u8>, i64, bool)>,
    pub playout: bool,
    pub send: bool,
    pub ready_to_send: Vec<bool>,
    pub recv_codecs: Vec<RtpCodec>,
    pub send_codecs: Vec<RtpCodec>,
    pub recv_extensions: Vec<RtpHeaderExtension>,
    pub send_extensions: Vec<RtpHeaderExtension>,
    pub send_streams: Vec<StreamParams>,
    pub recv_streams: Vec<StreamParams>,
    pub muted: Vec<(u32, bool)>,
    pub max_send_bandwidth: Option<u32>,
    pub interface: Option<MediaSendInterface>,
    pub reject_streams: bool,
    pub reject_codecs: bool,
}

/// Media collaborator double recording every call.
#[derive(Default, Clone)]
pub(crate) struct FakeMedia {
    pub state: Arc<Mutex<FakeMediaState>>,
}

impl FakeMedia {
    pub fn new() -> Self {
        FakeMedia::default()
    }

    pub fn packet_count(&self) -> usize {
        self.state.lock().unwrap().packets.len()
    }

    pub fn last_ready_to_send(&self) -> Option<bool> {
        self.state.lock().unwrap().ready_to_send.last().copied()
    }
}

impl MediaChannel for FakeMedia {
    fn set_interface(&mut self, iface: MediaSendInterface) {
        self.state.lock().unwrap().interface = Some(iface);
    }

    fn on_packet_received(&mut self, packet: &Bytes, timestamp_us: i64, is_rtcp: bool) {
        self.state
            .lock()
            .unwrap()
            .packets
            .push((packet.to_vec(), timestamp_us, is_rtcp));
    }

    fn set_playout(&mut self, playout: bool) {
        self.state.lock().unwrap().playout = playout;
    }

    fn set_send(&mut self, send: bool) {
        self.state.lock().unwrap().send = send;
    }

    fn set_recv_codecs(&mut self, codecs: &[RtpCodec]) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_codecs {
            return false;
        }
        state.recv_codecs = codecs.to_vec();
        true
    }

    fn set_send_codecs(&mut self, codecs: &[RtpCodec]) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_codecs {
            return false;
        }
        state.send_codecs = codecs.to_vec();
        true
    }

    fn set_recv_rtp_header_extensions(&mut self, extensions: &[RtpHeaderExtension]) {
        self.state.lock().unwrap().recv_extensions = extensions.to_vec();
    }

    fn set_send_rtp_header_extensions(&mut self, extensions: &[RtpHeaderExtension]) {
        self.state.lock().unwrap().send_extensions = extensions.to_vec();
    }

    fn add_send_stream(&mut self, stream: &StreamParams) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_streams {
            return false;
        }
        state.send_streams.push(stream.clone());
        true
    }

    fn remove_send_stream(&mut self, ssrc: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.send_streams.iter().position(|s| s.has_ssrc(ssrc)) {
            Some(idx) => {
                state.send_streams.remove(idx);
                true
            }
            None => false,
        }
    }

    fn add_recv_stream(&mut self, stream: &StreamParams) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_streams {
            return false;
        }
        state.recv_streams.push(stream.clone());
        true
    }

    fn remove_recv_stream(&mut self, ssrc: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.recv_streams.iter().position(|s| s.has_ssrc(ssrc)) {
            Some(idx) => {
                state.recv_streams.remove(idx);
                true
            }
            None => false,
        }
    }

    fn set_max_send_bandwidth(&mut self, bps: u32) -> bool {
        self.state.lock().unwrap().max_send_bandwidth = Some(bps);
        true
    }

    fn mute_stream(&mut self, ssrc: u32, mute: bool) -> bool {
        self.state.lock().unwrap().muted.push((ssrc, mute));
        true
    }

    fn on_ready_to_send(&mut self, ready: bool) {
        self.state.lock().unwrap().ready_to_send.push(ready);
    }
}
