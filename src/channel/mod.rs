#[cfg(test)]
mod channel_test;
#[cfg(test)]
pub(crate) mod fakes;

pub mod data;
pub mod video;
pub mod voice;
mod worker;

pub use worker::{ChannelEvent, MediaSendInterface, SecureChannel};

use bytes::Bytes;
use log::{debug, error, trace, warn};
use tokio::sync::mpsc;

use crate::content::{
    ContentDirection, ContentSource, MediaContentDescription, MediaKind, NegotiationAction,
};
use crate::crypto::{CryptoNegotiator, CryptoParams};
use crate::demux::BundleDemuxer;
use crate::error::{flatten_errs, Error, Result};
use crate::media::MediaChannel;
use crate::mux::RtcpMuxNegotiator;
use crate::protection_profile::ProtectionProfile;
use crate::streams::{StreamParams, StreamTable};
use crate::transport::{
    DtlsRole, PacketOptions, PacketTransport, TransportWriteError, DTLS_SRTP_EXPORTER_LABEL,
    MAX_PACKET_LEN, RTCP_MIN_PACKET_LEN, RTP_MIN_PACKET_LEN,
};

/// Construction-time configuration of a channel.
#[derive(Debug, Default, Clone)]
pub struct ChannelConfig {
    /// Refuse unprotected media even before any content marks crypto as
    /// required.
    pub srtp_required: bool,

    /// Receive-side SRTP replay protection window; `None` disables it.
    pub replay_protection_window: Option<usize>,
}

fn packet_kind(is_rtcp: bool) -> &'static str {
    if is_rtcp {
        "rtcp"
    } else {
        "rtp"
    }
}

struct DtlsExportedParams {
    suite: String,
    client_write: Vec<u8>,
    server_write: Vec<u8>,
    role: DtlsRole,
}

/// Fetches everything DTLS-SRTP keying needs from a transport: the
/// negotiated suite, the exported keying material split into its client and
/// server halves, and our role.
fn export_dtls_srtp_params(transport: &dyn PacketTransport) -> Result<DtlsExportedParams> {
    let suite = transport.srtp_cipher().ok_or(Error::DtlsNoSrtpCipher)?;
    let profile = ProtectionProfile::from_suite_name(&suite)
        .ok_or_else(|| Error::NoSuchProfile(suite.clone()))?;
    let role = transport.ssl_role().ok_or(Error::DtlsRoleUnknown)?;

    let material_len = 2 * profile.master_len();
    let material =
        transport.export_keying_material(DTLS_SRTP_EXPORTER_LABEL, &[], false, material_len)?;
    if material.len() != material_len {
        return Err(Error::KeyingMaterialLength(material_len, material.len()));
    }

    let half = material_len / 2;
    Ok(DtlsExportedParams {
        suite,
        client_write: material[..half].to_vec(),
        server_write: material[half..].to_vec(),
        role,
    })
}

/// All mutable channel state. Owned by the worker task; every method here
/// executes on the worker context.
pub(crate) struct ChannelInner {
    enabled: bool,
    writable: bool,
    was_ever_writable: bool,

    rtp_transport_writable: bool,
    rtcp_transport_writable: bool,
    rtp_ready_to_send: bool,
    rtcp_ready_to_send: bool,

    /// Whether DTLS-SRTP keying already ran for each transport.
    rtp_srtp_keyed: bool,
    rtcp_srtp_keyed: bool,

    srtp_required: bool,
    has_received_packet: bool,
    reported_srtp_error: bool,

    local_direction: ContentDirection,
    remote_direction: ContentDirection,

    crypto: CryptoNegotiator,
    rtcp_mux: RtcpMuxNegotiator,
    bundle: BundleDemuxer,
    streams: StreamTable,

    rtp_transport: Box<dyn PacketTransport>,
    rtcp_transport: Option<Box<dyn PacketTransport>>,
    media: Box<dyn MediaChannel>,

    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelInner {
    pub(crate) fn new(
        config: ChannelConfig,
        mut rtp_transport: Box<dyn PacketTransport>,
        mut rtcp_transport: Option<Box<dyn PacketTransport>>,
        media: Box<dyn MediaChannel>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        let suites = ProtectionProfile::supported_suite_names();
        if !rtp_transport.set_srtp_ciphers(suites) {
            warn!("rtp transport rejected srtp cipher restriction");
        }
        if let Some(t) = rtcp_transport.as_mut() {
            if !t.set_srtp_ciphers(suites) {
                warn!("rtcp transport rejected srtp cipher restriction");
            }
        }

        let crypto = match config.replay_protection_window {
            Some(window) => CryptoNegotiator::with_replay_protection(window),
            None => CryptoNegotiator::new(),
        };

        ChannelInner {
            enabled: false,
            writable: false,
            was_ever_writable: false,
            rtp_transport_writable: false,
            rtcp_transport_writable: false,
            rtp_ready_to_send: true,
            rtcp_ready_to_send: true,
            rtp_srtp_keyed: false,
            rtcp_srtp_keyed: false,
            srtp_required: config.srtp_required,
            has_received_packet: false,
            reported_srtp_error: false,
            local_direction: ContentDirection::Inactive,
            remote_direction: ContentDirection::Inactive,
            crypto,
            rtcp_mux: RtcpMuxNegotiator::new(),
            bundle: BundleDemuxer::new(),
            streams: StreamTable::new(),
            rtp_transport,
            rtcp_transport,
            media,
            events,
        }
    }

    fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn enable(&mut self, enable: bool) {
        if self.enabled == enable {
            return;
        }
        self.enabled = enable;
        self.change_state();
    }

    pub(crate) fn ready_to_receive(&self) -> bool {
        self.enabled && self.local_direction.can_recv()
    }

    pub(crate) fn ready_to_send(&self) -> bool {
        self.enabled
            && self.remote_direction.can_send()
            && self.local_direction.can_send()
            && self.was_ever_writable
    }

    pub(crate) fn is_srtp_active(&self) -> bool {
        self.crypto.is_active()
    }

    pub(crate) fn is_rtcp_mux_active(&self) -> bool {
        self.rtcp_mux.is_active()
    }

    pub(crate) fn has_rtcp_transport(&self) -> bool {
        self.rtcp_transport.is_some()
    }

    /// Pushes the current receive/send posture to the media collaborator.
    fn change_state(&mut self) {
        let recv = self.ready_to_receive();
        let send = self.ready_to_send();
        self.media.set_playout(recv);
        self.media.set_send(send);
        trace!("channel state changed: playout={recv} send={send}");
    }

    fn all_transports_writable(&self) -> bool {
        self.rtp_transport_writable
            && (self.rtcp_mux.is_active()
                || self.rtcp_transport.is_none()
                || self.rtcp_transport_writable)
    }

    pub(crate) fn on_transport_writable_changed(&mut self, rtcp: bool, writable: bool) {
        if rtcp {
            self.rtcp_transport_writable = writable;
        } else {
            self.rtp_transport_writable = writable;
        }
        if self.all_transports_writable() {
            self.maybe_channel_writable();
        } else {
            self.channel_not_writable();
        }
    }

    fn maybe_channel_writable(&mut self) {
        if self.writable {
            return;
        }
        if !self.was_ever_writable {
            // Keying runs at most once, on the transition where the channel
            // would first become writable.
            if !self.setup_dtls_srtp() {
                return;
            }
            self.was_ever_writable = true;
            debug!("channel writable for the first time");
        }
        self.writable = true;
        self.change_state();
    }

    fn channel_not_writable(&mut self) {
        if !self.writable {
            return;
        }
        self.writable = false;
        self.change_state();
    }

    /// DTLS-SRTP bring-up on first-writable: key every still-unkeyed
    /// transport whose DTLS handshake completed. A failure emits a setup
    /// failure naming the transport and leaves the channel not-writable.
    fn setup_dtls_srtp(&mut self) -> bool {
        if self.rtp_transport.is_dtls_active() && !self.rtp_srtp_keyed {
            let installed = export_dtls_srtp_params(self.rtp_transport.as_ref()).and_then(|p| {
                self.crypto.set_rtp_params_from_dtls_export(
                    &p.suite,
                    &p.client_write,
                    &p.server_write,
                    p.role,
                )
            });
            match installed {
                Ok(()) => self.rtp_srtp_keyed = true,
                Err(e) => {
                    error!("dtls-srtp setup failed on rtp transport: {e}");
                    self.emit(ChannelEvent::DtlsSetupFailure { rtcp: false });
                    return false;
                }
            }
        }

        if !self.rtcp_mux.is_active() {
            if let Some(rtcp_transport) = &self.rtcp_transport {
                if rtcp_transport.is_dtls_active() && !self.rtcp_srtp_keyed {
                    let installed =
                        export_dtls_srtp_params(rtcp_transport.as_ref()).and_then(|p| {
                            self.crypto.set_rtcp_params_from_dtls_export(
                                &p.suite,
                                &p.client_write,
                                &p.server_write,
                                p.role,
                            )
                        });
                    match installed {
                        Ok(()) => self.rtcp_srtp_keyed = true,
                        Err(e) => {
                            error!("dtls-srtp setup failed on rtcp transport: {e}");
                            self.emit(ChannelEvent::DtlsSetupFailure { rtcp: true });
                            return false;
                        }
                    }
                }
            }
        }

        true
    }

    pub(crate) fn on_transport_ready_to_send(&mut self, rtcp: bool, ready: bool) {
        if rtcp {
            self.rtcp_ready_to_send = ready;
        } else {
            self.rtp_ready_to_send = ready;
        }
        self.update_ready_to_send();
    }

    fn update_ready_to_send(&mut self) {
        let ready = self.rtp_ready_to_send
            && (self.rtcp_mux.is_active()
                || self.rtcp_transport.is_none()
                || self.rtcp_ready_to_send);
        self.media.on_ready_to_send(ready);
    }

    /// The worker-context send pipeline: size bounds, transport selection,
    /// protection, hand-off. Errors here are per-packet; they never tear the
    /// channel down.
    pub(crate) fn send_packet(&mut self, packet: &Bytes, is_rtcp: bool) -> Result<()> {
        let min_len = if is_rtcp {
            RTCP_MIN_PACKET_LEN
        } else {
            RTP_MIN_PACKET_LEN
        };
        if packet.len() < min_len || packet.len() > MAX_PACKET_LEN {
            warn!(
                "dropping outbound {} packet with invalid size {}",
                packet_kind(is_rtcp),
                packet.len()
            );
            return Err(Error::PacketSizeInvalid(packet.len()));
        }

        // No media flows until the channel became writable (which is also
        // where DTLS-SRTP keying must have succeeded).
        if !self.writable {
            return Err(Error::NotWritable);
        }

        // RTCP goes out the separate transport until mux is active.
        let use_rtcp_transport = is_rtcp && !self.rtcp_mux.is_active();
        if use_rtcp_transport {
            if self.rtcp_transport.is_none() || !self.rtcp_transport_writable {
                return Err(Error::NotWritable);
            }
        } else if !self.rtp_transport_writable {
            return Err(Error::NotWritable);
        }

        let data = if self.crypto.is_active() {
            match self.crypto.protect(packet, is_rtcp) {
                Ok(protected) => protected,
                Err(e) => {
                    error!(
                        "failed to protect outbound {} packet: {e}",
                        packet_kind(is_rtcp)
                    );
                    return Err(e);
                }
            }
        } else if self.srtp_required {
            error!(
                "dropping outbound {} packet, srtp required but not active",
                packet_kind(is_rtcp)
            );
            return Err(Error::SrtpRequired);
        } else {
            packet.clone()
        };

        let options = PacketOptions::default();
        let sent = if use_rtcp_transport {
            match self.rtcp_transport.as_mut() {
                Some(t) => t.send_packet(&data, &options),
                None => return Err(Error::NotWritable),
            }
        } else {
            self.rtp_transport.send_packet(&data, &options)
        };

        match sent {
            Ok(_) => Ok(()),
            Err(TransportWriteError::WouldBlock) => {
                // Backpressure, not an error: remember the transport is
                // congested and tell the media collaborator to back off.
                if use_rtcp_transport {
                    self.rtcp_ready_to_send = false;
                } else {
                    self.rtp_ready_to_send = false;
                }
                debug!(
                    "transport backpressure on {} path",
                    packet_kind(use_rtcp_transport)
                );
                self.update_ready_to_send();
                Ok(())
            }
            Err(TransportWriteError::Os(code)) => {
                warn!(
                    "sending {} packet failed with os error {code}",
                    packet_kind(is_rtcp)
                );
                Ok(())
            }
        }
    }

    /// The worker-context receive pipeline: classify, bounds-check, bundle
    /// demux, unprotect, dispatch. Rejected packets are dropped silently
    /// (logged only).
    pub(crate) fn on_packet_received(
        &mut self,
        from_rtcp_transport: bool,
        data: Bytes,
        timestamp_us: i64,
    ) {
        let is_rtcp = from_rtcp_transport || self.rtcp_mux.demux_rtcp(&data);

        let min_len = if is_rtcp {
            RTCP_MIN_PACKET_LEN
        } else {
            RTP_MIN_PACKET_LEN
        };
        if data.len() < min_len || data.len() > MAX_PACKET_LEN {
            warn!(
                "dropping inbound {} packet with invalid size {}",
                packet_kind(is_rtcp),
                data.len()
            );
            return;
        }

        if !self.bundle.demux(&data, is_rtcp) {
            trace!(
                "bundle demux rejected inbound {} packet",
                packet_kind(is_rtcp)
            );
            return;
        }

        if !is_rtcp && !self.has_received_packet {
            self.has_received_packet = true;
            self.emit(ChannelEvent::FirstPacketReceived);
        }

        let plaintext = if self.crypto.is_active() {
            match self.crypto.unprotect(&data, is_rtcp) {
                Ok(p) => p,
                Err(e) => {
                    debug!(
                        "failed to unprotect inbound {} packet ({} bytes): {e}",
                        packet_kind(is_rtcp),
                        data.len()
                    );
                    if !self.reported_srtp_error {
                        self.reported_srtp_error = true;
                        self.emit(ChannelEvent::SrtpError { is_rtcp });
                    }
                    return;
                }
            }
        } else if self.srtp_required {
            debug!(
                "dropping inbound {} packet, srtp required but not active",
                packet_kind(is_rtcp)
            );
            return;
        } else {
            data
        };

        self.media.on_packet_received(&plaintext, timestamp_us, is_rtcp);
    }

    fn any_transport_dtls_active(&self) -> bool {
        self.rtp_transport.is_dtls_active()
            || self
                .rtcp_transport
                .as_ref()
                .map(|t| t.is_dtls_active())
                .unwrap_or(false)
    }

    fn drive_crypto(
        &mut self,
        cryptos: &[CryptoParams],
        source: ContentSource,
        action: NegotiationAction,
    ) -> Result<()> {
        match action {
            NegotiationAction::Offer => self.crypto.set_offer(cryptos, source),
            NegotiationAction::ProvisionalAnswer => {
                self.crypto.set_provisional_answer(cryptos, source)
            }
            NegotiationAction::Answer => self.crypto.set_answer(cryptos, source),
            NegotiationAction::Update => Ok(()),
        }
    }

    fn drive_rtcp_mux(
        &mut self,
        enabled: bool,
        source: ContentSource,
        action: NegotiationAction,
    ) -> Result<()> {
        let result = match action {
            NegotiationAction::Offer => self.rtcp_mux.set_offer(enabled, source),
            NegotiationAction::ProvisionalAnswer => {
                self.rtcp_mux.set_provisional_answer(enabled, source)
            }
            NegotiationAction::Answer => self.rtcp_mux.set_answer(enabled, source),
            NegotiationAction::Update => Ok(()),
        };

        if self.rtcp_mux.is_active() && self.rtcp_transport.is_some() {
            debug!("rtcp mux active, permanently retiring the rtcp transport");
            self.rtcp_transport = None;
            self.rtcp_transport_writable = false;
            self.update_ready_to_send();
            // With the separate transport gone, the RTP transport alone may
            // satisfy writability.
            if self.all_transports_writable() {
                self.maybe_channel_writable();
            }
        }

        result
    }

    /// Applies the local half of a negotiated content description. Sub-steps
    /// run best-effort: a failing step is recorded but later independent
    /// steps still execute, leaving the channel as consistent as possible.
    pub(crate) fn set_local_content(
        &mut self,
        content: &MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        let mut errs: Vec<Error> = vec![];

        if content.crypto_required {
            self.srtp_required = true;
        }

        self.media
            .set_recv_rtp_header_extensions(&content.rtp_header_extensions);

        if action != NegotiationAction::Update {
            if self.any_transport_dtls_active() {
                debug!("dtls-srtp in use, ignoring sdes crypto attributes in local content");
            } else if let Err(e) = self.drive_crypto(&content.cryptos, ContentSource::Local, action)
            {
                errs.push(e);
            }
            if let Err(e) = self.drive_rtcp_mux(content.rtcp_mux, ContentSource::Local, action) {
                errs.push(e);
            }
        }

        let (changes, mut stream_errs) = self.streams.update_local_streams(&content.streams, action);
        errs.append(&mut stream_errs);
        for stream in &changes.removed {
            if let Some(ssrc) = stream.first_ssrc() {
                if !self.media.remove_send_stream(ssrc) {
                    errs.push(Error::Other(format!(
                        "media failed to remove send stream ssrc {ssrc}"
                    )));
                }
            }
        }
        for stream in &changes.added {
            if !self.media.add_send_stream(stream) {
                errs.push(Error::Other(format!(
                    "media failed to add send stream {}",
                    stream.id
                )));
            }
        }

        if !self.media.set_recv_codecs(&content.codecs) {
            errs.push(Error::Other("media rejected recv codecs".to_owned()));
        }
        // The payload types we are prepared to receive also feed the bundle
        // filter.
        for codec in &content.codecs {
            self.bundle.add_payload_type(codec.payload_type);
        }

        self.local_direction = content.direction;
        self.change_state();

        flatten_errs(errs)
    }

    /// Applies the remote half of a negotiated content description; same
    /// best-effort error collection as the local path.
    pub(crate) fn set_remote_content(
        &mut self,
        content: &MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        let mut errs: Vec<Error> = vec![];

        if content.crypto_required {
            self.srtp_required = true;
        }

        self.media
            .set_send_rtp_header_extensions(&content.rtp_header_extensions);

        if action != NegotiationAction::Update {
            if self.any_transport_dtls_active() {
                debug!("dtls-srtp in use, ignoring sdes crypto attributes in remote content");
            } else if let Err(e) =
                self.drive_crypto(&content.cryptos, ContentSource::Remote, action)
            {
                errs.push(e);
            }
            if let Err(e) = self.drive_rtcp_mux(content.rtcp_mux, ContentSource::Remote, action) {
                errs.push(e);
            }
        }

        let (changes, mut stream_errs) =
            self.streams.update_remote_streams(&content.streams, action);
        errs.append(&mut stream_errs);
        for stream in &changes.removed {
            if let Some(ssrc) = stream.first_ssrc() {
                if !self.media.remove_recv_stream(ssrc) {
                    errs.push(Error::Other(format!(
                        "media failed to remove recv stream ssrc {ssrc}"
                    )));
                }
            }
        }
        for stream in &changes.added {
            if !self.media.add_recv_stream(stream) {
                errs.push(Error::Other(format!(
                    "media failed to add recv stream {}",
                    stream.id
                )));
            }
        }

        if !self.media.set_send_codecs(&content.codecs) {
            errs.push(Error::Other("media rejected send codecs".to_owned()));
        }
        if let Some(bps) = content.max_send_bandwidth_bps {
            if !self.media.set_max_send_bandwidth(bps) {
                errs.push(Error::Other(format!(
                    "media rejected max send bandwidth {bps}"
                )));
            }
        }

        self.remote_direction = content.direction;
        self.change_state();

        flatten_errs(errs)
    }

    pub(crate) fn add_send_stream(&mut self, params: StreamParams) -> Result<()> {
        self.streams.add_send_stream(params.clone())?;
        if !self.media.add_send_stream(&params) {
            // Keep the table in step with the media collaborator.
            if let Some(ssrc) = params.first_ssrc() {
                let _ = self.streams.remove_send_stream(ssrc);
            }
            return Err(Error::Other(format!(
                "media failed to add send stream {}",
                params.id
            )));
        }
        Ok(())
    }

    pub(crate) fn remove_send_stream(&mut self, ssrc: u32) -> Result<()> {
        self.streams.remove_send_stream(ssrc)?;
        if !self.media.remove_send_stream(ssrc) {
            return Err(Error::Other(format!(
                "media failed to remove send stream ssrc {ssrc}"
            )));
        }
        Ok(())
    }

    pub(crate) fn add_recv_stream(&mut self, params: StreamParams) -> Result<()> {
        self.streams.add_recv_stream(params.clone())?;
        if !self.media.add_recv_stream(&params) {
            if let Some(ssrc) = params.first_ssrc() {
                let _ = self.streams.remove_recv_stream(ssrc);
            }
            return Err(Error::Other(format!(
                "media failed to add recv stream {}",
                params.id
            )));
        }
        Ok(())
    }

    pub(crate) fn remove_recv_stream(&mut self, ssrc: u32) -> Result<()> {
        self.streams.remove_recv_stream(ssrc)?;
        if !self.media.remove_recv_stream(ssrc) {
            return Err(Error::Other(format!(
                "media failed to remove recv stream ssrc {ssrc}"
            )));
        }
        Ok(())
    }

    pub(crate) fn mute_stream(&mut self, ssrc: u32, mute: bool) -> Result<()> {
        if !self.streams.local_streams().iter().any(|s| s.has_ssrc(ssrc)) {
            return Err(Error::SsrcNotFound(ssrc));
        }
        if !self.media.mute_stream(ssrc, mute) {
            return Err(Error::Other(format!("media failed to mute ssrc {ssrc}")));
        }
        self.streams.set_muted(ssrc, mute)
    }
}

pub(crate) fn check_content_kind(content: &MediaContentDescription, kind: MediaKind) -> Result<()> {
    if content.kind != kind || content.codecs.iter().any(|c| c.kind != kind) {
        return Err(Error::MediaKindMismatch);
    }
    Ok(())
}
