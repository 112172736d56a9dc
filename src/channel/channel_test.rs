use bytes::Bytes;
use tokio::sync::mpsc;

use super::fakes::{FakeMedia, FakeTransport};
use super::*;
use crate::content::{RtpCodec, RtpHeaderExtension};
use crate::protection_profile::SRTP_AES128_CM_HMAC_SHA1_80;
use crate::transport::DtlsRole;

fn rtp_packet(payload_type: u8, seq: u16, ssrc: u32) -> Bytes {
    let mut pkt = vec![0u8; 12 + 20];
    pkt[0] = 0x80;
    pkt[1] = payload_type;
    pkt[2..4].copy_from_slice(&seq.to_be_bytes());
    pkt[8..12].copy_from_slice(&ssrc.to_be_bytes());
    for (i, b) in pkt[12..].iter_mut().enumerate() {
        *b = i as u8;
    }
    Bytes::from(pkt)
}

fn rtcp_packet(ssrc: u32) -> Bytes {
    let mut pkt = vec![0u8; 24];
    pkt[0] = 0x80;
    pkt[1] = 201;
    pkt[2..4].copy_from_slice(&5u16.to_be_bytes());
    pkt[4..8].copy_from_slice(&ssrc.to_be_bytes());
    Bytes::from(pkt)
}

struct TestChannel {
    inner: ChannelInner,
    rtp_transport: FakeTransport,
    rtcp_transport: Option<FakeTransport>,
    media: FakeMedia,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

fn make_channel(config: ChannelConfig, with_rtcp: bool) -> TestChannel {
    let rtp_transport = FakeTransport::new();
    let rtcp_transport = with_rtcp.then(FakeTransport::new);
    let media = FakeMedia::new();
    let (event_tx, events) = mpsc::unbounded_channel();

    let inner = ChannelInner::new(
        config,
        Box::new(rtp_transport.clone()),
        rtcp_transport
            .clone()
            .map(|t| Box::new(t) as Box<dyn PacketTransport>),
        Box::new(media.clone()),
        event_tx,
    );

    TestChannel {
        inner,
        rtp_transport,
        rtcp_transport,
        media,
        events,
    }
}

fn make_writable(ch: &mut TestChannel) {
    ch.inner.on_transport_writable_changed(false, true);
    if ch.rtcp_transport.is_some() {
        ch.inner.on_transport_writable_changed(true, true);
    }
}

fn audio_codec(payload_type: u8) -> RtpCodec {
    RtpCodec {
        payload_type,
        name: "opus".to_owned(),
        clock_rate: 48000,
        channels: 2,
        kind: MediaKind::Audio,
    }
}

fn crypto_params(seed: u8) -> CryptoParams {
    CryptoParams {
        tag: 1,
        suite: SRTP_AES128_CM_HMAC_SHA1_80.to_owned(),
        key: (0..30).map(|i| seed.wrapping_add(i)).collect(),
    }
}

#[test]
fn test_send_rejects_undersized_before_transport() {
    let mut ch = make_channel(ChannelConfig::default(), false);
    make_writable(&mut ch);

    let short = Bytes::from(vec![0x80u8; 8]);
    assert_eq!(
        ch.inner.send_packet(&short, false),
        Err(Error::PacketSizeInvalid(8))
    );
    assert_eq!(ch.rtp_transport.sent_count(), 0);
}

#[test]
fn test_send_rejects_oversized_before_transport() {
    let mut ch = make_channel(ChannelConfig::default(), false);
    make_writable(&mut ch);

    let huge = Bytes::from(vec![0x80u8; 3000]);
    assert_eq!(
        ch.inner.send_packet(&huge, false),
        Err(Error::PacketSizeInvalid(3000))
    );
    assert_eq!(ch.rtp_transport.sent_count(), 0);
}

#[test]
fn test_send_requires_writable() {
    let mut ch = make_channel(ChannelConfig::default(), false);

    assert_eq!(
        ch.inner.send_packet(&rtp_packet(96, 1, 111), false),
        Err(Error::NotWritable)
    );
    assert_eq!(ch.rtp_transport.sent_count(), 0);
}

#[test]
fn test_send_plain_passthrough() {
    let mut ch = make_channel(ChannelConfig::default(), false);
    make_writable(&mut ch);

    let pkt = rtp_packet(96, 1, 111);
    ch.inner.send_packet(&pkt, false).unwrap();

    assert_eq!(ch.rtp_transport.sent_count(), 1);
    assert_eq!(ch.rtp_transport.last_sent().unwrap(), pkt.to_vec());
}

#[test]
fn test_send_srtp_required_without_keys() {
    let config = ChannelConfig {
        srtp_required: true,
        ..Default::default()
    };
    let mut ch = make_channel(config, false);
    make_writable(&mut ch);

    assert_eq!(
        ch.inner.send_packet(&rtp_packet(96, 1, 111), false),
        Err(Error::SrtpRequired)
    );
    assert_eq!(ch.rtp_transport.sent_count(), 0);
}

#[test]
fn test_send_would_block_signals_backpressure() {
    let mut ch = make_channel(ChannelConfig::default(), false);
    make_writable(&mut ch);
    ch.rtp_transport.set_would_block(true);

    // Backpressure is not an error to the caller.
    ch.inner.send_packet(&rtp_packet(96, 1, 111), false).unwrap();

    assert_eq!(ch.rtp_transport.sent_count(), 0);
    assert_eq!(ch.media.last_ready_to_send(), Some(false));

    // The transport draining again restores readiness.
    ch.rtp_transport.set_would_block(false);
    ch.inner.on_transport_ready_to_send(false, true);
    assert_eq!(ch.media.last_ready_to_send(), Some(true));
}

#[test]
fn test_rtcp_uses_separate_transport_until_mux_active() {
    let mut ch = make_channel(ChannelConfig::default(), true);
    make_writable(&mut ch);

    let report = rtcp_packet(111);
    ch.inner.send_packet(&report, true).unwrap();

    let rtcp_transport = ch.rtcp_transport.as_ref().unwrap();
    assert_eq!(rtcp_transport.sent_count(), 1);
    assert_eq!(ch.rtp_transport.sent_count(), 0);

    // Negotiate rtcp-mux on.
    let mut local = MediaContentDescription::new(MediaKind::Audio);
    local.rtcp_mux = true;
    ch.inner
        .set_local_content(&local, NegotiationAction::Offer)
        .unwrap();
    let mut remote = MediaContentDescription::new(MediaKind::Audio);
    remote.rtcp_mux = true;
    ch.inner
        .set_remote_content(&remote, NegotiationAction::Answer)
        .unwrap();

    assert!(ch.inner.is_rtcp_mux_active());
    assert!(!ch.inner.has_rtcp_transport());

    ch.inner.send_packet(&report, true).unwrap();
    assert_eq!(rtcp_transport.sent_count(), 1);
    assert_eq!(ch.rtp_transport.sent_count(), 1);
}

#[test]
fn test_rtcp_transport_stays_retired_after_renegotiation() {
    let mut ch = make_channel(ChannelConfig::default(), true);
    make_writable(&mut ch);

    let mut content = MediaContentDescription::new(MediaKind::Audio);
    content.rtcp_mux = true;
    ch.inner
        .set_local_content(&content, NegotiationAction::Offer)
        .unwrap();
    ch.inner
        .set_remote_content(&content, NegotiationAction::Answer)
        .unwrap();
    assert!(!ch.inner.has_rtcp_transport());

    // A renegotiation attempt with mux off fails and resurrects nothing.
    let mut no_mux = MediaContentDescription::new(MediaKind::Audio);
    no_mux.rtcp_mux = false;
    let result = ch
        .inner
        .set_remote_content(&no_mux, NegotiationAction::Offer);
    assert!(result.is_err());

    assert!(ch.inner.is_rtcp_mux_active());
    assert!(!ch.inner.has_rtcp_transport());
}

#[test]
fn test_receive_size_bounds_checked_before_dispatch() {
    let mut ch = make_channel(ChannelConfig::default(), false);

    ch.inner
        .on_packet_received(false, Bytes::from(vec![0x80u8, 0x60, 0, 1]), -1);
    assert_eq!(ch.media.packet_count(), 0);

    ch.inner
        .on_packet_received(false, Bytes::from(vec![0u8; 4000]), -1);
    assert_eq!(ch.media.packet_count(), 0);
}

#[test]
fn test_first_packet_event_emitted_once() {
    let mut ch = make_channel(ChannelConfig::default(), false);

    ch.inner.on_packet_received(false, rtp_packet(96, 1, 111), -1);
    ch.inner.on_packet_received(false, rtp_packet(96, 2, 111), -1);

    assert_eq!(ch.events.try_recv(), Ok(ChannelEvent::FirstPacketReceived));
    assert!(ch.events.try_recv().is_err());
    assert_eq!(ch.media.packet_count(), 2);
}

#[test]
fn test_receive_drops_unprotected_when_srtp_required() {
    let config = ChannelConfig {
        srtp_required: true,
        ..Default::default()
    };
    let mut ch = make_channel(config, false);

    ch.inner.on_packet_received(false, rtp_packet(96, 1, 111), -1);
    assert_eq!(ch.media.packet_count(), 0);
}

#[test]
fn test_bundle_demux_drops_foreign_packets() {
    let mut ch = make_channel(ChannelConfig::default(), false);

    let mut local = MediaContentDescription::new(MediaKind::Audio);
    local.codecs = vec![audio_codec(96)];
    ch.inner
        .set_local_content(&local, NegotiationAction::Offer)
        .unwrap();

    ch.inner.on_packet_received(false, rtp_packet(97, 1, 222), -1);
    assert_eq!(ch.media.packet_count(), 0);

    ch.inner.on_packet_received(false, rtp_packet(96, 1, 111), -1);
    assert_eq!(ch.media.packet_count(), 1);
}

#[test]
fn test_readiness_truth_table() {
    let mut ch = make_channel(ChannelConfig::default(), false);
    make_writable(&mut ch);
    ch.inner.enable(true);

    let mut local = MediaContentDescription::new(MediaKind::Audio);
    local.direction = ContentDirection::SendRecv;
    ch.inner
        .set_local_content(&local, NegotiationAction::Offer)
        .unwrap();

    // The remote only sends toward us: we may not send.
    let mut remote = MediaContentDescription::new(MediaKind::Audio);
    remote.direction = ContentDirection::RecvOnly;
    ch.inner
        .set_remote_content(&remote, NegotiationAction::Answer)
        .unwrap();

    assert!(ch.inner.ready_to_receive());
    assert!(!ch.inner.ready_to_send());
    assert!(ch.media.state.lock().unwrap().playout);
    assert!(!ch.media.state.lock().unwrap().send);

    // A renegotiation where the remote accepts our media turns sending on.
    ch.inner
        .set_local_content(&local, NegotiationAction::Offer)
        .unwrap();
    let mut remote = MediaContentDescription::new(MediaKind::Audio);
    remote.direction = ContentDirection::SendRecv;
    ch.inner
        .set_remote_content(&remote, NegotiationAction::Answer)
        .unwrap();
    assert!(ch.inner.ready_to_send());

    // Disabled channel is never ready.
    ch.inner.enable(false);
    assert!(!ch.inner.ready_to_receive());
    assert!(!ch.inner.ready_to_send());
}

#[test]
fn test_ready_to_send_requires_ever_writable() {
    let mut ch = make_channel(ChannelConfig::default(), false);
    ch.inner.enable(true);

    let mut content = MediaContentDescription::new(MediaKind::Audio);
    content.direction = ContentDirection::SendRecv;
    ch.inner
        .set_local_content(&content, NegotiationAction::Offer)
        .unwrap();
    ch.inner
        .set_remote_content(&content, NegotiationAction::Answer)
        .unwrap();

    assert!(!ch.inner.ready_to_send());

    ch.inner.on_transport_writable_changed(false, true);
    assert!(ch.inner.ready_to_send());

    // Losing writability does not reset ever-writable.
    ch.inner.on_transport_writable_changed(false, false);
    assert!(ch.inner.ready_to_send());
}

#[test]
fn test_dtls_srtp_setup_on_first_writable() {
    let rtp_transport = FakeTransport::with_dtls(DtlsRole::Server, (0..60).map(|i| i as u8).collect());
    let media = FakeMedia::new();
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut inner = ChannelInner::new(
        ChannelConfig::default(),
        Box::new(rtp_transport.clone()),
        None,
        Box::new(media.clone()),
        event_tx,
    );

    inner.on_transport_writable_changed(false, true);

    assert!(inner.is_srtp_active());
    assert!(events.try_recv().is_err());

    // Toggling writability must not re-run keying.
    inner.on_transport_writable_changed(false, false);
    inner.on_transport_writable_changed(false, true);
    assert_eq!(rtp_transport.state.lock().unwrap().export_calls, 1);
}

#[test]
fn test_dtls_setup_failure_emits_event_and_blocks_media() {
    let rtp_transport = FakeTransport::with_dtls(DtlsRole::Server, vec![]);
    rtp_transport.state.lock().unwrap().fail_export = true;
    let media = FakeMedia::new();
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut inner = ChannelInner::new(
        ChannelConfig::default(),
        Box::new(rtp_transport.clone()),
        None,
        Box::new(media.clone()),
        event_tx,
    );

    inner.on_transport_writable_changed(false, true);

    assert_eq!(
        events.try_recv(),
        Ok(ChannelEvent::DtlsSetupFailure { rtcp: false })
    );
    assert!(!inner.is_srtp_active());

    // The channel never became writable, so no media flows.
    assert_eq!(
        inner.send_packet(&rtp_packet(96, 1, 111), false),
        Err(Error::NotWritable)
    );
    assert_eq!(rtp_transport.sent_count(), 0);
}

#[test]
fn test_sdes_content_negotiation_end_to_end() {
    let mut ch = make_channel(ChannelConfig::default(), true);

    let mut local = MediaContentDescription::new(MediaKind::Audio);
    local.crypto_required = true;
    local.cryptos = vec![crypto_params(0x10)];
    local.rtcp_mux = true;
    local.codecs = vec![audio_codec(96)];
    local.streams = vec![StreamParams::with_ssrcs("g", "mic", &[1111])];
    local.rtp_header_extensions = vec![RtpHeaderExtension {
        uri: "urn:ietf:params:rtp-hdrext:ssrc-audio-level".to_owned(),
        id: 1,
    }];
    ch.inner
        .set_local_content(&local, NegotiationAction::Offer)
        .unwrap();

    let mut remote = MediaContentDescription::new(MediaKind::Audio);
    remote.cryptos = vec![crypto_params(0x80)];
    remote.rtcp_mux = true;
    remote.codecs = vec![audio_codec(96)];
    remote.streams = vec![StreamParams::with_ssrcs("g", "speaker", &[2222])];
    remote.max_send_bandwidth_bps = Some(64_000);
    ch.inner
        .set_remote_content(&remote, NegotiationAction::Answer)
        .unwrap();

    assert!(ch.inner.is_srtp_active());
    assert!(ch.inner.is_rtcp_mux_active());
    assert!(!ch.inner.has_rtcp_transport());

    let media = ch.media.state.lock().unwrap();
    assert_eq!(media.recv_codecs.len(), 1);
    assert_eq!(media.send_codecs.len(), 1);
    assert_eq!(media.recv_extensions.len(), 1);
    assert_eq!(media.send_streams.len(), 1);
    assert_eq!(media.recv_streams.len(), 1);
    assert_eq!(media.max_send_bandwidth, Some(64_000));
}

#[test]
fn test_sdes_protected_media_roundtrip_through_channel() {
    // Two channels negotiated against each other: what one sends, the other
    // receives in the clear.
    let mut caller = make_channel(ChannelConfig::default(), false);
    let mut callee = make_channel(ChannelConfig::default(), false);
    make_writable(&mut caller);
    make_writable(&mut callee);

    let offer_crypto = crypto_params(0x10);
    let answer_crypto = crypto_params(0x80);

    let mut offer = MediaContentDescription::new(MediaKind::Audio);
    offer.cryptos = vec![offer_crypto.clone()];
    let mut answer = MediaContentDescription::new(MediaKind::Audio);
    answer.cryptos = vec![answer_crypto.clone()];

    caller
        .inner
        .set_local_content(&offer, NegotiationAction::Offer)
        .unwrap();
    caller
        .inner
        .set_remote_content(&answer, NegotiationAction::Answer)
        .unwrap();

    callee
        .inner
        .set_remote_content(&offer, NegotiationAction::Offer)
        .unwrap();
    callee
        .inner
        .set_local_content(&answer, NegotiationAction::Answer)
        .unwrap();

    assert!(caller.inner.is_srtp_active());
    assert!(callee.inner.is_srtp_active());

    let pkt = rtp_packet(96, 42, 1111);
    caller.inner.send_packet(&pkt, false).unwrap();

    let wire = Bytes::from(caller.rtp_transport.last_sent().unwrap());
    assert_ne!(&wire[..], &pkt[..]);

    callee.inner.on_packet_received(false, wire, -1);
    let media = callee.media.state.lock().unwrap();
    assert_eq!(media.packets.len(), 1);
    assert_eq!(media.packets[0].0, pkt.to_vec());
}

#[test]
fn test_unprotect_failure_drops_packet_and_reports_once() {
    let mut ch = make_channel(ChannelConfig::default(), false);
    make_writable(&mut ch);

    let mut offer = MediaContentDescription::new(MediaKind::Audio);
    offer.cryptos = vec![crypto_params(0x10)];
    let mut answer = MediaContentDescription::new(MediaKind::Audio);
    answer.cryptos = vec![crypto_params(0x80)];
    ch.inner
        .set_local_content(&offer, NegotiationAction::Offer)
        .unwrap();
    ch.inner
        .set_remote_content(&answer, NegotiationAction::Answer)
        .unwrap();

    // A plausible RTP packet that was never protected: the auth check fails,
    // the packet is dropped, the channel survives.
    ch.inner.on_packet_received(false, rtp_packet(96, 1, 111), -1);
    ch.inner.on_packet_received(false, rtp_packet(96, 2, 111), -1);

    assert_eq!(ch.media.packet_count(), 0);
    assert_eq!(ch.events.try_recv(), Ok(ChannelEvent::FirstPacketReceived));
    assert_eq!(
        ch.events.try_recv(),
        Ok(ChannelEvent::SrtpError { is_rtcp: false })
    );
    // Reported once, not per packet.
    assert!(ch.events.try_recv().is_err());
}

#[test]
fn test_content_negotiation_collects_errors_but_continues() {
    let mut ch = make_channel(ChannelConfig::default(), true);

    let mut local = MediaContentDescription::new(MediaKind::Audio);
    local.rtcp_mux = true;
    ch.inner
        .set_local_content(&local, NegotiationAction::Offer)
        .unwrap();

    let mut remote = MediaContentDescription::new(MediaKind::Audio);
    remote.rtcp_mux = true;
    remote.codecs = vec![audio_codec(96)];
    // Two streams sharing an ssrc: the second is rejected.
    remote.streams = vec![
        StreamParams::with_ssrcs("g", "a", &[7]),
        StreamParams::with_ssrcs("g", "b", &[7]),
    ];
    let result = ch
        .inner
        .set_remote_content(&remote, NegotiationAction::Answer);

    assert!(matches!(result, Err(Error::ContentNegotiation(_))));
    // Later sub-steps still ran.
    assert!(ch.inner.is_rtcp_mux_active());
    let media = ch.media.state.lock().unwrap();
    assert_eq!(media.send_codecs.len(), 1);
    assert_eq!(media.recv_streams.len(), 1);
}

#[test]
fn test_update_action_patches_streams_only() {
    let mut ch = make_channel(ChannelConfig::default(), false);

    let mut local = MediaContentDescription::new(MediaKind::Audio);
    local.cryptos = vec![crypto_params(0x10)];
    local.streams = vec![StreamParams::with_ssrcs("g", "a", &[1])];
    ch.inner
        .set_local_content(&local, NegotiationAction::Offer)
        .unwrap();

    // An update removing "a" and adding "b"; the pending crypto offer must
    // survive untouched.
    let mut update = MediaContentDescription::new(MediaKind::Audio);
    update.streams = vec![
        StreamParams::with_ssrcs("g", "a", &[]),
        StreamParams::with_ssrcs("g", "b", &[2]),
    ];
    ch.inner
        .set_local_content(&update, NegotiationAction::Update)
        .unwrap();

    let media = ch.media.state.lock().unwrap();
    assert_eq!(media.send_streams.len(), 1);
    assert_eq!(media.send_streams[0].id, "b");
    drop(media);

    // The earlier offer is still answerable.
    let mut remote = MediaContentDescription::new(MediaKind::Audio);
    remote.cryptos = vec![crypto_params(0x80)];
    ch.inner
        .set_remote_content(&remote, NegotiationAction::Answer)
        .unwrap();
    assert!(ch.inner.is_srtp_active());
}

#[test]
fn test_mute_stream() {
    let mut ch = make_channel(ChannelConfig::default(), false);

    ch.inner
        .add_send_stream(StreamParams::with_ssrcs("g", "mic", &[1111]))
        .unwrap();

    assert_eq!(
        ch.inner.mute_stream(9999, true),
        Err(Error::SsrcNotFound(9999))
    );

    ch.inner.mute_stream(1111, true).unwrap();
    assert_eq!(ch.media.state.lock().unwrap().muted, vec![(1111, true)]);
}
