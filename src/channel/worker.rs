use bytes::Bytes;
use log::debug;
use tokio::sync::{mpsc, oneshot};

use super::{ChannelConfig, ChannelInner};
use crate::content::{MediaContentDescription, NegotiationAction};
use crate::error::{Error, Result};
use crate::media::MediaChannel;
use crate::streams::StreamParams;
use crate::transport::PacketTransport;

/// Notifications posted asynchronously from the worker context to the
/// signaling context. Delivery order follows emission order, but an event
/// triggered by a control call may arrive after that call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// DTLS-SRTP keying failed on the first-writable transition; `rtcp`
    /// identifies which transport failed. The channel stays not-writable.
    DtlsSetupFailure { rtcp: bool },

    /// The first bundle-accepted media packet arrived. Emitted once.
    FirstPacketReceived,

    /// SRTP rejected an inbound packet (bad auth tag, replay, truncation).
    /// The packet was dropped and the channel carries on; emitted once to
    /// avoid flooding the signaling context on a bad stream.
    SrtpError { is_rtcp: bool },
}

pub(crate) enum WorkerCommand {
    Enable(bool, oneshot::Sender<()>),
    SetLocalContent(
        MediaContentDescription,
        NegotiationAction,
        oneshot::Sender<Result<()>>,
    ),
    SetRemoteContent(
        MediaContentDescription,
        NegotiationAction,
        oneshot::Sender<Result<()>>,
    ),
    AddSendStream(StreamParams, oneshot::Sender<Result<()>>),
    RemoveSendStream(u32, oneshot::Sender<Result<()>>),
    AddRecvStream(StreamParams, oneshot::Sender<Result<()>>),
    RemoveRecvStream(u32, oneshot::Sender<Result<()>>),
    MuteStream(u32, bool, oneshot::Sender<Result<()>>),
    QueryReadiness(oneshot::Sender<(bool, bool)>),
    QuerySrtpActive(oneshot::Sender<bool>),
    SendPacket {
        data: Bytes,
        is_rtcp: bool,
    },
    PacketReceived {
        from_rtcp_transport: bool,
        data: Bytes,
        timestamp_us: i64,
    },
    TransportWritableChanged {
        rtcp: bool,
        writable: bool,
    },
    TransportReadyToSend {
        rtcp: bool,
        ready: bool,
    },
    Close(oneshot::Sender<()>),
}

/// Handle to one secure media channel.
///
/// All mutable state lives on the channel's worker task. Control calls are a
/// request/response pair over the command queue: the caller awaits the reply,
/// a deliberate single-hop block bounded by the worker's queue depth. Packet
/// submissions are fire-and-forget and FIFO. Cloning the handle is cheap.
#[derive(Clone)]
pub struct SecureChannel {
    pub(crate) tx: mpsc::UnboundedSender<WorkerCommand>,
}

/// Send-only handle handed to the media collaborator, so payload logic can
/// originate packets without seeing the control surface.
#[derive(Clone)]
pub struct MediaSendInterface {
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl MediaSendInterface {
    pub fn send_rtp(&self, data: Bytes) -> Result<()> {
        self.tx
            .send(WorkerCommand::SendPacket {
                data,
                is_rtcp: false,
            })
            .map_err(|_| Error::ChannelClosed)
    }

    pub fn send_rtcp(&self, data: Bytes) -> Result<()> {
        self.tx
            .send(WorkerCommand::SendPacket {
                data,
                is_rtcp: true,
            })
            .map_err(|_| Error::ChannelClosed)
    }
}

impl SecureChannel {
    /// Spawns the worker task that owns all channel state and returns the
    /// handle plus the receiver for worker-to-signaling notifications.
    pub fn spawn(
        config: ChannelConfig,
        rtp_transport: Box<dyn PacketTransport>,
        rtcp_transport: Option<Box<dyn PacketTransport>>,
        mut media: Box<dyn MediaChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        media.set_interface(MediaSendInterface { tx: tx.clone() });
        let inner = ChannelInner::new(config, rtp_transport, rtcp_transport, media, event_tx);
        tokio::spawn(run_worker(inner, rx));

        (SecureChannel { tx }, event_rx)
    }

    async fn invoke<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> WorkerCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| Error::ChannelClosed)?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn enable(&self, enable: bool) -> Result<()> {
        self.invoke(|tx| WorkerCommand::Enable(enable, tx)).await
    }

    pub async fn set_local_content(
        &self,
        content: MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        self.invoke(|tx| WorkerCommand::SetLocalContent(content, action, tx))
            .await?
    }

    pub async fn set_remote_content(
        &self,
        content: MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        self.invoke(|tx| WorkerCommand::SetRemoteContent(content, action, tx))
            .await?
    }

    pub async fn add_send_stream(&self, params: StreamParams) -> Result<()> {
        self.invoke(|tx| WorkerCommand::AddSendStream(params, tx))
            .await?
    }

    pub async fn remove_send_stream(&self, ssrc: u32) -> Result<()> {
        self.invoke(|tx| WorkerCommand::RemoveSendStream(ssrc, tx))
            .await?
    }

    pub async fn add_recv_stream(&self, params: StreamParams) -> Result<()> {
        self.invoke(|tx| WorkerCommand::AddRecvStream(params, tx))
            .await?
    }

    pub async fn remove_recv_stream(&self, ssrc: u32) -> Result<()> {
        self.invoke(|tx| WorkerCommand::RemoveRecvStream(ssrc, tx))
            .await?
    }

    pub async fn mute_stream(&self, ssrc: u32, mute: bool) -> Result<()> {
        self.invoke(|tx| WorkerCommand::MuteStream(ssrc, mute, tx))
            .await?
    }

    /// (ready_to_receive, ready_to_send) as currently computed on the worker.
    pub async fn readiness(&self) -> Result<(bool, bool)> {
        self.invoke(WorkerCommand::QueryReadiness).await
    }

    pub async fn is_srtp_active(&self) -> Result<bool> {
        self.invoke(WorkerCommand::QuerySrtpActive).await
    }

    /// Submits an RTP packet for sending from any context. The packet is
    /// moved onto the worker queue and the call reports optimistic success
    /// immediately: the network layer is best-effort, so worker-side send
    /// failures surface as logs and backpressure signals, never through this
    /// return value.
    pub fn send_rtp(&self, data: Bytes) -> Result<()> {
        self.tx
            .send(WorkerCommand::SendPacket {
                data,
                is_rtcp: false,
            })
            .map_err(|_| Error::ChannelClosed)
    }

    /// RTCP companion of [`SecureChannel::send_rtp`], with the same
    /// optimistic-success contract.
    pub fn send_rtcp(&self, data: Bytes) -> Result<()> {
        self.tx
            .send(WorkerCommand::SendPacket {
                data,
                is_rtcp: true,
            })
            .map_err(|_| Error::ChannelClosed)
    }

    /// Forwards a packet-received signal from a transport. `timestamp_us`
    /// may be -1 when the arrival time is unknown.
    pub fn on_packet_received(&self, from_rtcp_transport: bool, data: Bytes, timestamp_us: i64) {
        let _ = self.tx.send(WorkerCommand::PacketReceived {
            from_rtcp_transport,
            data,
            timestamp_us,
        });
    }

    /// Forwards a writable-state-changed signal from a transport.
    pub fn on_transport_writable(&self, rtcp: bool, writable: bool) {
        let _ = self
            .tx
            .send(WorkerCommand::TransportWritableChanged { rtcp, writable });
    }

    /// Forwards a ready-to-send-changed signal from a transport.
    pub fn on_transport_ready_to_send(&self, rtcp: bool, ready: bool) {
        let _ = self
            .tx
            .send(WorkerCommand::TransportReadyToSend { rtcp, ready });
    }

    /// Shuts the worker down. Still-queued RTCP sends are flushed before the
    /// transports are released; all other queued work is discarded.
    pub async fn close(&self) -> Result<()> {
        self.invoke(WorkerCommand::Close).await
    }
}

async fn run_worker(mut inner: ChannelInner, mut rx: mpsc::UnboundedReceiver<WorkerCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WorkerCommand::Enable(enable, done) => {
                inner.enable(enable);
                let _ = done.send(());
            }
            WorkerCommand::SetLocalContent(content, action, done) => {
                let _ = done.send(inner.set_local_content(&content, action));
            }
            WorkerCommand::SetRemoteContent(content, action, done) => {
                let _ = done.send(inner.set_remote_content(&content, action));
            }
            WorkerCommand::AddSendStream(params, done) => {
                let _ = done.send(inner.add_send_stream(params));
            }
            WorkerCommand::RemoveSendStream(ssrc, done) => {
                let _ = done.send(inner.remove_send_stream(ssrc));
            }
            WorkerCommand::AddRecvStream(params, done) => {
                let _ = done.send(inner.add_recv_stream(params));
            }
            WorkerCommand::RemoveRecvStream(ssrc, done) => {
                let _ = done.send(inner.remove_recv_stream(ssrc));
            }
            WorkerCommand::MuteStream(ssrc, mute, done) => {
                let _ = done.send(inner.mute_stream(ssrc, mute));
            }
            WorkerCommand::QueryReadiness(done) => {
                let _ = done.send((inner.ready_to_receive(), inner.ready_to_send()));
            }
            WorkerCommand::QuerySrtpActive(done) => {
                let _ = done.send(inner.is_srtp_active());
            }
            WorkerCommand::SendPacket { data, is_rtcp } => {
                if let Err(e) = inner.send_packet(&data, is_rtcp) {
                    debug!("queued send failed: {e}");
                }
            }
            WorkerCommand::PacketReceived {
                from_rtcp_transport,
                data,
                timestamp_us,
            } => {
                inner.on_packet_received(from_rtcp_transport, data, timestamp_us);
            }
            WorkerCommand::TransportWritableChanged { rtcp, writable } => {
                inner.on_transport_writable_changed(rtcp, writable);
            }
            WorkerCommand::TransportReadyToSend { rtcp, ready } => {
                inner.on_transport_ready_to_send(rtcp, ready);
            }
            WorkerCommand::Close(done) => {
                flush_pending(&mut inner, &mut rx);
                let _ = done.send(());
                return;
            }
        }
    }
}

/// Teardown: still-queued protected RTCP (receiver reports, BYE) must not be
/// silently dropped, so it is sent synchronously before the transports go
/// away; everything else in the queue is discarded.
fn flush_pending(inner: &mut ChannelInner, rx: &mut mpsc::UnboundedReceiver<WorkerCommand>) {
    while let Ok(cmd) = rx.try_recv() {
        if let WorkerCommand::SendPacket {
            data,
            is_rtcp: true,
        } = cmd
        {
            if let Err(e) = inner.send_packet(&data, true) {
                debug!("rtcp flush on close failed: {e}");
            }
        }
    }
}
