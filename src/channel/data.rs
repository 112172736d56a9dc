use super::{check_content_kind, SecureChannel};
use crate::content::{MediaContentDescription, MediaKind, NegotiationAction};
use crate::error::Result;

/// RTP data channel: checks that negotiated content is data, then delegates
/// everything to the secure channel core.
pub struct RtpDataChannel {
    channel: SecureChannel,
}

impl RtpDataChannel {
    pub fn new(channel: SecureChannel) -> Self {
        RtpDataChannel { channel }
    }

    pub fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    pub async fn set_local_content(
        &self,
        content: MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        check_content_kind(&content, MediaKind::Data)?;
        self.channel.set_local_content(content, action).await
    }

    pub async fn set_remote_content(
        &self,
        content: MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        check_content_kind(&content, MediaKind::Data)?;
        self.channel.set_remote_content(content, action).await
    }
}
