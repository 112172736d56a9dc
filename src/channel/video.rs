use super::{check_content_kind, SecureChannel};
use crate::content::{MediaContentDescription, MediaKind, NegotiationAction};
use crate::error::Result;

/// Video channel: checks that negotiated content is video, then delegates
/// everything to the secure channel core.
pub struct VideoChannel {
    channel: SecureChannel,
}

impl VideoChannel {
    pub fn new(channel: SecureChannel) -> Self {
        VideoChannel { channel }
    }

    pub fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    pub async fn set_local_content(
        &self,
        content: MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        check_content_kind(&content, MediaKind::Video)?;
        self.channel.set_local_content(content, action).await
    }

    pub async fn set_remote_content(
        &self,
        content: MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        check_content_kind(&content, MediaKind::Video)?;
        self.channel.set_remote_content(content, action).await
    }

    pub async fn mute_stream(&self, ssrc: u32, mute: bool) -> Result<()> {
        self.channel.mute_stream(ssrc, mute).await
    }
}
