use super::{check_content_kind, SecureChannel};
use crate::content::{MediaContentDescription, MediaKind, NegotiationAction};
use crate::error::Result;

/// Audio channel: checks that negotiated content is audio, then delegates
/// everything to the secure channel core.
pub struct VoiceChannel {
    channel: SecureChannel,
}

impl VoiceChannel {
    pub fn new(channel: SecureChannel) -> Self {
        VoiceChannel { channel }
    }

    pub fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    pub async fn set_local_content(
        &self,
        content: MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        check_content_kind(&content, MediaKind::Audio)?;
        self.channel.set_local_content(content, action).await
    }

    pub async fn set_remote_content(
        &self,
        content: MediaContentDescription,
        action: NegotiationAction,
    ) -> Result<()> {
        check_content_kind(&content, MediaKind::Audio)?;
        self.channel.set_remote_content(content, action).await
    }

    pub async fn mute_stream(&self, ssrc: u32, mute: bool) -> Result<()> {
        self.channel.mute_stream(ssrc, mute).await
    }
}
