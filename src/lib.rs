#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod channel;
mod cipher;
pub mod content;
mod context;
pub mod crypto;
pub mod demux;
pub mod error;
mod key_derivation;
pub mod media;
pub mod mux;
mod option;
pub mod protection_profile;
pub mod streams;
pub mod transport;

pub use channel::{ChannelConfig, ChannelEvent, MediaSendInterface, SecureChannel};
pub use content::{
    ContentDirection, ContentSource, MediaContentDescription, MediaKind, NegotiationAction,
    RtpCodec, RtpHeaderExtension,
};
pub use crypto::{CryptoNegotiator, CryptoParams};
pub use demux::BundleDemuxer;
pub use error::{Error, Result};
pub use mux::RtcpMuxNegotiator;
pub use streams::{StreamParams, StreamTable};
