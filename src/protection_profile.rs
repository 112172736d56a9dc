/// ProtectionProfile specifies the SRTP cipher and auth tag details,
/// similar to a TLS cipher suite.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionProfile {
    #[default]
    Aes128CmHmacSha1_80,
    Aes128CmHmacSha1_32,
}

/// SDES suite name carried in session-description crypto attributes.
pub const SRTP_AES128_CM_HMAC_SHA1_80: &str = "AES_CM_128_HMAC_SHA1_80";
pub const SRTP_AES128_CM_HMAC_SHA1_32: &str = "AES_CM_128_HMAC_SHA1_32";

impl ProtectionProfile {
    pub fn from_suite_name(name: &str) -> Option<ProtectionProfile> {
        match name {
            SRTP_AES128_CM_HMAC_SHA1_80 => Some(ProtectionProfile::Aes128CmHmacSha1_80),
            SRTP_AES128_CM_HMAC_SHA1_32 => Some(ProtectionProfile::Aes128CmHmacSha1_32),
            _ => None,
        }
    }

    pub fn suite_name(&self) -> &'static str {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80 => SRTP_AES128_CM_HMAC_SHA1_80,
            ProtectionProfile::Aes128CmHmacSha1_32 => SRTP_AES128_CM_HMAC_SHA1_32,
        }
    }

    /// All suites this endpoint is willing to negotiate, most preferred first.
    pub fn supported_suite_names() -> &'static [&'static str] {
        &[SRTP_AES128_CM_HMAC_SHA1_80, SRTP_AES128_CM_HMAC_SHA1_32]
    }

    pub(crate) fn key_len(&self) -> usize {
        16
    }

    pub(crate) fn salt_len(&self) -> usize {
        14
    }

    /// Length of a full master key blob (key followed by salt).
    pub(crate) fn master_len(&self) -> usize {
        self.key_len() + self.salt_len()
    }

    pub(crate) fn auth_key_len(&self) -> usize {
        20
    }

    pub(crate) fn rtp_auth_tag_len(&self) -> usize {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80 => 10,
            ProtectionProfile::Aes128CmHmacSha1_32 => 4,
        }
    }

    /// SRTCP always carries the 80-bit tag, also for the _32 suite.
    pub(crate) fn rtcp_auth_tag_len(&self) -> usize {
        10
    }
}
