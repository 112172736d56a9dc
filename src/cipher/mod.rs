pub(crate) mod cipher_aes_cm_hmac_sha1;

use bytes::Bytes;

use crate::error::Result;

/// The authentication tag is placed *after* the ESRTCP word
/// (Encrypted-flag and SRTCP index):
///
/// > AES_128_CM_HMAC_SHA1_80
/// > | RTCP Header | Encrypted payload |E| SRTCP Index | Auth tag |
/// >                                   ^               |----------|
/// >                                   |                ^
/// >                                   |                authTagLen=10
/// >                                   aeadAuthTagLen=0
///
/// See <https://tools.ietf.org/html/rfc3711> for the full specification.
///
/// Cipher represents an implementation of one of the SRTP specific ciphers.
pub(crate) trait Cipher {
    /// Get RTP authenticated tag length.
    fn rtp_auth_tag_len(&self) -> usize;

    /// Get RTCP authenticated tag length.
    fn rtcp_auth_tag_len(&self) -> usize;

    /// Retrieve the SRTCP index from a protected packet.
    fn get_rtcp_index(&self, input: &[u8]) -> usize;

    /// Encrypt RTP payload.
    fn encrypt_rtp(
        &mut self,
        payload: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes>;

    /// Decrypt RTP payload.
    fn decrypt_rtp(
        &mut self,
        payload: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes>;

    /// Encrypt RTCP payload.
    fn encrypt_rtcp(&mut self, payload: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes>;

    /// Decrypt RTCP payload.
    fn decrypt_rtcp(&mut self, payload: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes>;
}
