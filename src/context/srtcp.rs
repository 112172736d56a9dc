use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use rtcp::header::{HEADER_LENGTH, SSRC_LENGTH};
use util::marshal::*;

use super::*;
use crate::key_derivation::SRTCP_INDEX_SIZE;

impl Context {
    /// decrypt_rtcp decrypts an RTCP packet with an encrypted payload.
    pub fn decrypt_rtcp(&mut self, encrypted: &[u8]) -> Result<Bytes> {
        {
            let mut buf = encrypted;
            rtcp::header::Header::unmarshal(&mut buf)?;
        }

        let min_len =
            self.cipher.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE + HEADER_LENGTH + SSRC_LENGTH;
        if encrypted.len() < min_len {
            return Err(Error::SrtcpTooSmall(encrypted.len(), min_len));
        }

        let index = self.cipher.get_rtcp_index(encrypted);
        let ssrc = BigEndian::read_u32(&encrypted[HEADER_LENGTH..HEADER_LENGTH + SSRC_LENGTH]);

        {
            let state = self.get_srtcp_ssrc_state(ssrc);
            if let Some(replay_detector) = &mut state.replay_detector {
                if !replay_detector.check(index as u64) {
                    return Err(Error::SrtcpSsrcDuplicated(ssrc, index));
                }
            }
        }

        let dst = self.cipher.decrypt_rtcp(encrypted, index, ssrc)?;

        {
            let state = self.get_srtcp_ssrc_state(ssrc);
            if let Some(replay_detector) = &mut state.replay_detector {
                replay_detector.accept();
            }
        }

        Ok(dst)
    }

    /// encrypt_rtcp encrypts an RTCP packet, appending the E-flagged
    /// SRTCP index word and the auth tag.
    pub fn encrypt_rtcp(&mut self, decrypted: &[u8]) -> Result<Bytes> {
        {
            let mut buf = decrypted;
            rtcp::header::Header::unmarshal(&mut buf)?;
        }

        if decrypted.len() < HEADER_LENGTH + SSRC_LENGTH {
            return Err(Error::SrtcpTooSmall(
                decrypted.len(),
                HEADER_LENGTH + SSRC_LENGTH,
            ));
        }
        let ssrc = BigEndian::read_u32(&decrypted[HEADER_LENGTH..HEADER_LENGTH + SSRC_LENGTH]);

        // We roll over early because the MSB is used for marking as encrypted.
        let index = self.get_srtcp_ssrc_state(ssrc).next_index();

        self.cipher.encrypt_rtcp(decrypted, index, ssrc)
    }
}
