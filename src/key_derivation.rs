use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::{Error, Result};

pub(crate) const LABEL_SRTP_ENCRYPTION: u8 = 0x00;
pub(crate) const LABEL_SRTP_AUTHENTICATION_TAG: u8 = 0x01;
pub(crate) const LABEL_SRTP_SALT: u8 = 0x02;
pub(crate) const LABEL_SRTCP_ENCRYPTION: u8 = 0x03;
pub(crate) const LABEL_SRTCP_AUTHENTICATION_TAG: u8 = 0x04;
pub(crate) const LABEL_SRTCP_SALT: u8 = 0x05;

pub(crate) const SRTCP_INDEX_SIZE: usize = 4;

/// aes_cm_key_derivation derives a session key/salt/auth-key from the
/// master key and salt per <https://tools.ietf.org/html/rfc3711#section-4.3.1>.
pub(crate) fn aes_cm_key_derivation(
    label: u8,
    master_key: &[u8],
    master_salt: &[u8],
    index_over_kdr: usize,
    out_len: usize,
) -> Result<Vec<u8>> {
    if index_over_kdr != 0 {
        // 24-bit "index DIV kdr" is not supported yet
        return Err(Error::UnsupportedIndexOverKdr);
    }

    // The input block for AES-CM is generated by exclusive-oring the master salt with
    // the concatenation of the encryption key label 0x00 with (index DIV kdr),
    // - index is 'rollover count' and DIV is 'divided by'
    let n_master_key = master_key.len();
    let n_master_salt = master_salt.len();

    let mut prf_in = vec![0u8; n_master_key];
    prf_in[..n_master_salt].copy_from_slice(master_salt);

    prf_in[7] ^= label;

    // The resulting value is then AES encrypted using the master key to get the
    // cipher key.
    let block = Aes128::new(GenericArray::from_slice(master_key));

    let mut out = vec![0u8; ((out_len + n_master_key) / n_master_key) * n_master_key];
    let mut i: u16 = 0;
    let mut n = 0;
    while n < out_len {
        prf_in[n_master_key - 2] = (i >> 8) as u8;
        prf_in[n_master_key - 1] = i as u8;

        out[n..n + n_master_key].copy_from_slice(&prf_in);
        let out_key = GenericArray::from_mut_slice(&mut out[n..n + n_master_key]);
        block.encrypt_block(out_key);

        i += 1;
        n += n_master_key;
    }

    out.truncate(out_len);
    Ok(out)
}

/// generate_counter takes the ROC, sequence number, SSRC and the session salt
/// and returns the IV per <https://tools.ietf.org/html/rfc3711#section-4.1.1>:
/// where the 128-bit integer value IV SHALL be defined by the SSRC, the
/// SRTP packet index i, and the SRTP session salting key k_s, as below.
/// - ROC = a 32-bit unsigned rollover counter (roc), which records how many
///   times the 16-bit RTP sequence number has been reset to zero after
///   passing through 65,535
///
/// i = 2^16 * roc + SEQ
///
/// IV = (salt*2 ^ 16) | (ssrc*2 ^ 64) | (i*2 ^ 16)
pub(crate) fn generate_counter(
    sequence_number: u16,
    rollover_counter: u32,
    ssrc: u32,
    session_salt: &[u8],
) -> [u8; 16] {
    debug_assert!(session_salt.len() <= 16);

    let mut counter = [0u8; 16];
    counter[4..8].copy_from_slice(&ssrc.to_be_bytes());
    counter[8..12].copy_from_slice(&rollover_counter.to_be_bytes());
    counter[12..16].copy_from_slice(&((u32::from(sequence_number)) << 16).to_be_bytes());

    for (i, v) in counter.iter_mut().take(session_salt.len()).enumerate() {
        *v ^= session_salt[i];
    }

    counter
}
