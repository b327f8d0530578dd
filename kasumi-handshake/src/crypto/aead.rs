use zeroize::Zeroize;

use super::aegis128l;
use crate::error::Error;
use crate::nonce::Nonce;

/// AEAD key length in bytes.
pub const AEAD_KEY_LEN: usize = aegis128l::KEY_LEN;
/// AEAD tag length in bytes.
pub const AEAD_TAG_LEN: usize = aegis128l::TAG_LEN;
/// AEAD nonce length in bytes.
pub const AEAD_NONCE_LEN: usize = aegis128l::NONCE_LEN;

/// Encrypt plaintext in-place, appending the 16-byte AEAD tag.
///
/// `buffer[..plaintext_len]` contains the plaintext.
/// `buffer` must have room for `plaintext_len + AEAD_TAG_LEN` bytes.
/// Returns the total ciphertext length (plaintext_len + tag).
pub fn encrypt_in_place(
    key: &[u8; AEAD_KEY_LEN],
    nonce: Nonce,
    ad: &[u8],
    buffer: &mut [u8],
    plaintext_len: usize,
) -> Result<usize, Error> {
    let total_len = plaintext_len
        .checked_add(AEAD_TAG_LEN)
        .ok_or(Error::BufferTooSmall)?;
    if buffer.len() < total_len {
        return Err(Error::BufferTooSmall);
    }

    let tag = aegis128l::encrypt_detached(key, &nonce.to_bytes(), ad, &mut buffer[..plaintext_len]);
    buffer[plaintext_len..total_len].copy_from_slice(&tag);
    Ok(total_len)
}

/// Decrypt ciphertext in-place, verifying the 16-byte AEAD tag.
///
/// `buffer[..ciphertext_len]` contains ciphertext + tag.
/// Returns the plaintext length (ciphertext_len - AEAD_TAG_LEN). On
/// authentication failure the plaintext region is left zeroed.
pub fn decrypt_in_place(
    key: &[u8; AEAD_KEY_LEN],
    nonce: Nonce,
    ad: &[u8],
    buffer: &mut [u8],
    ciphertext_len: usize,
) -> Result<usize, Error> {
    if ciphertext_len < AEAD_TAG_LEN || buffer.len() < ciphertext_len {
        return Err(Error::BadMessage);
    }
    let plaintext_len = ciphertext_len - AEAD_TAG_LEN;

    let (ct, tag_bytes) = buffer[..ciphertext_len].split_at_mut(plaintext_len);
    let mut tag = [0u8; AEAD_TAG_LEN];
    tag.copy_from_slice(tag_bytes);

    aegis128l::decrypt_detached(key, &nonce.to_bytes(), ad, ct, &tag)?;
    Ok(plaintext_len)
}

/// Rekey function per Noise §11.3.
///
/// REKEY(k) = ENCRYPT(k, maxnonce, "", zeros)
/// where maxnonce = 2^64 - 1 and zeros = one key length of zero bytes.
///
/// Returns the first [`AEAD_KEY_LEN`] bytes of the output as the new key.
pub fn rekey(key: &[u8; AEAD_KEY_LEN]) -> Result<[u8; AEAD_KEY_LEN], Error> {
    let mut buffer = [0u8; AEAD_KEY_LEN + AEAD_TAG_LEN];
    encrypt_in_place(key, Nonce::MAX, &[], &mut buffer, AEAD_KEY_LEN)?;
    let mut new_key = [0u8; AEAD_KEY_LEN];
    new_key.copy_from_slice(&buffer[..AEAD_KEY_LEN]);
    buffer.zeroize();
    Ok(new_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; AEAD_KEY_LEN] = [0x42u8; AEAD_KEY_LEN];

    #[test]
    fn encrypt_decrypt_round_trip() {
        let plaintext = b"hello noise";
        let ad = b"associated data";

        let mut buffer = [0u8; 128];
        buffer[..plaintext.len()].copy_from_slice(plaintext);

        let ct_len = encrypt_in_place(&KEY, Nonce::ZERO, ad, &mut buffer, plaintext.len()).unwrap();
        assert_eq!(ct_len, plaintext.len() + AEAD_TAG_LEN);

        let pt_len = decrypt_in_place(&KEY, Nonce::ZERO, ad, &mut buffer, ct_len).unwrap();
        assert_eq!(pt_len, plaintext.len());
        assert_eq!(&buffer[..pt_len], plaintext);
    }

    #[test]
    fn decrypt_wrong_key_fails() {
        let other = [0x43u8; AEAD_KEY_LEN];
        let plaintext = b"hello";

        let mut buffer = [0u8; 128];
        buffer[..plaintext.len()].copy_from_slice(plaintext);

        let ct_len = encrypt_in_place(&KEY, Nonce::ZERO, &[], &mut buffer, plaintext.len()).unwrap();
        let result = decrypt_in_place(&other, Nonce::ZERO, &[], &mut buffer, ct_len);
        assert_eq!(result.unwrap_err(), Error::CryptoFailed);
        assert!(buffer[..plaintext.len()].iter().all(|&b| b == 0));
    }

    #[test]
    fn decrypt_wrong_nonce_fails() {
        let plaintext = b"hello";

        let mut buffer = [0u8; 128];
        buffer[..plaintext.len()].copy_from_slice(plaintext);

        let ct_len = encrypt_in_place(&KEY, Nonce::ZERO, &[], &mut buffer, plaintext.len()).unwrap();
        let result = decrypt_in_place(&KEY, Nonce::from_u64(1), &[], &mut buffer, ct_len);
        assert_eq!(result.unwrap_err(), Error::CryptoFailed);
    }

    #[test]
    fn distinct_nonces_give_distinct_ciphertexts() {
        let mut a = [0u8; 48];
        let mut b = [0u8; 48];
        a[..32].copy_from_slice(&[9u8; 32]);
        b[..32].copy_from_slice(&[9u8; 32]);
        encrypt_in_place(&KEY, Nonce::from_u64(1), &[], &mut a, 32).unwrap();
        encrypt_in_place(&KEY, Nonce::from_u64(2), &[], &mut b, 32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn encrypt_buffer_too_small() {
        let mut buffer = [0u8; 4]; // too small for plaintext(3) + tag(16)
        let result = encrypt_in_place(&KEY, Nonce::ZERO, &[], &mut buffer, 3);
        assert_eq!(result.unwrap_err(), Error::BufferTooSmall);
    }

    #[test]
    fn decrypt_too_short() {
        let mut buffer = [0u8; 8]; // less than AEAD_TAG_LEN
        let result = decrypt_in_place(&KEY, Nonce::ZERO, &[], &mut buffer, 8);
        assert_eq!(result.unwrap_err(), Error::BadMessage);
    }

    #[test]
    fn encrypt_empty_plaintext() {
        let mut buffer = [0u8; AEAD_TAG_LEN];

        let ct_len = encrypt_in_place(&KEY, Nonce::ZERO, &[], &mut buffer, 0).unwrap();
        assert_eq!(ct_len, AEAD_TAG_LEN);

        let pt_len = decrypt_in_place(&KEY, Nonce::ZERO, &[], &mut buffer, ct_len).unwrap();
        assert_eq!(pt_len, 0);
    }

    #[test]
    fn rekey_produces_different_key() {
        let new_key = rekey(&KEY).unwrap();
        assert_ne!(KEY, new_key);
        assert_eq!(rekey(&KEY).unwrap(), new_key);
    }
}
