use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::aead::{self, AEAD_KEY_LEN, AEAD_TAG_LEN};
use crate::error::Error;
use crate::nonce::Nonce;

/// Noise CipherState: one AEAD key and its nonce counter, for one direction.
///
/// Per Noise Section 5.1.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CipherState {
    /// The AEAD key, or `None` if uninitialized.
    key: Option<[u8; AEAD_KEY_LEN]>,
    /// Next nonce to use, incremented after each encryption/decryption.
    #[zeroize(skip)]
    nonce: Nonce,
}

impl CipherState {
    /// Create an empty (uninitialized) CipherState.
    pub fn empty() -> Self {
        Self {
            key: None,
            nonce: Nonce::ZERO,
        }
    }

    /// Initialize with a key, resetting the nonce counter to zero.
    pub fn initialize_key(&mut self, key: [u8; AEAD_KEY_LEN]) {
        self.key = Some(key);
        self.nonce = Nonce::ZERO;
    }

    /// Whether this CipherState has a key set.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// The nonce the next operation will use.
    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// Override the next nonce.
    ///
    /// Used by the transport receive path, where the counter comes from the
    /// frame header. The caller is responsible for never decrypting under a
    /// nonce it has already accepted (see [`crate::replay::ReplayWindow`]).
    pub fn set_nonce(&mut self, nonce: Nonce) {
        self.nonce = nonce;
    }

    /// Advance past the nonce just used.
    fn bump(&mut self) {
        // Callers reject `Nonce::MAX` before using it, so this cannot overflow.
        self.nonce = Nonce::from_u64(self.nonce.as_u64() + 1);
    }

    /// Encrypt plaintext with associated data.
    ///
    /// If no key is set, copies plaintext to output unchanged (Noise behavior).
    /// Returns the number of bytes written.
    pub fn encrypt_with_ad(
        &mut self,
        ad: &[u8],
        plaintext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, Error> {
        match &self.key {
            None => {
                if out.len() < plaintext.len() {
                    return Err(Error::BufferTooSmall);
                }
                out[..plaintext.len()].copy_from_slice(plaintext);
                Ok(plaintext.len())
            }
            Some(key) => {
                if self.nonce.is_reserved() {
                    // Nonce 2^64-1 is reserved for rekey (Noise §11.3)
                    return Err(Error::NonceExhausted);
                }
                let needed = plaintext
                    .len()
                    .checked_add(AEAD_TAG_LEN)
                    .ok_or(Error::BufferTooSmall)?;
                if out.len() < needed {
                    return Err(Error::BufferTooSmall);
                }
                out[..plaintext.len()].copy_from_slice(plaintext);
                let len = aead::encrypt_in_place(key, self.nonce, ad, out, plaintext.len())?;
                self.bump();
                Ok(len)
            }
        }
    }

    /// Decrypt ciphertext with associated data.
    ///
    /// If no key is set, copies ciphertext to output unchanged (Noise behavior).
    /// Returns the number of plaintext bytes written. On failure nothing
    /// readable is left in `out` and the nonce does not advance.
    pub fn decrypt_with_ad(
        &mut self,
        ad: &[u8],
        ciphertext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, Error> {
        match &self.key {
            None => {
                if out.len() < ciphertext.len() {
                    return Err(Error::BufferTooSmall);
                }
                out[..ciphertext.len()].copy_from_slice(ciphertext);
                Ok(ciphertext.len())
            }
            Some(key) => {
                if self.nonce.is_reserved() {
                    // Nonce 2^64-1 is reserved for rekey (Noise §11.3)
                    return Err(Error::NonceExhausted);
                }
                if ciphertext.len() < AEAD_TAG_LEN {
                    return Err(Error::BadMessage);
                }
                let plaintext_len = ciphertext.len() - AEAD_TAG_LEN;
                if out.len() < plaintext_len {
                    return Err(Error::BufferTooSmall);
                }
                // In-place decryption needs the full ciphertext (including tag)
                // in the buffer; use a temp Vec when `out` can't hold it.
                if out.len() >= ciphertext.len() {
                    out[..ciphertext.len()].copy_from_slice(ciphertext);
                    let result = aead::decrypt_in_place(key, self.nonce, ad, out, ciphertext.len());
                    // Drop the copied tag bytes along with any failed plaintext.
                    out[plaintext_len..ciphertext.len()].zeroize();
                    let len = result?;
                    self.bump();
                    Ok(len)
                } else {
                    let mut tmp = Zeroizing::new(ciphertext.to_vec());
                    let len =
                        aead::decrypt_in_place(key, self.nonce, ad, &mut tmp, ciphertext.len())?;
                    out[..len].copy_from_slice(&tmp[..len]);
                    self.bump();
                    Ok(len)
                }
            }
        }
    }

    /// Rekey per Noise §11.3. Does not reset the nonce counter.
    pub fn rekey(&mut self) -> Result<(), Error> {
        if let Some(ref mut key) = self.key {
            *key = aead::rekey(key)?;
        }
        Ok(())
    }

    /// The overhead added by encryption (0 if no key, AEAD_TAG_LEN otherwise).
    pub fn overhead(&self) -> usize {
        if self.has_key() { AEAD_TAG_LEN } else { 0 }
    }
}

impl ConstantTimeEq for CipherState {
    /// Equal when both hold the same key (or both none) at the same nonce.
    fn ct_eq(&self, other: &Self) -> Choice {
        let same_nonce = self.nonce.as_u64().ct_eq(&other.nonce.as_u64());
        match (&self.key, &other.key) {
            (Some(a), Some(b)) => a.ct_eq(b) & same_nonce,
            (None, None) => same_nonce,
            _ => Choice::from(0),
        }
    }
}

impl core::fmt::Debug for CipherState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CipherState")
            .field("has_key", &self.has_key())
            .field("nonce", &self.nonce)
            .finish()
    }
}
