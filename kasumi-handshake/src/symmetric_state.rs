use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher_state::CipherState;
use crate::crypto::aead::AEAD_KEY_LEN;
use crate::crypto::hash::{self, HASH_LEN};
use crate::error::Error;

/// Take the AEAD key from the front of a 32-byte derivation window.
fn aead_key(window: &[u8; HASH_LEN]) -> Zeroizing<[u8; AEAD_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    key.copy_from_slice(&window[..AEAD_KEY_LEN]);
    key
}

/// Noise SymmetricState: the chaining key and transcript hash.
///
/// Per Noise Section 5.2, with BLAKE3 output windows in place of HKDF.
/// Both secrets are wiped when the state is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricState {
    cipher: CipherState,
    /// Chaining key (ck), mixed with DH outputs and the PSK.
    ck: [u8; HASH_LEN],
    /// Handshake hash (h), accumulates all handshake data.
    h: [u8; HASH_LEN],
}

impl SymmetricState {
    /// Initialize the SymmetricState with a protocol name.
    ///
    /// The name is always hashed, whatever its length: `h = ck = HASH(name)`.
    pub fn initialize(protocol_name: &str) -> Self {
        let h = hash::hash(protocol_name.as_bytes());
        Self {
            cipher: CipherState::empty(),
            ck: h,
            h,
        }
    }

    /// `(ck, temp_k) = KDF(ck, ikm, 2)`, then `InitializeKey(temp_k)`.
    pub fn mix_key(&mut self, input_key_material: &[u8]) {
        let (new_ck, temp_k) = hash::kdf2(&self.ck, input_key_material);
        self.ck = *new_ck;
        self.cipher.initialize_key(*aead_key(&temp_k));
    }

    /// Mix data into the handshake hash: `h = HASH(h || data)`.
    pub fn mix_hash(&mut self, data: &[u8]) {
        self.h = hash::hash_two(&self.h, data);
    }

    /// `(ck, temp_h, temp_k) = KDF(ck, ikm, 3)`, then `MixHash(temp_h)` and
    /// `InitializeKey(temp_k)`. Absorbs the PSK.
    pub fn mix_key_and_hash(&mut self, input_key_material: &[u8]) {
        let (new_ck, temp_h, temp_k) = hash::kdf3(&self.ck, input_key_material);
        self.ck = *new_ck;
        self.mix_hash(&*temp_h);
        self.cipher.initialize_key(*aead_key(&temp_k));
    }

    /// Encrypt plaintext and mix the ciphertext into the hash.
    ///
    /// Per Noise: ciphertext = EncryptWithAd(h, plaintext), then MixHash(ciphertext)
    pub fn encrypt_and_hash(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        let len = self.cipher.encrypt_with_ad(&self.h, plaintext, out)?;
        self.mix_hash(&out[..len]);
        Ok(len)
    }

    /// Decrypt ciphertext and mix it into the hash.
    ///
    /// The current hash is the AD; the ciphertext is mixed in afterwards
    /// whether or not it authenticated.
    pub fn decrypt_and_hash(&mut self, ciphertext: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        let result = self.cipher.decrypt_with_ad(&self.h, ciphertext, out);
        self.mix_hash(ciphertext);
        result
    }

    /// Split into two CipherStates for transport mode.
    ///
    /// `(temp_k1, temp_k2) = KDF(ck, "", 2)`. Returns `(h, c1, c2)`; the
    /// chaining key is wiped when `self` drops here.
    pub fn split(self) -> ([u8; HASH_LEN], CipherState, CipherState) {
        let (temp_k1, temp_k2) = hash::kdf2(&self.ck, &[]);

        let mut c1 = CipherState::empty();
        c1.initialize_key(*aead_key(&temp_k1));

        let mut c2 = CipherState::empty();
        c2.initialize_key(*aead_key(&temp_k2));

        (self.h, c1, c2)
    }

    /// Get the current handshake hash.
    pub fn handshake_hash(&self) -> &[u8; HASH_LEN] {
        &self.h
    }

    /// Whether `encrypt_and_hash` will actually encrypt.
    pub fn has_key(&self) -> bool {
        self.cipher.has_key()
    }

    /// The current encryption overhead.
    pub fn overhead(&self) -> usize {
        self.cipher.overhead()
    }
}

#[cfg(test)]
mod tests {
    use subtle::ConstantTimeEq;

    use super::*;
    use crate::crypto::aead::AEAD_TAG_LEN;

    const NAME: &str = "Noise_NNpsk0_25519_AEGIS128L_BLAKE3";

    #[test]
    fn initialize_hashes_short_names_too() {
        let ss = SymmetricState::initialize("short");
        assert_eq!(*ss.handshake_hash(), hash::hash(b"short"));
        assert_eq!(ss.ck, hash::hash(b"short"));
        assert!(!ss.has_key());
    }

    #[test]
    fn mix_hash_chains() {
        let mut ss = SymmetricState::initialize(NAME);
        let h0 = *ss.handshake_hash();
        ss.mix_hash(b"prologue");
        assert_eq!(*ss.handshake_hash(), hash::hash_two(&h0, b"prologue"));
    }

    #[test]
    fn mix_key_installs_first_half_of_second_window() {
        let mut ss = SymmetricState::initialize(NAME);
        let ck0 = ss.ck;
        ss.mix_key(b"ikm");

        let (ck, temp_k) = hash::kdf2(&ck0, b"ikm");
        assert_eq!(ss.ck, *ck);
        assert!(ss.has_key());
        assert_eq!(ss.overhead(), AEAD_TAG_LEN);

        let mut expected = CipherState::empty();
        expected.initialize_key(*aead_key(&temp_k));
        assert!(bool::from(ss.cipher.ct_eq(&expected)));
    }

    #[test]
    fn mix_key_and_hash_touches_all_three() {
        let mut ss = SymmetricState::initialize(NAME);
        let ck0 = ss.ck;
        let h0 = *ss.handshake_hash();
        ss.mix_key_and_hash(&[0u8; 32]);

        let (ck, temp_h, _) = hash::kdf3(&ck0, &[0u8; 32]);
        assert_eq!(ss.ck, *ck);
        assert_eq!(*ss.handshake_hash(), hash::hash_two(&h0, &*temp_h));
        assert!(ss.has_key());
    }

    #[test]
    fn encrypt_and_hash_without_key_still_mixes() {
        let mut ss = SymmetricState::initialize(NAME);
        let h0 = *ss.handshake_hash();
        let mut out = [0u8; 8];
        let len = ss.encrypt_and_hash(b"plain", &mut out).unwrap();
        assert_eq!(&out[..len], b"plain");
        assert_eq!(*ss.handshake_hash(), hash::hash_two(&h0, b"plain"));
    }

    #[test]
    fn encrypt_decrypt_and_hash_keep_transcripts_in_step() {
        let mut a = SymmetricState::initialize(NAME);
        let mut b = SymmetricState::initialize(NAME);
        a.mix_key(b"shared");
        b.mix_key(b"shared");

        let mut ct = [0u8; 64];
        let ct_len = a.encrypt_and_hash(b"payload", &mut ct).unwrap();
        let mut pt = [0u8; 64];
        let pt_len = b.decrypt_and_hash(&ct[..ct_len], &mut pt).unwrap();

        assert_eq!(&pt[..pt_len], b"payload");
        assert_eq!(a.handshake_hash(), b.handshake_hash());
    }

    #[test]
    fn failed_decrypt_still_mixes_ciphertext() {
        let mut a = SymmetricState::initialize(NAME);
        let mut b = SymmetricState::initialize(NAME);
        a.mix_key(b"one");
        b.mix_key(b"two");

        let mut ct = [0u8; 32];
        let ct_len = a.encrypt_and_hash(b"", &mut ct).unwrap();
        let h_before = *b.handshake_hash();
        let mut pt = [0u8; 32];
        assert_eq!(
            b.decrypt_and_hash(&ct[..ct_len], &mut pt),
            Err(Error::CryptoFailed)
        );
        assert_eq!(
            *b.handshake_hash(),
            hash::hash_two(&h_before, &ct[..ct_len])
        );
    }

    #[test]
    fn split_produces_distinct_matching_pairs() {
        let mut a = SymmetricState::initialize(NAME);
        let mut b = SymmetricState::initialize(NAME);
        a.mix_key(b"dh");
        b.mix_key(b"dh");

        let (ha, a1, a2) = a.split();
        let (hb, b1, b2) = b.split();
        assert_eq!(ha, hb);
        assert!(bool::from(a1.ct_eq(&b1)));
        assert!(bool::from(a2.ct_eq(&b2)));
        assert!(!bool::from(a1.ct_eq(&a2)));
    }
}
