use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::x25519::{self, DH_LEN, SharedSecret};
use crate::error::Error;

/// Pre-shared key length in bytes.
pub const PSK_LEN: usize = 32;

/// Fill `out` from the CSPRNG, failing instead of degrading.
fn fill_random(rng: &mut impl CryptoRngCore, out: &mut [u8]) -> Result<(), Error> {
    rng.try_fill_bytes(out).map_err(|_| Error::Rng)
}

/// An X25519 secret scalar.
///
/// Zeroized from memory when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; DH_LEN]);

impl SecretKey {
    /// Create from raw 32-byte secret key material.
    pub fn from_bytes(bytes: [u8; DH_LEN]) -> Self {
        Self(bytes)
    }

    /// Export the raw 32-byte secret key material.
    pub fn to_bytes(&self) -> [u8; DH_LEN] {
        self.0
    }

    /// Diffie-Hellman with a remote public key.
    pub fn diffie_hellman(&self, remote: &PublicKey) -> Result<SharedSecret, Error> {
        x25519::dh(&self.0, remote.as_bytes())
    }
}

impl core::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// An X25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Zeroize)]
pub struct PublicKey([u8; DH_LEN]);

impl PublicKey {
    /// The length of a public key in bytes.
    pub const LEN: usize = DH_LEN;

    /// Create from raw 32-byte public key.
    pub fn from_bytes(bytes: [u8; DH_LEN]) -> Self {
        Self(bytes)
    }

    /// Access the raw bytes of this public key.
    pub fn as_bytes(&self) -> &[u8; DH_LEN] {
        &self.0
    }
}

impl From<&SecretKey> for PublicKey {
    fn from(secret: &SecretKey) -> Self {
        Self(x25519::scalarmult_base(&secret.0))
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PublicKey({:02x?})", &self.0[..4])
    }
}

/// An ephemeral keypair: a Curve25519 scalar and its base point multiple.
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new random keypair using the provided RNG.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, Error> {
        let mut bytes = [0u8; DH_LEN];
        fill_random(rng, &mut bytes)?;
        let keypair = Self::from_secret_bytes(bytes);
        bytes.zeroize();
        Ok(keypair)
    }

    /// Create a keypair from an existing secret.
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create a keypair from raw 32-byte secret key material.
    ///
    /// Derives the corresponding public key automatically.
    pub fn from_secret_bytes(bytes: [u8; DH_LEN]) -> Self {
        Self::from_secret(SecretKey::from_bytes(bytes))
    }
}

/// A 32-byte pre-shared key.
///
/// Zeroized on drop; compared in constant time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Psk([u8; PSK_LEN]);

impl Psk {
    pub fn from_bytes(bytes: [u8; PSK_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh PSK from the CSPRNG.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, Error> {
        let mut psk = Self([0u8; PSK_LEN]);
        fill_random(rng, &mut psk.0)?;
        Ok(psk)
    }

    pub fn as_bytes(&self) -> &[u8; PSK_LEN] {
        &self.0
    }
}

impl ConstantTimeEq for Psk {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0.ct_eq(&other.0)
    }
}

impl core::fmt::Debug for Psk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Psk([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use rand_core::{OsRng, RngCore};

    use super::*;

    /// An RNG that always reports an entropy failure.
    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand_core::Error> {
            Err(rand_core::Error::new("entropy source unavailable"))
        }
    }

    impl rand_core::CryptoRng for BrokenRng {}

    #[test]
    fn from_secret_bytes_derives_public_key() {
        let bytes = [42u8; 32];
        let kp = KeyPair::from_secret_bytes(bytes);
        assert_eq!(*kp.public.as_bytes(), x25519::scalarmult_base(&bytes));
        assert_eq!(kp.secret.to_bytes(), bytes);
    }

    #[test]
    fn dh_is_symmetric() {
        let a = KeyPair::generate(&mut OsRng).unwrap();
        let b = KeyPair::generate(&mut OsRng).unwrap();
        let ab = a.secret.diffie_hellman(&b.public).unwrap();
        let ba = b.secret.diffie_hellman(&a.public).unwrap();
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn generate_fails_closed_on_rng_failure() {
        assert!(matches!(KeyPair::generate(&mut BrokenRng), Err(Error::Rng)));
        assert!(matches!(Psk::generate(&mut BrokenRng), Err(Error::Rng)));
    }

    #[test]
    fn psk_constant_time_eq() {
        let a = Psk::from_bytes([1u8; PSK_LEN]);
        let b = Psk::from_bytes([1u8; PSK_LEN]);
        let c = Psk::from_bytes([2u8; PSK_LEN]);
        assert!(bool::from(a.ct_eq(&b)));
        assert!(!bool::from(a.ct_eq(&c)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let psk = Psk::from_bytes([0xAB; PSK_LEN]);
        assert_eq!(format!("{psk:?}"), "Psk([REDACTED])");
        let sk = SecretKey::from_bytes([0xAB; 32]);
        assert_eq!(format!("{sk:?}"), "SecretKey([REDACTED])");
    }
}
