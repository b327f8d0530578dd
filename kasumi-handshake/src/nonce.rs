//! The per-key message counter.
//!
//! A nonce is a 64-bit counter. On the wire of the AEAD it occupies the first
//! eight bytes of the 16-byte AEGIS-128L nonce, little-endian, followed by
//! eight zero bytes. For one key a given value may be used at most once.

use crate::crypto::aead::AEAD_NONCE_LEN;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nonce(u64);

impl Nonce {
    pub const ZERO: Self = Self(0);
    /// Reserved for [`crate::crypto::aead::rekey`]; never used for messages.
    pub const MAX: Self = Self(u64::MAX);

    pub const fn from_u64(n: u64) -> Self {
        Self(n)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The 16-byte AEAD nonce: LE counter, then zero padding.
    pub fn to_bytes(self) -> [u8; AEAD_NONCE_LEN] {
        let mut bytes = [0u8; AEAD_NONCE_LEN];
        bytes[..8].copy_from_slice(&self.0.to_le_bytes());
        bytes
    }

    /// Inverse of [`Nonce::to_bytes`]. Returns `None` if the padding is not zero.
    pub fn from_bytes(bytes: &[u8; AEAD_NONCE_LEN]) -> Option<Self> {
        if bytes[8..].iter().any(|&b| b != 0) {
            return None;
        }
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&bytes[..8]);
        Some(Self(u64::from_le_bytes(counter)))
    }

    /// The following nonce, or `None` once the next value would be the
    /// reserved [`Nonce::MAX`].
    pub fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(n) if n != u64::MAX => Some(Self(n)),
            _ => None,
        }
    }

    pub fn is_reserved(self) -> bool {
        self == Self::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_inc() {
        let nonce = Nonce::ZERO;
        assert_eq!([0u8; 16], nonce.to_bytes());

        let next = nonce.next().unwrap();
        let mut expected = [0u8; 16];
        expected[0] = 1;
        assert_eq!(expected, next.to_bytes());

        let next = next.next().unwrap();
        expected[0] = 2;
        assert_eq!(expected, next.to_bytes());
    }

    #[test]
    fn final_inc() {
        let last = Nonce::from_u64(u64::MAX - 1);
        assert!(last.next().is_none());
        assert!(!last.is_reserved());
        assert!(Nonce::MAX.is_reserved());
    }

    #[test]
    fn le_construction() {
        let ref_array = [44, 46, 42, 89, 12, 19, 13, 121];
        let ref_num = u64::from_le_bytes(ref_array);
        let bytes = Nonce::from_u64(ref_num).to_bytes();
        assert_eq!(bytes[..8], ref_array);
        assert_eq!(bytes[8..], [0u8; 8]);
        assert_eq!(Nonce::from_bytes(&bytes), Some(Nonce::from_u64(ref_num)));
    }

    #[test]
    fn from_bytes_rejects_padding() {
        let mut bytes = [0u8; 16];
        bytes[15] = 1;
        assert_eq!(Nonce::from_bytes(&bytes), None);
    }
}
