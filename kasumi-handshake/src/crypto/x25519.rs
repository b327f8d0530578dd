use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::field::FieldElement;
use crate::error::Error;

/// DH output length in bytes (X25519 = 32).
pub const DH_LEN: usize = 32;

/// The Curve25519 base point, u = 9.
pub const BASEPOINT: [u8; 32] = {
    let mut p = [0u8; 32];
    p[0] = 9;
    p
};

/// A shared secret resulting from a Diffie-Hellman operation.
///
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; DH_LEN]);

impl core::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

impl SharedSecret {
    /// Access the raw 32-byte shared secret.
    pub fn as_bytes(&self) -> &[u8; DH_LEN] {
        &self.0
    }
}

/// Clamp a scalar per RFC 7748: clear the low 3 bits, clear bit 255, set bit 254.
pub fn clamp(scalar: &[u8; 32]) -> [u8; 32] {
    let mut z = *scalar;
    z[0] &= 248;
    z[31] = (z[31] & 127) | 64;
    z
}

/// X25519 scalar multiplication: the u-coordinate of `scalar * point`.
///
/// Montgomery ladder over all 255 scalar bits. Every step performs the same
/// field operations and a branch-free conditional swap, so timing does not
/// depend on the scalar.
pub fn scalarmult(scalar: &[u8; 32], point: &[u8; 32]) -> [u8; 32] {
    let mut z = clamp(scalar);
    let x1 = FieldElement::from_bytes(point);

    let mut x2 = FieldElement::ONE;
    let mut z2 = FieldElement::ZERO;
    let mut x3 = x1;
    let mut z3 = FieldElement::ONE;

    for i in (0..255).rev() {
        let bit = i64::from((z[i >> 3] >> (i & 7)) & 1);
        FieldElement::swap(&mut x2, &mut x3, bit);
        FieldElement::swap(&mut z2, &mut z3, bit);

        let a = x2 + z2;
        let b = x2 - z2;
        let c = x3 + z3;
        let d = x3 - z3;
        let aa = a.square();
        let bb = b.square();
        let da = d * a;
        let cb = c * b;
        let e = aa - bb;

        x3 = (da + cb).square();
        z3 = x1 * (da - cb).square();
        x2 = aa * bb;
        z2 = e * (aa + FieldElement::A24 * e);

        FieldElement::swap(&mut x2, &mut x3, bit);
        FieldElement::swap(&mut z2, &mut z3, bit);
    }

    let out = (x2 * z2.invert()).to_bytes();

    z.zeroize();
    x2.zeroize();
    z2.zeroize();
    x3.zeroize();
    z3.zeroize();
    out
}

/// Derive the public key for a secret scalar: `scalar * 9`.
pub fn scalarmult_base(scalar: &[u8; 32]) -> [u8; 32] {
    scalarmult(scalar, &BASEPOINT)
}

/// Perform DH with a local secret scalar and a remote public key.
///
/// Returns the 32-byte shared secret, or `Error::BadKey` if the
/// result is the all-zeros point (low-order input).
pub fn dh(local_secret: &[u8; 32], remote_public: &[u8; 32]) -> Result<SharedSecret, Error> {
    let shared = SharedSecret(scalarmult(local_secret, remote_public));
    if bool::from(shared.0.ct_eq(&[0u8; DH_LEN])) {
        return Err(Error::BadKey);
    }
    Ok(shared)
}
