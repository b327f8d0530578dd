//! Arithmetic in GF(2^255 - 19).
//!
//! Elements are sixteen signed 64-bit limbs of nominally 16 bits each
//! (radix 2^16). Limbs may temporarily exceed 16 bits between carries; every
//! operation here is branch-free with respect to limb values.

use core::ops::{Add, Mul, Sub};

use zeroize::Zeroize;

/// A field element, little-endian limbs in radix 2^16.
#[derive(Clone, Copy, Default, Zeroize)]
pub struct FieldElement([i64; 16]);

impl FieldElement {
    pub const ZERO: Self = Self([0; 16]);
    pub const ONE: Self = Self([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    /// (A - 2) / 4 for Curve25519, A = 486662.
    pub const A24: Self = Self([0xDB41, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    /// Decode 32 little-endian bytes, ignoring the top bit.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0i64; 16];
        for (i, limb) in limbs.iter_mut().enumerate() {
            *limb = i64::from(bytes[2 * i]) | (i64::from(bytes[2 * i + 1]) << 8);
        }
        limbs[15] &= 0x7fff;
        Self(limbs)
    }

    /// Encode as 32 little-endian bytes, fully reduced mod p.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut t = *self;
        t.carry();
        t.carry();
        t.carry();

        // Two conditional subtractions of p bring t into [0, p).
        for _ in 0..2 {
            let mut m = [0i64; 16];
            m[0] = t.0[0] - 0xffed;
            for i in 1..15 {
                m[i] = t.0[i] - 0xffff - ((m[i - 1] >> 16) & 1);
                m[i - 1] &= 0xffff;
            }
            m[15] = t.0[15] - 0x7fff - ((m[14] >> 16) & 1);
            let borrow = (m[15] >> 16) & 1;
            m[14] &= 0xffff;
            let mut m = Self(m);
            // No borrow means t >= p, so keep the subtracted value.
            Self::swap(&mut t, &mut m, 1 - borrow);
            m.zeroize();
        }

        let mut out = [0u8; 32];
        for (i, limb) in t.0.iter().enumerate() {
            out[2 * i] = (limb & 0xff) as u8;
            out[2 * i + 1] = ((limb >> 8) & 0xff) as u8;
        }
        t.zeroize();
        out
    }

    /// Propagate carries so each limb returns to 16 bits.
    ///
    /// The carry out of the top limb wraps around multiplied by 38,
    /// since 2^256 = 38 (mod p).
    fn carry(&mut self) {
        for i in 0..16 {
            let c = self.0[i] >> 16;
            self.0[i] &= 0xffff;
            if i < 15 {
                self.0[i + 1] += c;
            } else {
                self.0[0] += 38 * c;
            }
        }
    }

    /// Swap `a` and `b` when `bit == 1`, leave them when `bit == 0`.
    ///
    /// Branch-free: the same instructions execute for either value of `bit`.
    pub fn swap(a: &mut Self, b: &mut Self, bit: i64) {
        let mask = !(bit - 1);
        for (x, y) in a.0.iter_mut().zip(b.0.iter_mut()) {
            let t = mask & (*x ^ *y);
            *x ^= t;
            *y ^= t;
        }
    }

    pub fn square(&self) -> Self {
        *self * *self
    }

    /// Multiplicative inverse via Fermat: self^(p - 2).
    pub fn invert(&self) -> Self {
        let mut c = *self;
        // p - 2 = 2^255 - 21: every bit set except bits 2 and 4.
        for bit in (0..254).rev() {
            c = c.square();
            if bit != 2 && bit != 4 {
                c = c * *self;
            }
        }
        c
    }
}

impl Add for FieldElement {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let mut out = [0i64; 16];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(rhs.0.iter())) {
            *o = a + b;
        }
        Self(out)
    }
}

impl Sub for FieldElement {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let mut out = [0i64; 16];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(rhs.0.iter())) {
            *o = a - b;
        }
        Self(out)
    }
}

impl Mul for FieldElement {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut t = [0i64; 31];
        for i in 0..16 {
            for j in 0..16 {
                t[i + j] += self.0[i] * rhs.0[j];
            }
        }
        // Fold the high half back: 2^256 = 38 (mod p).
        for i in 0..15 {
            t[i] += 38 * t[i + 16];
        }
        let mut out = Self::ZERO;
        out.0.copy_from_slice(&t[..16]);
        t.zeroize();
        out.carry();
        out.carry();
        out
    }
}

impl PartialEq for FieldElement {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.to_bytes().ct_eq(&other.to_bytes()).into()
    }
}

impl Eq for FieldElement {}

impl core::fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FieldElement([REDACTED])")
    }
}
