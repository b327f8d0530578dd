//! Cryptographic primitives for the Noise NNpsk0 handshake.
//!
//! - [`blake3`]: BLAKE3 tree hash with extendable output
//! - [`hash`]: transcript hashing and key derivation over BLAKE3
//! - [`field`] / [`x25519`]: Curve25519 field arithmetic and Diffie-Hellman
//! - [`aegis128l`] / [`aead`]: AEGIS-128L and the in-place AEAD API

pub mod aead;
pub mod aegis128l;
pub mod blake3;
pub mod field;
pub mod hash;
pub mod x25519;
