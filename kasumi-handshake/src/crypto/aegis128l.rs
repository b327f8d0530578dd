//! AEGIS-128L authenticated encryption.
//!
//! The state is eight 128-bit lanes. Each update feeds two 16-byte message
//! words through one AES round per lane, so data is absorbed 32 bytes at a
//! time. The AES round comes from `aes::hazmat`, which uses AES-NI / ARMv8
//! crypto instructions when the CPU has them.

use aes::Block;
use aes::hazmat::cipher_round;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Error;

/// Key length in bytes.
pub const KEY_LEN: usize = 16;
/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;
/// Tag length in bytes.
pub const TAG_LEN: usize = 16;
/// Bytes absorbed per state update.
const RATE: usize = 32;

const C0: Lane = Lane([
    0x00, 0x01, 0x01, 0x02, 0x03, 0x05, 0x08, 0x0d, 0x15, 0x22, 0x37, 0x59, 0x90, 0xe9, 0x79, 0x62,
]);
const C1: Lane = Lane([
    0xdb, 0x3d, 0x18, 0x55, 0x6d, 0xc2, 0x2f, 0xf1, 0x20, 0x11, 0x31, 0x42, 0x73, 0xb5, 0x28, 0xdd,
]);

/// One 128-bit state lane.
#[derive(Clone, Copy, Default, Zeroize)]
struct Lane([u8; 16]);

impl Lane {
    fn from_slice(bytes: &[u8]) -> Self {
        let mut lane = [0u8; 16];
        lane.copy_from_slice(bytes);
        Self(lane)
    }

    fn xor(self, other: Self) -> Self {
        let mut out = self.0;
        for (o, b) in out.iter_mut().zip(other.0.iter()) {
            *o ^= b;
        }
        Self(out)
    }

    fn and(self, other: Self) -> Self {
        let mut out = self.0;
        for (o, b) in out.iter_mut().zip(other.0.iter()) {
            *o &= b;
        }
        Self(out)
    }

    /// `MixColumns(ShiftRows(SubBytes(self))) ^ round_key`.
    fn aes_round(self, round_key: Self) -> Self {
        let mut block = Block::from(self.0);
        cipher_round(&mut block, &Block::from(round_key.0));
        Self(block.into())
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct State {
    lanes: [Lane; 8],
}

impl State {
    fn new(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        let key = Lane(*key);
        let nonce = Lane(*nonce);
        let key_nonce = key.xor(nonce);
        let mut state = Self {
            lanes: [
                key_nonce,
                C1,
                C0,
                C1,
                key_nonce,
                key.xor(C0),
                key.xor(C1),
                key.xor(C0),
            ],
        };
        for _ in 0..10 {
            state.update(nonce, key);
        }
        state
    }

    fn update(&mut self, m0: Lane, m1: Lane) {
        let s = &self.lanes;
        let next = [
            s[7].aes_round(s[0].xor(m0)),
            s[0].aes_round(s[1]),
            s[1].aes_round(s[2]),
            s[2].aes_round(s[3]),
            s[3].aes_round(s[4].xor(m1)),
            s[4].aes_round(s[5]),
            s[5].aes_round(s[6]),
            s[6].aes_round(s[7]),
        ];
        self.lanes = next;
    }

    fn update_block(&mut self, block: &[u8; RATE]) {
        self.update(Lane::from_slice(&block[..16]), Lane::from_slice(&block[16..]));
    }

    /// The 32-byte keystream for the next block.
    fn keystream(&self) -> [u8; RATE] {
        let s = &self.lanes;
        let z0 = s[6].xor(s[1]).xor(s[2].and(s[3]));
        let z1 = s[2].xor(s[5]).xor(s[6].and(s[7]));
        let mut out = [0u8; RATE];
        out[..16].copy_from_slice(&z0.0);
        out[16..].copy_from_slice(&z1.0);
        out
    }

    fn absorb(&mut self, ad: &[u8]) {
        let mut blocks = ad.chunks_exact(RATE);
        for block in &mut blocks {
            self.update(Lane::from_slice(&block[..16]), Lane::from_slice(&block[16..]));
        }
        let rest = blocks.remainder();
        if !rest.is_empty() {
            let mut padded = [0u8; RATE];
            padded[..rest.len()].copy_from_slice(rest);
            self.update_block(&padded);
        }
    }

    /// Encrypt one block of at most 32 bytes in place.
    ///
    /// A short block is zero-padded before it is fed back into the state, so
    /// the state only ever absorbs the real plaintext followed by zeros.
    fn encrypt_block(&mut self, chunk: &mut [u8]) {
        let mut z = self.keystream();
        let mut padded = [0u8; RATE];
        padded[..chunk.len()].copy_from_slice(chunk);
        for (c, (p, k)) in chunk.iter_mut().zip(padded.iter().zip(z.iter())) {
            *c = p ^ k;
        }
        self.update_block(&padded);
        padded.zeroize();
        z.zeroize();
    }

    /// Decrypt one block of at most 32 bytes in place.
    ///
    /// For a short block the keystream bytes past the ciphertext are dropped
    /// (zeroed) before the recovered plaintext is absorbed, mirroring
    /// `encrypt_block` exactly.
    fn decrypt_block(&mut self, chunk: &mut [u8]) {
        let mut z = self.keystream();
        let mut padded = [0u8; RATE];
        for ((out, c), k) in padded.iter_mut().zip(chunk.iter()).zip(z.iter()) {
            *out = c ^ k;
        }
        chunk.copy_from_slice(&padded[..chunk.len()]);
        self.update_block(&padded);
        padded.zeroize();
        z.zeroize();
    }

    fn finalize(mut self, ad_len: usize, msg_len: usize) -> [u8; TAG_LEN] {
        let mut lengths = [0u8; 16];
        lengths[..8].copy_from_slice(&((ad_len as u64) << 3).to_le_bytes());
        lengths[8..].copy_from_slice(&((msg_len as u64) << 3).to_le_bytes());
        let t = self.lanes[2].xor(Lane(lengths));
        for _ in 0..7 {
            self.update(t, t);
        }

        let tag = self.lanes[..7]
            .iter()
            .fold(Lane::default(), |acc, lane| acc.xor(*lane));
        tag.0
    }
}

/// Encrypt `buffer` in place and return the detached tag.
pub fn encrypt_detached(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ad: &[u8],
    buffer: &mut [u8],
) -> [u8; TAG_LEN] {
    let mut state = State::new(key, nonce);
    state.absorb(ad);
    for chunk in buffer.chunks_mut(RATE) {
        state.encrypt_block(chunk);
    }
    state.finalize(ad.len(), buffer.len())
}

/// Decrypt `buffer` in place and verify the detached tag.
///
/// On failure the buffer is zeroed, so unauthenticated plaintext is never
/// released, and `Error::CryptoFailed` is returned.
pub fn decrypt_detached(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ad: &[u8],
    buffer: &mut [u8],
    tag: &[u8; TAG_LEN],
) -> Result<(), Error> {
    let mut state = State::new(key, nonce);
    state.absorb(ad);
    for chunk in buffer.chunks_mut(RATE) {
        state.decrypt_block(chunk);
    }
    let mut expected = state.finalize(ad.len(), buffer.len());
    let ok = bool::from(expected.ct_eq(tag));
    expected.zeroize();
    if !ok {
        buffer.zeroize();
        return Err(Error::CryptoFailed);
    }
    Ok(())
}
