use zeroize::Zeroizing;

use super::blake3::Hasher;

/// Hash output length (BLAKE3 default digest = 32 bytes).
pub const HASH_LEN: usize = 32;

/// Compute the BLAKE3 hash of input.
pub fn hash(input: &[u8]) -> [u8; HASH_LEN] {
    Hasher::new().update(input).finalize()
}

/// Compute the BLAKE3 hash of two concatenated inputs without allocating.
pub fn hash_two(a: &[u8], b: &[u8]) -> [u8; HASH_LEN] {
    Hasher::new().update(a).update(b).finalize()
}

/// Read the `index`-th 32-byte window of the hasher's output stream.
fn window(hasher: &Hasher, index: u64) -> Zeroizing<[u8; HASH_LEN]> {
    let mut out = Zeroizing::new([0u8; HASH_LEN]);
    hasher.finalize_seek(index * HASH_LEN as u64, out.as_mut_slice());
    out
}

/// Key derivation with 2 outputs.
///
/// Hashes `chaining_key || input_key_material` once and returns the first two
/// disjoint 32-byte windows of the extendable output.
pub fn kdf2(
    chaining_key: &[u8; HASH_LEN],
    input_key_material: &[u8],
) -> (Zeroizing<[u8; HASH_LEN]>, Zeroizing<[u8; HASH_LEN]>) {
    let mut hasher = Hasher::new();
    hasher.update(chaining_key).update(input_key_material);
    (window(&hasher, 0), window(&hasher, 1))
}

/// Three zeroized key derivation outputs.
pub type KdfOutput3 = (
    Zeroizing<[u8; HASH_LEN]>,
    Zeroizing<[u8; HASH_LEN]>,
    Zeroizing<[u8; HASH_LEN]>,
);

/// Key derivation with 3 outputs, used when mixing the PSK.
pub fn kdf3(chaining_key: &[u8; HASH_LEN], input_key_material: &[u8]) -> KdfOutput3 {
    let mut hasher = Hasher::new();
    hasher.update(chaining_key).update(input_key_material);
    (window(&hasher, 0), window(&hasher, 1), window(&hasher, 2))
}
