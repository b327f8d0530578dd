//! BLAKE3 tree hash with extendable output.
//!
//! Input is split into 1024-byte chunks. Each chunk is compressed block by
//! block into a chaining value, and chaining values are merged pairwise into
//! parent nodes. The hasher keeps the right spine of the tree on a stack whose
//! shape always matches the binary representation of the number of completed
//! chunks. Merging is deferred until more input arrives, so the last node is
//! only compressed in [`Hasher::finalize_seek`], where it receives the `ROOT`
//! flag.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default output length in bytes.
pub const OUT_LEN: usize = 32;
/// Key length for keyed hashing.
pub const KEY_LEN: usize = 32;

const BLOCK_LEN: usize = 64;
const CHUNK_LEN: usize = 1024;
/// Enough for 2^54 chunks, i.e. 2^64 bytes of input.
const MAX_DEPTH: usize = 54;

const CHUNK_START: u32 = 1 << 0;
const CHUNK_END: u32 = 1 << 1;
const PARENT: u32 = 1 << 2;
const ROOT: u32 = 1 << 3;
const KEYED_HASH: u32 = 1 << 4;

const IV: [u32; 8] = [
    0x6A09_E667,
    0xBB67_AE85,
    0x3C6E_F372,
    0xA54F_F53A,
    0x510E_527F,
    0x9B05_688C,
    0x1F83_D9AB,
    0x5BE0_CD19,
];

const MSG_PERMUTATION: [usize; 16] = [2, 6, 3, 10, 7, 0, 4, 13, 1, 11, 12, 5, 9, 14, 15, 8];

#[inline(always)]
fn g(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, mx: u32, my: u32) {
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(mx);
    state[d] = (state[d] ^ state[a]).rotate_right(16);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(12);
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(my);
    state[d] = (state[d] ^ state[a]).rotate_right(8);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(7);
}

#[inline(always)]
fn round(state: &mut [u32; 16], m: &[u32; 16]) {
    // Columns.
    g(state, 0, 4, 8, 12, m[0], m[1]);
    g(state, 1, 5, 9, 13, m[2], m[3]);
    g(state, 2, 6, 10, 14, m[4], m[5]);
    g(state, 3, 7, 11, 15, m[6], m[7]);
    // Diagonals.
    g(state, 0, 5, 10, 15, m[8], m[9]);
    g(state, 1, 6, 11, 12, m[10], m[11]);
    g(state, 2, 7, 8, 13, m[12], m[13]);
    g(state, 3, 4, 9, 14, m[14], m[15]);
}

fn permute(m: &mut [u32; 16]) {
    let mut permuted = [0u32; 16];
    for (dst, &src) in permuted.iter_mut().zip(MSG_PERMUTATION.iter()) {
        *dst = m[src];
    }
    *m = permuted;
}

/// The BLAKE3 compression function: seven rounds over a 16-word state.
fn compress(
    chaining_value: &[u32; 8],
    block_words: &[u32; 16],
    counter: u64,
    block_len: u32,
    flags: u32,
) -> [u32; 16] {
    let mut state = [
        chaining_value[0],
        chaining_value[1],
        chaining_value[2],
        chaining_value[3],
        chaining_value[4],
        chaining_value[5],
        chaining_value[6],
        chaining_value[7],
        IV[0],
        IV[1],
        IV[2],
        IV[3],
        counter as u32,
        (counter >> 32) as u32,
        block_len,
        flags,
    ];
    let mut block = *block_words;

    for r in 0..7 {
        round(&mut state, &block);
        if r < 6 {
            permute(&mut block);
        }
    }
    block.zeroize();

    for i in 0..8 {
        state[i] ^= state[i + 8];
        state[i + 8] ^= chaining_value[i];
    }
    state
}

fn first_8_words(words: [u32; 16]) -> [u32; 8] {
    let mut out = [0u32; 8];
    out.copy_from_slice(&words[..8]);
    out
}

fn words_from_le_bytes(bytes: &[u8; BLOCK_LEN]) -> [u32; 16] {
    let mut words = [0u32; 16];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

fn key_words(key: &[u8; KEY_LEN]) -> [u32; 8] {
    let mut words = [0u32; 8];
    for (word, chunk) in words.iter_mut().zip(key.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// A not-yet-compressed node: either the last chunk block or a parent.
///
/// Compressing it with the `ROOT` flag and an incrementing counter yields the
/// extendable output stream.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct Output {
    input_chaining_value: [u32; 8],
    block_words: [u32; 16],
    counter: u64,
    block_len: u32,
    flags: u32,
}

impl Output {
    fn chaining_value(&self) -> [u32; 8] {
        first_8_words(compress(
            &self.input_chaining_value,
            &self.block_words,
            self.counter,
            self.block_len,
            self.flags,
        ))
    }

    fn root_output_block(&self, output_block_counter: u64) -> [u8; BLOCK_LEN] {
        let mut words = compress(
            &self.input_chaining_value,
            &self.block_words,
            output_block_counter,
            self.block_len,
            self.flags | ROOT,
        );
        let mut block = [0u8; BLOCK_LEN];
        for (chunk, word) in block.chunks_exact_mut(4).zip(words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        words.zeroize();
        block
    }

    fn root_output_bytes(&self, offset: u64, out: &mut [u8]) {
        let mut counter = offset / BLOCK_LEN as u64;
        let mut skip = (offset % BLOCK_LEN as u64) as usize;
        let mut written = 0;
        while written < out.len() {
            let mut block = self.root_output_block(counter);
            let available = &block[skip..];
            let take = available.len().min(out.len() - written);
            out[written..written + take].copy_from_slice(&available[..take]);
            block.zeroize();
            written += take;
            skip = 0;
            counter += 1;
        }
    }
}

#[derive(Clone, Zeroize)]
struct ChunkState {
    chaining_value: [u32; 8],
    chunk_counter: u64,
    block: [u8; BLOCK_LEN],
    block_len: u8,
    blocks_compressed: u8,
    flags: u32,
}

impl ChunkState {
    fn new(key_words: [u32; 8], chunk_counter: u64, flags: u32) -> Self {
        Self {
            chaining_value: key_words,
            chunk_counter,
            block: [0u8; BLOCK_LEN],
            block_len: 0,
            blocks_compressed: 0,
            flags,
        }
    }

    fn len(&self) -> usize {
        BLOCK_LEN * self.blocks_compressed as usize + self.block_len as usize
    }

    fn start_flag(&self) -> u32 {
        if self.blocks_compressed == 0 {
            CHUNK_START
        } else {
            0
        }
    }

    fn update(&mut self, mut input: &[u8]) {
        while !input.is_empty() {
            // A full buffered block is only compressed once more input shows
            // it is not the last block of the chunk.
            if self.block_len as usize == BLOCK_LEN {
                let mut block_words = words_from_le_bytes(&self.block);
                self.chaining_value = first_8_words(compress(
                    &self.chaining_value,
                    &block_words,
                    self.chunk_counter,
                    BLOCK_LEN as u32,
                    self.flags | self.start_flag(),
                ));
                block_words.zeroize();
                self.blocks_compressed += 1;
                self.block.zeroize();
                self.block_len = 0;
            }

            let want = BLOCK_LEN - self.block_len as usize;
            let take = want.min(input.len());
            let start = self.block_len as usize;
            self.block[start..start + take].copy_from_slice(&input[..take]);
            self.block_len += take as u8;
            input = &input[take..];
        }
    }

    fn output(&self) -> Output {
        Output {
            input_chaining_value: self.chaining_value,
            block_words: words_from_le_bytes(&self.block),
            counter: self.chunk_counter,
            block_len: self.block_len as u32,
            flags: self.flags | self.start_flag() | CHUNK_END,
        }
    }
}

fn parent_output(
    left_child_cv: [u32; 8],
    right_child_cv: [u32; 8],
    key_words: [u32; 8],
    flags: u32,
) -> Output {
    let mut block_words = [0u32; 16];
    block_words[..8].copy_from_slice(&left_child_cv);
    block_words[8..].copy_from_slice(&right_child_cv);
    Output {
        input_chaining_value: key_words,
        block_words,
        counter: 0,
        block_len: BLOCK_LEN as u32,
        flags: PARENT | flags,
    }
}

fn parent_cv(
    left_child_cv: [u32; 8],
    right_child_cv: [u32; 8],
    key_words: [u32; 8],
    flags: u32,
) -> [u32; 8] {
    parent_output(left_child_cv, right_child_cv, key_words, flags).chaining_value()
}

/// An incremental BLAKE3 hasher.
///
/// `update` may be called any number of times with any chunking. Finalizing
/// does not consume the hasher, so several output windows can be read from
/// the same input with [`Hasher::finalize_seek`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Hasher {
    chunk_state: ChunkState,
    key_words: [u32; 8],
    cv_stack: [[u32; 8]; MAX_DEPTH],
    cv_stack_len: u8,
    flags: u32,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    fn new_internal(key_words: [u32; 8], flags: u32) -> Self {
        Self {
            chunk_state: ChunkState::new(key_words, 0, flags),
            key_words,
            cv_stack: [[0u32; 8]; MAX_DEPTH],
            cv_stack_len: 0,
            flags,
        }
    }

    /// Create a hasher for the default (unkeyed) mode.
    pub fn new() -> Self {
        Self::new_internal(IV, 0)
    }

    /// Create a hasher for keyed (MAC / PRF) mode.
    pub fn new_keyed(key: &[u8; KEY_LEN]) -> Self {
        Self::new_internal(key_words(key), KEYED_HASH)
    }

    fn push_stack(&mut self, cv: [u32; 8]) {
        self.cv_stack[self.cv_stack_len as usize] = cv;
        self.cv_stack_len += 1;
    }

    fn pop_stack(&mut self) -> [u32; 8] {
        self.cv_stack_len -= 1;
        let cv = self.cv_stack[self.cv_stack_len as usize];
        self.cv_stack[self.cv_stack_len as usize].zeroize();
        cv
    }

    // Each trailing zero bit of `total_chunks` is one completed subtree on the
    // stack that can now be merged with the new chaining value.
    fn add_chunk_chaining_value(&mut self, mut new_cv: [u32; 8], mut total_chunks: u64) {
        while total_chunks & 1 == 0 {
            new_cv = parent_cv(self.pop_stack(), new_cv, self.key_words, self.flags);
            total_chunks >>= 1;
        }
        self.push_stack(new_cv);
    }

    /// Absorb more input.
    pub fn update(&mut self, mut input: &[u8]) -> &mut Self {
        while !input.is_empty() {
            if self.chunk_state.len() == CHUNK_LEN {
                let chunk_cv = self.chunk_state.output().chaining_value();
                let total_chunks = self.chunk_state.chunk_counter + 1;
                self.add_chunk_chaining_value(chunk_cv, total_chunks);
                self.chunk_state = ChunkState::new(self.key_words, total_chunks, self.flags);
            }

            let want = CHUNK_LEN - self.chunk_state.len();
            let take = want.min(input.len());
            self.chunk_state.update(&input[..take]);
            input = &input[take..];
        }
        self
    }

    fn root_output(&self) -> Output {
        let mut output = self.chunk_state.output();
        let mut parent_nodes_remaining = self.cv_stack_len as usize;
        while parent_nodes_remaining > 0 {
            parent_nodes_remaining -= 1;
            output = parent_output(
                self.cv_stack[parent_nodes_remaining],
                output.chaining_value(),
                self.key_words,
                self.flags,
            );
        }
        output
    }

    /// The default 32-byte digest.
    pub fn finalize(&self) -> [u8; OUT_LEN] {
        let mut out = [0u8; OUT_LEN];
        self.finalize_seek(0, &mut out);
        out
    }

    /// Fill `out` with the output stream starting at byte `offset`.
    ///
    /// Reading `n` bytes at offset `k` yields exactly bytes `k..k + n` of the
    /// unbounded output. An empty `out` is a no-op.
    pub fn finalize_seek(&self, offset: u64, out: &mut [u8]) {
        if out.is_empty() {
            return;
        }
        self.root_output().root_output_bytes(offset, out);
    }

    /// An incremental reader over the output stream.
    pub fn finalize_xof(&self) -> OutputReader {
        OutputReader {
            output: self.root_output(),
            position: 0,
        }
    }
}

/// Sequential reader over a finalized hash's extendable output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OutputReader {
    output: Output,
    position: u64,
}

impl OutputReader {
    /// Fill `buf` with the next bytes of output.
    pub fn fill(&mut self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        self.output.root_output_bytes(self.position, buf);
        self.position += buf.len() as u64;
    }

    /// Current byte offset into the output stream.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move to an absolute byte offset.
    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_hash(input: &[u8]) -> String {
        hex::encode(Hasher::new().update(input).finalize())
    }

    #[test]
    fn empty_input_vector() {
        assert_eq!(
            hex_hash(b""),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn abc_vector() {
        assert_eq!(
            hex_hash(b"abc"),
            "6437b3ac38465133ffb63b75273a8db548c558465d79db03fd359c6cd5bd9d85"
        );
    }

    #[test]
    fn chunk_boundaries_match_reference() {
        // Lengths around block, chunk and multi-level tree boundaries.
        for len in [
            0usize, 1, 63, 64, 65, 1023, 1024, 1025, 2048, 2049, 3072, 3073, 4096, 4097, 5120,
            8192, 8193, 16384, 31744, 102400,
        ] {
            let input: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let ours = Hasher::new().update(&input).finalize();
            let reference = ::blake3::hash(&input);
            assert_eq!(&ours, reference.as_bytes(), "length {len}");
        }
    }

    #[test]
    fn keyed_matches_reference() {
        let key = *b"whats the Elvish word for friend";
        let input: Vec<u8> = (0..5000).map(|i| (i % 251) as u8).collect();
        let ours = Hasher::new_keyed(&key).update(&input).finalize();
        let reference = ::blake3::keyed_hash(&key, &input);
        assert_eq!(&ours, reference.as_bytes());
    }

    #[test]
    fn split_updates_equal_single_update() {
        let input: Vec<u8> = (0..3000).map(|i| (i * 7) as u8).collect();
        let whole = Hasher::new().update(&input).finalize();

        let mut pieces = Hasher::new();
        for piece in input.chunks(37) {
            pieces.update(piece);
        }
        assert_eq!(pieces.finalize(), whole);
    }

    #[test]
    fn update_is_order_sensitive() {
        let ab = Hasher::new().update(b"a").update(b"b").finalize();
        let ba = Hasher::new().update(b"b").update(b"a").finalize();
        assert_ne!(ab, ba);
    }

    #[test]
    fn extended_output_matches_reference() {
        let mut ours = [0u8; 300];
        Hasher::new().update(b"xof").finalize_seek(0, &mut ours);

        let mut reference = [0u8; 300];
        ::blake3::Hasher::new()
            .update(b"xof")
            .finalize_xof()
            .fill(&mut reference);
        assert_eq!(ours, reference);
    }

    #[test]
    fn seek_reads_the_same_stream() {
        let hasher = {
            let mut h = Hasher::new();
            h.update(b"seek test");
            h
        };
        let mut full = [0u8; 200];
        hasher.finalize_seek(0, &mut full);

        for offset in [0u64, 1, 31, 32, 63, 64, 65, 130] {
            let mut window = [0u8; 40];
            hasher.finalize_seek(offset, &mut window);
            let start = offset as usize;
            assert_eq!(&window[..], &full[start..start + 40], "offset {offset}");
        }
    }

    #[test]
    fn finalize_does_not_consume() {
        let mut hasher = Hasher::new();
        hasher.update(b"first");
        let a = hasher.finalize();
        let b = hasher.finalize();
        assert_eq!(a, b);

        hasher.update(b"second");
        assert_eq!(hasher.finalize(), Hasher::new().update(b"firstsecond").finalize());
    }

    #[test]
    fn zero_length_output_is_noop() {
        let hasher = Hasher::new();
        hasher.finalize_seek(12345, &mut []);
        let mut reader = hasher.finalize_xof();
        reader.fill(&mut []);
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn output_reader_tracks_position() {
        let hasher = {
            let mut h = Hasher::new();
            h.update(b"reader");
            h
        };
        let mut reader = hasher.finalize_xof();
        let mut a = [0u8; 10];
        let mut b = [0u8; 90];
        reader.fill(&mut a);
        reader.fill(&mut b);
        assert_eq!(reader.position(), 100);

        let mut whole = [0u8; 100];
        hasher.finalize_seek(0, &mut whole);
        assert_eq!(&whole[..10], &a);
        assert_eq!(&whole[10..], &b);

        reader.set_position(10);
        let mut again = [0u8; 90];
        reader.fill(&mut again);
        assert_eq!(again, b);
    }
}
