use zeroize::Zeroize;

use crate::cipher_state::CipherState;
use crate::crypto::aead::AEAD_TAG_LEN;
use crate::crypto::hash::HASH_LEN;
use crate::error::Error;
use crate::fragment::{Fragmenter, Reassembler};
use crate::framing::{self, Frame, FrameHeader, FrameKind, PREFIX_LEN};
use crate::nonce::Nonce;
use crate::replay::{REPLAY_WINDOW_LEN, ReplayWindow};

/// A transport frame that authenticated, as seen by [`TransportState::read_fragment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedFragment {
    /// Plaintext bytes written to the output buffer.
    pub len: usize,
    /// Byte offset of this fragment within its message.
    pub offset: u32,
    /// Whether this is the final fragment of the message.
    pub last: bool,
    /// The sender's full counter for this frame.
    pub counter: u64,
}

/// Post-handshake transport encryption state.
///
/// `ours` encrypts outgoing frames, `theirs` decrypts incoming ones. The
/// initiator's `ours` is the responder's `theirs` and vice versa.
///
/// Frames may arrive out of order; each counter is accepted at most once
/// within a window of [`REPLAY_WINDOW_LEN`]. A frame that fails to
/// authenticate poisons the state: every later call returns
/// [`Error::WrongState`].
pub struct TransportState {
    ours: CipherState,
    theirs: CipherState,
    handshake_hash: [u8; HASH_LEN],
    replay: ReplayWindow<REPLAY_WINDOW_LEN>,
    max_message_len: usize,
    failed: bool,
}

impl Drop for TransportState {
    fn drop(&mut self) {
        self.handshake_hash.zeroize();
    }
}

impl TransportState {
    pub(crate) fn new(
        handshake_hash: [u8; HASH_LEN],
        ours: CipherState,
        theirs: CipherState,
        max_message_len: usize,
    ) -> Self {
        Self {
            ours,
            theirs,
            handshake_hash,
            replay: ReplayWindow::new(),
            max_message_len,
            failed: false,
        }
    }

    fn ensure_usable(&self) -> Result<(), Error> {
        if self.failed {
            Err(Error::WrongState)
        } else {
            Ok(())
        }
    }

    /// Encrypt a payload as a single data frame.
    ///
    /// Returns the number of bytes written to `out`, which must hold at
    /// least `payload.len() + overhead()` bytes.
    pub fn write_message(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        self.ensure_usable()?;
        if payload.len() > self.max_message_len {
            return Err(Error::MessageTooLarge);
        }
        self.write_frame(FrameKind::Data, 0, payload, out)
    }

    /// Encrypt a payload as one or more frames of at most `max_fragment`
    /// plaintext bytes each.
    pub fn write_fragments(
        &mut self,
        payload: &[u8],
        max_fragment: usize,
    ) -> Result<Vec<Vec<u8>>, Error> {
        self.ensure_usable()?;
        if payload.len() > self.max_message_len {
            return Err(Error::MessageTooLarge);
        }
        let fragments = Fragmenter::new(payload, max_fragment)?;
        let mut frames = Vec::with_capacity(Fragmenter::fragment_count(payload.len(), max_fragment));
        for fragment in fragments {
            let kind = if fragment.last {
                FrameKind::Data
            } else {
                FrameKind::DataMore
            };
            let mut frame = vec![0u8; fragment.data.len() + self.overhead()];
            let len = self.write_frame(kind, fragment.offset, fragment.data, &mut frame)?;
            frame.truncate(len);
            frames.push(frame);
        }
        Ok(frames)
    }

    fn write_frame(
        &mut self,
        kind: FrameKind,
        offset: u32,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<usize, Error> {
        let declared_len = u32::try_from(payload.len()).map_err(|_| Error::MessageTooLarge)?;
        let total = payload
            .len()
            .checked_add(self.overhead())
            .ok_or(Error::BufferTooSmall)?;
        if out.len() < total {
            return Err(Error::BufferTooSmall);
        }

        let counter = self.ours.nonce();
        if counter.is_reserved() {
            return Err(Error::NonceExhausted);
        }
        let header = FrameHeader::new(kind, counter.as_u64());
        framing::write_prefix(&header, offset, out)?;
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&out[..PREFIX_LEN]);
        let ad = framing::transport_ad(&prefix, declared_len);

        let len = self
            .ours
            .encrypt_with_ad(&ad, payload, &mut out[PREFIX_LEN..])?;
        Ok(PREFIX_LEN + len)
    }

    /// Decrypt a single-frame message received from the peer.
    ///
    /// Returns the number of plaintext bytes written to `out`. Fragments of
    /// larger messages are refused with [`Error::BadMessage`]; use
    /// [`TransportState::read_fragment`] for those.
    pub fn read_message(&mut self, message: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        self.ensure_usable()?;
        let frame = Frame::parse(message)?;
        if frame.header.kind != FrameKind::Data || frame.offset != 0 {
            return Err(Error::BadMessage);
        }
        Ok(self.open(&frame, out)?.len)
    }

    /// Decrypt any data frame, including non-final fragments.
    pub fn read_fragment(
        &mut self,
        message: &[u8],
        out: &mut [u8],
    ) -> Result<ReceivedFragment, Error> {
        self.ensure_usable()?;
        let frame = Frame::parse(message)?;
        self.open(&frame, out)
    }

    fn open(&mut self, frame: &Frame<'_>, out: &mut [u8]) -> Result<ReceivedFragment, Error> {
        if !frame.header.kind.is_data() || frame.body.len() < AEAD_TAG_LEN {
            return Err(Error::BadMessage);
        }
        let plaintext_len = frame.body.len() - AEAD_TAG_LEN;
        if plaintext_len > self.max_message_len {
            return Err(Error::MessageTooLarge);
        }
        let declared_len = u32::try_from(plaintext_len).map_err(|_| Error::MessageTooLarge)?;
        if out.len() < plaintext_len {
            return Err(Error::BufferTooSmall);
        }

        let counter = framing::expand_seq(self.replay.largest(), frame.header.seq);
        if let Err(err) = self.replay.check(counter) {
            tracing::warn!(counter, "dropping replayed transport frame");
            return Err(err);
        }

        let ad = framing::transport_ad(&frame.prefix(), declared_len);
        self.theirs.set_nonce(Nonce::from_u64(counter));
        let len = match self.theirs.decrypt_with_ad(&ad, frame.body, out) {
            Ok(len) => len,
            Err(err) => {
                if err == Error::CryptoFailed {
                    tracing::warn!(counter, "transport frame failed authentication");
                    self.failed = true;
                }
                return Err(err);
            }
        };
        self.replay.update(counter)?;

        Ok(ReceivedFragment {
            len,
            offset: frame.offset,
            last: frame.header.kind == FrameKind::Data,
            counter,
        })
    }

    /// A reassembler bounded by this session's message limit.
    pub fn reassembler(&self) -> Reassembler {
        Reassembler::new(self.max_message_len)
    }

    /// The final handshake hash, a channel binding value.
    ///
    /// Both sides will have the same value after a successful handshake.
    pub fn handshake_hash(&self) -> &[u8; HASH_LEN] {
        &self.handshake_hash
    }

    /// The cipher used for outgoing frames.
    pub fn ours(&self) -> &CipherState {
        &self.ours
    }

    /// The cipher used for incoming frames.
    pub fn theirs(&self) -> &CipherState {
        &self.theirs
    }

    /// Framing and AEAD tag overhead per transport frame.
    pub fn overhead(&self) -> usize {
        PREFIX_LEN + AEAD_TAG_LEN
    }

    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    /// Rekey the sending cipher (Noise §11.3).
    pub fn rekey_ours(&mut self) -> Result<(), Error> {
        self.ours.rekey()
    }

    /// Rekey the receiving cipher (Noise §11.3).
    pub fn rekey_theirs(&mut self) -> Result<(), Error> {
        self.theirs.rekey()
    }
}

impl core::fmt::Debug for TransportState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransportState")
            .field("ours", &self.ours)
            .field("theirs", &self.theirs)
            .field("replay", &self.replay)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aead::AEAD_KEY_LEN;

    fn cipher(key: u8) -> CipherState {
        let mut cs = CipherState::empty();
        cs.initialize_key([key; AEAD_KEY_LEN]);
        cs
    }

    /// Two transports wired back to back, as after a handshake.
    fn pair(max_message_len: usize) -> (TransportState, TransportState) {
        let h = [9u8; HASH_LEN];
        (
            TransportState::new(h, cipher(1), cipher(2), max_message_len),
            TransportState::new(h, cipher(2), cipher(1), max_message_len),
        )
    }

    fn seal(t: &mut TransportState, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; payload.len() + t.overhead()];
        let len = t.write_message(payload, &mut out).unwrap();
        out.truncate(len);
        out
    }

    #[test]
    fn frame_layout() {
        let (mut a, _) = pair(1024);
        let frame = seal(&mut a, b"hello");
        assert_eq!(frame.len(), PREFIX_LEN + 5 + AEAD_TAG_LEN);
        // Data kind, sequence 0, offset 0.
        assert_eq!(frame[..PREFIX_LEN], [0, 0, 0, 0x30, 0, 0, 0, 0]);
        let frame = seal(&mut a, b"again");
        assert_eq!(frame[..PREFIX_LEN], [1, 0, 0, 0x30, 0, 0, 0, 0]);
    }

    #[test]
    fn both_directions() {
        let (mut a, mut b) = pair(1024);
        let mut out = [0u8; 64];

        let frame = seal(&mut a, b"ping");
        let len = b.read_message(&frame, &mut out).unwrap();
        assert_eq!(&out[..len], b"ping");

        let frame = seal(&mut b, b"pong");
        let len = a.read_message(&frame, &mut out).unwrap();
        assert_eq!(&out[..len], b"pong");
    }

    #[test]
    fn out_of_order_then_replay() {
        let (mut a, mut b) = pair(1024);
        let first = seal(&mut a, b"first");
        let second = seal(&mut a, b"second");
        let mut out = [0u8; 64];

        let len = b.read_message(&second, &mut out).unwrap();
        assert_eq!(&out[..len], b"second");
        let len = b.read_message(&first, &mut out).unwrap();
        assert_eq!(&out[..len], b"first");

        assert_eq!(b.read_message(&first, &mut out), Err(Error::Replay));
        assert_eq!(b.read_message(&second, &mut out), Err(Error::Replay));
        // Replays are dropped without killing the session.
        let third = seal(&mut a, b"third");
        assert!(b.read_message(&third, &mut out).is_ok());
    }

    #[test]
    fn header_is_authenticated() {
        let (mut a, mut b) = pair(1024);
        let mut frame = seal(&mut a, b"payload");
        // Claim this is a fragment at a different offset.
        frame[4] = 1;
        let mut out = [0u8; 64];
        assert_eq!(b.read_fragment(&frame, &mut out), Err(Error::CryptoFailed));
    }

    #[test]
    fn auth_failure_is_fatal() {
        let (mut a, mut b) = pair(1024);
        let mut frame = seal(&mut a, b"payload");
        let last = frame.len() - 1;
        frame[last] ^= 1;
        let mut out = [0u8; 64];
        assert_eq!(b.read_message(&frame, &mut out), Err(Error::CryptoFailed));

        let good = seal(&mut a, b"payload");
        assert_eq!(b.read_message(&good, &mut out), Err(Error::WrongState));
        let mut sink = [0u8; 64];
        assert_eq!(b.write_message(b"x", &mut sink), Err(Error::WrongState));
    }

    #[test]
    fn malformed_frames_are_not_fatal() {
        let (mut a, mut b) = pair(1024);
        let mut out = [0u8; 64];
        assert_eq!(b.read_message(&[0u8; 3], &mut out), Err(Error::BadMessage));
        assert_eq!(
            b.read_message(&[0, 0, 0, 0x30, 0, 0, 0, 0, 1, 2], &mut out),
            Err(Error::BadMessage)
        );
        let frame = seal(&mut a, b"still fine");
        assert!(b.read_message(&frame, &mut out).is_ok());
    }

    #[test]
    fn message_limit_enforced() {
        let (mut a, _) = pair(4);
        let mut out = [0u8; 64];
        assert_eq!(a.write_message(b"12345", &mut out), Err(Error::MessageTooLarge));
        assert!(a.write_message(b"1234", &mut out).is_ok());
    }

    #[test]
    fn fragments_reassemble() {
        let (mut a, mut b) = pair(1024);
        let message: Vec<u8> = (0..50u8).collect();
        let frames = a.write_fragments(&message, 16).unwrap();
        assert_eq!(frames.len(), 4);

        let mut reassembler = b.reassembler();
        let mut result = None;
        let mut out = [0u8; 16];
        for frame in &frames {
            let got = b.read_fragment(frame, &mut out).unwrap();
            result = reassembler.push(got.offset, &out[..got.len], got.last).unwrap();
        }
        assert_eq!(result.unwrap(), message);
    }

    #[test]
    fn read_message_refuses_fragments() {
        let (mut a, mut b) = pair(1024);
        let frames = a.write_fragments(b"abcdef", 4).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(b.read_message(&frames[0], &mut out), Err(Error::BadMessage));
    }

    #[test]
    fn rekey_both_sides() {
        let (mut a, mut b) = pair(1024);
        a.rekey_ours().unwrap();
        b.rekey_theirs().unwrap();
        let frame = seal(&mut a, b"after rekey");
        let mut out = [0u8; 64];
        let len = b.read_message(&frame, &mut out).unwrap();
        assert_eq!(&out[..len], b"after rekey");
    }

    #[test]
    fn exhausted_nonce() {
        let (mut a, _) = pair(1024);
        a.ours.set_nonce(Nonce::MAX);
        let mut out = [0u8; 64];
        assert_eq!(a.write_message(b"x", &mut out), Err(Error::NonceExhausted));
    }
}
