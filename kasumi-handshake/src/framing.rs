//! Wire framing for handshake and transport messages.
//!
//! Every frame starts with an eight byte prefix, both fields little-endian:
//!
//! ```text
//!  0               4               8
//! +---------------+---------------+------------------------+-----+
//! | kind:4 seq:28 |    offset     |  payload / ciphertext  | tag |
//! +---------------+---------------+------------------------+-----+
//! ```
//!
//! The top four bits of the header word carry the [`FrameKind`]; the low 28
//! bits carry the sender's nonce truncated to 28 bits. Receivers recover the
//! full 64-bit counter with [`expand_seq`]. Handshake frames always carry
//! sequence zero and offset zero.

use crate::error::Error;

/// Header word length.
pub const HEADER_LEN: usize = 4;
/// Fragment offset length.
pub const OFFSET_LEN: usize = 4;
/// Header plus offset.
pub const PREFIX_LEN: usize = HEADER_LEN + OFFSET_LEN;
/// Transport AD: header, offset and declared plaintext length.
pub const TRANSPORT_AD_LEN: usize = PREFIX_LEN + 4;

/// Bits of the sequence number carried on the wire.
pub const SEQ_BITS: u32 = 28;
const SEQ_MASK: u32 = (1 << SEQ_BITS) - 1;
const KIND_SHIFT: u32 = SEQ_BITS;

/// The four-bit frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// `-> psk, e` from the initiator.
    HandshakeA = 1,
    /// `<- e, ee` from the responder.
    HandshakeB = 2,
    /// Transport data, last (or only) fragment of a message.
    Data = 3,
    /// Transport data, more fragments follow.
    DataMore = 4,
}

impl FrameKind {
    pub fn is_data(self) -> bool {
        matches!(self, Self::Data | Self::DataMore)
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            1 => Ok(Self::HandshakeA),
            2 => Ok(Self::HandshakeB),
            3 => Ok(Self::Data),
            4 => Ok(Self::DataMore),
            _ => Err(Error::BadMessage),
        }
    }
}

/// Decoded header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    /// Low [`SEQ_BITS`] bits of the sender's nonce.
    pub seq: u32,
}

impl FrameHeader {
    /// Build a header from a full 64-bit counter, truncating it.
    pub fn new(kind: FrameKind, counter: u64) -> Self {
        Self {
            kind,
            seq: truncate_seq(counter),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let word = ((self.kind as u32) << KIND_SHIFT) | (self.seq & SEQ_MASK);
        word.to_le_bytes()
    }

    pub fn decode(bytes: [u8; HEADER_LEN]) -> Result<Self, Error> {
        let word = u32::from_le_bytes(bytes);
        // The shift leaves four bits, so the cast is lossless.
        let kind = FrameKind::try_from((word >> KIND_SHIFT) as u8)?;
        Ok(Self {
            kind,
            seq: word & SEQ_MASK,
        })
    }
}

/// A parsed frame borrowing its body from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    /// Byte offset of this fragment within its message.
    pub offset: u32,
    /// Everything after the prefix: payload or ciphertext with tag.
    pub body: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Split a received buffer into prefix fields and body.
    pub fn parse(buf: &'a [u8]) -> Result<Self, Error> {
        if buf.len() < PREFIX_LEN {
            return Err(Error::BadMessage);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&buf[..HEADER_LEN]);
        let mut offset = [0u8; OFFSET_LEN];
        offset.copy_from_slice(&buf[HEADER_LEN..PREFIX_LEN]);

        Ok(Self {
            header: FrameHeader::decode(header)?,
            offset: u32::from_le_bytes(offset),
            body: &buf[PREFIX_LEN..],
        })
    }

    /// The raw prefix bytes, as they appeared on the wire.
    pub fn prefix(&self) -> [u8; PREFIX_LEN] {
        encode_prefix(&self.header, self.offset)
    }
}

/// Encode header and offset.
pub fn encode_prefix(header: &FrameHeader, offset: u32) -> [u8; PREFIX_LEN] {
    let mut prefix = [0u8; PREFIX_LEN];
    prefix[..HEADER_LEN].copy_from_slice(&header.encode());
    prefix[HEADER_LEN..].copy_from_slice(&offset.to_le_bytes());
    prefix
}

/// Write header and offset to the front of `out`, returning [`PREFIX_LEN`].
pub fn write_prefix(header: &FrameHeader, offset: u32, out: &mut [u8]) -> Result<usize, Error> {
    if out.len() < PREFIX_LEN {
        return Err(Error::BufferTooSmall);
    }
    out[..PREFIX_LEN].copy_from_slice(&encode_prefix(header, offset));
    Ok(PREFIX_LEN)
}

/// Associated data bound to every transport frame.
///
/// The declared plaintext length is authenticated but not transmitted.
pub fn transport_ad(prefix: &[u8; PREFIX_LEN], plaintext_len: u32) -> [u8; TRANSPORT_AD_LEN] {
    let mut ad = [0u8; TRANSPORT_AD_LEN];
    ad[..PREFIX_LEN].copy_from_slice(prefix);
    ad[PREFIX_LEN..].copy_from_slice(&plaintext_len.to_le_bytes());
    ad
}

/// The low [`SEQ_BITS`] bits of a counter.
pub fn truncate_seq(counter: u64) -> u32 {
    // Masked to 28 bits, so the cast is lossless.
    (counter & u64::from(SEQ_MASK)) as u32
}

/// Recover the full counter from its truncated form.
///
/// Picks the candidate closest to one past `largest`, the highest counter
/// authenticated so far (RFC 9000 Appendix A.3).
pub fn expand_seq(largest: Option<u64>, truncated: u32) -> u64 {
    let expected = largest.map_or(0, |n| n.saturating_add(1));
    let win: u64 = 1 << SEQ_BITS;
    let hwin = win / 2;
    let mask = win - 1;

    let candidate = (expected & !mask) | u64::from(truncated & SEQ_MASK);
    if candidate.saturating_add(hwin) <= expected && candidate <= u64::MAX - win {
        candidate + win
    } else if candidate > expected.saturating_add(hwin) && candidate >= win {
        candidate - win
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_kind_over_seq() {
        let header = FrameHeader {
            kind: FrameKind::Data,
            seq: 0x0123_4567,
        };
        let bytes = header.encode();
        assert_eq!(u32::from_le_bytes(bytes), 0x3123_4567);
        assert_eq!(FrameHeader::decode(bytes).unwrap(), header);
    }

    #[test]
    fn handshake_prefix_is_zero_seq_zero_offset() {
        let prefix = encode_prefix(&FrameHeader::new(FrameKind::HandshakeA, 0), 0);
        assert_eq!(prefix, [0, 0, 0, 0x10, 0, 0, 0, 0]);
        let prefix = encode_prefix(&FrameHeader::new(FrameKind::HandshakeB, 0), 0);
        assert_eq!(prefix, [0, 0, 0, 0x20, 0, 0, 0, 0]);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        for kind in [0u32, 5, 15] {
            let bytes = (kind << KIND_SHIFT).to_le_bytes();
            assert_eq!(FrameHeader::decode(bytes), Err(Error::BadMessage));
        }
    }

    #[test]
    fn parse_splits_prefix_and_body() {
        let mut buf = encode_prefix(&FrameHeader::new(FrameKind::DataMore, 7), 300).to_vec();
        buf.extend_from_slice(b"body");

        let frame = Frame::parse(&buf).unwrap();
        assert_eq!(frame.header.kind, FrameKind::DataMore);
        assert_eq!(frame.header.seq, 7);
        assert_eq!(frame.offset, 300);
        assert_eq!(frame.body, b"body");
        assert_eq!(frame.prefix(), buf[..PREFIX_LEN]);
    }

    #[test]
    fn parse_truncated_prefix() {
        assert_eq!(Frame::parse(&[0x30; 7]), Err(Error::BadMessage));
        assert!(Frame::parse(&encode_prefix(&FrameHeader::new(FrameKind::Data, 0), 0)).is_ok());
    }

    #[test]
    fn write_prefix_buffer_too_small() {
        let header = FrameHeader::new(FrameKind::Data, 1);
        assert_eq!(
            write_prefix(&header, 0, &mut [0u8; 4]),
            Err(Error::BufferTooSmall)
        );
    }

    #[test]
    fn transport_ad_appends_declared_length() {
        let prefix = encode_prefix(&FrameHeader::new(FrameKind::Data, 2), 0);
        let ad = transport_ad(&prefix, 0x0102_0304);
        assert_eq!(ad[..PREFIX_LEN], prefix);
        assert_eq!(ad[PREFIX_LEN..], [4, 3, 2, 1]);
    }

    #[test]
    fn truncate_keeps_low_bits() {
        assert_eq!(truncate_seq(5), 5);
        assert_eq!(truncate_seq((1 << 28) + 5), 5);
        assert_eq!(truncate_seq(u64::MAX), SEQ_MASK);
    }

    #[test]
    fn expand_first_frames() {
        assert_eq!(expand_seq(None, 0), 0);
        assert_eq!(expand_seq(None, 5), 5);
        assert_eq!(expand_seq(Some(0), 1), 1);
    }

    #[test]
    fn expand_across_wrap() {
        let win = 1u64 << 28;
        assert_eq!(expand_seq(Some(win - 1), 0), win);
        assert_eq!(expand_seq(Some(win - 2), 3), win + 3);
        // Slightly older than largest stays in the lower epoch.
        assert_eq!(expand_seq(Some(win + 10), truncate_seq(win - 5)), win - 5);
    }

    #[test]
    fn expand_round_trips_near_largest() {
        let largest = 3 * (1u64 << 28) + 12_345;
        for delta in [-1000i64, -1, 1, 2, 1000, 100_000] {
            let counter = largest.checked_add_signed(delta).unwrap();
            assert_eq!(expand_seq(Some(largest), truncate_seq(counter)), counter);
        }
    }
}
