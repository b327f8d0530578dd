//! Splitting messages across frames and putting them back together.
//!
//! Each fragment carries the byte offset of its first byte within the
//! message. The final fragment is sent as [`FrameKind::Data`], all earlier
//! ones as [`FrameKind::DataMore`].
//!
//! [`FrameKind::Data`]: crate::framing::FrameKind::Data
//! [`FrameKind::DataMore`]: crate::framing::FrameKind::DataMore

use crate::error::Error;

/// One piece of a message produced by [`Fragmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub offset: u32,
    pub data: &'a [u8],
    /// Whether this is the final fragment.
    pub last: bool,
}

/// Iterator over the fragments of a message.
///
/// An empty message yields a single empty final fragment.
#[derive(Debug, Clone)]
pub struct Fragmenter<'a> {
    message: &'a [u8],
    max_fragment: usize,
    position: usize,
    done: bool,
}

impl<'a> Fragmenter<'a> {
    /// Fails if the message cannot be addressed by 32-bit offsets or if
    /// `max_fragment` is zero.
    pub fn new(message: &'a [u8], max_fragment: usize) -> Result<Self, Error> {
        if max_fragment == 0 {
            return Err(Error::BufferTooSmall);
        }
        if u32::try_from(message.len()).is_err() {
            return Err(Error::MessageTooLarge);
        }
        Ok(Self {
            message,
            max_fragment,
            position: 0,
            done: false,
        })
    }

    /// Number of fragments the message will produce.
    pub fn fragment_count(message_len: usize, max_fragment: usize) -> usize {
        message_len.div_ceil(max_fragment.max(1)).max(1)
    }
}

impl<'a> Iterator for Fragmenter<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let end = self
            .position
            .saturating_add(self.max_fragment)
            .min(self.message.len());
        // `new` checked the whole message fits in u32 offsets.
        let offset = self.position as u32;
        let data = &self.message[self.position..end];
        self.position = end;
        let last = end == self.message.len();
        self.done = last;
        Some(Fragment { offset, data, last })
    }
}

/// Reassembles a message from fragments delivered in offset order.
///
/// A fragment whose offset differs from the number of bytes collected so far
/// discards the partial message and is rejected. Messages larger than the
/// configured bound are refused.
#[derive(Debug)]
pub struct Reassembler {
    buffer: Vec<u8>,
    max_message_len: usize,
}

impl Reassembler {
    pub fn new(max_message_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_len,
        }
    }

    /// Feed one decrypted fragment.
    ///
    /// Returns the complete message once the final fragment arrives.
    pub fn push(&mut self, offset: u32, data: &[u8], last: bool) -> Result<Option<Vec<u8>>, Error> {
        if offset as usize != self.buffer.len() {
            self.reset();
            return Err(Error::BadMessage);
        }
        let new_len = self
            .buffer
            .len()
            .checked_add(data.len())
            .ok_or(Error::MessageTooLarge)?;
        if new_len > self.max_message_len {
            self.reset();
            return Err(Error::MessageTooLarge);
        }
        self.buffer.extend_from_slice(data);
        if last {
            Ok(Some(core::mem::take(&mut self.buffer)))
        } else {
            Ok(None)
        }
    }

    /// Bytes of the current partial message.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
