//! Sliding anti-replay window for transport counters.
//!
//! Each counter maps to slot `counter % L`, which remembers the highest
//! `counter + 1` accepted there. A counter is fresh only if its slot has not
//! yet seen it or anything later, and if it is within `L` of the highest
//! counter accepted overall.

use crate::error::Error;

/// Window size used by [`crate::transport::TransportState`].
pub const REPLAY_WINDOW_LEN: usize = 1024;

#[derive(Clone)]
pub struct ReplayWindow<const L: usize> {
    slots: [u64; L],
    /// Highest accepted counter plus one; zero when nothing was accepted.
    top: u64,
}

impl<const L: usize> ReplayWindow<L> {
    pub fn new() -> Self {
        Self {
            slots: [0; L],
            top: 0,
        }
    }

    /// Check a counter without recording it. Call before decrypting.
    pub fn check(&self, counter: u64) -> Result<(), Error> {
        let next = counter.checked_add(1).ok_or(Error::Replay)?;
        let slot = self.slots[Self::index(counter)];
        if slot >= next || next.saturating_add(L as u64) <= self.top {
            return Err(Error::Replay);
        }
        Ok(())
    }

    /// Record a counter. Call only once the frame has authenticated.
    pub fn update(&mut self, counter: u64) -> Result<(), Error> {
        self.check(counter)?;
        let next = counter + 1;
        self.slots[Self::index(counter)] = next;
        self.top = self.top.max(next);
        Ok(())
    }

    /// The highest counter accepted so far.
    pub fn largest(&self) -> Option<u64> {
        self.top.checked_sub(1)
    }

    fn index(counter: u64) -> usize {
        // The remainder is below L, so it fits in usize.
        (counter % L as u64) as usize
    }
}

impl<const L: usize> Default for ReplayWindow<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const L: usize> core::fmt::Debug for ReplayWindow<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReplayWindow")
            .field("len", &L)
            .field("largest", &self.largest())
            .finish()
    }
}
