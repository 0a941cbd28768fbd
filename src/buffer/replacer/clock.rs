//! CLOCK (second chance) replacement.
//!
//! The sweep walks the descriptor table with a persistent hand cursor.
//! Empty frames are taken immediately; pinned frames are skipped; a
//! referenced frame loses its reference bit and survives one more lap.

use crate::buffer::descriptor::FrameDesc;
use crate::common::{Error, FrameId, Result};

/// The clock hand over the descriptor table.
///
/// Owned by the buffer manager and driven under its lock; the hand
/// position persists across calls and is never reset after construction.
pub struct ClockSweep {
    hand: usize,
}

impl ClockSweep {
    /// Create a sweep for a pool of `pool_size` frames. The hand starts on
    /// the last frame so the first advance lands on frame 0.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self {
            hand: pool_size - 1,
        }
    }

    /// Current hand position.
    #[inline]
    pub fn hand(&self) -> usize {
        self.hand
    }

    /// Select a frame to (re)use.
    ///
    /// Advances the hand one frame at a time, wrapping modulo the table
    /// length:
    /// - an invalid (empty) frame is selected immediately;
    /// - a pinned frame is skipped; `table.len()` consecutive pinned
    ///   frames mean a full lap found nothing but pinned frames, and the
    ///   sweep fails with `Error::BufferExhausted` (an unpinned frame
    ///   resets the run — it will be selected within one more lap, so the
    ///   sweep is not exhausted);
    /// - a referenced frame has its reference bit cleared and is passed
    ///   over (second chance);
    /// - otherwise the frame is the victim.
    ///
    /// The selected frame's descriptor is left untouched; the caller
    /// writes back, unmaps and clears a valid victim before reuse.
    pub fn select(&mut self, table: &mut [FrameDesc]) -> Result<FrameId> {
        let mut pinned_seen = 0;

        loop {
            self.hand = (self.hand + 1) % table.len();
            let desc = &mut table[self.hand];

            if !desc.is_valid() {
                return Ok(FrameId::new(self.hand));
            }

            if desc.is_pinned() {
                pinned_seen += 1;
                if pinned_seen == table.len() {
                    return Err(Error::BufferExhausted {
                        pool_size: table.len(),
                    });
                }
                continue;
            }
            pinned_seen = 0;

            if desc.is_referenced() {
                desc.clear_referenced();
                continue;
            }

            return Ok(FrameId::new(self.hand));
        }
    }
}
