// Rolling checksum used to place content-defined chunk boundaries.
//
// bup-style rollsum over a fixed 64-byte window:
//   - `s1`: sum of the window bytes (each biased by CHAR_OFFSET)
//   - `s2`: position-weighted sum of the window bytes
//
// Once WINDOW_SIZE bytes have been rolled in, both sums depend only on the
// window contents, never on what came before. That property is what keeps
// boundaries stable across insertions and deletions elsewhere in the stream.

use super::config::{CHAR_OFFSET, CHUNK_BITS, WINDOW_SIZE};

const WINDOW_U32: u32 = WINDOW_SIZE as u32;

/// Mask of the `s2` bits checked for a boundary.
const SPLIT_MASK: u32 = (1 << CHUNK_BITS) - 1;

// ---------------------------------------------------------------------------
// Rollsum
// ---------------------------------------------------------------------------

/// Rolling checksum state.
#[derive(Clone)]
pub struct Rollsum {
    s1: u32,
    s2: u32,
    window: [u8; WINDOW_SIZE],
    wofs: usize,
}

impl Rollsum {
    /// State equivalent to a window of zero bytes.
    pub fn new() -> Self {
        Self {
            s1: WINDOW_U32 * CHAR_OFFSET,
            s2: WINDOW_U32 * (WINDOW_U32 - 1) * CHAR_OFFSET,
            window: [0u8; WINDOW_SIZE],
            wofs: 0,
        }
    }

    /// Return to the initial state.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Push `add` into the window, evicting the oldest byte.
    #[inline(always)]
    pub fn roll(&mut self, add: u8) {
        let drop = self.window[self.wofs] as u32;
        self.s1 = self.s1.wrapping_add(add as u32).wrapping_sub(drop);
        self.s2 = self
            .s2
            .wrapping_add(self.s1)
            .wrapping_sub(WINDOW_U32.wrapping_mul(drop + CHAR_OFFSET));
        self.window[self.wofs] = add;
        self.wofs = (self.wofs + 1) % WINDOW_SIZE;
    }

    /// 32-bit digest of the current window.
    #[inline]
    pub fn digest(&self) -> u32 {
        (self.s1 << 16) | (self.s2 & 0xffff)
    }

    /// True when the current window ends a chunk.
    ///
    /// Fires with probability `2^-CHUNK_BITS` on random input.
    #[inline(always)]
    pub fn on_split(&self) -> bool {
        self.s2 & SPLIT_MASK == SPLIT_MASK
    }
}

impl Default for Rollsum {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
