//! Growable output accumulator.
//!
//! Codec output has unknown final size. Reallocating one contiguous buffer
//! as it grows would copy every byte O(n) times; this accumulator instead
//! collects fixed-capacity blocks from an ascending schedule and coalesces
//! them once, when the call finishes. The common case of a small output
//! fits entirely in the first block and is returned without any copy.

use crate::engine::OutputCursor;
use crate::error::{Error, Result};

/// Block capacities, ascending. The first entry doubles as the default
/// first-block size; the last entry repeats once the schedule runs out.
const BLOCK_SIZES: [usize; 17] = [
    32 << 10,
    64 << 10,
    256 << 10,
    1 << 20,
    4 << 20,
    8 << 20,
    16 << 20,
    16 << 20,
    32 << 20,
    32 << 20,
    32 << 20,
    32 << 20,
    64 << 20,
    64 << 20,
    128 << 20,
    128 << 20,
    256 << 20,
];

/// Accumulates the output of a single codec call sequence.
///
/// Invariant: every block except the last is fully written, so the logical
/// length is `allocated` minus the unwritten tail of the last block.
pub struct BlockBuffer {
    /// Oldest first; never empty.
    blocks: Vec<Vec<u8>>,
    /// Bytes written into the last block.
    filled: usize,
    /// Total capacity reserved across all blocks.
    allocated: usize,
    /// Byte cap, `None` for unlimited.
    max_length: Option<usize>,
}

impl BlockBuffer {
    /// Start with the default first block, clipped to `max_length` when the
    /// cap is smaller.
    pub fn new(max_length: Option<usize>) -> Self {
        let first = match max_length {
            Some(cap) if cap < BLOCK_SIZES[0] => cap,
            _ => BLOCK_SIZES[0],
        };
        Self::with_first_block(max_length, first)
    }

    /// Start with a first block sized from a caller hint, e.g. a
    /// decompressed size declared by a frame header.
    pub fn with_hint(max_length: Option<usize>, hint: usize) -> Self {
        let first = match max_length {
            Some(cap) => hint.min(cap),
            None => hint,
        };
        Self::with_first_block(max_length, first)
    }

    fn with_first_block(max_length: Option<usize>, first: usize) -> Self {
        Self {
            blocks: vec![vec![0u8; first]],
            filled: 0,
            allocated: first,
            max_length,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        let last_capacity = self.blocks.last().map_or(0, Vec::len);
        self.allocated - (last_capacity - self.filled)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current block has no spare room left.
    pub fn block_is_full(&self) -> bool {
        self.filled == self.blocks.last().map_or(0, Vec::len)
    }

    /// The cap is reached exactly; nothing more may be written.
    pub fn reached_max(&self) -> bool {
        self.max_length == Some(self.allocated) && self.block_is_full()
    }

    /// Append a fresh block from the schedule, clipped to the remaining
    /// budget. Only valid while the current block is exactly full.
    pub fn grow(&mut self) -> Result<()> {
        debug_assert!(self.block_is_full());
        let index = self.blocks.len().min(BLOCK_SIZES.len() - 1);
        let mut size = BLOCK_SIZES[index];
        if let Some(cap) = self.max_length {
            let budget = cap - self.allocated;
            if budget == 0 {
                return Err(Error::protocol("output buffer grown past its cap"));
            }
            size = size.min(budget);
        }
        self.blocks.push(vec![0u8; size]);
        self.allocated += size;
        self.filled = 0;
        Ok(())
    }

    /// Borrow the writable tail of the current block as an engine cursor.
    /// Pair with [`commit`] after the engine step.
    pub fn tail(&mut self) -> OutputCursor<'_> {
        let filled = self.filled;
        OutputCursor::new(self.blocks.last_mut().expect("at least one block"), filled)
    }

    /// Record how far the engine advanced a cursor obtained from [`tail`].
    pub fn commit(&mut self, pos: usize) {
        debug_assert!(self.filled <= pos && pos <= self.blocks.last().map_or(0, Vec::len));
        self.filled = pos;
    }

    /// Coalesce into the final contiguous output.
    pub fn finish(mut self) -> Vec<u8> {
        let last_capacity = self.blocks.last().map_or(0, Vec::len);
        // One full block, or a full block plus an untouched one: hand the
        // first block back without copying.
        if (self.blocks.len() == 1 && self.filled == last_capacity)
            || (self.blocks.len() == 2 && self.filled == 0)
        {
            return self.blocks.swap_remove(0);
        }

        let total = self.len();
        let mut out = Vec::with_capacity(total);
        let last = self.blocks.pop().expect("at least one block");
        for block in &self.blocks {
            out.extend_from_slice(block);
        }
        out.extend_from_slice(&last[..self.filled]);
        out
    }
}
