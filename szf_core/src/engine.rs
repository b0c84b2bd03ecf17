//! Contract between the streaming layer and an external codec engine.
//!
//! The sessions in this crate never touch a compression library directly.
//! They drive an opaque engine context through one incremental step at a
//! time, each step moving a pair of cursors: input bytes consumed, output
//! bytes produced. Engine implementations live in `szf_engines`.

use crate::error::Result;

/// End directive for one compressor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Keep buffering input for compression ratio; output may lag.
    Continue,
    /// Complete the current block; the stream stays inside a frame.
    FlushBlock,
    /// Complete the current frame, including its epilogue.
    EndFrame,
}

/// Read cursor over caller-supplied input.
#[derive(Debug)]
pub struct InputCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> InputCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed by the engine.
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Record that the engine consumed `n` more bytes.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.data.len());
        self.pos += n;
    }
}

/// Write cursor over one output block.
pub struct OutputCursor<'a> {
    dst: &'a mut [u8],
    pos: usize,
}

impl<'a> OutputCursor<'a> {
    pub fn new(dst: &'a mut [u8], pos: usize) -> Self {
        debug_assert!(pos <= dst.len());
        Self { dst, pos }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The unwritten tail of the block.
    #[inline]
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.dst[self.pos..]
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.pos == self.dst.len()
    }

    /// Record that the engine wrote `n` more bytes.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.dst.len());
        self.pos += n;
    }
}

/// Incremental compression engine. One context per session, exclusively
/// owned by it.
pub trait CompressEngine {
    /// Run one incremental step: consume bytes from `input`, append bytes
    /// to `output`, honoring the end directive. Returns the engine's
    /// remaining-work hint, where zero means the current directive is
    /// fully flushed.
    fn step(
        &mut self,
        input: &mut InputCursor<'_>,
        output: &mut OutputCursor<'_>,
        mode: FlushMode,
    ) -> Result<usize>;

    /// Drop all session state while keeping parameters and dictionaries.
    /// Cheap and infallible.
    fn reset_session(&mut self);

    /// Worst-case compressed size for a single frame over `len` input
    /// bytes.
    fn compress_bound(&self, len: usize) -> usize;

    /// Number of background worker threads, zero when single-threaded.
    fn worker_count(&self) -> u32 {
        0
    }
}

/// Incremental decompression engine.
pub trait DecompressEngine {
    /// Run one incremental step. A returned hint of zero means a frame
    /// completed exactly at the current input position.
    fn step(&mut self, input: &mut InputCursor<'_>, output: &mut OutputCursor<'_>)
        -> Result<usize>;

    /// Drop all session state while keeping parameters and dictionaries.
    /// Cheap and infallible.
    fn reset_session(&mut self);

    /// Decompressed size declared by the frame header at the start of
    /// `data`, when the header is readable and carries one.
    fn frame_content_size(&self, data: &[u8]) -> Option<u64>;

    /// Whether `data` starts with one complete frame. Used to decide if a
    /// declared content size can be trusted for exact output pre-sizing.
    fn frame_looks_complete(&self, data: &[u8]) -> bool;
}
