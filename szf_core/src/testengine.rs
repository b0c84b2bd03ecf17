//! Deterministic fake engines for exercising the session state machines
//! without a real compression library.
//!
//! Wire format: a frame is a run of stored segments followed by an
//! end-of-frame marker.
//!
//! ```text
//! data segment     := 0x01 len:u16le payload
//! end of frame     := 0x00
//! skippable frame  := 0x02 len:u16le payload      (complete frame, no output)
//! ```

use crate::engine::{CompressEngine, DecompressEngine, FlushMode, InputCursor, OutputCursor};
use crate::error::{Error, Result};

const TAG_DATA: u8 = 0x01;
const TAG_END: u8 = 0x00;
const TAG_SKIP: u8 = 0x02;
const MAX_SEGMENT: usize = 0xFFFF;

/// Serialize one complete data frame.
pub fn stored_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    push_segments(&mut out, payload);
    out.push(TAG_END);
    out
}

/// Serialize one skippable frame.
pub fn skippable_frame(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= MAX_SEGMENT);
    let mut out = Vec::with_capacity(payload.len() + 3);
    out.push(TAG_SKIP);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn push_segments(out: &mut Vec<u8>, payload: &[u8]) {
    for chunk in payload.chunks(MAX_SEGMENT) {
        out.push(TAG_DATA);
        out.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
        out.extend_from_slice(chunk);
    }
}

// ── Compressor ─────────────────────────────────────────────────────────────

pub struct StoredCompressEngine {
    /// Input accepted but not yet serialized.
    buffered: Vec<u8>,
    /// Serialized output waiting to be handed over.
    pending: Vec<u8>,
    pending_off: usize,
    /// End marker queued for the frame being closed.
    closing: bool,
    workers: u32,
    /// Max input bytes consumed per step; models slow engine intake.
    intake: usize,
    /// Buffered bytes that trigger a burst emission in worker mode.
    burst: usize,
    fail_on_close: bool,
}

impl StoredCompressEngine {
    pub fn new() -> Self {
        Self {
            buffered: Vec::new(),
            pending: Vec::new(),
            pending_off: 0,
            closing: false,
            workers: 0,
            intake: usize::MAX,
            burst: 1024,
            fail_on_close: false,
        }
    }

    /// Worker-backed variant: consumes `intake` bytes per step and emits
    /// output only in bursts, like an engine with background threads.
    pub fn multithreaded(workers: u32, intake: usize) -> Self {
        Self {
            workers,
            intake,
            ..Self::new()
        }
    }

    /// Fails the first `EndFrame` step, then behaves normally.
    pub fn failing() -> Self {
        Self {
            fail_on_close: true,
            ..Self::new()
        }
    }

    fn emit_segments(&mut self) {
        if !self.buffered.is_empty() {
            let buffered = std::mem::take(&mut self.buffered);
            push_segments(&mut self.pending, &buffered);
        }
    }

    fn drain(&mut self, output: &mut OutputCursor<'_>) {
        let spare = output.spare_mut();
        let n = spare.len().min(self.pending.len() - self.pending_off);
        spare[..n].copy_from_slice(&self.pending[self.pending_off..self.pending_off + n]);
        output.advance(n);
        self.pending_off += n;
        if self.pending_off == self.pending.len() {
            self.pending.clear();
            self.pending_off = 0;
        }
    }
}

impl CompressEngine for StoredCompressEngine {
    fn step(
        &mut self,
        input: &mut InputCursor<'_>,
        output: &mut OutputCursor<'_>,
        mode: FlushMode,
    ) -> Result<usize> {
        if mode == FlushMode::EndFrame && self.fail_on_close {
            self.fail_on_close = false;
            return Err(Error::Engine("synthetic engine failure".into()));
        }

        let take = self.intake.min(input.remaining().len());
        self.buffered.extend_from_slice(&input.remaining()[..take]);
        input.advance(take);

        match mode {
            FlushMode::Continue => {
                if self.workers > 0 && self.buffered.len() >= self.burst {
                    self.emit_segments();
                }
            }
            FlushMode::FlushBlock => self.emit_segments(),
            FlushMode::EndFrame => {
                self.emit_segments();
                if input.is_exhausted() && !self.closing {
                    self.pending.push(TAG_END);
                    self.closing = true;
                }
            }
        }

        self.drain(output);
        let remaining = self.pending.len() - self.pending_off;
        let hint = match mode {
            FlushMode::Continue => remaining + self.buffered.len(),
            FlushMode::FlushBlock => remaining,
            FlushMode::EndFrame => remaining + usize::from(!self.closing),
        };
        if hint == 0 && mode == FlushMode::EndFrame {
            self.closing = false;
        }
        Ok(hint)
    }

    fn reset_session(&mut self) {
        self.buffered.clear();
        self.pending.clear();
        self.pending_off = 0;
        self.closing = false;
    }

    fn compress_bound(&self, len: usize) -> usize {
        len + 3 * (len / MAX_SEGMENT + 1) + 1
    }

    fn worker_count(&self) -> u32 {
        self.workers
    }
}

// ── Decompressor ───────────────────────────────────────────────────────────

enum ParseState {
    Tag,
    Len { skip: bool, bytes: [u8; 2], have: usize },
    Payload { skip: bool, remaining: usize },
}

pub struct StoredDecompressEngine {
    state: ParseState,
}

impl StoredDecompressEngine {
    pub fn new() -> Self {
        Self {
            state: ParseState::Tag,
        }
    }
}

impl DecompressEngine for StoredDecompressEngine {
    fn step(
        &mut self,
        input: &mut InputCursor<'_>,
        output: &mut OutputCursor<'_>,
    ) -> Result<usize> {
        loop {
            match &mut self.state {
                ParseState::Tag => {
                    let Some(&tag) = input.remaining().first() else {
                        return Ok(1);
                    };
                    input.advance(1);
                    match tag {
                        TAG_END => return Ok(0),
                        TAG_DATA => {
                            self.state = ParseState::Len {
                                skip: false,
                                bytes: [0; 2],
                                have: 0,
                            }
                        }
                        TAG_SKIP => {
                            self.state = ParseState::Len {
                                skip: true,
                                bytes: [0; 2],
                                have: 0,
                            }
                        }
                        other => {
                            return Err(Error::Engine(format!("corrupt tag {other:#04x}")))
                        }
                    }
                }
                ParseState::Len { skip, bytes, have } => {
                    while *have < 2 {
                        let Some(&b) = input.remaining().first() else {
                            return Ok(1);
                        };
                        input.advance(1);
                        bytes[*have] = b;
                        *have += 1;
                    }
                    let skip = *skip;
                    let remaining = u16::from_le_bytes(*bytes) as usize;
                    self.state = ParseState::Payload { skip, remaining };
                }
                ParseState::Payload { skip, remaining } => {
                    if *skip {
                        let n = (*remaining).min(input.remaining().len());
                        input.advance(n);
                        *remaining -= n;
                        if *remaining == 0 {
                            // A skippable frame is complete in itself.
                            self.state = ParseState::Tag;
                            return Ok(0);
                        }
                        return Ok(1);
                    }
                    let spare = output.spare_mut();
                    let n = (*remaining).min(input.remaining().len()).min(spare.len());
                    spare[..n].copy_from_slice(&input.remaining()[..n]);
                    output.advance(n);
                    input.advance(n);
                    *remaining -= n;
                    if *remaining == 0 {
                        self.state = ParseState::Tag;
                        continue;
                    }
                    // Out of input or out of output space.
                    return Ok(1);
                }
            }
        }
    }

    fn reset_session(&mut self) {
        self.state = ParseState::Tag;
    }

    fn frame_content_size(&self, data: &[u8]) -> Option<u64> {
        walk_frame(data).map(|(_, content)| content)
    }

    fn frame_looks_complete(&self, data: &[u8]) -> bool {
        walk_frame(data).is_some()
    }
}

/// Walk one complete frame at the start of `data`. Returns its byte length
/// and declared content size, or `None` when the frame is absent or cut
/// short.
fn walk_frame(data: &[u8]) -> Option<(usize, u64)> {
    let mut off = 0;
    let mut content = 0u64;
    loop {
        let tag = *data.get(off)?;
        off += 1;
        match tag {
            TAG_END => return Some((off, content)),
            TAG_DATA | TAG_SKIP => {
                let len = u16::from_le_bytes([*data.get(off)?, *data.get(off + 1)?]) as usize;
                off += 2;
                if data.len() < off + len {
                    return None;
                }
                off += len;
                if tag == TAG_DATA {
                    content += len as u64;
                } else {
                    // Skippable frames end after their payload.
                    return Some((off, 0));
                }
            }
            _ => return None,
        }
    }
}
