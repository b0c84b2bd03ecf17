//! Streaming compressor session.

use crate::buffer::BlockBuffer;
use crate::engine::{CompressEngine, FlushMode, InputCursor};
use crate::error::{Error, Result};

/// Streaming compressor over an engine context it exclusively owns.
///
/// Each call hands back the compressed bytes produced so far for the
/// supplied input and directive; concatenating the returned chunks yields
/// the compressed stream. After an engine failure the session resets to a
/// frame boundary and stays usable for a fresh frame.
pub struct Compressor<E> {
    engine: E,
    last_mode: FlushMode,
    rich_memory: bool,
}

impl<E: CompressEngine> Compressor<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            last_mode: FlushMode::EndFrame,
            rich_memory: false,
        }
    }

    /// Pre-size output to the engine's worst-case bound whenever one call
    /// carries a complete frame, trading memory for zero buffer growth.
    pub fn rich_memory(engine: E) -> Self {
        Self {
            engine,
            last_mode: FlushMode::EndFrame,
            rich_memory: true,
        }
    }

    /// Directive of the last successful call; `EndFrame` before any.
    pub fn last_mode(&self) -> FlushMode {
        self.last_mode
    }

    /// Feed `data` to the engine under the given end directive and return
    /// everything the engine produced for it.
    pub fn compress(&mut self, data: &[u8], mode: FlushMode) -> Result<Vec<u8>> {
        let mut input = InputCursor::new(data);
        let mut out = if self.rich_memory && mode == FlushMode::EndFrame {
            BlockBuffer::with_hint(None, self.engine.compress_bound(data.len()))
        } else {
            BlockBuffer::new(None)
        };
        match self.drive(&mut input, &mut out, mode) {
            Ok(()) => {
                self.last_mode = mode;
                Ok(out.finish())
            }
            Err(err) => {
                // Abandon the half-written frame; the session stays usable
                // for a fresh one.
                self.engine.reset_session();
                self.last_mode = FlushMode::EndFrame;
                Err(err)
            }
        }
    }

    /// Complete the current block or frame without new input.
    pub fn flush(&mut self, mode: FlushMode) -> Result<Vec<u8>> {
        if mode == FlushMode::Continue {
            return Err(Error::protocol("flush requires a block or frame directive"));
        }
        self.compress(&[], mode)
    }

    fn drive(
        &mut self,
        input: &mut InputCursor<'_>,
        out: &mut BlockBuffer,
        mode: FlushMode,
    ) -> Result<()> {
        let multithreaded = self.engine.worker_count() > 0;
        loop {
            let mut hint = self.step_once(input, out, mode)?;

            // A multi-threaded engine buffers input internally and emits
            // output in bursts. Keep feeding it until a cursor runs dry or
            // it reports completion for the directive.
            if multithreaded && mode == FlushMode::Continue {
                while hint != 0 && !input.is_exhausted() && !out.block_is_full() {
                    hint = self.step_once(input, out, mode)?;
                }
            }

            // Continue is complete once the input is taken; flush
            // directives additionally need the engine's zero hint.
            let complete = input.is_exhausted()
                && match mode {
                    FlushMode::Continue => true,
                    FlushMode::FlushBlock | FlushMode::EndFrame => hint == 0,
                };
            if complete {
                return Ok(());
            }
            if out.block_is_full() {
                out.grow()?;
            }
        }
    }

    fn step_once(
        &mut self,
        input: &mut InputCursor<'_>,
        out: &mut BlockBuffer,
        mode: FlushMode,
    ) -> Result<usize> {
        let mut cursor = out.tail();
        let result = self.engine.step(input, &mut cursor, mode);
        let pos = cursor.pos();
        drop(cursor);
        out.commit(pos);
        result
    }
}

/// Compress `data` as one complete frame, pre-sizing output to the
/// engine's worst-case bound.
pub fn compress_frame<E: CompressEngine>(engine: E, data: &[u8]) -> Result<Vec<u8>> {
    Compressor::rich_memory(engine).compress(data, FlushMode::EndFrame)
}
