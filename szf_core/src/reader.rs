//! Random-access reader over a seekable compressed stream.
//!
//! The table gives O(log frames) resolution of a decompressed offset to
//! its frame; within a frame the reader decodes and discards forward, so
//! genuine random access exists at frame granularity only.

use std::io::{self, Read, Seek, SeekFrom};

use crate::decompress::StreamDecompressor;
use crate::engine::DecompressEngine;
use crate::error::{Error, Result};
use crate::seek_table::SeekTable;

/// Compressed bytes pulled from the source per refill.
const READ_CHUNK: usize = 128 * 1024;
/// Decode-and-discard granularity while skipping forward inside a frame.
const SKIP_CHUNK: usize = 32 * 1024;

/// Decompressing [`Read`] + [`Seek`] over a seekable stream.
pub struct SeekableReader<R, E: DecompressEngine> {
    src: R,
    table: SeekTable,
    /// Live session; reset whenever the reader repositions.
    session: StreamDecompressor<E>,
    /// Decompressed read position.
    pos: u64,
    /// Source cursor position, tracked to avoid redundant seeks.
    src_pos: u64,
}

impl<R: Read + Seek, E: DecompressEngine> SeekableReader<R, E> {
    /// Load the seek table from the end of `src` and start reading at
    /// decompressed offset zero.
    pub fn new(mut src: R, engine: E) -> Result<Self> {
        let table = SeekTable::load(&mut src, true)?;
        Ok(Self {
            src,
            table,
            session: StreamDecompressor::new(engine),
            pos: 0,
            src_pos: 0,
        })
    }

    pub fn seek_table(&self) -> &SeekTable {
        &self.table
    }

    /// Current decompressed offset.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total decompressed size of the stream.
    pub fn decompressed_size(&self) -> u64 {
        self.table.total_decompressed_size()
    }

    /// Decode forward from the current position into `buf`. Returns the
    /// byte count, zero at end of stream.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.pos >= self.table.total_decompressed_size() {
            return Ok(0);
        }
        let data_end = self.table.total_compressed_size();
        loop {
            // Drain output the session still holds before feeding it more.
            if !self.session.needs_input() {
                let out = self.session.decompress(&[], Some(buf.len()))?;
                if !out.is_empty() {
                    buf[..out.len()].copy_from_slice(&out);
                    self.pos += out.len() as u64;
                    return Ok(out.len());
                }
            }
            let available = data_end.saturating_sub(self.src_pos);
            if available == 0 {
                // The table promised content the frames don't deliver.
                return Ok(0);
            }
            let take = READ_CHUNK.min(available as usize);
            let mut chunk = vec![0u8; take];
            self.src.read_exact(&mut chunk)?;
            self.src_pos += take as u64;
            let out = self.session.decompress(&chunk, Some(buf.len()))?;
            if !out.is_empty() {
                buf[..out.len()].copy_from_slice(&out);
                self.pos += out.len() as u64;
                return Ok(out.len());
            }
        }
    }

    /// Reposition to decompressed offset `offset`.
    fn seek_decompressed(&mut self, offset: u64) -> Result<()> {
        let Some(frame) = self.table.frame_index_at(offset) else {
            // At or past the end: park on the stream tail.
            self.pos = self.table.total_decompressed_size();
            self.src_pos = self.table.total_compressed_size();
            self.src.seek(SeekFrom::Start(self.src_pos))?;
            self.session.reset();
            return Ok(());
        };
        let (frame_compressed, frame_decompressed) = self.table.frame_start_sizes(frame);

        // Already inside the target frame and moving forward, with the
        // source past the frame start: keep decoding from where we are.
        // Common when sequential reads cross a skippable frame.
        let in_place = self.table.frame_index_at(self.pos) == Some(frame)
            && offset >= self.pos
            && self.src_pos >= frame_compressed;
        if !in_place {
            self.src.seek(SeekFrom::Start(frame_compressed))?;
            self.src_pos = frame_compressed;
            self.session.reset();
            self.pos = frame_decompressed;
        }

        // Close the remaining gap by decoding and discarding.
        let mut scratch = vec![0u8; SKIP_CHUNK];
        while self.pos < offset {
            let gap = offset - self.pos;
            let take = SKIP_CHUNK.min(gap as usize);
            let n = self.fill(&mut scratch[..take])?;
            if n == 0 {
                return Err(Error::Truncated);
            }
        }
        Ok(())
    }

    /// Convenience wrapper: reposition to `start` and decode up to `len`
    /// bytes, clamped to the end of the stream.
    pub fn read_range(&mut self, start: u64, len: usize) -> Result<Vec<u8>> {
        self.seek_decompressed(start)?;
        let mut out = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.fill(&mut out[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out.truncate(filled);
        Ok(out)
    }
}

impl<R: Read + Seek, E: DecompressEngine> Read for SeekableReader<R, E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl<R: Read + Seek, E: DecompressEngine> Seek for SeekableReader<R, E> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => {
                i128::from(self.table.total_decompressed_size()) + i128::from(delta)
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the stream",
            ));
        }
        self.seek_decompressed(target as u64)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(self.pos)
    }
}
