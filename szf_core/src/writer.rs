//! Frame-bounded seekable writer.
//!
//! Splits the incoming byte stream into independent frames of at most
//! `max_frame_size` decompressed bytes, records each frame's sizes in a
//! [`SeekTable`], and appends the table as the final skippable frame on
//! [`finish`](SeekableWriter::finish). Smaller frames seek faster and
//! compress worse; the cap is the knob for that trade-off.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use log::warn;
use xxhash_rust::xxh64::Xxh64;

use crate::compress::Compressor;
use crate::engine::{CompressEngine, FlushMode};
use crate::error::{Error, Result};
use crate::seek_table::{SeekTable, MAX_FRAME_CONTENT_SIZE};

/// Default cap on a frame's decompressed payload: 1 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1 << 20;

/// Hard ceiling on a frame's compressed size. Flush-heavy usage can grow
/// the compressed side far beyond the decompressed budget; the frame is
/// cut before the format's 32-bit size field can overflow.
const FRAME_COMPRESSED_CEILING: u64 = u32::MAX as u64 - (32 << 20);

/// Sinks that can drop bytes at their tail, enabling in-place append.
pub trait Truncate {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl Truncate for Cursor<Vec<u8>> {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().truncate(len as usize);
        Ok(())
    }
}

/// Streaming writer producing a seekable compressed stream.
pub struct SeekableWriter<W: Write, E: CompressEngine> {
    sink: W,
    session: Compressor<E>,
    table: SeekTable,
    max_frame_size: u32,
    /// Decompressed bytes still allowed into the current frame.
    frame_budget: u32,
    current_compressed: u64,
    current_decompressed: u64,
    hasher: Xxh64,
    checksum: bool,
}

impl<W: Write, E: CompressEngine> SeekableWriter<W, E> {
    /// Start a fresh seekable stream on `sink`.
    pub fn new(sink: W, engine: E, max_frame_size: u32, checksum: bool) -> Result<Self> {
        if max_frame_size == 0 || max_frame_size > MAX_FRAME_CONTENT_SIZE {
            return Err(Error::protocol(format!(
                "max frame size must be within 1..={MAX_FRAME_CONTENT_SIZE}"
            )));
        }
        Ok(Self {
            sink,
            session: Compressor::new(engine),
            table: SeekTable::new(checksum),
            max_frame_size,
            frame_budget: max_frame_size,
            current_compressed: 0,
            current_decompressed: 0,
            hasher: Xxh64::new(0),
            checksum,
        })
    }

    /// Resume writing after the frames already present on `sink`. The old
    /// seek table frame is truncated away and will be rewritten, extended,
    /// on finish.
    pub fn append(mut sink: W, engine: E, max_frame_size: u32) -> Result<Self>
    where
        W: Read + Seek + Truncate,
    {
        let table = SeekTable::load(&mut sink, false)?;
        let data_end = table.total_compressed_size();
        sink.truncate_to(data_end)?;
        sink.seek(SeekFrom::Start(data_end))?;
        Self::resume(sink, engine, max_frame_size, table)
    }

    /// Resume writing on a sink whose tail cannot be truncated (plain
    /// append-only targets). The superseded table frame stays in place,
    /// recorded as a zero-content padding entry so compressed offsets keep
    /// adding up.
    pub fn append_untruncatable(mut sink: W, engine: E, max_frame_size: u32) -> Result<Self>
    where
        W: Read + Seek,
    {
        let mut table = SeekTable::load(&mut sink, false)?;
        let wasted = table.on_disk_size();
        warn!("sink cannot be truncated; {wasted} bytes of superseded seek table become padding");
        let wasted = u32::try_from(wasted)
            .map_err(|_| Error::format("superseded seek table exceeds the 32-bit size field"))?;
        table.append(wasted, 0, 0)?;
        sink.seek(SeekFrom::End(0))?;
        Self::resume(sink, engine, max_frame_size, table)
    }

    fn resume(sink: W, engine: E, max_frame_size: u32, table: SeekTable) -> Result<Self> {
        let checksum = table.has_checksum();
        let mut writer = Self::new(sink, engine, max_frame_size, checksum)?;
        writer.table = table;
        Ok(writer)
    }

    /// The table as recorded so far; the current unflushed frame is not in
    /// it yet.
    pub fn seek_table(&self) -> &SeekTable {
        &self.table
    }

    /// Compress `data`, cutting frames whenever the decompressed budget
    /// runs out or the compressed side hits its safety ceiling.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let take = (self.frame_budget as usize).min(data.len());
            let (chunk, rest) = data.split_at(take);
            let produced = self.session.compress(chunk, FlushMode::Continue)?;
            self.sink.write_all(&produced)?;
            self.current_compressed += produced.len() as u64;
            self.current_decompressed += take as u64;
            if self.checksum {
                self.hasher.update(chunk);
            }
            self.frame_budget -= take as u32;
            data = rest;
            if self.frame_budget == 0 || self.current_compressed >= FRAME_COMPRESSED_CEILING {
                self.end_frame()?;
            }
        }
        Ok(())
    }

    /// Push buffered data out to the sink without ending the frame
    /// (`FlushBlock`), or cut the frame entirely (`EndFrame`).
    pub fn flush(&mut self, mode: FlushMode) -> Result<()> {
        match mode {
            FlushMode::Continue => {
                Err(Error::protocol("flush requires a block or frame directive"))
            }
            FlushMode::FlushBlock => {
                let produced = self.session.flush(FlushMode::FlushBlock)?;
                self.sink.write_all(&produced)?;
                self.current_compressed += produced.len() as u64;
                if self.current_compressed >= FRAME_COMPRESSED_CEILING {
                    self.end_frame()?;
                }
                Ok(())
            }
            FlushMode::EndFrame => self.end_frame(),
        }
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frame_budget = self.max_frame_size;
        if self.current_compressed == 0 && self.current_decompressed == 0 {
            return Ok(());
        }
        let produced = self.session.flush(FlushMode::EndFrame)?;
        self.sink.write_all(&produced)?;
        self.current_compressed += produced.len() as u64;

        let compressed = u32::try_from(self.current_compressed)
            .map_err(|_| Error::protocol("frame compressed size overflowed its ceiling"))?;
        let decompressed = u32::try_from(self.current_decompressed)
            .map_err(|_| Error::protocol("frame decompressed size exceeded its budget"))?;
        let checksum = (self.hasher.digest() & 0xFFFF_FFFF) as u32;
        self.table.append(compressed, decompressed, checksum)?;

        self.current_compressed = 0;
        self.current_decompressed = 0;
        self.hasher.reset(0);
        Ok(())
    }

    /// Cut the final frame if one is open, write the seek table, flush the
    /// sink, and hand it back.
    pub fn finish(mut self) -> Result<W> {
        self.end_frame()?;
        self.table.write(&mut self.sink)?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}

impl<W: Write, E: CompressEngine> io::Write for SeekableWriter<W, E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SeekableWriter::write(self, buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        SeekableWriter::flush(self, FlushMode::FlushBlock)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
