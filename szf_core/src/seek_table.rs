//! Seek-table model and its binary serialization.
//!
//! A seekable stream is a run of independent compressed frames followed by
//! one skippable frame that carries the table. Decoders that don't know
//! the format skip that frame; decoders that do read it from the end of
//! the stream and gain random access at frame granularity.
//!
//! On-disk layout, all integers little-endian:
//!
//! ```text
//! stream  := frame* table_frame
//! table_frame := MAGIC(u32) FRAME_SIZE(u32) entry* footer
//! entry   := compressed_size(u32) decompressed_size(u32) [checksum(u32)]
//! footer  := frame_count(u32) descriptor(u8) SEEKABLE_MAGIC(u32)
//! ```
//!
//! `FRAME_SIZE` counts the bytes after itself (entries plus footer). The
//! descriptor's bit 7 flags per-entry checksums; bits 6..2 are reserved
//! and must be zero; bits 1..0 are unused.

use std::io::{Read, Seek, SeekFrom, Write};

use log::warn;

use crate::error::{Error, Result};

/// Magic opening the skippable frame that carries the table.
pub const SKIPPABLE_MAGIC: u32 = 0x184D2A5E;
/// Magic closing the table footer.
pub const SEEKABLE_MAGIC: u32 = 0x8F92EAB1;
/// Skippable frame header: magic plus frame size.
pub const SKIPPABLE_HEADER_SIZE: u64 = 8;
/// Footer: frame count, descriptor, magic.
pub const FOOTER_SIZE: u64 = 9;
/// Upper bound on a frame's decompressed payload: 1 GiB.
pub const MAX_FRAME_CONTENT_SIZE: u32 = 0x4000_0000;

/// Smallest source that can hold a table: empty header plus footer.
const MIN_SOURCE_SIZE: u64 = SKIPPABLE_HEADER_SIZE + FOOTER_SIZE;
const DESCRIPTOR_HAS_CHECKSUM: u8 = 0x80;
const DESCRIPTOR_RESERVED_MASK: u8 = 0x7C;

/// One frame's sizes as recorded in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    pub compressed_size: u32,
    pub decompressed_size: u32,
    /// Low 32 bits of the XXH64 of the decompressed content. Serialized
    /// only when the table carries checksums.
    pub checksum: u32,
}

/// Ordered index of frame sizes with running totals for offset lookup.
pub struct SeekTable {
    entries: Vec<FrameEntry>,
    /// Totals through frame `i`; same length as `entries`, conceptually
    /// preceded by zero.
    cum_compressed: Vec<u64>,
    cum_decompressed: Vec<u64>,
    has_checksum: bool,
}

impl SeekTable {
    pub fn new(has_checksum: bool) -> Self {
        Self {
            entries: Vec::new(),
            cum_compressed: Vec::new(),
            cum_decompressed: Vec::new(),
            has_checksum,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_checksum(&self) -> bool {
        self.has_checksum
    }

    pub fn entries(&self) -> &[FrameEntry] {
        &self.entries
    }

    pub fn total_compressed_size(&self) -> u64 {
        self.cum_compressed.last().copied().unwrap_or(0)
    }

    pub fn total_decompressed_size(&self) -> u64 {
        self.cum_decompressed.last().copied().unwrap_or(0)
    }

    fn entry_size(has_checksum: bool) -> u64 {
        if has_checksum {
            12
        } else {
            8
        }
    }

    /// On-disk size of the whole table frame for `count` entries.
    fn frame_size(count: u64, has_checksum: bool) -> u64 {
        SKIPPABLE_HEADER_SIZE + count * Self::entry_size(has_checksum) + FOOTER_SIZE
    }

    /// On-disk size of the table frame as currently populated.
    pub fn on_disk_size(&self) -> u64 {
        Self::frame_size(self.entries.len() as u64, self.has_checksum)
    }

    /// Record one completed frame.
    ///
    /// `(0, 0)` entries are dropped as no-ops. A zero-size compressed
    /// frame can never decode to content, so `(0, d != 0)` is invalid.
    pub fn append(
        &mut self,
        compressed_size: u32,
        decompressed_size: u32,
        checksum: u32,
    ) -> Result<()> {
        if compressed_size == 0 {
            if decompressed_size == 0 {
                return Ok(());
            }
            return Err(Error::format(
                "zero-size compressed frame declares decompressed content",
            ));
        }
        let c_total = self.total_compressed_size() + u64::from(compressed_size);
        let d_total = self.total_decompressed_size() + u64::from(decompressed_size);
        self.entries.push(FrameEntry {
            compressed_size,
            decompressed_size,
            checksum,
        });
        self.cum_compressed.push(c_total);
        self.cum_decompressed.push(d_total);
        Ok(())
    }

    /// Parse the table from the end of a seekable stream.
    ///
    /// With `rewind`, the source is left at its start; otherwise it is left
    /// at the end of the compressed frames, where the table frame begins.
    pub fn load<R: Read + Seek>(src: &mut R, rewind: bool) -> Result<Self> {
        let src_len = src.seek(SeekFrom::End(0))?;
        if src_len < MIN_SOURCE_SIZE {
            return Err(Error::format("source too small to hold a seek table"));
        }

        src.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        src.read_exact(&mut footer)?;
        let frame_count = u32::from_le_bytes(footer[0..4].try_into().expect("4 bytes"));
        let descriptor = footer[4];
        let magic = u32::from_le_bytes(footer[5..9].try_into().expect("4 bytes"));
        if magic != SEEKABLE_MAGIC {
            return Err(Error::format("missing seekable magic in footer"));
        }
        if descriptor & DESCRIPTOR_RESERVED_MASK != 0 {
            return Err(Error::format("reserved descriptor bits set"));
        }
        let has_checksum = descriptor & DESCRIPTOR_HAS_CHECKSUM != 0;

        let table_size = Self::frame_size(u64::from(frame_count), has_checksum);
        if src_len < table_size {
            return Err(Error::format("source shorter than its seek table"));
        }
        let data_size = src_len - table_size;

        src.seek(SeekFrom::Start(data_size))?;
        let mut raw = vec![0u8; table_size as usize];
        src.read_exact(&mut raw)?;

        let magic = u32::from_le_bytes(raw[0..4].try_into().expect("4 bytes"));
        if magic != SKIPPABLE_MAGIC {
            return Err(Error::format("missing skippable magic before seek table"));
        }
        let declared = u64::from(u32::from_le_bytes(raw[4..8].try_into().expect("4 bytes")));
        if declared != table_size - SKIPPABLE_HEADER_SIZE {
            return Err(Error::format("seek table frame size mismatch"));
        }

        let mut table = SeekTable::new(has_checksum);
        let entry_size = Self::entry_size(has_checksum) as usize;
        let mut off = SKIPPABLE_HEADER_SIZE as usize;
        for _ in 0..frame_count {
            let c = u32::from_le_bytes(raw[off..off + 4].try_into().expect("4 bytes"));
            let d = u32::from_le_bytes(raw[off + 4..off + 8].try_into().expect("4 bytes"));
            let checksum = if has_checksum {
                u32::from_le_bytes(raw[off + 8..off + 12].try_into().expect("4 bytes"))
            } else {
                0
            };
            off += entry_size;
            table.append(c, d, checksum)?;
            if table.total_compressed_size() > data_size {
                return Err(Error::format(
                    "cumulative compressed size overruns the stream",
                ));
            }
        }
        if table.total_compressed_size() != data_size {
            return Err(Error::format("seek table does not cover the stream"));
        }

        if rewind {
            src.seek(SeekFrom::Start(0))?;
        } else {
            src.seek(SeekFrom::Start(data_size))?;
        }
        Ok(table)
    }

    /// Index of the frame containing decompressed offset `pos`, or `None`
    /// when `pos` is at or past the end of the stream.
    ///
    /// Upper-bound search: the first frame whose cumulative decompressed
    /// size exceeds `pos`. Zero-size frames share their cumulative value
    /// with their predecessor, so the search lands past them, on the frame
    /// that actually advances content.
    pub fn frame_index_at(&self, pos: u64) -> Option<usize> {
        if pos >= self.total_decompressed_size() {
            return None;
        }
        Some(self.cum_decompressed.partition_point(|&end| end <= pos))
    }

    /// Starting offsets (compressed, decompressed) of frame `index`.
    pub fn frame_start_sizes(&self, index: usize) -> (u64, u64) {
        if index == 0 {
            (0, 0)
        } else {
            (
                self.cum_compressed[index - 1],
                self.cum_decompressed[index - 1],
            )
        }
    }

    /// Coarsen to at most `max_frames` entries by summing contiguous
    /// groups. Totals are preserved exactly; seek resolution drops to
    /// group granularity and per-frame checksums become meaningless, so
    /// the checksum flag is cleared.
    pub fn merge_frames(&mut self, max_frames: usize) -> Result<()> {
        if max_frames == 0 {
            return Err(Error::protocol("cannot merge a table to zero frames"));
        }
        let n = self.entries.len();
        if n <= max_frames {
            return Ok(());
        }

        let base = n / max_frames;
        let extra = n % max_frames;
        let mut merged = SeekTable::new(false);
        let mut start = 0;
        for group in 0..max_frames {
            let size = base + usize::from(group < extra);
            let slice = &self.entries[start..start + size];
            let c: u64 = slice.iter().map(|e| u64::from(e.compressed_size)).sum();
            let d: u64 = slice.iter().map(|e| u64::from(e.decompressed_size)).sum();
            let c = u32::try_from(c)
                .map_err(|_| Error::format("merged compressed size exceeds the 32-bit field"))?;
            let d = u32::try_from(d)
                .map_err(|_| Error::format("merged decompressed size exceeds the 32-bit field"))?;
            merged.append(c, d, 0)?;
            start += size;
        }
        *self = merged;
        Ok(())
    }

    /// Serialize as the trailing skippable frame.
    pub fn write<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        const MAX_ENTRIES: usize = u32::MAX as usize;
        if self.entries.len() > MAX_ENTRIES {
            warn!(
                "seek table holds {} frames, beyond the format's 32-bit count; merging",
                self.entries.len()
            );
            self.merge_frames(MAX_ENTRIES)?;
        }
        let count = self.entries.len() as u32;
        let content = self.on_disk_size() - SKIPPABLE_HEADER_SIZE;
        let content = u32::try_from(content)
            .map_err(|_| Error::format("seek table frame size exceeds the 32-bit field"))?;

        sink.write_all(&SKIPPABLE_MAGIC.to_le_bytes())?;
        sink.write_all(&content.to_le_bytes())?;
        for entry in &self.entries {
            sink.write_all(&entry.compressed_size.to_le_bytes())?;
            sink.write_all(&entry.decompressed_size.to_le_bytes())?;
            if self.has_checksum {
                sink.write_all(&entry.checksum.to_le_bytes())?;
            }
        }
        sink.write_all(&count.to_le_bytes())?;
        let mut descriptor = 0u8;
        if self.has_checksum {
            descriptor |= DESCRIPTOR_HAS_CHECKSUM;
        }
        sink.write_all(&[descriptor])?;
        sink.write_all(&SEEKABLE_MAGIC.to_le_bytes())?;
        Ok(())
    }
}
