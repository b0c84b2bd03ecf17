//! Core of the seekable compression format.
//!
//! Four layers, leaves first:
//!
//! - [`buffer`]: a growable output accumulator that coalesces codec output
//!   of unknown size with at most one copy.
//! - [`compress`] / [`decompress`]: resumable streaming sessions that
//!   drive an abstract codec [`engine`] call by call, with partial-output
//!   caps and unconsumed-input re-buffering.
//! - [`seek_table`]: the self-describing binary index appended to a
//!   stream of frames.
//! - [`writer`] / [`reader`]: frame-bounded writing and random-access
//!   reading composed from the layers above.
//!
//! Engine implementations live in the `szf_engines` crate; this crate
//! only consumes the [`engine`] contract.

pub mod buffer;
pub mod compress;
pub mod decompress;
pub mod engine;
pub mod error;
pub mod reader;
pub mod seek_table;
pub mod writer;

#[cfg(test)]
pub(crate) mod testengine;

pub use compress::{compress_frame, Compressor};
pub use decompress::{decompress_frames, FrameDecompressor, StreamDecompressor};
pub use engine::{CompressEngine, DecompressEngine, FlushMode, InputCursor, OutputCursor};
pub use error::{Error, Result};
pub use reader::SeekableReader;
pub use seek_table::{FrameEntry, SeekTable, MAX_FRAME_CONTENT_SIZE};
pub use writer::{SeekableWriter, Truncate, DEFAULT_MAX_FRAME_SIZE};
