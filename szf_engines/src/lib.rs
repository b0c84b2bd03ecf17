//! Zstandard-backed implementations of the `szf_core` engine contract.
//!
//! All streaming goes through the `zstd_safe` CCtx/DCtx incremental API;
//! the sessions in `szf_core` own the buffering and state machines.

mod zstd_engine;

pub use zstd_engine::{
    compression_level_range, CompressOptions, DecompressOptions, Dictionary,
    ZstdCompressEngine, ZstdDecompressEngine,
};
