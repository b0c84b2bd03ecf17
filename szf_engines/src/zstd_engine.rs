use log::warn;
use zstd::zstd_safe::zstd_sys::ZSTD_EndDirective;
use zstd::zstd_safe::{
    self, CCtx, CParameter, DCtx, DParameter, InBuffer, OutBuffer, ResetDirective,
};

use szf_core::engine::{
    CompressEngine, DecompressEngine, FlushMode, InputCursor, OutputCursor,
};
use szf_core::error::{Error, Result};

/// Dictionary content and how it binds to a session.
///
/// The binding mode is decided at the call site, never inferred from the
/// payload.
pub enum Dictionary<'a> {
    /// Digested once into an engine-internal table when the engine is
    /// built; reusable across frames at the level it was digested for,
    /// overriding session compression parameters.
    Digested(&'a [u8]),
    /// Raw bytes loaded into the session; session parameters stay in
    /// effect. Cheap to build, costlier per load.
    Undigested(&'a [u8]),
    /// Reference content for the immediately following frame only.
    Prefix(&'a [u8]),
}

fn engine_err(code: zstd_safe::ErrorCode) -> Error {
    Error::Engine(zstd_safe::get_error_name(code).to_string())
}

fn directive(mode: FlushMode) -> ZSTD_EndDirective {
    match mode {
        FlushMode::Continue => ZSTD_EndDirective::ZSTD_e_continue,
        FlushMode::FlushBlock => ZSTD_EndDirective::ZSTD_e_flush,
        FlushMode::EndFrame => ZSTD_EndDirective::ZSTD_e_end,
    }
}

/// The zstd compression levels this build accepts.
pub fn compression_level_range() -> std::ops::RangeInclusive<i32> {
    zstd::compression_level_range()
}

// ── Compression ────────────────────────────────────────────────────────────

/// Configuration for a [`ZstdCompressEngine`].
pub struct CompressOptions<'a> {
    level: i32,
    checksum: bool,
    window_log: Option<u32>,
    workers: u32,
    dictionary: Option<Dictionary<'a>>,
}

impl<'a> CompressOptions<'a> {
    pub fn new(level: i32) -> Self {
        Self {
            level,
            checksum: false,
            window_log: None,
            workers: 0,
            dictionary: None,
        }
    }

    /// Append a content checksum to every frame.
    pub fn checksum(mut self, on: bool) -> Self {
        self.checksum = on;
        self
    }

    pub fn window_log(mut self, log: u32) -> Self {
        self.window_log = Some(log);
        self
    }

    /// Background worker threads inside the engine. Degrades to zero with
    /// a warning when the built engine does not support them.
    pub fn workers(mut self, n: u32) -> Self {
        self.workers = n;
        self
    }

    pub fn dictionary(mut self, dictionary: Dictionary<'a>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn into_engine(self) -> Result<ZstdCompressEngine<'a>> {
        let mut cctx = CCtx::create();
        cctx.set_parameter(CParameter::CompressionLevel(self.level))
            .map_err(engine_err)?;
        cctx.set_parameter(CParameter::ChecksumFlag(self.checksum))
            .map_err(engine_err)?;
        if let Some(log) = self.window_log {
            cctx.set_parameter(CParameter::WindowLog(log))
                .map_err(engine_err)?;
        }

        let mut workers = self.workers;
        if workers > 0 {
            if let Err(code) = cctx.set_parameter(CParameter::NbWorkers(workers)) {
                warn!(
                    "worker threads unavailable ({}); compressing single-threaded",
                    zstd_safe::get_error_name(code)
                );
                workers = 0;
            }
        }

        let mut cdict = None;
        match self.dictionary {
            Some(Dictionary::Digested(bytes)) => {
                let prepared = zstd_safe::create_cdict(bytes, self.level);
                let prepared = cdict.insert(prepared);
                cctx.ref_cdict(prepared).map_err(engine_err)?;
            }
            Some(Dictionary::Undigested(bytes)) => {
                cctx.load_dictionary(bytes).map_err(engine_err)?;
            }
            Some(Dictionary::Prefix(bytes)) => {
                cctx.ref_prefix(bytes).map_err(engine_err)?;
            }
            None => {}
        }

        Ok(ZstdCompressEngine {
            cctx,
            workers,
            _cdict: cdict,
        })
    }
}

/// Incremental zstd compressor context.
pub struct ZstdCompressEngine<'a> {
    cctx: CCtx<'a>,
    workers: u32,
    /// Keeps a digested dictionary alive as long as the context refers to
    /// it.
    _cdict: Option<zstd_safe::CDict<'static>>,
}

impl ZstdCompressEngine<'static> {
    pub fn new(level: i32) -> Result<Self> {
        CompressOptions::new(level).into_engine()
    }
}

impl CompressEngine for ZstdCompressEngine<'_> {
    fn step(
        &mut self,
        input: &mut InputCursor<'_>,
        output: &mut OutputCursor<'_>,
        mode: FlushMode,
    ) -> Result<usize> {
        let mut in_buf = InBuffer::around(input.remaining());
        let mut out_buf = OutBuffer::around(output.spare_mut());
        let result = self
            .cctx
            .compress_stream2(&mut out_buf, &mut in_buf, directive(mode));
        let written = out_buf.pos();
        let consumed = in_buf.pos;
        drop(out_buf);
        output.advance(written);
        input.advance(consumed);
        result.map_err(engine_err)
    }

    fn reset_session(&mut self) {
        let _ = self.cctx.reset(ResetDirective::SessionOnly);
    }

    fn compress_bound(&self, len: usize) -> usize {
        zstd_safe::compress_bound(len)
    }

    fn worker_count(&self) -> u32 {
        self.workers
    }
}

// ── Decompression ──────────────────────────────────────────────────────────

/// Configuration for a [`ZstdDecompressEngine`].
pub struct DecompressOptions<'a> {
    window_log_max: Option<u32>,
    dictionary: Option<Dictionary<'a>>,
}

impl<'a> DecompressOptions<'a> {
    pub fn new() -> Self {
        Self {
            window_log_max: None,
            dictionary: None,
        }
    }

    /// Ceiling on the window size a frame may demand, bounding worst-case
    /// decompression memory.
    pub fn window_log_max(mut self, log: u32) -> Self {
        self.window_log_max = Some(log);
        self
    }

    pub fn dictionary(mut self, dictionary: Dictionary<'a>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn into_engine(self) -> Result<ZstdDecompressEngine<'a>> {
        let mut dctx = DCtx::create();
        if let Some(log) = self.window_log_max {
            dctx.set_parameter(DParameter::WindowLogMax(log))
                .map_err(engine_err)?;
        }

        let mut ddict = None;
        match self.dictionary {
            Some(Dictionary::Digested(bytes)) => {
                let prepared = zstd_safe::create_ddict(bytes);
                let prepared = ddict.insert(prepared);
                dctx.ref_ddict(prepared).map_err(engine_err)?;
            }
            Some(Dictionary::Undigested(bytes)) => {
                dctx.load_dictionary(bytes).map_err(engine_err)?;
            }
            Some(Dictionary::Prefix(bytes)) => {
                dctx.ref_prefix(bytes).map_err(engine_err)?;
            }
            None => {}
        }

        Ok(ZstdDecompressEngine {
            dctx,
            _ddict: ddict,
        })
    }
}

impl Default for DecompressOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental zstd decompressor context.
pub struct ZstdDecompressEngine<'a> {
    dctx: DCtx<'a>,
    /// Keeps a digested dictionary alive as long as the context refers to
    /// it.
    _ddict: Option<zstd_safe::DDict<'static>>,
}

impl ZstdDecompressEngine<'static> {
    pub fn new() -> Result<Self> {
        DecompressOptions::new().into_engine()
    }
}

impl DecompressEngine for ZstdDecompressEngine<'_> {
    fn step(
        &mut self,
        input: &mut InputCursor<'_>,
        output: &mut OutputCursor<'_>,
    ) -> Result<usize> {
        let mut in_buf = InBuffer::around(input.remaining());
        let mut out_buf = OutBuffer::around(output.spare_mut());
        let result = self.dctx.decompress_stream(&mut out_buf, &mut in_buf);
        let written = out_buf.pos();
        let consumed = in_buf.pos;
        drop(out_buf);
        output.advance(written);
        input.advance(consumed);
        result.map_err(engine_err)
    }

    fn reset_session(&mut self) {
        let _ = self.dctx.reset(ResetDirective::SessionOnly);
    }

    fn frame_content_size(&self, data: &[u8]) -> Option<u64> {
        zstd_safe::get_frame_content_size(data).ok().flatten()
    }

    fn frame_looks_complete(&self, data: &[u8]) -> bool {
        zstd_safe::find_frame_compressed_size(data)
            .map(|frame_len| frame_len <= data.len())
            .unwrap_or(false)
    }
}
