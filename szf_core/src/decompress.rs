//! Streaming decompressor sessions.
//!
//! Two session flavors share one state machine. [`FrameDecompressor`]
//! stops at the first completed frame and reports trailing bytes through
//! `unused_data`. [`StreamDecompressor`] decodes concatenated frames,
//! skippable frames included, and reports whether the stream currently
//! rests on a frame boundary.

use crate::buffer::BlockBuffer;
use crate::engine::{DecompressEngine, InputCursor};
use crate::error::{Error, Result};

/// Where a session stands between calls.
///
/// Modeled as a single enum so that contradictory flag combinations
/// cannot exist.
#[derive(Debug)]
enum State {
    /// Settled on a frame boundary with nothing buffered. Fresh sessions
    /// start here.
    AtFrameEdge,
    /// Inside a frame with all supplied input consumed; the engine wants
    /// more bytes.
    MidFrame,
    /// An output cap stopped the last call early. `staged` holds input
    /// accepted but not yet consumed, possibly empty: the engine may still
    /// have output to deliver without any new bytes.
    Capped { staged: Vec<u8> },
    /// First frame fully decoded. Bounded sessions only; terminal.
    Finished { unused: Vec<u8> },
}

struct Session<E> {
    engine: E,
    state: State,
}

impl<E: DecompressEngine> Session<E> {
    fn new(engine: E) -> Self {
        Self {
            engine,
            state: State::AtFrameEdge,
        }
    }

    fn needs_input(&self) -> bool {
        matches!(self.state, State::AtFrameEdge | State::MidFrame)
    }

    fn reset(&mut self) {
        self.engine.reset_session();
        self.state = State::AtFrameEdge;
    }

    /// Shared decode call. `bounded` sessions stop at the first frame
    /// boundary; endless ones keep going across frames.
    fn decompress(
        &mut self,
        data: &[u8],
        max_length: Option<usize>,
        bounded: bool,
    ) -> Result<Vec<u8>> {
        if matches!(self.state, State::Finished { .. }) {
            return Err(Error::protocol("already at the end of the frame"));
        }
        let at_edge = matches!(self.state, State::AtFrameEdge);
        // Settled on a frame boundary and handed nothing new: the stream
        // is at rest, don't touch the engine.
        if !bounded && at_edge && data.is_empty() {
            return Ok(Vec::new());
        }

        // Assemble the input view. Unconsumed leftovers from an earlier
        // capped call sit at the front of the staging buffer; new bytes go
        // after them.
        let mut staged = match &mut self.state {
            State::Capped { staged } => std::mem::take(staged),
            _ => Vec::new(),
        };
        let combined: &[u8] = if staged.is_empty() {
            data
        } else if data.is_empty() {
            &staged
        } else {
            staged.extend_from_slice(data);
            &staged
        };

        // Fast path: starting a fresh frame whose header declares its
        // decompressed size, and the whole frame appears to be present.
        // Pre-size the output exactly and skip dynamic growth.
        let mut size_hint = None;
        if !bounded && at_edge && !data.is_empty() && staged.is_empty() {
            if let Some(size) = self.engine.frame_content_size(data) {
                if self.engine.frame_looks_complete(data) {
                    size_hint = usize::try_from(size).ok();
                }
            }
        }
        let mut out = match size_hint {
            Some(hint) => BlockBuffer::with_hint(max_length, hint),
            None => BlockBuffer::new(max_length),
        };

        let mut input = InputCursor::new(combined);
        let mut at_edge_now = at_edge;
        let mut eof = false;
        let mut capped = false;
        let mut failure = None;

        loop {
            let mut cursor = out.tail();
            let step = self.engine.step(&mut input, &mut cursor);
            let pos = cursor.pos();
            drop(cursor);
            out.commit(pos);

            let hint = match step {
                Ok(hint) => hint,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };

            if bounded {
                if hint == 0 {
                    eof = true;
                    break;
                }
            } else {
                // The stream is only at rest when both facts hold: the
                // engine reported a frame boundary and the input ran out.
                at_edge_now = hint == 0;
                if at_edge_now && input.is_exhausted() {
                    break;
                }
            }

            if out.block_is_full() {
                if out.reached_max() {
                    capped = true;
                    break;
                }
                if let Err(err) = out.grow() {
                    failure = Some(err);
                    break;
                }
                continue;
            }
            if input.is_exhausted() {
                break;
            }
        }

        if let Some(err) = failure {
            // Staged input was already detached and is dropped here; the
            // session resets to its fresh state and stays reusable. The
            // failed stream's output is lost.
            self.reset();
            return Err(err);
        }

        self.state = if bounded && eof {
            State::Finished {
                unused: input.remaining().to_vec(),
            }
        } else if !input.is_exhausted() {
            // Output cap hit mid-input: keep the unconsumed suffix for the
            // next call.
            State::Capped {
                staged: input.remaining().to_vec(),
            }
        } else if capped {
            // Capped exactly at input end while the frame is not at rest:
            // the engine may produce more output without new bytes.
            State::Capped { staged: Vec::new() }
        } else if !bounded && at_edge_now {
            State::AtFrameEdge
        } else {
            State::MidFrame
        };

        Ok(out.finish())
    }
}

/// Decoder for a single frame.
///
/// Decoding stops at the first frame boundary; bytes supplied past it are
/// reported verbatim through [`unused_data`](Self::unused_data).
pub struct FrameDecompressor<E> {
    session: Session<E>,
}

impl<E: DecompressEngine> FrameDecompressor<E> {
    pub fn new(engine: E) -> Self {
        Self {
            session: Session::new(engine),
        }
    }

    /// Decode up to `max_length` bytes (`None` for unlimited). Returns the
    /// decompressed bytes produced by this call.
    pub fn decompress(&mut self, data: &[u8], max_length: Option<usize>) -> Result<Vec<u8>> {
        self.session.decompress(data, max_length, true)
    }

    /// False while undelivered output is pending inside the session; call
    /// again with empty input to drain it.
    pub fn needs_input(&self) -> bool {
        self.session.needs_input()
    }

    /// The frame decoded to completion.
    pub fn eof(&self) -> bool {
        matches!(self.session.state, State::Finished { .. })
    }

    /// Bytes supplied after the end of the frame. Empty before `eof`.
    pub fn unused_data(&self) -> &[u8] {
        match &self.session.state {
            State::Finished { unused } => unused,
            _ => &[],
        }
    }

    /// Return the session to its fresh state for a new frame.
    pub fn reset(&mut self) {
        self.session.reset();
    }
}

/// Decoder for a whole stream of concatenated frames.
///
/// Skippable frames are consumed transparently; they produce no output but
/// advance the frame edge exactly as an empty data frame would.
pub struct StreamDecompressor<E> {
    session: Session<E>,
}

impl<E: DecompressEngine> StreamDecompressor<E> {
    pub fn new(engine: E) -> Self {
        Self {
            session: Session::new(engine),
        }
    }

    /// Decode up to `max_length` bytes (`None` for unlimited). Returns the
    /// decompressed bytes produced by this call.
    pub fn decompress(&mut self, data: &[u8], max_length: Option<usize>) -> Result<Vec<u8>> {
        self.session.decompress(data, max_length, false)
    }

    /// False while undelivered output is pending inside the session; call
    /// again with empty input to drain it.
    pub fn needs_input(&self) -> bool {
        self.session.needs_input()
    }

    /// True when all supplied input was consumed and the last frame is
    /// complete, i.e. the stream is at rest on a frame boundary.
    pub fn at_frame_edge(&self) -> bool {
        matches!(self.session.state, State::AtFrameEdge)
    }

    /// Return the session to its fresh state for a new stream.
    pub fn reset(&mut self) {
        self.session.reset();
    }
}

/// Decode a complete stream of concatenated frames in one call, assuming
/// no further input exists.
///
/// Unlike the streaming sessions, which leave "more input needed" to the
/// caller's judgment, this entry point knows the input is all there is and
/// reports a mid-frame ending as [`Error::Truncated`].
pub fn decompress_frames<E: DecompressEngine>(engine: E, data: &[u8]) -> Result<Vec<u8>> {
    let mut session = StreamDecompressor::new(engine);
    let out = session.decompress(data, None)?;
    if !session.at_frame_edge() {
        return Err(Error::Truncated);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::Compressor;
    use crate::engine::FlushMode;
    use crate::testengine::{
        skippable_frame, stored_frame, StoredCompressEngine, StoredDecompressEngine,
    };

    fn frame(payload: &[u8]) -> Vec<u8> {
        stored_frame(payload)
    }

    #[test]
    fn empty_input_on_fresh_session_is_idempotent() {
        let mut endless = StreamDecompressor::new(StoredDecompressEngine::new());
        assert_eq!(endless.decompress(b"", None).unwrap(), b"");
        assert!(endless.needs_input());
        assert!(endless.at_frame_edge());

        let mut bounded = FrameDecompressor::new(StoredDecompressEngine::new());
        assert_eq!(bounded.decompress(b"", None).unwrap(), b"");
        assert!(bounded.needs_input());
        assert!(!bounded.eof());
    }

    #[test]
    fn single_frame_decodes_whole() {
        let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());
        let out = dec.decompress(&frame(b"abcdef"), None).unwrap();
        assert_eq!(out, b"abcdef");
        assert!(dec.at_frame_edge());
        assert!(dec.needs_input());
    }

    #[test]
    fn arbitrary_chunking_reassembles() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let stream = frame(&payload);

        for chunk_size in [1usize, 2, 3, 7, 64, 1000] {
            let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());
            let mut out = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                out.extend(dec.decompress(chunk, None).unwrap());
            }
            assert_eq!(out, payload, "chunk size {chunk_size}");
            assert!(dec.at_frame_edge());
        }
    }

    #[test]
    fn concatenated_frames_decode_across_edges() {
        let mut stream = frame(b"first");
        stream.extend(frame(b"second"));
        let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());
        let out = dec.decompress(&stream, None).unwrap();
        assert_eq!(out, b"firstsecond");
        assert!(dec.at_frame_edge());
    }

    #[test]
    fn output_cap_stages_unconsumed_input() {
        let stream = frame(&[7u8; 100]);
        let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());

        let first = dec.decompress(&stream, Some(30)).unwrap();
        assert_eq!(first, vec![7u8; 30]);
        assert!(!dec.needs_input());
        assert!(!dec.at_frame_edge());

        // Drain the rest with empty input.
        let mut rest = Vec::new();
        while !dec.needs_input() {
            rest.extend(dec.decompress(b"", Some(33)).unwrap());
        }
        assert_eq!(rest, vec![7u8; 70]);
        assert!(dec.at_frame_edge());
    }

    #[test]
    fn zero_cap_is_valid_and_defers_output() {
        let stream = frame(b"xyz");
        let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());
        let out = dec.decompress(&stream, Some(0)).unwrap();
        assert!(out.is_empty());
        assert!(!dec.needs_input());

        let rest = dec.decompress(b"", None).unwrap();
        assert_eq!(rest, b"xyz");
        assert!(dec.at_frame_edge());
    }

    #[test]
    fn staged_input_merges_with_new_data() {
        let payload = vec![3u8; 200];
        let stream = frame(&payload);
        let (head, tail) = stream.split_at(stream.len() / 2);

        let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());
        let mut out = dec.decompress(head, Some(10)).unwrap();
        // head is only partially consumed; the leftover must be re-buffered
        // in front of the tail.
        out.extend(dec.decompress(tail, None).unwrap());
        assert_eq!(out, payload);
        assert!(dec.at_frame_edge());
    }

    #[test]
    fn skippable_frame_advances_edge_with_no_output() {
        let mut stream = frame(b"data");
        stream.extend(skippable_frame(b"metadata"));
        let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());
        let out = dec.decompress(&stream, None).unwrap();
        assert_eq!(out, b"data");
        assert!(dec.at_frame_edge());
        assert!(dec.needs_input());
    }

    #[test]
    fn bounded_stops_at_first_frame_and_keeps_unused() {
        let mut stream = frame(b"head");
        stream.extend(frame(b"tail"));
        let mut dec = FrameDecompressor::new(StoredDecompressEngine::new());
        let out = dec.decompress(&stream, None).unwrap();
        assert_eq!(out, b"head");
        assert!(dec.eof());
        assert_eq!(dec.unused_data(), frame(b"tail"));

        let err = dec.decompress(b"more", None).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn truncated_stream_never_reaches_edge() {
        let stream = frame(b"payload");
        let cut = &stream[..stream.len() - 1];
        let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());
        let out = dec.decompress(cut, None).unwrap();
        assert_eq!(out, b"payload");
        assert!(!dec.at_frame_edge());
        assert!(dec.needs_input());

        assert!(matches!(
            decompress_frames(StoredDecompressEngine::new(), cut),
            Err(Error::Truncated)
        ));
        assert!(decompress_frames(StoredDecompressEngine::new(), &stream).is_ok());
    }

    #[test]
    fn engine_error_resets_session_for_reuse() {
        let mut dec = StreamDecompressor::new(StoredDecompressEngine::new());
        let err = dec.decompress(&[0xEE, 1, 2, 3], None).unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
        assert!(dec.needs_input());
        assert!(dec.at_frame_edge());

        let out = dec.decompress(&frame(b"fresh"), None).unwrap();
        assert_eq!(out, b"fresh");
    }

    #[test]
    fn size_hint_path_matches_dynamic_growth() {
        // A complete frame at a frame edge takes the pre-sized path; the
        // same frame fed in two pieces takes dynamic growth. Outputs must
        // be identical.
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let stream = frame(&payload);

        let mut whole = StreamDecompressor::new(StoredDecompressEngine::new());
        let out_whole = whole.decompress(&stream, None).unwrap();

        let mut split = StreamDecompressor::new(StoredDecompressEngine::new());
        let (a, b) = stream.split_at(10);
        let mut out_split = split.decompress(a, None).unwrap();
        out_split.extend(split.decompress(b, None).unwrap());

        assert_eq!(out_whole, payload);
        assert_eq!(out_split, payload);
    }

    #[test]
    fn round_trip_through_fake_engine() {
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 256) as u8).collect();
        let mut comp = Compressor::new(StoredCompressEngine::new());
        let mut stream = Vec::new();
        for chunk in payload.chunks(997) {
            stream.extend(comp.compress(chunk, FlushMode::Continue).unwrap());
        }
        stream.extend(comp.flush(FlushMode::EndFrame).unwrap());

        assert_eq!(
            decompress_frames(StoredDecompressEngine::new(), &stream).unwrap(),
            payload
        );
    }
}
