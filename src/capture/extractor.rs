//! Splits the capture subprocess's continuous byte stream into JPEG frames.
//!
//! The stream is back-to-back JPEG images with no framing beyond the JPEG
//! markers themselves: `FF D8` opens an image and `FF D9` closes it. The
//! extractor accumulates chunks and yields one [`Frame`] per complete marker
//! pair, keeping any trailing partial frame buffered for the next chunk.

use std::time::Instant;

use bytes::{Buf, BytesMut};

use crate::capture::frame::Frame;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Stateful per-stream parser. Exclusively owns its buffer; the pipeline
/// loop is the only caller.
pub struct FrameExtractor {
    buf: BytesMut,
    sequence: u64,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            sequence: 0,
        }
    }

    /// Append a chunk and lazily drain every complete frame it completes.
    ///
    /// Leftover bytes after the last end-of-image marker stay buffered, so a
    /// frame split across chunks at any offset (including mid-marker) parses
    /// once the rest arrives. No frame is ever yielded twice. A stream that
    /// stalls mid-frame grows the buffer until the supervisor restarts the
    /// subprocess and the pipeline calls [`reset`](Self::reset).
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buf.extend_from_slice(chunk);
        Frames { extractor: self }
    }

    /// Discard buffered bytes (after a capture restart the tail of the old
    /// stream would corrupt the first new frame). Returns how many bytes
    /// were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        dropped
    }

    /// Bytes waiting for a complete marker pair.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let start = find(&self.buf, SOI)?;
        let end = find(&self.buf[start + 2..], EOI)? + start + 2;

        // Bytes before the start marker are inter-frame garbage.
        self.buf.advance(start);
        let data = self.buf.split_to(end + 2 - start).freeze();

        self.sequence += 1;
        Some(Frame {
            data,
            sequence: self.sequence,
            timestamp: Instant::now(),
        })
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over the frames completed by one `feed` call.
pub struct Frames<'a> {
    extractor: &'a mut FrameExtractor,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.extractor.next_frame()
    }
}

fn find(haystack: &[u8], needle: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}
