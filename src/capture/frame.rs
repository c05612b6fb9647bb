use std::time::Instant;

use bytes::Bytes;

/// One complete JPEG-encoded image, start-of-image marker through
/// end-of-image marker inclusive.
///
/// `Bytes` is refcounted and immutable, so handing a frame to every consumer
/// of a dispatch cycle is zero-copy, and a consumer that needs it longer
/// (the snapshot cache) clones the handle rather than the pixels.
#[derive(Clone)]
pub struct Frame {
    pub data: Bytes,
    /// Monotonic per-stream counter, reset when the extractor is reset.
    pub sequence: u64,
    /// Extraction time, for latency accounting.
    pub timestamp: Instant,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}
