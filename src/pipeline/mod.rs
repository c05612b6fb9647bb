//! The single dispatch loop between capture and every consumer.
//!
//! One task owns the [`FrameExtractor`] (and with it the stream buffer), so
//! frame extraction, the snapshot cache update, the recording append, and
//! the broadcast all happen in sequence for each frame. Viewer attach/detach
//! and recording start/stop stay concurrent with this loop; nothing here
//! blocks on a slow viewer.

pub mod fps;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::capture::{CaptureEvent, FrameExtractor};
use crate::service::CameraService;

pub use fps::FrameRateMeter;

/// Consume capture events until the supervisor side hangs up.
pub fn spawn(
    events: flume::Receiver<CaptureEvent>,
    service: Arc<CameraService>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut extractor = FrameExtractor::new();
        while let Ok(event) = events.recv_async().await {
            match event {
                CaptureEvent::Data(chunk) => {
                    trace!(bytes = chunk.len(), "capture chunk");
                    for frame in extractor.feed(&chunk) {
                        service.dispatch(frame).await;
                    }
                }
                CaptureEvent::Restarted => {
                    let dropped = extractor.reset();
                    if dropped > 0 {
                        debug!(dropped, "discarded partial frame after capture restart");
                    }
                }
                CaptureEvent::Exited(_) => {
                    // Already logged by the supervisor; keep draining in case
                    // buffered chunks are still in flight.
                }
            }
        }
        debug!("capture event channel closed, pipeline loop ending");
    })
}
