//! The owned service state tying the pipeline to its consumers.
//!
//! Everything that used to be free-floating shared state (viewer set,
//! recording flag, last frame, fps) lives in one `CameraService` held by the
//! HTTP layer and the background tasks, so tests can stand up as many
//! independent instances as they like.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::broadcast::BroadcastHub;
use crate::capture::{Frame, Heartbeat};
use crate::pipeline::FrameRateMeter;
use crate::recording::{RecordingController, RecordingState};
use crate::snapshot::SnapshotService;
use crate::Config;

/// Snapshot of service health for `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub fps: u64,
    pub viewers: usize,
    pub frames: u64,
    pub recording: RecordingState,
}

pub struct CameraService {
    pub hub: BroadcastHub,
    pub recorder: RecordingController,
    pub snapshots: SnapshotService,
    pub fps: Arc<FrameRateMeter>,
    pub heartbeat: Arc<Heartbeat>,
    pub shutdown: CancellationToken,
    frames: AtomicU64,
}

impl CameraService {
    /// Build the service and create the artifact directories.
    pub fn new(config: &Config, shutdown: CancellationToken) -> io::Result<Arc<Self>> {
        std::fs::create_dir_all(&config.storage.snapshots_dir)?;
        std::fs::create_dir_all(&config.storage.recordings_dir)?;

        Ok(Arc::new(Self {
            hub: BroadcastHub::new(
                config.pipeline.boundary.clone(),
                config.pipeline.viewer_buffer,
            ),
            recorder: RecordingController::new(&config.storage, config.capture.framerate),
            snapshots: SnapshotService::new(&config.storage.snapshots_dir),
            fps: Arc::new(FrameRateMeter::new()),
            heartbeat: Arc::new(Heartbeat::new()),
            shutdown,
            frames: AtomicU64::new(0),
        }))
    }

    /// One dispatch cycle: runs on the pipeline task for every extracted
    /// frame, in order. The snapshot cache and the recorder always see the
    /// frame; broadcast and fps accounting short-circuit while nobody is
    /// watching.
    pub async fn dispatch(&self, frame: Frame) {
        self.heartbeat.beat();
        self.frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("argus_frames_total").increment(1);

        self.snapshots.update(frame.clone()).await;
        self.recorder.append(&frame).await;
        if self.hub.broadcast(&frame) {
            self.fps.tick();
        }
    }

    /// Total frames extracted since startup.
    pub fn frames_total(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            fps: self.fps.current(),
            viewers: self.hub.viewer_count(),
            frames: self.frames_total(),
            recording: self.recorder.state().await,
        }
    }
}
