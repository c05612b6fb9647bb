//! On-demand persistence of the frame stream.
//!
//! While a session is active every extracted frame is appended to a raw
//! MJPEG container in arrival order; `stop` hands the container to the
//! encoder task for MP4 finalization. Appends are best-effort: a write
//! failure degrades the session and is logged once, it never touches the
//! broadcaster. At most one session exists at a time.

pub mod encoder;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::Frame;
use crate::error::RecordingError;
use crate::utils;
use crate::StorageConfig;

/// Outcome of a start request. Preconditions are ordinary outcomes here,
/// not errors: callers render them as a refused-but-healthy response.
#[derive(Debug)]
pub enum StartRecording {
    Started { path: PathBuf },
    AlreadyRecording,
    InsufficientSpace { available: u64, required: u64 },
}

/// Outcome of a stop request.
#[derive(Debug)]
pub enum StopRecording {
    Stopped { raw: PathBuf, output: PathBuf },
    NotRecording,
}

/// Caller-visible session state for `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingState {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub frames: u64,
}

struct RecordingSession {
    raw_path: PathBuf,
    writer: BufWriter<File>,
    started_at: DateTime<Utc>,
    frames: u64,
    bytes: u64,
    write_errors: u64,
}

pub struct RecordingController {
    dir: PathBuf,
    min_free_bytes: u64,
    encoder_program: String,
    framerate: u32,
    session: Mutex<Option<RecordingSession>>,
    finalizers: Mutex<Vec<JoinHandle<()>>>,
}

impl RecordingController {
    pub fn new(storage: &StorageConfig, framerate: u32) -> Self {
        Self {
            dir: storage.recordings_dir.clone(),
            min_free_bytes: storage.min_free_bytes,
            encoder_program: storage.encoder_program.clone(),
            framerate,
            session: Mutex::new(None),
            finalizers: Mutex::new(Vec::new()),
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn state(&self) -> RecordingState {
        match self.session.lock().await.as_ref() {
            Some(s) => RecordingState {
                active: true,
                path: Some(s.raw_path.display().to_string()),
                started_at: Some(s.started_at.to_rfc3339()),
                frames: s.frames,
            },
            None => RecordingState {
                active: false,
                path: None,
                started_at: None,
                frames: 0,
            },
        }
    }

    /// Open a new session unless one is active or free space on the
    /// recordings volume is below the floor.
    pub async fn start(&self) -> Result<StartRecording, RecordingError> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Ok(StartRecording::AlreadyRecording);
        }

        let available = utils::free_bytes(&self.dir)?;
        if available < self.min_free_bytes {
            warn!(
                available,
                required = self.min_free_bytes,
                "refusing to record, not enough free space"
            );
            return Ok(StartRecording::InsufficientSpace {
                available,
                required: self.min_free_bytes,
            });
        }

        let raw_path = self.dir.join(format!("{}.mjpeg", utils::timestamp_name()));
        let file = File::create(&raw_path)?;
        *guard = Some(RecordingSession {
            raw_path: raw_path.clone(),
            writer: BufWriter::new(file),
            started_at: Utc::now(),
            frames: 0,
            bytes: 0,
            write_errors: 0,
        });
        info!(path = %raw_path.display(), "recording started");
        Ok(StartRecording::Started { path: raw_path })
    }

    /// Append one frame to the active session, if any. Write failures
    /// degrade the session instead of propagating.
    pub async fn append(&self, frame: &Frame) {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        let result = tokio::task::block_in_place(|| session.writer.write_all(&frame.data));
        match result {
            Ok(()) => {
                session.frames += 1;
                session.bytes += frame.len() as u64;
                metrics::counter!("argus_recorded_bytes_total").increment(frame.len() as u64);
            }
            Err(e) => {
                session.write_errors += 1;
                if session.write_errors == 1 {
                    warn!(
                        path = %session.raw_path.display(),
                        "recording write failed, session degraded: {e}"
                    );
                }
            }
        }
    }

    /// Close the active session and hand the raw container to the encoder.
    /// The raw file is deleted only after a successful encode; on encoder
    /// failure it stays put for manual recovery.
    pub async fn stop(&self) -> StopRecording {
        let Some(mut session) = self.session.lock().await.take() else {
            return StopRecording::NotRecording;
        };

        if let Err(e) = tokio::task::block_in_place(|| session.writer.flush()) {
            warn!(path = %session.raw_path.display(), "flushing raw recording: {e}");
        }
        info!(
            path = %session.raw_path.display(),
            frames = session.frames,
            bytes = session.bytes,
            write_errors = session.write_errors,
            "recording stopped"
        );

        let raw = session.raw_path.clone();
        let output = raw.with_extension("mp4");
        drop(session); // closes the file before the encoder reads it

        let program = self.encoder_program.clone();
        let framerate = self.framerate;
        let (task_raw, task_output) = (raw.clone(), output.clone());
        let handle = tokio::spawn(async move {
            match encoder::finalize(&program, &task_raw, &task_output, framerate).await {
                Ok(()) => info!(output = %task_output.display(), "recording finalized"),
                Err(e) => warn!(
                    raw = %task_raw.display(),
                    "finalizing recording failed, raw container kept: {e}"
                ),
            }
        });
        self.finalizers.lock().await.push(handle);

        StopRecording::Stopped { raw, output }
    }

    /// Await any in-flight encoder tasks (shutdown path and tests).
    pub async fn wait_for_finalize(&self) {
        let handles: Vec<_> = self.finalizers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
