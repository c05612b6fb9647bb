//! Library error types.
//!
//! Viewer faults never surface here: a broken viewer is dropped by the hub.
//! These are the failures a caller has to act on.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// Failures taking a still image.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No frame has been parsed yet, so there is nothing to save.
    #[error("no frame available")]
    NoFrame,
    #[error("writing snapshot: {0}")]
    Io(#[from] io::Error),
}

/// Failures starting a recording session.
///
/// Preconditions (already recording, low disk) are not errors; they are
/// ordinary [`crate::recording::StartRecording`] outcomes.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("recording storage: {0}")]
    Io(#[from] io::Error),
}

/// Failures finalizing a raw recording into its distributable container.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to launch encoder: {0}")]
    Spawn(#[source] io::Error),
    #[error("encoder exited with {0}")]
    Failed(ExitStatus),
    #[error("encoder exited cleanly but produced no output file")]
    MissingOutput,
    #[error("removing raw container after encode: {0}")]
    Cleanup(#[source] io::Error),
}
