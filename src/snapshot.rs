//! Still images on demand from the most recently extracted frame.

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::info;

use crate::capture::Frame;
use crate::error::SnapshotError;
use crate::utils;

pub struct SnapshotService {
    dir: PathBuf,
    last: RwLock<Option<Frame>>,
}

impl SnapshotService {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Overwrite the cached frame; called once per extraction.
    pub async fn update(&self, frame: Frame) {
        *self.last.write().await = Some(frame);
    }

    /// Sequence number of the cached frame, if any (status reporting).
    pub async fn last_sequence(&self) -> Option<u64> {
        self.last.read().await.as_ref().map(|f| f.sequence)
    }

    /// Write the cached frame to a timestamped file and return its path.
    /// Fails with [`SnapshotError::NoFrame`] before the first extraction.
    pub async fn capture(&self) -> Result<PathBuf, SnapshotError> {
        let frame = self
            .last
            .read()
            .await
            .clone()
            .ok_or(SnapshotError::NoFrame)?;
        let path = self.dir.join(format!("{}.jpg", utils::timestamp_name()));
        tokio::fs::write(&path, &frame.data).await?;
        info!(path = %path.display(), bytes = frame.len(), "snapshot saved");
        Ok(path)
    }
}
