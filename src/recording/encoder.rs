//! Finalizes a raw MJPEG container into a broadly playable MP4.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::EncodeError;

/// Run the encoder subprocess over `raw`, producing `output`.
///
/// Success is "exited 0 and the output file exists"; only then is the raw
/// container removed. The explicit `-framerate` keeps playback speed at the
/// capture rate (recording is best-effort, not frame-accurate, but constant
/// pacing is still wanted).
pub async fn finalize(
    program: &str,
    raw: &Path,
    output: &Path,
    framerate: u32,
) -> Result<(), EncodeError> {
    debug!(program, raw = %raw.display(), output = %output.display(), "starting encode");
    let status = Command::new(program)
        .arg("-y")
        .arg("-f")
        .arg("mjpeg")
        .arg("-framerate")
        .arg(framerate.to_string())
        .arg("-i")
        .arg(raw)
        .arg("-movflags")
        .arg("+faststart")
        .arg("-pix_fmt")
        .arg("yuv420p")
        .arg(output)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(EncodeError::Spawn)?;

    if !status.success() {
        return Err(EncodeError::Failed(status));
    }
    if !output.exists() {
        return Err(EncodeError::MissingOutput);
    }
    tokio::fs::remove_file(raw)
        .await
        .map_err(EncodeError::Cleanup)?;
    Ok(())
}
