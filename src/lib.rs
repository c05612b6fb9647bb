//! argus — live MJPEG camera distribution for a home robot.
//!
//! Owns an external capture subprocess, splits its stdout into JPEG frames,
//! fans the frames out to HTTP viewers (`multipart/x-mixed-replace`), records
//! them to disk on demand, and guards active recordings with disk-space and
//! wireless-link watchdogs. Everything above (motor control, intent pipeline,
//! smart-home bridge) talks to this crate through the HTTP command surface.

pub mod broadcast;
pub mod capture;
pub mod error;
pub mod pipeline;
pub mod recording;
pub mod server;
pub mod service;
pub mod snapshot;
pub mod utils;
pub mod watchdog;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use capture::{CaptureEvent, CaptureSupervisor, Frame, FrameExtractor, Heartbeat};
pub use service::CameraService;

/// System configuration. Every field has a working default; a TOML file can
/// overlay any subset of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub watchdog: WatchdogConfig,
}

/// Capture subprocess tuning. All static: changing resolution or framerate
/// means restarting the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture program emitting MJPEG on stdout.
    pub program: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// JPEG quality, 1-100.
    pub quality: u32,
    /// Mirror flags for reversed camera mounts.
    pub hflip: bool,
    pub vflip: bool,
    /// Read size for the stdout pump.
    pub chunk_bytes: usize,
    /// Restart the subprocess if no frame is extracted for this long.
    pub stall_timeout_ms: u64,
    /// Consecutive stall restarts before giving up (resets once frames flow).
    pub max_stall_restarts: u32,
    /// SIGTERM grace period before escalating to SIGKILL.
    pub stop_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Depth of the capture → extractor chunk channel.
    pub channel_depth: usize,
    /// Encoded parts buffered per viewer before a slow viewer is dropped.
    pub viewer_buffer: usize,
    /// Multipart boundary token.
    pub boundary: String,
    /// FPS reporting window.
    pub fps_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Public MJPEG stream listener.
    pub stream_addr: String,
    /// Loopback control listener for the control-surface collaborator.
    pub control_addr: String,
    /// Hard cap on ordered teardown before the process force-exits.
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub snapshots_dir: PathBuf,
    pub recordings_dir: PathBuf,
    /// Recording refuses to start (and the disk watchdog force-stops it)
    /// below this much free space on the recordings volume.
    pub min_free_bytes: u64,
    /// Encoder program finalizing raw MJPEG into MP4.
    pub encoder_program: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub disk_interval_ms: u64,
    pub link_interval_ms: u64,
    /// Wireless interface whose link state gates recording.
    pub wireless_iface: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: "/usr/bin/rpicam-vid".into(),
            width: 640,
            height: 480,
            framerate: 30,
            quality: 80,
            hflip: false,
            vflip: true, // camera is mounted upside down on the chassis
            chunk_bytes: 64 * 1024,
            stall_timeout_ms: 5_000,
            max_stall_restarts: 3,
            stop_grace_ms: 2_000,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_depth: 16,
            viewer_buffer: 16,
            boundary: "frame".into(),
            fps_window_ms: 1_000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stream_addr: "0.0.0.0:8888".into(),
            control_addr: "127.0.0.1:8890".into(),
            shutdown_timeout_ms: 3_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshots_dir: PathBuf::from("/var/lib/argus/snapshots"),
            recordings_dir: PathBuf::from("/var/lib/argus/recordings"),
            min_free_bytes: 256 * 1024 * 1024,
            encoder_program: "ffmpeg".into(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            disk_interval_ms: 5_000,
            link_interval_ms: 10_000,
            wireless_iface: "wlan0".into(),
        }
    }
}

impl Config {
    /// Load configuration, overlaying an optional TOML file on the defaults.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder.build()?.try_deserialize()
    }
}
