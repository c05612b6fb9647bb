//! Capture subprocess lifecycle.
//!
//! One supervised task owns the child for its whole life: spawn, pump
//! stdout into the pipeline channel, watch for stalls, and tear the child
//! down on shutdown. An unexpected exit is surfaced as a degraded-service
//! condition, not respawned — silent infinite retry would mask a camera
//! hardware fault. A *stall* (child alive, no frames extracted within the
//! timeout) is different: the child is killed and respawned, a bounded
//! number of consecutive times.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::CaptureConfig;

/// What the supervisor feeds the pipeline.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A raw chunk of subprocess stdout, boundaries arbitrary.
    Data(Bytes),
    /// The subprocess was killed and respawned after a stall; the extractor
    /// must drop its buffered tail of the old stream.
    Restarted,
    /// The subprocess is gone and will not come back without operator
    /// intervention.
    Exited(Option<i32>),
}

/// Frame-extraction liveness shared between the pipeline (which beats it per
/// extracted frame) and the supervisor (which restarts the child when it
/// goes quiet).
pub struct Heartbeat {
    epoch: Instant,
    last_beat_ms: AtomicU64,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_beat_ms: AtomicU64::new(0),
        }
    }

    pub fn beat(&self) {
        self.last_beat_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// Time since the last beat. Before the first beat this is the age of
    /// the heartbeat itself, so a stream that never produces counts as idle.
    pub fn idle(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_beat_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the capture subprocess for the lifetime of the service.
pub struct CaptureSupervisor {
    config: CaptureConfig,
}

impl CaptureSupervisor {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Run the supervisor until shutdown, subprocess exit, or a stall budget
    /// exhausted.
    pub fn start(
        self,
        events: flume::Sender<CaptureEvent>,
        heartbeat: std::sync::Arc<Heartbeat>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, heartbeat, shutdown))
    }

    async fn run(
        self,
        events: flume::Sender<CaptureEvent>,
        heartbeat: std::sync::Arc<Heartbeat>,
        shutdown: CancellationToken,
    ) {
        let stall_timeout = Duration::from_millis(self.config.stall_timeout_ms);
        let mut stall_restarts = 0u32;

        'respawn: loop {
            let mut child = match self.spawn_capture() {
                Ok(child) => child,
                Err(e) => {
                    error!("failed to launch capture process {:?}: {e}", self.config.program);
                    let _ = events.send_async(CaptureEvent::Exited(None)).await;
                    return;
                }
            };
            info!(
                pid = child.id(),
                program = %self.config.program,
                "capture process started"
            );

            let Some(mut stdout) = child.stdout.take() else {
                error!("capture process has no stdout pipe");
                self.terminate(&mut child).await;
                return;
            };
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(target: "argus::capture", "{line}");
                    }
                });
            }

            let spawned_at = Instant::now();
            let mut buf = vec![0u8; self.config.chunk_bytes];
            let mut stall_check =
                tokio::time::interval((stall_timeout / 2).max(Duration::from_millis(10)));
            stall_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        self.terminate(&mut child).await;
                        return;
                    }
                    read = stdout.read(&mut buf) => match read {
                        Ok(0) => {
                            let code = child.wait().await.ok().and_then(|s| s.code());
                            warn!(
                                ?code,
                                "capture process exited unexpectedly; \
                                 streaming degraded until operator restart"
                            );
                            let _ = events.send_async(CaptureEvent::Exited(code)).await;
                            return;
                        }
                        Ok(n) => {
                            let chunk = Bytes::copy_from_slice(&buf[..n]);
                            if events.send_async(CaptureEvent::Data(chunk)).await.is_err() {
                                debug!("pipeline receiver dropped, stopping capture");
                                self.terminate(&mut child).await;
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("error reading capture stdout: {e}");
                            self.terminate(&mut child).await;
                            let _ = events.send_async(CaptureEvent::Exited(None)).await;
                            return;
                        }
                    },
                    _ = stall_check.tick() => {
                        let idle = heartbeat.idle();
                        if idle < stall_timeout {
                            // Budget only resets once a frame arrived from
                            // *this* child, not on the respawn itself.
                            if idle <= spawned_at.elapsed() {
                                stall_restarts = 0;
                            }
                            continue;
                        }
                        if spawned_at.elapsed() < stall_timeout {
                            continue; // still warming up
                        }
                        if stall_restarts >= self.config.max_stall_restarts {
                            error!(
                                restarts = stall_restarts,
                                "capture still stalled after restart budget; giving up"
                            );
                            self.terminate(&mut child).await;
                            let _ = events.send_async(CaptureEvent::Exited(None)).await;
                            return;
                        }
                        stall_restarts += 1;
                        warn!(
                            attempt = stall_restarts,
                            idle_ms = idle.as_millis() as u64,
                            "no frames within stall timeout, restarting capture process"
                        );
                        self.terminate(&mut child).await;
                        if events.send_async(CaptureEvent::Restarted).await.is_err() {
                            return;
                        }
                        continue 'respawn;
                    }
                }
            }
        }
    }

    fn spawn_capture(&self) -> io::Result<Child> {
        let c = &self.config;
        let mut cmd = Command::new(&c.program);
        cmd.arg("--codec")
            .arg("mjpeg")
            .arg("--width")
            .arg(c.width.to_string())
            .arg("--height")
            .arg(c.height.to_string())
            .arg("--framerate")
            .arg(c.framerate.to_string())
            .arg("--quality")
            .arg(c.quality.to_string())
            .arg("--inline")
            .arg("--flush")
            .arg("--timeout")
            .arg("0")
            .arg("--nopreview");
        if c.hflip {
            cmd.arg("--hflip");
        }
        if c.vflip {
            cmd.arg("--vflip");
        }
        cmd.arg("--output")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.spawn()
    }

    /// SIGTERM, bounded grace, then SIGKILL.
    async fn terminate(&self, child: &mut Child) {
        let grace = Duration::from_millis(self.config.stop_grace_ms);
        if let Some(pid) = child.id() {
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!("SIGTERM to capture process failed: {e}");
            }
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(%status, "capture process terminated");
                    return;
                }
                Ok(Err(e)) => warn!("waiting for capture process: {e}"),
                Err(_) => warn!("capture process ignored SIGTERM, killing"),
            }
        }
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}
