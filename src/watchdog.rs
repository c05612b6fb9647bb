//! Periodic resource guards for active recordings.
//!
//! Both watchdogs run on their own intervals, uncoupled from frame arrival,
//! and do nothing unless a recording session exists. Their stops go through
//! the controller's normal no-op-if-idle path, so racing the operator's own
//! stop is harmless.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument};

use crate::recording::StopRecording;
use crate::service::CameraService;
use crate::utils;

/// Force-stop recording when free space on `volume` drops below `floor`.
pub fn spawn_disk(
    service: Arc<CameraService>,
    volume: PathBuf,
    floor: u64,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let span = tracing::info_span!("disk_watchdog");
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !service.recorder.is_recording().await {
                    continue;
                }
                match utils::free_bytes(&volume) {
                    Ok(available) if available < floor => {
                        warn!(available, floor, "disk space below floor, stopping recording");
                        if matches!(service.recorder.stop().await, StopRecording::Stopped { .. }) {
                            metrics::counter!("argus_watchdog_stops_total", "reason" => "disk")
                                .increment(1);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("disk watchdog probe failed: {e}"),
                }
            }
        }
        .instrument(span),
    )
}

/// Force-stop recording when the wireless interface loses its link. An
/// unattended robot that drops off the network should not fill local
/// storage indefinitely.
pub fn spawn_link(
    service: Arc<CameraService>,
    iface: String,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let span = tracing::info_span!("link_watchdog");
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !service.recorder.is_recording().await {
                    continue;
                }
                if !utils::link_up(&iface) {
                    warn!(iface, "wireless link down, stopping recording");
                    if matches!(service.recorder.stop().await, StopRecording::Stopped { .. }) {
                        metrics::counter!("argus_watchdog_stops_total", "reason" => "link")
                            .increment(1);
                    }
                }
            }
        }
        .instrument(span),
    )
}
