//! Frames-per-second derived from broadcast cadence.
//!
//! Ticked from the dispatch loop, rolled by an independent interval task so
//! the reading decays to zero when the stream stalls instead of freezing at
//! the last computed value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct FrameRateMeter {
    ticks: AtomicU64,
    fps: AtomicU64,
}

impl FrameRateMeter {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            fps: AtomicU64::new(0),
        }
    }

    /// Count one delivered frame in the current window.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recently published whole-frame rate.
    pub fn current(&self) -> u64 {
        self.fps.load(Ordering::Relaxed)
    }

    fn roll(&self, window: Duration) {
        let ticks = self.ticks.swap(0, Ordering::Relaxed);
        let fps = (ticks as f64 / window.as_secs_f64()).round() as u64;
        self.fps.store(fps, Ordering::Relaxed);
    }

    /// Publish the rate once per window until shutdown.
    pub fn spawn_window(
        self: &Arc<Self>,
        window: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let meter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // the immediate first tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => meter.roll(window),
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new()
    }
}
