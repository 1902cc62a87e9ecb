//! Playback progress polling
//!
//! Some backends expose no progress event, so position is polled while the
//! overlay is in unmuted playback. The loop is a chain of `ProgressPoll`
//! timers guarded by a running flag; `stop` both clears the flag and cancels
//! the pending poll, so a poll already awaiting the backend cannot revive it.

use crate::adapter::PlayerAdapter;
use crate::overlay::OverlaySink;
use crate::timers::{TimerPurpose, TimerRegistry};
use crate::{OverlayConfig, VideoInstanceId};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Integer percentage of `current` within `duration`, clamped to 0..=100.
/// A zero, negative or non-finite duration yields 0.
pub fn percent_of(current: f64, duration: f64) -> u8 {
    if !duration.is_finite() || duration <= 0.0 || !current.is_finite() {
        return 0;
    }
    (100.0 * current / duration).round().clamp(0.0, 100.0) as u8
}

pub struct ProgressTracker {
    id: VideoInstanceId,
    adapter: Arc<PlayerAdapter>,
    timers: Arc<TimerRegistry>,
    sink: Arc<dyn OverlaySink>,
    interval: Duration,
    seek_settle: Duration,
    seek_enabled: bool,
    running: AtomicBool,
}

impl ProgressTracker {
    pub fn new(
        adapter: Arc<PlayerAdapter>,
        timers: Arc<TimerRegistry>,
        sink: Arc<dyn OverlaySink>,
        config: &OverlayConfig,
    ) -> Arc<Self> {
        Arc::new(ProgressTracker {
            id: adapter.id().clone(),
            adapter,
            timers,
            sink,
            interval: config.timings.progress_interval(),
            seek_settle: config.timings.seek_settle(),
            seek_enabled: !config.disable_seek,
            running: AtomicBool::new(false),
        })
    }

    /// Start the polling loop. A no-op while already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("[{}] progress polling started", self.id);
        self.schedule_poll(Duration::ZERO);
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("[{}] progress polling stopped", self.id);
        }
        self.timers.cancel(&self.id, TimerPurpose::ProgressPoll);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Query position and duration once and publish the percentage.
    pub async fn update(&self) -> Option<u8> {
        let current = match self.adapter.current_time().await {
            Ok(t) => t,
            Err(e) => {
                warn!("[{}] progress: current time unavailable: {}", self.id, e);
                return None;
            }
        };
        let duration = match self.adapter.duration().await {
            Ok(d) => d,
            Err(e) => {
                warn!("[{}] progress: duration unavailable: {}", self.id, e);
                return None;
            }
        };
        let percent = percent_of(current, duration);
        self.sink.progress_updated(&self.id, percent);
        Some(percent)
    }

    /// Seek to `fraction` of the duration (clamped to 0..=1), then refresh the
    /// published percentage once after the settle delay. Returns false when
    /// seeking is disabled or the duration cannot be read.
    pub async fn seek_to_fraction(self: &Arc<Self>, fraction: f64) -> bool {
        if !self.seek_enabled {
            debug!("[{}] seek ignored, seeking disabled", self.id);
            return false;
        }
        if !fraction.is_finite() {
            return false;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        let duration = match self.adapter.duration().await {
            Ok(d) => d,
            Err(e) => {
                warn!("[{}] seek: duration unavailable: {}", self.id, e);
                return false;
            }
        };
        let target = if duration.is_finite() { fraction * duration } else { 0.0 };
        self.adapter.seek_to(target);

        let weak = Arc::downgrade(self);
        self.timers.schedule(&self.id, TimerPurpose::SeekRefresh, self.seek_settle, move || async move {
            if let Some(tracker) = weak.upgrade() {
                tracker.update().await;
            }
        });
        true
    }

    fn schedule_poll(self: &Arc<Self>, delay: Duration) {
        let weak = Arc::downgrade(self);
        self.timers.schedule(&self.id, TimerPurpose::ProgressPoll, delay, move || async move {
            if let Some(tracker) = weak.upgrade() {
                tracker.tick().await;
            }
        });
    }

    async fn tick(self: Arc<Self>) {
        if !self.is_running() {
            return;
        }
        self.update().await;
        if self.is_running() {
            self.schedule_poll(self.interval);
        }
    }
}
