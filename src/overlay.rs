//! Per-instance overlay state machine
//!
//! An [`OverlayController`] consumes normalized player events and overlay
//! clicks, moves between [`OverlayState`]s, and tells the visual layer what to
//! show through an [`OverlaySink`]. Every state change is also reported to an
//! optional transition observer (the coordinator).

use crate::adapter::{NormalizedPlayerEvent, PlayerAdapter};
use crate::coordinator::ActiveSlot;
use crate::progress::ProgressTracker;
use crate::timers::{TimerPurpose, TimerRegistry};
use crate::{OverlayConfig, VideoInstanceId, DEFAULT_AUDIBLE_VOLUME};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Overlay state of one embedded video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OverlayState {
    /// Waiting for the player to become ready
    Idle,
    /// Playing without sound; the click-to-unmute affordance may be shown
    MutedAutoplay,
    UnmutedPlaying,
    Paused,
    Ended,
}

/// A state change of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OverlayState,
    pub to: OverlayState,
}

/// Callback invoked after every transition, outside the controller's lock
pub type TransitionObserver = Arc<dyn Fn(&VideoInstanceId, Transition) + Send + Sync>;

/// Outbound notifications to the visual layer.
///
/// All methods default to no-ops so a skin only implements what it renders.
/// A missing visual target is the sink's business, never an error.
pub trait OverlaySink: Send + Sync {
    fn overlay_state_changed(&self, _id: &VideoInstanceId, _state: OverlayState) {}

    fn progress_updated(&self, _id: &VideoInstanceId, _percent: u8) {}

    /// Show or hide the click-to-unmute affordance. `shake` passes the
    /// configured animation hint through.
    fn unmute_affordance(&self, _id: &VideoInstanceId, _show: bool, _shake: bool) {}

    /// `Some(text)` shows the paused/ended banner and play-button chrome,
    /// `None` hides them.
    fn banner_changed(&self, _id: &VideoInstanceId, _text: Option<&str>) {}
}

/// Sink that renders nothing
pub struct NoopSink;

impl OverlaySink for NoopSink {}

/// Sink that writes every notification to the log
pub struct LogSink;

impl OverlaySink for LogSink {
    fn overlay_state_changed(&self, id: &VideoInstanceId, state: OverlayState) {
        info!("[{}] overlay -> {:?}", id, state);
    }

    fn progress_updated(&self, id: &VideoInstanceId, percent: u8) {
        debug!("[{}] progress {}%", id, percent);
    }

    fn unmute_affordance(&self, id: &VideoInstanceId, show: bool, _shake: bool) {
        info!("[{}] unmute affordance {}", id, if show { "shown" } else { "hidden" });
    }

    fn banner_changed(&self, id: &VideoInstanceId, text: Option<&str>) {
        match text {
            Some(text) => info!("[{}] banner \"{}\"", id, text),
            None => info!("[{}] banner hidden", id),
        }
    }
}

/// Shared collaborators handed to every controller
#[derive(Clone)]
pub struct ControllerContext {
    pub config: Arc<OverlayConfig>,
    pub timers: Arc<TimerRegistry>,
    pub sink: Arc<dyn OverlaySink>,
    pub active: Arc<ActiveSlot>,
    /// Result of the autoplay probe (or the embedder's override)
    pub autoplay_available: Arc<AtomicBool>,
    /// Device-level permission for muted autoplay
    pub muted_autoplay_allowed: bool,
}

struct ControllerState {
    overlay: OverlayState,
    need_unmute: bool,
}

pub struct OverlayController {
    id: VideoInstanceId,
    adapter: Arc<PlayerAdapter>,
    progress: Arc<ProgressTracker>,
    ctx: ControllerContext,
    observer: Option<TransitionObserver>,
    state: Mutex<ControllerState>,
    weak: Weak<Self>,
}

impl OverlayController {
    pub fn new(
        adapter: Arc<PlayerAdapter>,
        ctx: ControllerContext,
        observer: Option<TransitionObserver>,
    ) -> Arc<Self> {
        let progress = ProgressTracker::new(
            adapter.clone(),
            ctx.timers.clone(),
            ctx.sink.clone(),
            &ctx.config,
        );
        Arc::new_cyclic(|weak| OverlayController {
            id: adapter.id().clone(),
            adapter,
            progress,
            ctx,
            observer,
            state: Mutex::new(ControllerState {
                overlay: OverlayState::Idle,
                need_unmute: false,
            }),
            weak: weak.clone(),
        })
    }

    pub fn id(&self) -> &VideoInstanceId {
        &self.id
    }

    pub fn adapter(&self) -> &Arc<PlayerAdapter> {
        &self.adapter
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn state(&self) -> OverlayState {
        self.state.lock().overlay
    }

    /// Whether the click-to-unmute affordance is currently shown
    pub fn needs_unmute(&self) -> bool {
        self.state.lock().need_unmute
    }

    /// Apply one normalized player event.
    pub async fn handle_event(&self, event: NormalizedPlayerEvent) {
        debug!("[{}] {:?} while {:?}", self.id, event, self.state());
        match event {
            NormalizedPlayerEvent::Ready => self.on_ready(),
            NormalizedPlayerEvent::Playing => self.on_playing().await,
            NormalizedPlayerEvent::Paused => {
                if let Some(t) = self.set_state(OverlayState::Paused, None) {
                    self.enter_stopped(t);
                }
            }
            NormalizedPlayerEvent::Ended => {
                if let Some(t) = self.set_state(OverlayState::Ended, None) {
                    self.enter_stopped(t);
                }
            }
        }
    }

    /// The user clicked the overlay.
    ///
    /// In muted autoplay this restarts the video from the beginning with
    /// sound; otherwise it toggles play/pause. Either way the unmute
    /// affordance goes away immediately.
    pub async fn handle_click(&self) {
        let state = self.state();
        self.hide_unmute_affordance();
        self.ctx.timers.cancel(&self.id, TimerPurpose::AutoplaySettle);
        self.ctx.timers.cancel(&self.id, TimerPurpose::PlayRetry);

        if state == OverlayState::MutedAutoplay {
            debug!("[{}] unmute click, restarting with sound", self.id);
            self.adapter.pause();
            self.adapter.seek_to(0.0);
            self.adapter.unmute();
            self.adapter.set_volume(DEFAULT_AUDIBLE_VOLUME);
            self.adapter.play();
            self.schedule_play_retry();
            return;
        }

        match self.adapter.is_paused().await {
            Ok(true) => {
                self.adapter.unmute();
                self.adapter.set_volume(DEFAULT_AUDIBLE_VOLUME);
                self.adapter.play();
                self.schedule_play_retry();
            }
            Ok(false) => self.adapter.pause(),
            Err(e) => warn!("[{}] click ignored, paused state unavailable: {}", self.id, e),
        }
    }

    /// The user clicked the progress bar at `fraction` of its width.
    pub async fn handle_seek(&self, fraction: f64) -> bool {
        self.progress.seek_to_fraction(fraction).await
    }

    /// Cancel timers, stop polling and detach the adapter.
    pub fn shutdown(&self) {
        self.progress.stop();
        let cancelled = self.ctx.timers.cancel_instance(&self.id);
        self.adapter.detach();
        debug!("[{}] controller shut down ({} timers cancelled)", self.id, cancelled);
    }

    fn on_ready(&self) {
        let autoplay = self.ctx.autoplay_available.load(Ordering::SeqCst)
            && self.ctx.muted_autoplay_allowed
            && self.ctx.active.get().is_none();

        let target = if autoplay {
            OverlayState::MutedAutoplay
        } else {
            OverlayState::Paused
        };
        let Some(t) = self.set_state(target, Some(OverlayState::Idle)) else {
            debug!("[{}] ready ignored, already {:?}", self.id, self.state());
            return;
        };

        if autoplay {
            self.show_unmute_affordance();
            self.adapter.mute();
            self.adapter.play();
            let weak = self.weak.clone();
            self.ctx.timers.schedule(
                &self.id,
                TimerPurpose::AutoplaySettle,
                self.ctx.config.timings.autoplay_settle(),
                move || async move {
                    if let Some(this) = weak.upgrade() {
                        this.confirm_autoplay().await;
                    }
                },
            );
            self.announce(t);
        } else {
            self.enter_stopped(t);
        }
    }

    async fn on_playing(&self) {
        let audible = match self.adapter.is_audible().await {
            Ok(audible) => audible,
            Err(e) => {
                warn!("[{}] playing event ignored, volume unavailable: {}", self.id, e);
                return;
            }
        };

        if audible {
            if let Some(t) = self.set_state(OverlayState::UnmutedPlaying, None) {
                self.enter_unmuted_playing(t);
            }
        } else if let Some(t) = self.set_state(OverlayState::MutedAutoplay, None) {
            self.progress.stop();
            self.schedule_hide_banner();
            self.announce(t);
        }
    }

    // Restrictive browsers drop a muted play without reporting an error.
    async fn confirm_autoplay(&self) {
        if self.state() != OverlayState::MutedAutoplay {
            return;
        }
        let mut unknown = false;
        let playing = match self.adapter.is_playing().await {
            Ok(playing) => playing,
            Err(first) => {
                warn!("[{}] autoplay check failed, retrying: {}", self.id, first);
                match self.adapter.is_playing().await {
                    Ok(playing) => playing,
                    Err(e) => {
                        warn!("[{}] autoplay check failed again: {}", self.id, e);
                        unknown = true;
                        false
                    }
                }
            }
        };
        if playing {
            debug!("[{}] muted autoplay confirmed", self.id);
            return;
        }
        if let Some(t) = self.set_state(OverlayState::Paused, Some(OverlayState::MutedAutoplay)) {
            info!("[{}] muted autoplay did not start", self.id);
            // The player may still be running muted; stop it so it matches the overlay.
            if unknown {
                self.adapter.pause();
            }
            self.enter_stopped(t);
        }
    }

    fn enter_unmuted_playing(&self, t: Transition) {
        self.hide_unmute_affordance();
        self.ctx.timers.cancel(&self.id, TimerPurpose::AutoplaySettle);
        self.schedule_hide_banner();
        self.progress.start();
        self.announce(t);
    }

    fn enter_stopped(&self, t: Transition) {
        self.ctx.timers.cancel(&self.id, TimerPurpose::PlayDelay);
        self.ctx.timers.cancel(&self.id, TimerPurpose::AutoplaySettle);
        self.progress.stop();
        self.hide_unmute_affordance();
        let text: &str = if t.to == OverlayState::Ended {
            &self.ctx.config.ended_label_text
        } else {
            &self.ctx.config.paused_label_text
        };
        self.ctx.sink.banner_changed(&self.id, Some(text));
        self.announce(t);
    }

    fn schedule_hide_banner(&self) {
        let sink = self.ctx.sink.clone();
        let id = self.id.clone();
        self.ctx.timers.schedule(
            &self.id,
            TimerPurpose::PlayDelay,
            self.ctx.config.timings.play_delay(),
            move || async move {
                sink.banner_changed(&id, None);
            },
        );
    }

    // Some backends need a second nudge before a play command sticks.
    fn schedule_play_retry(&self) {
        let weak = self.weak.clone();
        self.ctx.timers.schedule(
            &self.id,
            TimerPurpose::PlayRetry,
            self.ctx.config.timings.play_retry(),
            move || async move {
                let Some(this) = weak.upgrade() else {
                    return;
                };
                match this.adapter.is_playing().await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("[{}] play did not stick, retrying", this.id);
                        this.adapter.play();
                    }
                    Err(e) => warn!("[{}] play retry skipped: {}", this.id, e),
                }
            },
        );
    }

    fn show_unmute_affordance(&self) {
        {
            let mut state = self.state.lock();
            if state.need_unmute {
                return;
            }
            state.need_unmute = true;
        }
        self.ctx
            .sink
            .unmute_affordance(&self.id, true, self.ctx.config.autoplay_shake_affordance);
    }

    fn hide_unmute_affordance(&self) {
        {
            let mut state = self.state.lock();
            if !state.need_unmute {
                return;
            }
            state.need_unmute = false;
        }
        self.ctx
            .sink
            .unmute_affordance(&self.id, false, self.ctx.config.autoplay_shake_affordance);
    }

    // Moves to `to` unless already there (or not in `only_from`, when given).
    fn set_state(&self, to: OverlayState, only_from: Option<OverlayState>) -> Option<Transition> {
        let mut state = self.state.lock();
        let from = state.overlay;
        if from == to || only_from.is_some_and(|required| required != from) {
            return None;
        }
        state.overlay = to;
        Some(Transition { from, to })
    }

    fn announce(&self, t: Transition) {
        debug!("[{}] {:?} -> {:?}", self.id, t.from, t.to);
        self.ctx.sink.overlay_state_changed(&self.id, t.to);
        if let Some(observer) = &self.observer {
            observer(&self.id, t);
        }
    }
}
