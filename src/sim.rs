//! In-memory player backends and platform hooks
//!
//! Used by the integration tests and the `overlay-sim` binary. Both simulated
//! players share a [`SimCore`] whose playback position advances with the tokio
//! clock, so paused-clock tests see deterministic progress.

use crate::backend::{
    AsyncBackend, AsyncListener, BackendHandle, BackendResult, SyncBackend, SyncListener,
    SyncNativeEvent, SyncPlayerState,
};
use crate::overlay::{OverlaySink, OverlayState};
use crate::platform::{
    BrowserFamily, DeviceProfile, MediaElementFactory, PlatformApi, ProbeElement,
};
use crate::VideoInstanceId;
use futures::future::BoxFuture;
use log::trace;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Commands a simulated player received, in order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCommand {
    Play,
    Pause,
    SeekTo(f64),
    /// Fraction of full scale
    SetVolume(f64),
    Mute,
    Unmute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimEvent {
    Ready,
    Playing,
    Paused,
    Ended,
}

type CoreListener = Arc<dyn Fn(SimEvent) + Send + Sync>;

struct SimState {
    started: bool,
    playing: bool,
    ended: bool,
    // Position at `anchor`; the live position adds the elapsed time while playing
    position: f64,
    anchor: Instant,
    muted: bool,
    volume: f64,
    sdk_loaded: bool,
    failing: bool,
    block_muted_autoplay: bool,
    drop_next_play: bool,
    commands: Vec<SimCommand>,
    listener: Option<CoreListener>,
}

impl SimState {
    fn position(&self, duration: f64) -> f64 {
        if self.playing {
            (self.position + self.anchor.elapsed().as_secs_f64()).min(duration)
        } else {
            self.position
        }
    }
}

/// Playback model shared by both simulated player shapes.
pub struct SimCore {
    duration: f64,
    state: Mutex<SimState>,
    ready: watch::Sender<bool>,
}

impl SimCore {
    fn new(duration: f64) -> Arc<Self> {
        let (ready, _) = watch::channel(false);
        Arc::new(SimCore {
            duration,
            state: Mutex::new(SimState {
                started: false,
                playing: false,
                ended: false,
                position: 0.0,
                anchor: Instant::now(),
                muted: false,
                volume: 1.0,
                sdk_loaded: true,
                failing: false,
                block_muted_autoplay: false,
                drop_next_play: false,
                commands: Vec::new(),
                listener: None,
            }),
            ready,
        })
    }

    /// The player finished loading
    pub fn fire_ready(&self) {
        self.ready.send_replace(true);
        self.notify(SimEvent::Ready);
    }

    /// The user pressed the native play control. Not subject to the muted
    /// autoplay policy.
    pub fn press_play(&self) {
        let event = self.start(true);
        self.notify_opt(event);
    }

    /// The user pressed the native pause control
    pub fn press_pause(&self) {
        let event = self.stop();
        self.notify_opt(event);
    }

    /// Jump to the end of the video
    pub fn finish(&self) {
        {
            let mut s = self.state.lock();
            s.playing = false;
            s.ended = true;
            s.started = true;
            s.position = self.duration;
        }
        self.notify(SimEvent::Ended);
    }

    pub fn position(&self) -> f64 {
        self.state.lock().position(self.duration)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    /// Fraction of full scale
    pub fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().listener.is_some()
    }

    pub fn commands(&self) -> Vec<SimCommand> {
        self.state.lock().commands.clone()
    }

    /// Make every query fail
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn set_sdk_loaded(&self, loaded: bool) {
        self.state.lock().sdk_loaded = loaded;
    }

    /// Silently ignore play commands while muted, like a browser that
    /// forbids unattended playback.
    pub fn set_block_muted_autoplay(&self, block: bool) {
        self.state.lock().block_muted_autoplay = block;
    }

    /// Record the next play command but leave the player stopped.
    pub fn drop_next_play(&self) {
        self.state.lock().drop_next_play = true;
    }

    fn sdk_loaded(&self) -> bool {
        self.state.lock().sdk_loaded
    }

    fn set_listener(&self, listener: Option<CoreListener>) {
        self.state.lock().listener = listener;
    }

    fn query<T>(&self, read: impl FnOnce(&SimState, f64) -> T) -> BackendResult<T> {
        let s = self.state.lock();
        if s.failing {
            return Err("simulated query failure".to_string());
        }
        Ok(read(&s, self.duration))
    }

    fn apply(&self, command: SimCommand) {
        trace!("sim player: {:?}", command);
        {
            let mut s = self.state.lock();
            s.commands.push(command);
            match command {
                SimCommand::Mute => s.muted = true,
                SimCommand::Unmute => s.muted = false,
                SimCommand::SetVolume(v) => s.volume = v.clamp(0.0, 1.0),
                SimCommand::SeekTo(seconds) => {
                    s.position = seconds.clamp(0.0, self.duration);
                    s.anchor = Instant::now();
                    if s.position < self.duration {
                        s.ended = false;
                    }
                }
                SimCommand::Play | SimCommand::Pause => {}
            }
        }
        let event = match command {
            SimCommand::Play => self.start(false),
            SimCommand::Pause => self.stop(),
            _ => None,
        };
        self.notify_opt(event);
    }

    fn start(&self, user_gesture: bool) -> Option<SimEvent> {
        let mut s = self.state.lock();
        if s.playing {
            return None;
        }
        if !user_gesture && s.block_muted_autoplay && s.muted {
            trace!("sim player: muted play blocked");
            return None;
        }
        if !user_gesture && s.drop_next_play {
            s.drop_next_play = false;
            trace!("sim player: play dropped");
            return None;
        }
        if s.ended {
            s.ended = false;
            s.position = 0.0;
        }
        s.started = true;
        s.playing = true;
        s.anchor = Instant::now();
        Some(SimEvent::Playing)
    }

    fn stop(&self) -> Option<SimEvent> {
        let mut s = self.state.lock();
        if !s.playing {
            return None;
        }
        s.position = s.position(self.duration);
        s.playing = false;
        Some(SimEvent::Paused)
    }

    fn notify_opt(&self, event: Option<SimEvent>) {
        if let Some(event) = event {
            self.notify(event);
        }
    }

    // Listeners run outside the state lock.
    fn notify(&self, event: SimEvent) {
        let listener = self.state.lock().listener.clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }
}

/// Player whose getters answer immediately and whose states are numeric
pub struct SimulatedSyncPlayer {
    core: Arc<SimCore>,
}

impl SimulatedSyncPlayer {
    pub fn new(duration: f64) -> Self {
        SimulatedSyncPlayer {
            core: SimCore::new(duration),
        }
    }

    pub fn handle(&self) -> BackendHandle {
        BackendHandle::Synchronous(Arc::new(SyncFacade(self.core.clone())))
    }
}

impl Deref for SimulatedSyncPlayer {
    type Target = SimCore;

    fn deref(&self) -> &SimCore {
        &self.core
    }
}

struct SyncFacade(Arc<SimCore>);

impl SyncBackend for SyncFacade {
    fn sdk_loaded(&self) -> bool {
        self.0.sdk_loaded()
    }

    fn subscribe(&self, listener: SyncListener) {
        self.0.set_listener(Some(Arc::new(move |event: SimEvent| {
            let native = match event {
                SimEvent::Ready => SyncNativeEvent::Ready,
                SimEvent::Playing => SyncNativeEvent::StateChange(SyncPlayerState::Playing),
                SimEvent::Paused => SyncNativeEvent::StateChange(SyncPlayerState::Paused),
                SimEvent::Ended => SyncNativeEvent::StateChange(SyncPlayerState::Ended),
            };
            listener(native);
        })));
    }

    fn unsubscribe(&self) {
        self.0.set_listener(None);
    }

    fn current_time(&self) -> BackendResult<f64> {
        self.0.query(|s, d| s.position(d))
    }

    fn duration(&self) -> BackendResult<f64> {
        self.0.query(|_, d| d)
    }

    fn is_muted(&self) -> BackendResult<bool> {
        self.0.query(|s, _| s.muted)
    }

    fn volume(&self) -> BackendResult<u8> {
        self.0.query(|s, _| (s.volume * 100.0).round() as u8)
    }

    fn player_state(&self) -> BackendResult<SyncPlayerState> {
        self.0.query(|s, _| {
            if s.playing {
                SyncPlayerState::Playing
            } else if s.ended {
                SyncPlayerState::Ended
            } else if s.started {
                SyncPlayerState::Paused
            } else {
                SyncPlayerState::Unstarted
            }
        })
    }

    fn play_video(&self) -> BackendResult<()> {
        self.0.apply(SimCommand::Play);
        Ok(())
    }

    fn pause_video(&self) -> BackendResult<()> {
        self.0.apply(SimCommand::Pause);
        Ok(())
    }

    fn seek_to(&self, seconds: f64) -> BackendResult<()> {
        self.0.apply(SimCommand::SeekTo(seconds));
        Ok(())
    }

    fn set_volume(&self, percent: u8) -> BackendResult<()> {
        self.0.apply(SimCommand::SetVolume(f64::from(percent) / 100.0));
        Ok(())
    }

    fn mute(&self) -> BackendResult<()> {
        self.0.apply(SimCommand::Mute);
        Ok(())
    }

    fn un_mute(&self) -> BackendResult<()> {
        self.0.apply(SimCommand::Unmute);
        Ok(())
    }
}

/// Player whose getters and commands all settle through futures, optionally
/// after a fixed latency
pub struct SimulatedAsyncPlayer {
    core: Arc<SimCore>,
    latency: Duration,
}

impl SimulatedAsyncPlayer {
    pub fn new(duration: f64) -> Self {
        Self::with_latency(duration, Duration::ZERO)
    }

    pub fn with_latency(duration: f64, latency: Duration) -> Self {
        SimulatedAsyncPlayer {
            core: SimCore::new(duration),
            latency,
        }
    }

    pub fn handle(&self) -> BackendHandle {
        BackendHandle::AsyncOnly(Arc::new(AsyncFacade {
            core: self.core.clone(),
            latency: self.latency,
        }))
    }
}

impl Deref for SimulatedAsyncPlayer {
    type Target = SimCore;

    fn deref(&self) -> &SimCore {
        &self.core
    }
}

struct AsyncFacade {
    core: Arc<SimCore>,
    latency: Duration,
}

impl AsyncFacade {
    fn get<T, F>(&self, read: F) -> BoxFuture<'static, BackendResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&SimState, f64) -> T + Send + 'static,
    {
        let core = self.core.clone();
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            core.query(read)
        })
    }

    fn send(&self, command: SimCommand) -> BoxFuture<'static, BackendResult<()>> {
        let core = self.core.clone();
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            core.apply(command);
            Ok(())
        })
    }
}

impl AsyncBackend for AsyncFacade {
    fn sdk_loaded(&self) -> bool {
        self.core.sdk_loaded()
    }

    fn ready(&self) -> BoxFuture<'static, BackendResult<()>> {
        let mut rx = self.core.ready.subscribe();
        Box::pin(async move {
            rx.wait_for(|ready| *ready)
                .await
                .map(|_| ())
                .map_err(|_| "player destroyed".to_string())
        })
    }

    fn on(&self, listener: AsyncListener) {
        self.core.set_listener(Some(Arc::new(move |event: SimEvent| {
            let name = match event {
                SimEvent::Ready => return,
                SimEvent::Playing => "play",
                SimEvent::Paused => "pause",
                SimEvent::Ended => "ended",
            };
            listener(name);
        })));
    }

    fn off(&self) {
        self.core.set_listener(None);
    }

    fn current_time(&self) -> BoxFuture<'static, BackendResult<f64>> {
        self.get(|s, d| s.position(d))
    }

    fn duration(&self) -> BoxFuture<'static, BackendResult<f64>> {
        self.get(|_, d| d)
    }

    fn muted(&self) -> BoxFuture<'static, BackendResult<bool>> {
        self.get(|s, _| s.muted)
    }

    fn volume(&self) -> BoxFuture<'static, BackendResult<f64>> {
        self.get(|s, _| s.volume)
    }

    fn paused(&self) -> BoxFuture<'static, BackendResult<bool>> {
        self.get(|s, _| !s.playing)
    }

    fn play(&self) -> BoxFuture<'static, BackendResult<()>> {
        self.send(SimCommand::Play)
    }

    fn pause(&self) -> BoxFuture<'static, BackendResult<()>> {
        self.send(SimCommand::Pause)
    }

    fn set_current_time(&self, seconds: f64) -> BoxFuture<'static, BackendResult<()>> {
        self.send(SimCommand::SeekTo(seconds))
    }

    fn set_volume(&self, volume: f64) -> BoxFuture<'static, BackendResult<()>> {
        self.send(SimCommand::SetVolume(volume))
    }

    fn set_muted(&self, muted: bool) -> BoxFuture<'static, BackendResult<()>> {
        self.send(if muted { SimCommand::Mute } else { SimCommand::Unmute })
    }
}

/// How simulated probe elements answer a play attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Resolve,
    Reject,
    /// Never settle
    Hang,
}

/// Probe element factory with a fixed outcome that counts what it created
pub struct SimulatedMediaFactory {
    outcome: ProbeOutcome,
    created: AtomicUsize,
    detached: Arc<AtomicUsize>,
}

impl SimulatedMediaFactory {
    pub fn new(outcome: ProbeOutcome) -> Self {
        SimulatedMediaFactory {
            outcome,
            created: AtomicUsize::new(0),
            detached: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn detached(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

impl MediaElementFactory for SimulatedMediaFactory {
    fn create_muted_test_element(&self) -> Box<dyn ProbeElement> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(SimElement {
            outcome: self.outcome,
            detached: self.detached.clone(),
        })
    }
}

struct SimElement {
    outcome: ProbeOutcome,
    detached: Arc<AtomicUsize>,
}

impl ProbeElement for SimElement {
    fn play(&mut self) -> BoxFuture<'static, Result<(), String>> {
        match self.outcome {
            ProbeOutcome::Resolve => Box::pin(async { Ok(()) }),
            ProbeOutcome::Reject => Box::pin(async { Err("NotAllowedError".to_string()) }),
            ProbeOutcome::Hang => Box::pin(futures::future::pending()),
        }
    }

    fn detach(&mut self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

/// Platform with a declared device profile and simulated probe elements
pub struct SimPlatform {
    device: DeviceProfile,
    media: Arc<SimulatedMediaFactory>,
}

impl SimPlatform {
    pub fn new(device: DeviceProfile, outcome: ProbeOutcome) -> Self {
        SimPlatform {
            device,
            media: Arc::new(SimulatedMediaFactory::new(outcome)),
        }
    }

    /// Desktop Chrome whose probe element plays
    pub fn desktop() -> Self {
        Self::new(DeviceProfile::desktop(BrowserFamily::Chrome), ProbeOutcome::Resolve)
    }

    /// Touch Safari
    pub fn mobile() -> Self {
        Self::new(DeviceProfile::mobile(BrowserFamily::Safari), ProbeOutcome::Resolve)
    }

    pub fn media(&self) -> &Arc<SimulatedMediaFactory> {
        &self.media
    }
}

impl PlatformApi for SimPlatform {
    fn device_profile(&self) -> DeviceProfile {
        self.device
    }

    fn media_elements(&self) -> Arc<dyn MediaElementFactory> {
        self.media.clone()
    }
}

/// Sink notifications captured for assertions
#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    State(VideoInstanceId, OverlayState),
    Progress(VideoInstanceId, u8),
    Unmute(VideoInstanceId, bool),
    Banner(VideoInstanceId, Option<String>),
}

/// Sink that records every notification
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<SinkRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }

    /// Overlay states reported for `id`, in order
    pub fn states(&self, id: &VideoInstanceId) -> Vec<OverlayState> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                SinkRecord::State(i, s) if i == id => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Progress percentages reported for `id`, in order
    pub fn progress(&self, id: &VideoInstanceId) -> Vec<u8> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                SinkRecord::Progress(i, p) if i == id => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// Whether the unmute affordance is currently shown for `id`
    pub fn unmute_shown(&self, id: &VideoInstanceId) -> bool {
        self.records
            .lock()
            .iter()
            .rev()
            .find_map(|r| match r {
                SinkRecord::Unmute(i, show) if i == id => Some(*show),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// The last banner change for `id`: `None` if there was none,
    /// `Some(None)` if the banner was hidden
    pub fn last_banner(&self, id: &VideoInstanceId) -> Option<Option<String>> {
        self.records.lock().iter().rev().find_map(|r| match r {
            SinkRecord::Banner(i, text) if i == id => Some(text.clone()),
            _ => None,
        })
    }

    fn push(&self, record: SinkRecord) {
        self.records.lock().push(record);
    }
}

impl OverlaySink for RecordingSink {
    fn overlay_state_changed(&self, id: &VideoInstanceId, state: OverlayState) {
        self.push(SinkRecord::State(id.clone(), state));
    }

    fn progress_updated(&self, id: &VideoInstanceId, percent: u8) {
        self.push(SinkRecord::Progress(id.clone(), percent));
    }

    fn unmute_affordance(&self, id: &VideoInstanceId, show: bool, _shake: bool) {
        self.push(SinkRecord::Unmute(id.clone(), show));
    }

    fn banner_changed(&self, id: &VideoInstanceId, text: Option<&str>) {
        self.push(SinkRecord::Banner(id.clone(), text.map(str::to_string)));
    }
}
