//! Uniform player adapter
//!
//! Wraps one backend (synchronous or async-only) behind a single interface:
//! every query is an `async fn` returning [`Result`], every command is
//! fire-and-forget, and every native notification is re-emitted once as a
//! [`NormalizedPlayerEvent`] on the instance's event stream.

use crate::backend::{
    AsyncBackend, BackendCapability, BackendHandle, SyncNativeEvent, SyncPlayerState,
};
use crate::{Error, Result, VideoInstanceId};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Backend transitions in normalized form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NormalizedPlayerEvent {
    Ready,
    Playing,
    Paused,
    Ended,
}

/// Per-instance stream of normalized events, in backend emission order
pub type EventStream = mpsc::UnboundedReceiver<NormalizedPlayerEvent>;

/// Map a synchronous backend's state code to a normalized event. Buffering,
/// cueing and unstarted states carry no overlay meaning.
pub fn normalize_sync_state(state: SyncPlayerState) -> Option<NormalizedPlayerEvent> {
    match state {
        SyncPlayerState::Playing => Some(NormalizedPlayerEvent::Playing),
        SyncPlayerState::Paused => Some(NormalizedPlayerEvent::Paused),
        SyncPlayerState::Ended => Some(NormalizedPlayerEvent::Ended),
        SyncPlayerState::Unstarted | SyncPlayerState::Buffering | SyncPlayerState::Cued => None,
    }
}

/// Map an async backend's event name to a normalized event
pub fn normalize_event_name(name: &str) -> Option<NormalizedPlayerEvent> {
    match name {
        "play" | "playing" => Some(NormalizedPlayerEvent::Playing),
        "pause" => Some(NormalizedPlayerEvent::Paused),
        "ended" => Some(NormalizedPlayerEvent::Ended),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Play,
    Pause,
    SeekTo(f64),
    SetVolume(f64),
    Mute,
    Unmute,
}

// Suppresses consecutive duplicates and drops everything once closed.
struct EventEmitter {
    id: VideoInstanceId,
    tx: Mutex<Option<mpsc::UnboundedSender<NormalizedPlayerEvent>>>,
    last: Mutex<Option<NormalizedPlayerEvent>>,
}

impl EventEmitter {
    fn emit(&self, event: NormalizedPlayerEvent) {
        let mut last = self.last.lock();
        if *last == Some(event) {
            trace!("[{}] duplicate {:?} suppressed", self.id, event);
            return;
        }
        let tx = self.tx.lock();
        if let Some(tx) = tx.as_ref() {
            if tx.send(event).is_ok() {
                *last = Some(event);
            }
        }
    }

    fn close(&self) {
        self.tx.lock().take();
    }
}

/// One embedded player, normalized.
pub struct PlayerAdapter {
    id: VideoInstanceId,
    backend: BackendHandle,
    emitter: Arc<EventEmitter>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    detached: AtomicBool,
}

impl PlayerAdapter {
    /// Wrap a mounted backend and subscribe to its native notifications.
    ///
    /// Fails with [`Error::SdkNotLoaded`] when the backend SDK is not ready
    /// yet; nothing is subscribed in that case. Must be called inside a tokio
    /// runtime when the backend is async-only.
    pub fn attach(id: VideoInstanceId, backend: BackendHandle) -> Result<(Arc<Self>, EventStream)> {
        if !backend.sdk_loaded() {
            return Err(Error::SdkNotLoaded(id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Arc::new(EventEmitter {
            id: id.clone(),
            tx: Mutex::new(Some(tx)),
            last: Mutex::new(None),
        });
        let mut tasks = Vec::new();
        let mut commands = None;

        match &backend {
            BackendHandle::Synchronous(b) => {
                let em = emitter.clone();
                b.subscribe(Arc::new(move |event: SyncNativeEvent| match event {
                    SyncNativeEvent::Ready => em.emit(NormalizedPlayerEvent::Ready),
                    SyncNativeEvent::StateChange(state) => {
                        if let Some(ev) = normalize_sync_state(state) {
                            em.emit(ev);
                        }
                    }
                }));
            }
            BackendHandle::AsyncOnly(b) => {
                let em = emitter.clone();
                b.on(Arc::new(move |name: &str| {
                    if let Some(ev) = normalize_event_name(name) {
                        em.emit(ev);
                    }
                }));

                let em = emitter.clone();
                let ready = b.ready();
                let ready_id = id.clone();
                tasks.push(tokio::spawn(async move {
                    match ready.await {
                        Ok(()) => em.emit(NormalizedPlayerEvent::Ready),
                        Err(e) => warn!("[{}] player never became ready: {}", ready_id, e),
                    }
                }));

                let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                tasks.push(tokio::spawn(run_command_worker(id.clone(), b.clone(), cmd_rx)));
                commands = Some(cmd_tx);
            }
        }

        debug!("[{}] adapter attached ({:?})", id, backend.capability());
        let adapter = Arc::new(PlayerAdapter {
            id,
            backend,
            emitter,
            commands,
            tasks: Mutex::new(tasks),
            detached: AtomicBool::new(false),
        });
        Ok((adapter, rx))
    }

    pub fn id(&self) -> &VideoInstanceId {
        &self.id
    }

    pub fn capability(&self) -> BackendCapability {
        self.backend.capability()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    // --- queries ---

    pub async fn current_time(&self) -> Result<f64> {
        self.ensure_attached()?;
        match &self.backend {
            BackendHandle::Synchronous(b) => b.current_time().map_err(Error::Backend),
            BackendHandle::AsyncOnly(b) => b.current_time().await.map_err(Error::Backend),
        }
    }

    pub async fn duration(&self) -> Result<f64> {
        self.ensure_attached()?;
        match &self.backend {
            BackendHandle::Synchronous(b) => b.duration().map_err(Error::Backend),
            BackendHandle::AsyncOnly(b) => b.duration().await.map_err(Error::Backend),
        }
    }

    pub async fn is_muted(&self) -> Result<bool> {
        self.ensure_attached()?;
        match &self.backend {
            BackendHandle::Synchronous(b) => b.is_muted().map_err(Error::Backend),
            BackendHandle::AsyncOnly(b) => b.muted().await.map_err(Error::Backend),
        }
    }

    /// Volume as a fraction of full scale
    pub async fn volume(&self) -> Result<f64> {
        self.ensure_attached()?;
        match &self.backend {
            BackendHandle::Synchronous(b) => b
                .volume()
                .map(|percent| f64::from(percent) / 100.0)
                .map_err(Error::Backend),
            BackendHandle::AsyncOnly(b) => b.volume().await.map_err(Error::Backend),
        }
    }

    pub async fn is_paused(&self) -> Result<bool> {
        self.ensure_attached()?;
        match &self.backend {
            BackendHandle::Synchronous(b) => b
                .player_state()
                .map(|state| state != SyncPlayerState::Playing)
                .map_err(Error::Backend),
            BackendHandle::AsyncOnly(b) => b.paused().await.map_err(Error::Backend),
        }
    }

    pub async fn is_playing(&self) -> Result<bool> {
        Ok(!self.is_paused().await?)
    }

    /// Not muted and volume above zero
    pub async fn is_audible(&self) -> Result<bool> {
        if self.is_muted().await? {
            return Ok(false);
        }
        Ok(self.volume().await? > 0.0)
    }

    // --- commands (fire-and-forget) ---

    pub fn play(&self) {
        self.dispatch(Command::Play);
    }

    pub fn pause(&self) {
        self.dispatch(Command::Pause);
    }

    pub fn seek_to(&self, seconds: f64) {
        self.dispatch(Command::SeekTo(seconds.max(0.0)));
    }

    /// Set volume as a fraction of full scale
    pub fn set_volume(&self, volume: f64) {
        self.dispatch(Command::SetVolume(volume.clamp(0.0, 1.0)));
    }

    pub fn mute(&self) {
        self.dispatch(Command::Mute);
    }

    pub fn unmute(&self) {
        self.dispatch(Command::Unmute);
    }

    /// Unsubscribe native listeners and stop background tasks. Idempotent.
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        match &self.backend {
            BackendHandle::Synchronous(b) => b.unsubscribe(),
            BackendHandle::AsyncOnly(b) => b.off(),
        }
        self.emitter.close();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        debug!("[{}] adapter detached", self.id);
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.is_detached() {
            return Err(Error::InstanceDetached(self.id.to_string()));
        }
        Ok(())
    }

    fn dispatch(&self, command: Command) {
        if self.is_detached() {
            debug!("[{}] {:?} dropped, adapter detached", self.id, command);
            return;
        }
        match &self.backend {
            BackendHandle::Synchronous(b) => {
                let res = match command {
                    Command::Play => b.play_video(),
                    Command::Pause => b.pause_video(),
                    Command::SeekTo(seconds) => b.seek_to(seconds),
                    Command::SetVolume(volume) => b.set_volume(to_percent(volume)),
                    Command::Mute => b.mute(),
                    Command::Unmute => b.un_mute(),
                };
                if let Err(e) = res {
                    warn!("[{}] {:?} failed: {}", self.id, command, e);
                }
            }
            BackendHandle::AsyncOnly(_) => {
                if let Some(tx) = &self.commands {
                    if tx.send(command).is_err() {
                        debug!("[{}] command worker gone, {:?} dropped", self.id, command);
                    }
                }
            }
        }
    }
}

impl Drop for PlayerAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

fn to_percent(volume: f64) -> u8 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}

// Async commands are awaited one at a time so they reach the backend in
// issue order.
async fn run_command_worker(
    id: VideoInstanceId,
    backend: Arc<dyn AsyncBackend>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = rx.recv().await {
        let fut = match command {
            Command::Play => backend.play(),
            Command::Pause => backend.pause(),
            Command::SeekTo(seconds) => backend.set_current_time(seconds),
            Command::SetVolume(volume) => backend.set_volume(volume),
            Command::Mute => backend.set_muted(true),
            Command::Unmute => backend.set_muted(false),
        };
        if let Err(e) = fut.await {
            warn!("[{}] {:?} failed: {}", id, command, e);
        }
    }
}

type LoadedCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct HookState {
    loaded: bool,
    pending: Vec<LoadedCallback>,
}

/// Explicit "SDK finished loading" hook.
///
/// The embedding layer owns one per backend SDK and calls
/// [`SdkReadyHook::signal_loaded`] from the SDK's bootstrap callback.
/// Callbacks queued before that run once, in order; later ones run at once.
#[derive(Default)]
pub struct SdkReadyHook {
    state: Mutex<HookState>,
}

impl SdkReadyHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    pub fn when_loaded<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.loaded {
            drop(state);
            callback();
        } else {
            state.pending.push(Box::new(callback));
        }
    }

    /// Mark the SDK as loaded and run queued callbacks. Returns how many ran;
    /// repeated signals run nothing.
    pub fn signal_loaded(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            if state.loaded {
                return 0;
            }
            state.loaded = true;
            std::mem::take(&mut state.pending)
        };
        let count = pending.len();
        for callback in pending {
            callback();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn sync_states_without_overlay_meaning_are_dropped() {
        assert_eq!(normalize_sync_state(SyncPlayerState::Buffering), None);
        assert_eq!(normalize_sync_state(SyncPlayerState::Cued), None);
        assert_eq!(
            normalize_sync_state(SyncPlayerState::Ended),
            Some(NormalizedPlayerEvent::Ended)
        );
    }

    #[test]
    fn unknown_event_names_are_ignored() {
        assert_eq!(normalize_event_name("play"), Some(NormalizedPlayerEvent::Playing));
        assert_eq!(normalize_event_name("pause"), Some(NormalizedPlayerEvent::Paused));
        assert_eq!(normalize_event_name("timeupdate"), None);
        assert_eq!(normalize_event_name("seeked"), None);
    }

    #[test]
    fn emitter_suppresses_consecutive_duplicates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let em = EventEmitter {
            id: VideoInstanceId::new("x"),
            tx: Mutex::new(Some(tx)),
            last: Mutex::new(None),
        };
        em.emit(NormalizedPlayerEvent::Playing);
        em.emit(NormalizedPlayerEvent::Playing);
        em.emit(NormalizedPlayerEvent::Paused);
        em.emit(NormalizedPlayerEvent::Playing);
        em.close();
        em.emit(NormalizedPlayerEvent::Ended);

        let mut seen = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            seen.push(ev);
        }
        assert_eq!(
            seen,
            vec![
                NormalizedPlayerEvent::Playing,
                NormalizedPlayerEvent::Paused,
                NormalizedPlayerEvent::Playing,
            ]
        );
    }

    #[test]
    fn volume_fraction_maps_to_percent() {
        assert_eq!(to_percent(1.0), 100);
        assert_eq!(to_percent(0.505), 51);
        assert_eq!(to_percent(-3.0), 0);
        assert_eq!(to_percent(7.0), 100);
    }

    #[test]
    fn ready_hook_runs_queued_callbacks_once() {
        let hook = SdkReadyHook::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let c = count.clone();
            hook.when_loaded(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(!hook.is_loaded());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(hook.signal_loaded(), 2);
        assert_eq!(hook.signal_loaded(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let c = count.clone();
        hook.when_loaded(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
