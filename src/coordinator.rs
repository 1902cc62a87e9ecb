//! Page-wide playback coordination
//!
//! The [`PlaybackCoordinator`] owns every registered instance, runs the
//! autoplay probe, and enforces single active playback: when one instance
//! starts playing audibly, every other instance is paused after a short
//! debounce.

use crate::adapter::{EventStream, PlayerAdapter, SdkReadyHook};
use crate::backend::BackendHandle;
use crate::overlay::{
    ControllerContext, OverlayController, OverlaySink, OverlayState, Transition,
    TransitionObserver,
};
use crate::platform::{DeviceProfile, PlatformApi};
use crate::probe::AutoplayProbe;
use crate::timers::{TimerPurpose, TimerRegistry};
use crate::{Error, OverlayConfig, Result, VideoInstanceId};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// The instance currently holding audible playback.
///
/// Controllers read it; only the coordinator writes it.
#[derive(Debug, Default)]
pub struct ActiveSlot {
    current: RwLock<Option<VideoInstanceId>>,
}

impl ActiveSlot {
    pub fn get(&self) -> Option<VideoInstanceId> {
        self.current.read().clone()
    }

    pub fn is_held_by(&self, id: &VideoInstanceId) -> bool {
        self.current.read().as_ref() == Some(id)
    }

    // Returns the previous holder when it was a different instance.
    fn claim(&self, id: &VideoInstanceId) -> Option<VideoInstanceId> {
        let mut current = self.current.write();
        let previous = current.replace(id.clone());
        previous.filter(|p| p != id)
    }

    fn release(&self, id: &VideoInstanceId) -> bool {
        let mut current = self.current.write();
        if current.as_ref() == Some(id) {
            *current = None;
            true
        } else {
            false
        }
    }

    fn clear(&self) -> Option<VideoInstanceId> {
        self.current.write().take()
    }
}

struct Instance {
    controller: Arc<OverlayController>,
    pump: JoinHandle<()>,
}

struct Inner {
    config: Arc<OverlayConfig>,
    device: DeviceProfile,
    probe: AutoplayProbe,
    sink: Arc<dyn OverlaySink>,
    timers: Arc<TimerRegistry>,
    active: Arc<ActiveSlot>,
    autoplay_available: Arc<AtomicBool>,
    instances: Mutex<BTreeMap<VideoInstanceId, Instance>>,
}

/// Registry of embedded videos and owner of the active slot.
///
/// Cheap to clone; clones share the same state. Registration spawns tasks,
/// so it must happen inside a tokio runtime.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Arc<Inner>,
}

impl PlaybackCoordinator {
    pub fn new(
        config: OverlayConfig,
        platform: Arc<dyn PlatformApi>,
        sink: Arc<dyn OverlaySink>,
    ) -> Self {
        let device = platform.device_profile();
        let probe = AutoplayProbe::new(
            device,
            platform.media_elements(),
            config.timings.probe_timeout(),
        );
        PlaybackCoordinator {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                device,
                probe,
                sink,
                timers: TimerRegistry::new(),
                active: Arc::new(ActiveSlot::default()),
                autoplay_available: Arc::new(AtomicBool::new(false)),
                instances: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.inner.config
    }

    pub fn device(&self) -> DeviceProfile {
        self.inner.device
    }

    pub fn timers(&self) -> &Arc<TimerRegistry> {
        &self.inner.timers
    }

    /// Run the autoplay probe once and remember its answer. Later calls
    /// return the memoized outcome.
    pub async fn probe_autoplay_capability(&self) -> bool {
        let available = self.inner.probe.run().await;
        self.inner.autoplay_available.store(available, Ordering::SeqCst);
        info!("Autoplay capability: {}", if available { "available" } else { "unavailable" });
        available
    }

    /// Override the autoplay capability without probing.
    pub fn set_autoplay_capability(&self, available: bool) {
        self.inner.autoplay_available.store(available, Ordering::SeqCst);
    }

    pub fn autoplay_capability(&self) -> bool {
        self.inner.autoplay_available.load(Ordering::SeqCst)
    }

    /// Attach an overlay to an already-mounted player.
    ///
    /// Returns false when the device does not get overlays, the backend SDK
    /// is not loaded, or the id is already registered.
    pub fn register(&self, id: VideoInstanceId, backend: BackendHandle) -> bool {
        if !self
            .inner
            .device
            .overlay_supported(self.inner.config.regular_player_for_mobile_firefox)
        {
            info!("[{}] overlay not supported on {:?}, keeping native player", id, self.inner.device);
            return false;
        }
        let capability = backend.capability();
        if !self.inner.config.allows(capability) {
            info!("[{}] {:?} players are not allowed, keeping native player", id, capability);
            return false;
        }
        match self.try_register(id.clone(), backend) {
            Ok(()) => true,
            Err(e @ Error::SdkNotLoaded(_)) => {
                debug!("[{}] not registered: {}", id, e);
                false
            }
            Err(e) => {
                warn!("[{}] registration refused: {}", id, e);
                false
            }
        }
    }

    /// Like [`PlaybackCoordinator::register`], with the refusal reason.
    pub fn try_register(&self, id: VideoInstanceId, backend: BackendHandle) -> Result<()> {
        if self.inner.instances.lock().contains_key(&id) {
            return Err(Error::DuplicateInstance(id.to_string()));
        }

        let (adapter, events) = PlayerAdapter::attach(id.clone(), backend)?;
        let ctx = ControllerContext {
            config: self.inner.config.clone(),
            timers: self.inner.timers.clone(),
            sink: self.inner.sink.clone(),
            active: self.inner.active.clone(),
            autoplay_available: self.inner.autoplay_available.clone(),
            muted_autoplay_allowed: self.inner.device.muted_autoplay_allowed(),
        };
        let weak = Arc::downgrade(&self.inner);
        let observer: TransitionObserver = Arc::new(move |id: &VideoInstanceId, t: Transition| {
            if let Some(inner) = weak.upgrade() {
                inner.on_transition(id, t);
            }
        });
        let controller = OverlayController::new(adapter, ctx, Some(observer));

        let mut instances = self.inner.instances.lock();
        if instances.contains_key(&id) {
            drop(instances);
            controller.shutdown();
            return Err(Error::DuplicateInstance(id.to_string()));
        }
        let pump = tokio::spawn(pump_events(controller.clone(), events));
        instances.insert(id.clone(), Instance { controller, pump });
        drop(instances);

        info!("[{}] registered", id);
        Ok(())
    }

    /// Register once the backend SDK signals that it has loaded.
    ///
    /// `make_backend` runs when `hook` fires (or right away when it already
    /// has). The hook must be signalled from within a tokio runtime.
    pub fn register_when_loaded<F>(&self, hook: &SdkReadyHook, id: VideoInstanceId, make_backend: F)
    where
        F: FnOnce() -> BackendHandle + Send + 'static,
    {
        if !hook.is_loaded() {
            debug!("[{}] waiting for player SDK", id);
        }
        let coordinator = self.clone();
        hook.when_loaded(move || {
            coordinator.register(id, make_backend());
        });
    }

    /// The user clicked the overlay of `id`.
    pub async fn overlay_clicked(&self, id: &VideoInstanceId) -> Result<()> {
        let controller = self.controller(id)?;
        if let Some(previous) = self.inner.active.clear() {
            debug!("[{}] click cleared active slot held by {}", id, previous);
        }
        controller.handle_click().await;
        Ok(())
    }

    /// The user clicked the progress bar of `id` at `fraction` of its width.
    /// Returns whether a seek was issued.
    pub async fn progress_clicked(&self, id: &VideoInstanceId, fraction: f64) -> Result<bool> {
        let controller = self.controller(id)?;
        Ok(controller.handle_seek(fraction).await)
    }

    /// Remove one instance: its timers, pump and backend subscription.
    pub fn teardown(&self, id: &VideoInstanceId) -> Result<()> {
        let instance = self
            .inner
            .instances
            .lock()
            .remove(id)
            .ok_or_else(|| Error::UnknownInstance(id.to_string()))?;
        self.inner.active.release(id);
        instance.close();
        info!("[{}] torn down", id);
        Ok(())
    }

    /// Tear down every instance.
    pub fn shutdown(&self) {
        let drained = std::mem::take(&mut *self.inner.instances.lock());
        let count = drained.len();
        for (_, instance) in drained {
            instance.close();
        }
        self.inner.active.clear();
        info!("Coordinator shut down ({} instances)", count);
    }

    pub fn active_instance(&self) -> Option<VideoInstanceId> {
        self.inner.active.get()
    }

    pub fn overlay_state(&self, id: &VideoInstanceId) -> Option<OverlayState> {
        self.inner
            .instances
            .lock()
            .get(id)
            .map(|instance| instance.controller.state())
    }

    /// Registered ids in sorted order
    pub fn instance_ids(&self) -> Vec<VideoInstanceId> {
        self.inner.instances.lock().keys().cloned().collect()
    }

    fn controller(&self, id: &VideoInstanceId) -> Result<Arc<OverlayController>> {
        self.inner
            .instances
            .lock()
            .get(id)
            .map(|instance| instance.controller.clone())
            .ok_or_else(|| Error::UnknownInstance(id.to_string()))
    }
}

impl Instance {
    fn close(self) {
        self.pump.abort();
        self.controller.shutdown();
    }
}

impl Inner {
    fn on_transition(self: Arc<Self>, id: &VideoInstanceId, t: Transition) {
        if t.to == OverlayState::UnmutedPlaying {
            if self.config.single_active_playback {
                self.become_active(id);
            }
        } else if self.active.release(id) {
            debug!("[{}] released active slot ({:?})", id, t.to);
        }
    }

    fn become_active(self: &Arc<Self>, id: &VideoInstanceId) {
        match self.active.claim(id) {
            Some(previous) => debug!("[{}] takes the active slot from {}", id, previous),
            None => debug!("[{}] holds the active slot", id),
        }

        let others: Vec<(VideoInstanceId, Weak<PlayerAdapter>)> = self
            .instances
            .lock()
            .iter()
            .filter(|(other, _)| *other != id)
            .map(|(other, instance)| (other.clone(), Arc::downgrade(instance.controller.adapter())))
            .collect();

        for (other, adapter) in others {
            let weak = Arc::downgrade(self);
            let target = other.clone();
            self.timers.schedule(
                &other,
                TimerPurpose::PauseOthersDelay,
                self.config.timings.pause_others_delay(),
                move || async move {
                    let (Some(inner), Some(adapter)) = (weak.upgrade(), adapter.upgrade()) else {
                        return;
                    };
                    if inner.active.is_held_by(&target) {
                        return;
                    }
                    match adapter.is_playing().await {
                        Ok(true) => {
                            debug!("[{}] paused for the active instance", target);
                            adapter.pause();
                        }
                        Ok(false) => {}
                        Err(e) => warn!("[{}] pause-others skipped: {}", target, e),
                    }
                },
            );
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (_, instance) in std::mem::take(self.instances.get_mut()) {
            instance.close();
        }
    }
}

// One pump per instance keeps its events in backend emission order.
async fn pump_events(controller: Arc<OverlayController>, mut events: EventStream) {
    while let Some(event) = events.recv().await {
        controller.handle_event(event).await;
    }
    debug!("[{}] event stream closed", controller.id());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_reports_takeover() {
        let slot = ActiveSlot::default();
        let a = VideoInstanceId::new("a");
        let b = VideoInstanceId::new("b");

        assert_eq!(slot.claim(&a), None);
        assert_eq!(slot.claim(&a), None);
        assert_eq!(slot.claim(&b), Some(a.clone()));
        assert!(slot.is_held_by(&b));
    }

    #[test]
    fn release_only_by_holder() {
        let slot = ActiveSlot::default();
        let a = VideoInstanceId::new("a");
        let b = VideoInstanceId::new("b");

        slot.claim(&a);
        assert!(!slot.release(&b));
        assert_eq!(slot.get(), Some(a.clone()));
        assert!(slot.release(&a));
        assert_eq!(slot.get(), None);
        assert_eq!(slot.clear(), None);
    }
}
