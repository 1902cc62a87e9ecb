//! Cancellable delayed callbacks keyed by (instance, purpose).
//!
//! Scheduling under a key that already has a pending timer aborts the old one,
//! so rapid repeated intents (play/pause flapping, repeated pause-others
//! broadcasts) coalesce to the most recent registration.

use crate::VideoInstanceId;
use log::trace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a delayed callback is for. At most one timer per instance and purpose
/// is live at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Deferred chrome update after a play transition
    PlayDelay,
    /// Progress polling loop
    ProgressPoll,
    /// Debounced pause issued by the coordinator to a non-active instance
    PauseOthersDelay,
    /// Muted autoplay confirmation
    AutoplaySettle,
    /// Second play nudge after a click
    PlayRetry,
    /// One-shot progress refresh after a seek
    SeekRefresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TimerKey {
    instance: VideoInstanceId,
    purpose: TimerPurpose,
}

struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Registry of pending timers. Must be used from within a tokio runtime.
#[derive(Default)]
pub struct TimerRegistry {
    timers: Mutex<HashMap<TimerKey, TimerEntry>>,
    next_generation: AtomicU64,
}

impl TimerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run `callback` after `delay`, replacing any pending timer under the
    /// same key.
    pub fn schedule<F, Fut>(
        self: &Arc<Self>,
        instance: &VideoInstanceId,
        purpose: TimerPurpose,
        delay: Duration,
        callback: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = TimerKey {
            instance: instance.clone(),
            purpose,
        };
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let registry: Weak<Self> = Arc::downgrade(self);
        let task_key = key.clone();

        // The lock is held until the entry is inserted so a zero-delay task
        // cannot try to retire itself before it is registered.
        let mut timers = self.timers.lock();
        if let Some(previous) = timers.remove(&key) {
            trace!("timer {:?}/{:?} superseded", key.instance, key.purpose);
            previous.handle.abort();
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if !registry.retire(&task_key, generation) {
                return;
            }
            drop(registry);
            callback().await;
        });
        timers.insert(key, TimerEntry { generation, handle });
    }

    /// Cancel the pending timer under this key, if any.
    pub fn cancel(&self, instance: &VideoInstanceId, purpose: TimerPurpose) -> bool {
        let key = TimerKey {
            instance: instance.clone(),
            purpose,
        };
        match self.timers.lock().remove(&key) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer of one instance. Returns how many were cancelled.
    pub fn cancel_instance(&self, instance: &VideoInstanceId) -> usize {
        let mut timers = self.timers.lock();
        let keys: Vec<TimerKey> = timers
            .keys()
            .filter(|k| &k.instance == instance)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(entry) = timers.remove(key) {
                entry.handle.abort();
            }
        }
        keys.len()
    }

    pub fn is_pending(&self, instance: &VideoInstanceId, purpose: TimerPurpose) -> bool {
        self.timers.lock().contains_key(&TimerKey {
            instance: instance.clone(),
            purpose,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.timers.lock().len()
    }

    // Removes the entry if it still belongs to `generation`. A superseded
    // timer that slipped past its abort finds a newer generation and bails.
    fn retire(&self, key: &TimerKey, generation: u64) -> bool {
        let mut timers = self.timers.lock();
        match timers.get(key) {
            Some(entry) if entry.generation == generation => {
                timers.remove(key);
                true
            }
            _ => false,
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        for (_, entry) in self.timers.get_mut().drain() {
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn id(s: &str) -> VideoInstanceId {
        VideoInstanceId::new(s)
    }

    #[tokio::test(start_paused = true)]
    async fn second_schedule_replaces_first() {
        let reg = TimerRegistry::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let f1 = fired.clone();
        reg.schedule(&id("a"), TimerPurpose::PlayDelay, Duration::from_millis(500), move || async move {
            f1.lock().push("first");
        });
        let f2 = fired.clone();
        reg.schedule(&id("a"), TimerPurpose::PlayDelay, Duration::from_millis(500), move || async move {
            f2.lock().push("second");
        });

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(*fired.lock(), vec!["second"]);
        assert_eq!(reg.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_purposes_do_not_coalesce() {
        let reg = TimerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        for purpose in [TimerPurpose::PlayDelay, TimerPurpose::ProgressPoll] {
            let c = count.clone();
            reg.schedule(&id("a"), purpose, Duration::from_millis(100), move || async move {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        let c = count.clone();
        reg.schedule(&id("b"), TimerPurpose::PlayDelay, Duration::from_millis(100), move || async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(reg.pending_count(), 3);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_instance_drops_only_that_instance() {
        let reg = TimerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        for (inst, purpose) in [
            ("a", TimerPurpose::PlayDelay),
            ("a", TimerPurpose::ProgressPoll),
            ("b", TimerPurpose::PlayDelay),
        ] {
            let c = count.clone();
            reg.schedule(&id(inst), purpose, Duration::from_millis(100), move || async move {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(reg.cancel_instance(&id("a")), 2);
        assert!(!reg.is_pending(&id("a"), TimerPurpose::PlayDelay));
        assert!(reg.is_pending(&id("b"), TimerPurpose::PlayDelay));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_may_reschedule_its_own_key() {
        let reg = TimerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        fn tick(reg: Arc<TimerRegistry>, count: Arc<AtomicUsize>) {
            let r = reg.clone();
            reg.schedule(&VideoInstanceId::new("loop"), TimerPurpose::ProgressPoll, Duration::from_millis(200), move || async move {
                if count.fetch_add(1, Ordering::SeqCst) < 4 {
                    tick(r, count);
                }
            });
        }
        tick(reg.clone(), count.clone());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(reg.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_reports_whether_anything_was_pending() {
        let reg = TimerRegistry::new();
        assert!(!reg.cancel(&id("a"), TimerPurpose::PlayRetry));
        reg.schedule(&id("a"), TimerPurpose::PlayRetry, Duration::from_millis(10), || async {});
        assert!(reg.cancel(&id("a"), TimerPurpose::PlayRetry));
        assert_eq!(reg.pending_count(), 0);
    }
}
