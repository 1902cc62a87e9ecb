//! One-shot autoplay capability probe
//!
//! Starts a muted, hidden test element and races its play attempt against a
//! fixed bound. The first outcome is memoized for the lifetime of the probe.

use crate::platform::{DeviceProfile, MediaElementFactory, ProbeElement};
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

pub struct AutoplayProbe {
    device: DeviceProfile,
    elements: Arc<dyn MediaElementFactory>,
    bound: Duration,
    outcome: OnceCell<bool>,
}

impl AutoplayProbe {
    pub fn new(device: DeviceProfile, elements: Arc<dyn MediaElementFactory>, bound: Duration) -> Self {
        AutoplayProbe {
            device,
            elements,
            bound,
            outcome: OnceCell::new(),
        }
    }

    /// Resolve whether muted video may start without user interaction.
    /// Concurrent and repeated callers share the first probe's answer.
    pub async fn run(&self) -> bool {
        *self.outcome.get_or_init(|| self.attempt()).await
    }

    /// The memoized answer, if a probe already completed
    pub fn outcome(&self) -> Option<bool> {
        self.outcome.get().copied()
    }

    async fn attempt(&self) -> bool {
        // Touch platforms gate autoplay on their own terms; a synthetic test
        // element says nothing useful there.
        if self.device.touch {
            debug!("autoplay probe: touch device, assuming available");
            return true;
        }

        let mut element = DetachOnDrop(self.elements.create_muted_test_element());
        let play = element.0.play();
        let available = match tokio::time::timeout(self.bound, play).await {
            Ok(Ok(())) => {
                debug!("autoplay probe: play succeeded");
                true
            }
            Ok(Err(e)) => {
                debug!("autoplay probe: play refused: {}", e);
                false
            }
            Err(_) => {
                debug!("autoplay probe: no answer within {:?}", self.bound);
                false
            }
        };
        drop(element);
        available
    }
}

// Detaches the test element on every exit path, including cancellation of
// the probe future.
struct DetachOnDrop(Box<dyn ProbeElement>);

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        self.0.detach();
    }
}
