//! Platform surface: declared device profile and media element hooks
//!
//! The embedding layer supplies these; the engine never inspects the host
//! environment itself.

pub mod device;
pub mod media;

pub use device::{BrowserFamily, DeviceProfile};
pub use media::{MediaElementFactory, NoopMediaElements, ProbeElement};

use std::sync::Arc;

/// A small composite trait that hosts implement to give the engine typed
/// access to the platform facts it needs.
pub trait PlatformApi: Send + Sync {
    fn device_profile(&self) -> DeviceProfile;
    fn media_elements(&self) -> Arc<dyn MediaElementFactory>;
}

/// Desktop platform without media playback. Probing always reports autoplay
/// as unavailable.
pub struct NoopPlatform {
    device: DeviceProfile,
}

impl NoopPlatform {
    pub fn new() -> Self {
        NoopPlatform {
            device: DeviceProfile::default(),
        }
    }

    pub fn with_device(device: DeviceProfile) -> Self {
        NoopPlatform { device }
    }
}

impl Default for NoopPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformApi for NoopPlatform {
    fn device_profile(&self) -> DeviceProfile {
        self.device
    }

    fn media_elements(&self) -> Arc<dyn MediaElementFactory> {
        Arc::new(NoopMediaElements::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_platform_is_desktop() {
        let p = NoopPlatform::new();
        assert!(!p.device_profile().touch);

        let m = NoopPlatform::with_device(DeviceProfile::mobile(BrowserFamily::Safari));
        assert!(m.device_profile().touch);
        let _elements = m.media_elements();
    }
}
