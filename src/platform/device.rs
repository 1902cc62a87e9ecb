//! Declared device facts the embedding layer hands to the engine.
//!
//! User-agent sniffing happens outside the engine; only its outcome lives here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    OperaTouch,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Touch / mobile device
    pub touch: bool,
    pub browser: BrowserFamily,
}

impl DeviceProfile {
    pub fn desktop(browser: BrowserFamily) -> Self {
        DeviceProfile { touch: false, browser }
    }

    pub fn mobile(browser: BrowserFamily) -> Self {
        DeviceProfile { touch: true, browser }
    }

    pub fn is_mobile_firefox(&self) -> bool {
        self.touch && self.browser == BrowserFamily::Firefox
    }

    /// Whether overlays should be attached at all. Opera Touch never gets
    /// one; mobile Firefox keeps its native player when configured to.
    pub fn overlay_supported(&self, regular_player_for_mobile_firefox: bool) -> bool {
        if self.browser == BrowserFamily::OperaTouch {
            return false;
        }
        !(regular_player_for_mobile_firefox && self.is_mobile_firefox())
    }

    /// Mobile Firefox silently ignores muted play commands
    pub fn muted_autoplay_allowed(&self) -> bool {
        !self.is_mobile_firefox()
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::desktop(BrowserFamily::Other)
    }
}
