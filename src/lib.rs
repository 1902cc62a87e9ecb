//! Video Overlay Engine
//!
//! Player-state synchronization and overlay control for embedded third-party
//! video players. The engine normalizes synchronous and promise-based player
//! backends into one event model, runs a click-to-unmute overlay state machine
//! per embedded video, keeps at most one video audible at a time, and probes
//! once whether unattended autoplay is possible.
//!
//! # Features
//!
//! - **Uniform adapter**: [`adapter::PlayerAdapter`] hides the backend shape
//! - **Single active playback**: [`coordinator::PlaybackCoordinator`] pauses the
//!   other players when one starts playing audibly
//! - **Simulation** (`sim`, default): in-memory backends for tests and the
//!   `overlay-sim` binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use video_overlay::{OverlayConfig, VideoInstanceId};
//! use video_overlay::coordinator::PlaybackCoordinator;
//! use video_overlay::overlay::LogSink;
//! use video_overlay::sim::{SimPlatform, SimulatedSyncPlayer};
//!
//! # async fn run() {
//! let coordinator = PlaybackCoordinator::new(
//!     OverlayConfig::default(),
//!     Arc::new(SimPlatform::desktop()),
//!     Arc::new(LogSink),
//! );
//! coordinator.probe_autoplay_capability().await;
//!
//! let player = SimulatedSyncPlayer::new(120.0);
//! coordinator.register(VideoInstanceId::new("intro"), player.handle());
//! player.fire_ready();
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod adapter;
pub mod backend;
pub mod coordinator;
pub mod overlay;
pub mod platform;
pub mod probe;
pub mod progress;
pub mod timers;

// In-memory backends used by the integration tests and the overlay-sim binary
#[cfg(feature = "sim")]
pub mod sim;

pub use adapter::{NormalizedPlayerEvent, PlayerAdapter, SdkReadyHook};
pub use backend::{BackendCapability, BackendHandle};
pub use coordinator::PlaybackCoordinator;
pub use overlay::{OverlaySink, OverlayState};

/// Volume restored when the user unmutes through the overlay (fraction of full scale)
pub const DEFAULT_AUDIBLE_VOLUME: f64 = 1.0;

/// Stable identifier of one embedded video, derived from its source id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VideoInstanceId(String);

impl VideoInstanceId {
    pub fn new(source_id: impl Into<String>) -> Self {
        VideoInstanceId(source_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoInstanceId {
    fn from(s: &str) -> Self {
        VideoInstanceId::new(s)
    }
}

/// Configuration for the overlay engine
///
/// Deserializes from the camelCase option object the embedding layer
/// already uses; every field is optional.
///
/// # Examples
///
/// ```
/// let cfg = video_overlay::OverlayConfig::from_json(r#"{"disableSeek": true}"#).unwrap();
/// assert!(cfg.disable_seek);
/// assert!(cfg.single_active_playback);
/// assert_eq!(cfg.paused_label_text, "paused");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayConfig {
    /// Pause every other player when one starts playing audibly
    pub single_active_playback: bool,
    /// Visual hint forwarded with the unmute affordance
    pub autoplay_shake_affordance: bool,
    /// Ignore clicks on the progress bar
    pub disable_seek: bool,
    /// Banner text while paused
    pub paused_label_text: String,
    /// Banner text once playback has ended
    pub ended_label_text: String,
    /// Leave the native player alone on mobile Firefox
    pub regular_player_for_mobile_firefox: bool,
    /// Only take over players of these backend kinds; `None` allows every kind
    pub allowed_backends: Option<Vec<BackendCapability>>,
    pub timings: Timings,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            single_active_playback: true,
            autoplay_shake_affordance: true,
            disable_seek: false,
            paused_label_text: "paused".to_string(),
            ended_label_text: "ended".to_string(),
            regular_player_for_mobile_firefox: true,
            allowed_backends: None,
            timings: Timings::default(),
        }
    }
}

impl OverlayConfig {
    /// Parse and validate a JSON option object
    pub fn from_json(json: &str) -> Result<Self> {
        let config: OverlayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn allows(&self, capability: BackendCapability) -> bool {
        self.allowed_backends
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&capability))
    }

    pub fn validate(&self) -> Result<()> {
        if self.timings.progress_interval_ms == 0 {
            return Err(Error::ConfigError(
                "progressIntervalMs must be greater than zero".to_string(),
            ));
        }
        if self.timings.probe_timeout_ms == 0 {
            return Err(Error::ConfigError(
                "probeTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settle delays and polling cadence, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Timings {
    /// Delay before chrome is hidden after a play transition
    pub play_delay_ms: u64,
    /// Wait before confirming that a muted autoplay attempt actually plays
    pub autoplay_settle_ms: u64,
    /// Debounce before pausing the other players
    pub pause_others_delay_ms: u64,
    pub progress_interval_ms: u64,
    /// Wait before nudging a play command a second time
    pub play_retry_ms: u64,
    pub seek_settle_ms: u64,
    /// Upper bound on the autoplay probe
    pub probe_timeout_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            play_delay_ms: 500,
            autoplay_settle_ms: 1500,
            pause_others_delay_ms: 800,
            progress_interval_ms: 200,
            play_retry_ms: 200,
            seek_settle_ms: 200,
            probe_timeout_ms: 1000,
        }
    }
}

impl Timings {
    pub fn play_delay(&self) -> Duration {
        Duration::from_millis(self.play_delay_ms)
    }

    pub fn autoplay_settle(&self) -> Duration {
        Duration::from_millis(self.autoplay_settle_ms)
    }

    pub fn pause_others_delay(&self) -> Duration {
        Duration::from_millis(self.pause_others_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn play_retry(&self) -> Duration {
        Duration::from_millis(self.play_retry_ms)
    }

    pub fn seek_settle(&self) -> Duration {
        Duration::from_millis(self.seek_settle_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OverlayConfig::default();
        assert!(config.single_active_playback);
        assert!(config.autoplay_shake_affordance);
        assert!(!config.disable_seek);
        assert_eq!(config.ended_label_text, "ended");
        assert_eq!(config.timings.autoplay_settle_ms, 1500);
        assert_eq!(config.timings.pause_others_delay(), Duration::from_millis(800));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = OverlayConfig::from_json(
            r#"{"pausedLabelText": "pausiert", "timings": {"pauseOthersDelayMs": 300}}"#,
        )
        .unwrap();
        assert_eq!(config.paused_label_text, "pausiert");
        assert_eq!(config.timings.pause_others_delay_ms, 300);
        assert_eq!(config.timings.progress_interval_ms, 200);
        assert!(config.single_active_playback);
    }

    #[test]
    fn test_allowed_backends() {
        assert!(OverlayConfig::default().allows(BackendCapability::Synchronous));

        let config = OverlayConfig::from_json(r#"{"allowedBackends": ["AsyncOnly"]}"#).unwrap();
        assert!(config.allows(BackendCapability::AsyncOnly));
        assert!(!config.allows(BackendCapability::Synchronous));

        let config = OverlayConfig::from_json(r#"{"allowedBackends": []}"#).unwrap();
        assert!(!config.allows(BackendCapability::AsyncOnly));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = OverlayConfig::from_json(r#"{"timings": {"progressIntervalMs": 0}}"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let err = OverlayConfig::from_json(r#"{"singleActivePlayback": "yes"}"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_instance_id_display() {
        let id = VideoInstanceId::from("dQw4w9WgXcQ");
        assert_eq!(id.to_string(), "dQw4w9WgXcQ");
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }
}
