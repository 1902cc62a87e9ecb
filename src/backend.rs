//! Backend player traits
//!
//! Two structurally different player SDKs are supported. A [`SyncBackend`]
//! answers getters immediately and reports numeric state changes through a
//! callback; an [`AsyncBackend`] answers every getter through a future and
//! reports transitions as named events. Neither shape leaks past
//! [`crate::adapter::PlayerAdapter`].

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result type used at the backend seam. Backends report failures as plain
/// strings; the adapter lifts them into [`crate::Error::Backend`].
pub type BackendResult<T> = std::result::Result<T, String>;

/// Listener installed on a synchronous backend
pub type SyncListener = Arc<dyn Fn(SyncNativeEvent) + Send + Sync>;

/// Listener installed on an asynchronous backend; receives the event name
pub type AsyncListener = Arc<dyn Fn(&str) + Send + Sync>;

/// How a backend answers queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendCapability {
    Synchronous,
    AsyncOnly,
}

/// Numeric player states reported by synchronous backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl SyncPlayerState {
    /// Decode the SDK's numeric state code. Unknown codes map to `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Unstarted),
            0 => Some(Self::Ended),
            1 => Some(Self::Playing),
            2 => Some(Self::Paused),
            3 => Some(Self::Buffering),
            5 => Some(Self::Cued),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Unstarted => -1,
            Self::Ended => 0,
            Self::Playing => 1,
            Self::Paused => 2,
            Self::Buffering => 3,
            Self::Cued => 5,
        }
    }
}

/// Native notifications from a synchronous backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncNativeEvent {
    Ready,
    StateChange(SyncPlayerState),
}

/// A player whose getters return immediately.
///
/// Volume is expressed in integer percent (0..=100).
pub trait SyncBackend: Send + Sync {
    /// Whether the backend's global SDK object is available
    fn sdk_loaded(&self) -> bool {
        true
    }

    fn subscribe(&self, listener: SyncListener);
    fn unsubscribe(&self);

    fn current_time(&self) -> BackendResult<f64>;
    fn duration(&self) -> BackendResult<f64>;
    fn is_muted(&self) -> BackendResult<bool>;
    fn volume(&self) -> BackendResult<u8>;
    fn player_state(&self) -> BackendResult<SyncPlayerState>;

    fn play_video(&self) -> BackendResult<()>;
    fn pause_video(&self) -> BackendResult<()>;
    fn seek_to(&self, seconds: f64) -> BackendResult<()>;
    fn set_volume(&self, percent: u8) -> BackendResult<()>;
    fn mute(&self) -> BackendResult<()>;
    fn un_mute(&self) -> BackendResult<()>;
}

/// A player whose getters and commands all settle through futures.
///
/// Volume is expressed as a fraction (0.0..=1.0). Readiness is reported by
/// the [`AsyncBackend::ready`] future rather than an event.
pub trait AsyncBackend: Send + Sync {
    fn sdk_loaded(&self) -> bool {
        true
    }

    fn ready(&self) -> BoxFuture<'static, BackendResult<()>>;

    /// Install the named-event listener (`"play"`, `"pause"`, `"ended"`, ...)
    fn on(&self, listener: AsyncListener);
    fn off(&self);

    fn current_time(&self) -> BoxFuture<'static, BackendResult<f64>>;
    fn duration(&self) -> BoxFuture<'static, BackendResult<f64>>;
    fn muted(&self) -> BoxFuture<'static, BackendResult<bool>>;
    fn volume(&self) -> BoxFuture<'static, BackendResult<f64>>;
    fn paused(&self) -> BoxFuture<'static, BackendResult<bool>>;

    fn play(&self) -> BoxFuture<'static, BackendResult<()>>;
    fn pause(&self) -> BoxFuture<'static, BackendResult<()>>;
    fn set_current_time(&self, seconds: f64) -> BoxFuture<'static, BackendResult<()>>;
    fn set_volume(&self, volume: f64) -> BoxFuture<'static, BackendResult<()>>;
    fn set_muted(&self, muted: bool) -> BoxFuture<'static, BackendResult<()>>;
}

/// An already-mounted player handed over by the embedding layer, tagged with
/// its capability.
#[derive(Clone)]
pub enum BackendHandle {
    Synchronous(Arc<dyn SyncBackend>),
    AsyncOnly(Arc<dyn AsyncBackend>),
}

impl BackendHandle {
    pub fn capability(&self) -> BackendCapability {
        match self {
            BackendHandle::Synchronous(_) => BackendCapability::Synchronous,
            BackendHandle::AsyncOnly(_) => BackendCapability::AsyncOnly,
        }
    }

    pub fn sdk_loaded(&self) -> bool {
        match self {
            BackendHandle::Synchronous(b) => b.sdk_loaded(),
            BackendHandle::AsyncOnly(b) => b.sdk_loaded(),
        }
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackendHandle").field(&self.capability()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_codes_roundtrip_known_values() {
        for code in [-1, 0, 1, 2, 3, 5] {
            let state = SyncPlayerState::from_code(code).expect("known code");
            assert_eq!(state.code(), code);
        }
        assert_eq!(SyncPlayerState::from_code(4), None);
        assert_eq!(SyncPlayerState::from_code(42), None);
    }
}
