use std::sync::Arc;
use std::time::Duration;
use video_overlay::coordinator::PlaybackCoordinator;
use video_overlay::overlay::NoopSink;
use video_overlay::platform::{BrowserFamily, DeviceProfile, NoopPlatform, PlatformApi};
use video_overlay::probe::AutoplayProbe;
use video_overlay::sim::{ProbeOutcome, SimPlatform, SimulatedSyncPlayer};
use video_overlay::{OverlayConfig, OverlayState, VideoInstanceId};

fn probe_for(platform: &SimPlatform, bound_ms: u64) -> AutoplayProbe {
    AutoplayProbe::new(
        platform.device_profile(),
        platform.media().clone(),
        Duration::from_millis(bound_ms),
    )
}

#[tokio::test(start_paused = true)]
async fn touch_device_is_available_without_test_element() {
    let platform = SimPlatform::new(DeviceProfile::mobile(BrowserFamily::Safari), ProbeOutcome::Reject);
    let probe = probe_for(&platform, 1000);
    assert!(probe.run().await);
    assert_eq!(platform.media().created(), 0);
}

#[tokio::test(start_paused = true)]
async fn resolved_play_is_available_and_element_detached() {
    let platform = SimPlatform::desktop();
    let probe = probe_for(&platform, 1000);
    assert!(probe.run().await);
    assert_eq!(platform.media().created(), 1);
    assert_eq!(platform.media().detached(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_play_is_unavailable() {
    let platform = SimPlatform::new(DeviceProfile::desktop(BrowserFamily::Safari), ProbeOutcome::Reject);
    let probe = probe_for(&platform, 1000);
    assert!(!probe.run().await);
    assert_eq!(platform.media().detached(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_element_times_out_as_unavailable() {
    let platform = SimPlatform::new(DeviceProfile::desktop(BrowserFamily::Firefox), ProbeOutcome::Hang);
    let probe = probe_for(&platform, 1000);

    let started = tokio::time::Instant::now();
    assert!(!probe.run().await);
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(platform.media().detached(), 1);
}

#[tokio::test(start_paused = true)]
async fn outcome_is_memoized_across_callers() {
    let platform = SimPlatform::new(DeviceProfile::desktop(BrowserFamily::Chrome), ProbeOutcome::Hang);
    let probe = probe_for(&platform, 500);

    let (first, second) = tokio::join!(probe.run(), probe.run());
    assert!(!first);
    assert!(!second);
    assert!(!probe.run().await);
    assert_eq!(probe.outcome(), Some(false));
    assert_eq!(platform.media().created(), 1);
}

#[tokio::test(start_paused = true)]
async fn coordinator_records_probe_outcome() {
    let c = PlaybackCoordinator::new(
        OverlayConfig::default(),
        Arc::new(SimPlatform::desktop()),
        Arc::new(NoopSink),
    );
    assert!(!c.autoplay_capability());
    assert!(c.probe_autoplay_capability().await);
    assert!(c.autoplay_capability());

    let noop = PlaybackCoordinator::new(
        OverlayConfig::default(),
        Arc::new(NoopPlatform::new()),
        Arc::new(NoopSink),
    );
    assert!(!noop.probe_autoplay_capability().await);
}

#[tokio::test(start_paused = true)]
async fn opera_touch_never_gets_an_overlay() {
    let platform = SimPlatform::new(DeviceProfile::mobile(BrowserFamily::OperaTouch), ProbeOutcome::Resolve);
    let c = PlaybackCoordinator::new(OverlayConfig::default(), Arc::new(platform), Arc::new(NoopSink));
    let player = SimulatedSyncPlayer::new(60.0);
    assert!(!c.register(VideoInstanceId::new("a"), player.handle()));
    assert!(!player.is_subscribed());
    assert!(c.instance_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mobile_firefox_keeps_native_player_by_default() {
    let platform = SimPlatform::new(DeviceProfile::mobile(BrowserFamily::Firefox), ProbeOutcome::Resolve);
    let c = PlaybackCoordinator::new(OverlayConfig::default(), Arc::new(platform), Arc::new(NoopSink));
    let player = SimulatedSyncPlayer::new(60.0);
    assert!(!c.register(VideoInstanceId::new("a"), player.handle()));
}

#[tokio::test(start_paused = true)]
async fn mobile_firefox_overlay_never_autoplays() {
    let config = OverlayConfig::from_json(r#"{"regularPlayerForMobileFirefox": false}"#).unwrap();
    let platform = SimPlatform::new(DeviceProfile::mobile(BrowserFamily::Firefox), ProbeOutcome::Resolve);
    let c = PlaybackCoordinator::new(config, Arc::new(platform), Arc::new(NoopSink));
    assert!(c.probe_autoplay_capability().await);

    let player = SimulatedSyncPlayer::new(60.0);
    let id = VideoInstanceId::new("a");
    assert!(c.register(id.clone(), player.handle()));
    player.fire_ready();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(c.overlay_state(&id), Some(OverlayState::Paused));
    assert!(!player.is_playing());
}

#[test]
fn device_profile_deserializes_from_embedder_json() {
    let d: DeviceProfile = serde_json::from_str(r#"{"touch": true, "browser": "opera-touch"}"#).unwrap();
    assert_eq!(d, DeviceProfile::mobile(BrowserFamily::OperaTouch));
    assert!(!d.overlay_supported(false));
}
