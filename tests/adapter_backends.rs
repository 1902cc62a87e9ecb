use std::sync::Arc;
use std::time::Duration;
use video_overlay::coordinator::PlaybackCoordinator;
use video_overlay::sim::{
    RecordingSink, SimCommand, SimPlatform, SimulatedAsyncPlayer, SimulatedSyncPlayer,
};
use video_overlay::{
    BackendCapability, Error, NormalizedPlayerEvent, OverlayConfig, OverlayState, PlayerAdapter,
    VideoInstanceId,
};

fn id(s: &str) -> VideoInstanceId {
    VideoInstanceId::new(s)
}

#[tokio::test(start_paused = true)]
async fn sync_backend_queries_and_events_are_normalized() {
    let player = SimulatedSyncPlayer::new(40.0);
    let (adapter, mut events) = PlayerAdapter::attach(id("s"), player.handle()).unwrap();
    assert_eq!(adapter.capability(), BackendCapability::Synchronous);

    player.fire_ready();
    assert_eq!(events.recv().await, Some(NormalizedPlayerEvent::Ready));

    assert_eq!(adapter.duration().await.unwrap(), 40.0);
    assert_eq!(adapter.volume().await.unwrap(), 1.0);
    assert!(adapter.is_paused().await.unwrap());
    assert!(adapter.is_audible().await.unwrap());

    adapter.set_volume(0.25);
    assert_eq!(adapter.volume().await.unwrap(), 0.25);
    adapter.mute();
    assert!(!adapter.is_audible().await.unwrap());

    adapter.play();
    adapter.play();
    adapter.pause();
    assert_eq!(events.recv().await, Some(NormalizedPlayerEvent::Playing));
    assert_eq!(events.recv().await, Some(NormalizedPlayerEvent::Paused));
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn async_backend_ready_comes_from_the_ready_future() {
    let player = SimulatedAsyncPlayer::with_latency(40.0, Duration::from_millis(20));
    let (adapter, mut events) = PlayerAdapter::attach(id("a"), player.handle()).unwrap();
    assert_eq!(adapter.capability(), BackendCapability::AsyncOnly);

    let early = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
    assert!(early.is_err());

    player.fire_ready();
    assert_eq!(events.recv().await, Some(NormalizedPlayerEvent::Ready));
    assert_eq!(adapter.volume().await.unwrap(), 1.0);
    assert!(adapter.is_paused().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn async_commands_reach_the_backend_in_issue_order() {
    let player = SimulatedAsyncPlayer::with_latency(40.0, Duration::from_millis(20));
    let (adapter, mut events) = PlayerAdapter::attach(id("a"), player.handle()).unwrap();

    adapter.pause();
    adapter.seek_to(12.0);
    adapter.unmute();
    adapter.set_volume(0.5);
    adapter.play();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        player.commands(),
        vec![
            SimCommand::Pause,
            SimCommand::SeekTo(12.0),
            SimCommand::Unmute,
            SimCommand::SetVolume(0.5),
            SimCommand::Play,
        ]
    );
    assert!(player.is_playing());
    assert_eq!(events.recv().await, Some(NormalizedPlayerEvent::Playing));
    assert!(adapter.is_playing().await.unwrap());
    let t = adapter.current_time().await.unwrap();
    assert!(t >= 12.0 && t < 13.0);
}

#[tokio::test(start_paused = true)]
async fn unloaded_sdk_refuses_to_attach() {
    let player = SimulatedSyncPlayer::new(10.0);
    player.set_sdk_loaded(false);
    assert!(matches!(
        PlayerAdapter::attach(id("s"), player.handle()),
        Err(Error::SdkNotLoaded(_))
    ));
    assert!(!player.is_subscribed());

    let player = SimulatedAsyncPlayer::new(10.0);
    player.set_sdk_loaded(false);
    assert!(matches!(
        PlayerAdapter::attach(id("a"), player.handle()),
        Err(Error::SdkNotLoaded(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn failing_queries_surface_as_backend_errors() {
    let player = SimulatedAsyncPlayer::new(10.0);
    let (adapter, _events) = PlayerAdapter::attach(id("a"), player.handle()).unwrap();
    player.set_failing(true);
    assert!(matches!(adapter.current_time().await, Err(Error::Backend(_))));
    assert!(matches!(adapter.is_audible().await, Err(Error::Backend(_))));
}

#[tokio::test(start_paused = true)]
async fn detach_closes_the_stream_and_drops_commands() {
    let player = SimulatedAsyncPlayer::new(10.0);
    let (adapter, mut events) = PlayerAdapter::attach(id("a"), player.handle()).unwrap();
    assert!(player.is_subscribed());

    adapter.detach();
    adapter.detach();
    assert!(adapter.is_detached());
    assert!(!player.is_subscribed());
    assert_eq!(events.recv().await, None);

    adapter.play();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(player.commands().is_empty());
    assert!(matches!(adapter.duration().await, Err(Error::InstanceDetached(_))));
}

#[tokio::test(start_paused = true)]
async fn async_players_follow_single_active_playback() {
    let sink = Arc::new(RecordingSink::new());
    let c = PlaybackCoordinator::new(OverlayConfig::default(), Arc::new(SimPlatform::desktop()), sink.clone());

    let a = SimulatedAsyncPlayer::with_latency(60.0, Duration::from_millis(20));
    let b = SimulatedAsyncPlayer::with_latency(60.0, Duration::from_millis(20));
    assert!(c.register(id("a"), a.handle()));
    assert!(c.register(id("b"), b.handle()));
    a.fire_ready();
    b.fire_ready();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(c.overlay_state(&id("a")), Some(OverlayState::Paused));

    a.press_play();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(c.overlay_state(&id("a")), Some(OverlayState::UnmutedPlaying));
    assert_eq!(c.active_instance(), Some(id("a")));

    c.overlay_clicked(&id("b")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(b.is_playing());
    assert!(!a.is_playing());
    assert_eq!(c.active_instance(), Some(id("b")));
    assert_eq!(c.overlay_state(&id("a")), Some(OverlayState::Paused));
    assert_eq!(c.overlay_state(&id("b")), Some(OverlayState::UnmutedPlaying));
}

#[tokio::test(start_paused = true)]
async fn async_muted_autoplay_unmutes_on_click() {
    let sink = Arc::new(RecordingSink::new());
    let c = PlaybackCoordinator::new(OverlayConfig::default(), Arc::new(SimPlatform::desktop()), sink.clone());
    c.set_autoplay_capability(true);

    let a = SimulatedAsyncPlayer::with_latency(60.0, Duration::from_millis(20));
    assert!(c.register(id("a"), a.handle()));
    a.fire_ready();
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(c.overlay_state(&id("a")), Some(OverlayState::MutedAutoplay));
    assert!(a.is_muted());
    assert!(a.is_playing());

    c.overlay_clicked(&id("a")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(c.overlay_state(&id("a")), Some(OverlayState::UnmutedPlaying));
    assert!(!a.is_muted());
    assert_eq!(a.volume(), 1.0);
    assert!(a.position() < 1.0);
    assert!(!sink.unmute_shown(&id("a")));
}
