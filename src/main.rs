use anyhow::{bail, Context};
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use video_overlay::coordinator::PlaybackCoordinator;
use video_overlay::overlay::LogSink;
use video_overlay::sim::{SimCore, SimPlatform, SimulatedAsyncPlayer, SimulatedSyncPlayer};
use video_overlay::{OverlayConfig, VideoInstanceId};

/// Drive simulated embedded players through the overlay engine
#[derive(Parser, Debug)]
#[command(name = "overlay-sim", version, about)]
struct Args {
    /// Number of players with synchronous getters
    #[arg(long, default_value_t = 2)]
    players: usize,

    /// Number of players with promise-style getters
    #[arg(long, default_value_t = 0)]
    async_players: usize,

    /// Simulate a touch device
    #[arg(long)]
    mobile: bool,

    /// Run the autoplay probe before registering players
    #[arg(long)]
    probe: bool,

    /// Players ignore play commands while muted
    #[arg(long)]
    block_muted_autoplay: bool,

    /// Overlay options as a JSON object
    #[arg(long)]
    config: Option<String>,

    /// Click the overlay of the player at this index (repeatable)
    #[arg(long = "click")]
    clicks: Vec<usize>,

    /// Simulated run time in milliseconds
    #[arg(long, default_value_t = 5000)]
    run_ms: u64,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbosity: u8,
}

enum SimPlayer {
    Sync(SimulatedSyncPlayer),
    Async(SimulatedAsyncPlayer),
}

impl SimPlayer {
    fn core(&self) -> &SimCore {
        match self {
            SimPlayer::Sync(p) => &**p,
            SimPlayer::Async(p) => &**p,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
    debug!("Command-line args: {:?}", args);

    let config = match &args.config {
        Some(json) => OverlayConfig::from_json(json).context("invalid --config")?,
        None => OverlayConfig::default(),
    };
    let total = args.players + args.async_players;
    if total == 0 {
        bail!("nothing to simulate: --players and --async-players are both zero");
    }
    if let Some(bad) = args.clicks.iter().find(|&&i| i >= total) {
        bail!("--click {} out of range (0..{})", bad, total);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(simulate(args, config))
}

async fn simulate(args: Args, config: OverlayConfig) -> anyhow::Result<()> {
    let platform = if args.mobile {
        SimPlatform::mobile()
    } else {
        SimPlatform::desktop()
    };
    let coordinator = PlaybackCoordinator::new(config, Arc::new(platform), Arc::new(LogSink));

    if args.probe {
        coordinator.probe_autoplay_capability().await;
    } else {
        info!("Autoplay probe skipped, assuming unavailable");
    }

    let mut players = Vec::new();
    for i in 0..args.players {
        players.push(SimPlayer::Sync(SimulatedSyncPlayer::new(30.0 + 15.0 * i as f64)));
    }
    for i in 0..args.async_players {
        players.push(SimPlayer::Async(SimulatedAsyncPlayer::with_latency(
            45.0 + 15.0 * i as f64,
            Duration::from_millis(20),
        )));
    }

    let mut ids = Vec::new();
    for (i, player) in players.iter().enumerate() {
        let id = VideoInstanceId::new(format!("video-{}", i));
        player.core().set_block_muted_autoplay(args.block_muted_autoplay);
        let handle = match player {
            SimPlayer::Sync(p) => p.handle(),
            SimPlayer::Async(p) => p.handle(),
        };
        if !coordinator.register(id.clone(), handle) {
            bail!("failed to register {}", id);
        }
        player.core().fire_ready();
        ids.push(id);
    }

    let run = Duration::from_millis(args.run_ms);
    let step = run / (args.clicks.len() as u32 + 1);
    for &index in &args.clicks {
        tokio::time::sleep(step).await;
        info!("Clicking {}", ids[index]);
        coordinator.overlay_clicked(&ids[index]).await?;
    }
    tokio::time::sleep(step).await;

    let mut summary = serde_json::Map::new();
    for (id, player) in ids.iter().zip(&players) {
        summary.insert(
            id.to_string(),
            serde_json::json!({
                "state": coordinator.overlay_state(id),
                "playing": player.core().is_playing(),
                "muted": player.core().is_muted(),
                "position": (player.core().position() * 10.0).round() / 10.0,
            }),
        );
    }
    let report = serde_json::json!({
        "autoplay": coordinator.autoplay_capability(),
        "active": coordinator.active_instance(),
        "instances": summary,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    coordinator.shutdown();
    Ok(())
}
