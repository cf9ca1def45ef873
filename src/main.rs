use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use maze_racer_server::config::ServerConfig;
use maze_racer_server::game::match_result::MatchResult;
use maze_racer_server::lobby::manager::RoomRegistry;
use maze_racer_server::lobby::player::LobbyPlayer;
use maze_racer_server::metrics::Metrics;
use maze_racer_server::net::protocol::{encode, RoomEvent};

/// Log a snapshot line every this many ticks
const SNAPSHOT_LOG_EVERY: u64 = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Maze Racer Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: max_rooms={}, tick_rate={} Hz, track {}x{}, laps={}",
        config.max_rooms,
        config.race.tick_rate,
        config.race.track.width,
        config.race.track.height,
        config.race.laps_to_finish
    );

    let bot_count = config.demo_bots.clamp(1, config.max_players_per_room);
    info!("Bot count set to {}", bot_count);

    let metrics = Arc::new(Metrics::new());
    let mut registry = RoomRegistry::new(config, metrics.clone());

    // The first bot hosts the room
    let host = LobbyPlayer::bot("Bot 1".to_string());
    let host_id = host.id;
    let room_id = registry.create_room("Demo".to_string(), host)?;
    for _ in 1..bot_count {
        registry.add_bot(room_id)?;
    }

    let mut events = registry.subscribe(room_id)?;
    let pack = registry.start_room(room_id, host_id)?;
    info!(
        "Track {}x{}, route of {} cells, start angle {:.2}",
        pack.width,
        pack.height,
        pack.route.len(),
        pack.start_angle
    );

    let result = tokio::select! {
        result = watch_room(&mut events) => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            None
        }
    };

    registry.shutdown_all();

    match result {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        None => warn!("Room stopped before the match ended"),
    }
    info!("Final metrics:\n{}", metrics.to_json());
    info!("Server stopped");

    Ok(())
}

/// Follow a room's broadcast until its match ends
async fn watch_room(events: &mut broadcast::Receiver<RoomEvent>) -> Option<MatchResult> {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event receiver lagged, skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => return None,
        };

        match event {
            RoomEvent::Countdown(countdown) => match countdown.seconds_remaining {
                0 => info!("Go!"),
                n => info!("Starting in {}...", n),
            },
            RoomEvent::Snapshot(snapshot) if snapshot.tick % SNAPSHOT_LOG_EVERY == 0 => {
                let size = encode(&snapshot).map(|bytes| bytes.len()).unwrap_or(0);
                debug!(
                    tick = snapshot.tick,
                    race_time = snapshot.race_time,
                    players = snapshot.players.len(),
                    bytes = size,
                    "Snapshot"
                );
            }
            RoomEvent::LapCompleted { player_id, laps } => info!(%player_id, laps, "Lap"),
            RoomEvent::PlayerFinished { player_id, elapsed } => info!(%player_id, elapsed, "Finish"),
            RoomEvent::MatchEnded(result) => return Some(result),
            _ => {}
        }
    }
}
