//! A single race room: roster, lifecycle state machine and its tick task
//!
//! LOBBY -> COUNTDOWN -> ONGOING -> ENDED. `start` generates the track and
//! spawns one task that runs the countdown and then the fixed-rate tick loop.
//! The task and the room handle share the roster and the race behind one
//! mutex that is never held across an await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RaceConfig;
use crate::game::constants::{room as room_consts, tick_duration_ms};
use crate::game::game_loop::{GameLoop, GameLoopEvent, TickOutput};
use crate::game::input_buffer::{InputBuffer, InputBufferError};
use crate::game::match_result::{check_match_end, determine_result, MatchEndReason, MatchResult};
use crate::game::performance::{PerformanceMonitor, PerformanceStatus};
use crate::game::state::{Entrant, PlayerId, RaceState, RoomId};
use crate::game::track::generate;
use crate::lobby::player::LobbyPlayer;
use crate::metrics::Metrics;
use crate::net::protocol::{CountdownEvent, InputEvent, RoomEvent, StarterPack};

/// Room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    /// Accepting players
    Lobby,
    /// Track generated, counting down
    Countdown,
    /// Tick loop running
    Ongoing,
    /// Terminal; the room is inert
    Ended,
}

/// Room summary for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub state: RoomState,
    pub owner: Option<PlayerId>,
    pub player_count: usize,
    pub bot_count: usize,
    pub max_players: usize,
}

struct RoomInner {
    state: RoomState,
    /// Join order
    roster: Vec<LobbyPlayer>,
    owner: Option<PlayerId>,
    game: Option<GameLoop>,
}

impl RoomInner {
    /// Move to ENDED. Returns whether the tick loop was running.
    fn end(&mut self) -> bool {
        let was_racing = self.state == RoomState::Ongoing;
        self.state = RoomState::Ended;
        was_racing
    }
}

/// State shared between the room handle and its tick task
struct RoomShared {
    id: RoomId,
    inner: Mutex<RoomInner>,
    inputs: InputBuffer,
    events: broadcast::Sender<RoomEvent>,
    metrics: Arc<Metrics>,
    stopped: AtomicBool,
}

impl RoomShared {
    /// Send to subscribers; having none is fine
    fn emit(&self, event: RoomEvent) {
        let _ = self.events.send(event);
    }
}

pub struct Room {
    pub name: String,
    pub max_players: usize,
    config: RaceConfig,
    shared: Arc<RoomShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Room {
    pub fn new(name: String, max_players: usize, config: RaceConfig, metrics: Arc<Metrics>) -> Self {
        let (events, _) = broadcast::channel(room_consts::EVENT_CHANNEL_CAPACITY);
        Self {
            name,
            max_players,
            config,
            shared: Arc::new(RoomShared {
                id: Uuid::new_v4(),
                inner: Mutex::new(RoomInner {
                    state: RoomState::Lobby,
                    roster: Vec::new(),
                    owner: None,
                    game: None,
                }),
                inputs: InputBuffer::new(),
                events,
                metrics,
                stopped: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> RoomId {
        self.shared.id
    }

    pub fn state(&self) -> RoomState {
        self.shared.inner.lock().state
    }

    pub fn owner(&self) -> Option<PlayerId> {
        self.shared.inner.lock().owner
    }

    pub fn player_count(&self) -> usize {
        self.shared.inner.lock().roster.len()
    }

    pub fn human_count(&self) -> usize {
        self.shared.inner.lock().roster.iter().filter(|p| !p.is_bot).count()
    }

    pub fn is_full(&self) -> bool {
        self.player_count() >= self.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().roster.is_empty()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.shared.inner.lock().roster.iter().map(|p| p.id).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.shared.events.subscribe()
    }

    pub fn info(&self) -> RoomInfo {
        let inner = self.shared.inner.lock();
        RoomInfo {
            id: self.shared.id,
            name: self.name.clone(),
            state: inner.state,
            owner: inner.owner,
            player_count: inner.roster.len(),
            bot_count: inner.roster.iter().filter(|p| p.is_bot).count(),
            max_players: self.max_players,
        }
    }

    /// Add a player while in the lobby. The first player becomes the owner.
    pub fn add_player(&self, mut player: LobbyPlayer) -> Result<(), RoomError> {
        let mut inner = self.shared.inner.lock();
        if inner.state != RoomState::Lobby {
            return Err(RoomError::GameInProgress);
        }
        if inner.roster.len() >= self.max_players {
            return Err(RoomError::RoomFull);
        }
        if inner.roster.iter().any(|p| p.id == player.id) {
            return Err(RoomError::AlreadyInRoom);
        }

        player.room_id = Some(self.shared.id);
        if inner.owner.is_none() {
            inner.owner = Some(player.id);
        }
        debug!(room = %self.shared.id, player_id = %player.id, bot = player.is_bot, "Player joined room");
        inner.roster.push(player);
        Ok(())
    }

    /// Remove a player in any state. Ownership passes to the next human,
    /// or the next player when only bots remain.
    pub fn remove_player(&self, player_id: PlayerId) -> Option<LobbyPlayer> {
        let mut inner = self.shared.inner.lock();
        let index = inner.roster.iter().position(|p| p.id == player_id)?;
        let mut player = inner.roster.remove(index);
        player.room_id = None;

        if let Some(game) = inner.game.as_mut() {
            game.remove_player(player_id);
        }
        self.shared.inputs.remove(player_id);

        if inner.owner == Some(player_id) {
            inner.owner = inner
                .roster
                .iter()
                .find(|p| !p.is_bot)
                .or_else(|| inner.roster.first())
                .map(|p| p.id);
        }
        debug!(room = %self.shared.id, %player_id, "Player left room");
        Some(player)
    }

    /// LOBBY -> COUNTDOWN. Generates the track, places every car and spawns
    /// the tick task. The starter pack is also broadcast to subscribers.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, requested_by: PlayerId) -> Result<StarterPack, RoomError> {
        let pack = {
            let mut inner = self.shared.inner.lock();
            if inner.state != RoomState::Lobby {
                return Err(RoomError::GameInProgress);
            }
            if inner.owner != Some(requested_by) {
                return Err(RoomError::NotOwner);
            }
            if inner.roster.is_empty() {
                return Err(RoomError::NotEnoughPlayers);
            }

            let track = generate(&self.config.track, self.config.track_seed);
            info!(
                room = %self.shared.id,
                seed = track.seed,
                cores = track.core_count,
                route = track.route.len(),
                bonus_candidates = track.bonus_candidates.len(),
                "Track generated"
            );
            if !track.has_loop() {
                warn!(room = %self.shared.id, "No loop found, laps cannot be completed");
            }

            let entrants: Vec<Entrant> = inner.roster.iter().map(LobbyPlayer::entrant).collect();
            let state = RaceState::new(
                self.shared.id,
                track,
                &entrants,
                self.config.finish_policy(),
                self.config.max_bonus_spawns,
            );
            let pack = StarterPack::from_state(&state, self.config.advertised_laps());

            inner.game = Some(GameLoop::new(state));
            inner.state = RoomState::Countdown;
            pack
        };

        info!(room = %self.shared.id, name = %self.name, players = pack.start_positions.len(), "Room started");
        self.shared.emit(RoomEvent::StarterPack(pack.clone()));

        let handle = tokio::spawn(run_room(
            self.shared.clone(),
            self.config.tick_rate,
            self.config.countdown_seconds,
        ));
        *self.task.lock() = Some(handle);

        Ok(pack)
    }

    /// Buffer a player's input for the next tick
    pub fn submit_input(&self, event: InputEvent) -> Result<(), RoomError> {
        {
            let inner = self.shared.inner.lock();
            if !inner.roster.iter().any(|p| p.id == event.player_id) {
                return Err(RoomError::PlayerNotFound);
            }
            if !matches!(inner.state, RoomState::Countdown | RoomState::Ongoing) {
                return Err(RoomError::NotStarted);
            }
        }
        self.shared.inputs.submit(event)?;
        Ok(())
    }

    /// Finish a player from outside the simulation
    pub fn mark_finished(&self, player_id: PlayerId) -> Result<(), RoomError> {
        let event = {
            let mut inner = self.shared.inner.lock();
            if inner.state != RoomState::Ongoing {
                return Err(RoomError::NotStarted);
            }
            let game = inner.game.as_mut().ok_or(RoomError::NotStarted)?;
            if game.state().get_player(player_id).is_none() {
                return Err(RoomError::PlayerNotFound);
            }
            game.mark_finished(player_id)
        };

        if let Some(GameLoopEvent::PlayerFinished { player_id, elapsed }) = event {
            Metrics::add(&self.shared.metrics.finishes_total, 1);
            self.shared.emit(RoomEvent::PlayerFinished { player_id, elapsed });
        }
        Ok(())
    }

    /// Cancel the tick task and make the room inert. A match that had not
    /// ended yet is reported as cancelled.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }

        let result = {
            let mut inner = self.shared.inner.lock();
            let state = inner.state;
            match state {
                RoomState::Ended => None,
                RoomState::Lobby => {
                    inner.end();
                    None
                }
                RoomState::Countdown | RoomState::Ongoing => {
                    if inner.end() {
                        Metrics::decrement(&self.shared.metrics.rooms_racing, 1);
                    }
                    inner
                        .game
                        .as_ref()
                        .map(|game| determine_result(game.state(), MatchEndReason::Cancelled))
                }
            }
        };

        if let Some(result) = result {
            Metrics::add(&self.shared.metrics.matches_completed, 1);
            self.shared.emit(RoomEvent::MatchEnded(result));
        }
        info!(room = %self.shared.id, "Room stopped");
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Countdown, then the fixed-rate tick loop until the match ends or the
/// room is stopped
async fn run_room(shared: Arc<RoomShared>, tick_rate: u32, countdown_seconds: u32) {
    for remaining in (1..=countdown_seconds).rev() {
        debug!(room = %shared.id, remaining, "Countdown");
        shared.emit(RoomEvent::Countdown(CountdownEvent {
            room_id: shared.id,
            seconds_remaining: remaining,
        }));
        sleep(Duration::from_secs(1)).await;
        if shared.stopped.load(Ordering::Relaxed) {
            return;
        }
    }

    {
        let mut inner = shared.inner.lock();
        if inner.state != RoomState::Countdown {
            return;
        }
        inner.state = RoomState::Ongoing;
        // Under the lock so a concurrent stop() always sees the increment
        Metrics::add(&shared.metrics.rooms_racing, 1);
    }
    shared.emit(RoomEvent::Countdown(CountdownEvent {
        room_id: shared.id,
        seconds_remaining: 0,
    }));
    info!(room = %shared.id, "Race started at {} Hz", tick_rate);

    let mut ticker = interval(Duration::from_millis(tick_duration_ms(tick_rate)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut monitor = PerformanceMonitor::new(tick_rate);
    let mut last_tick = Instant::now();
    let mut next_stats_at = room_consts::STATS_INTERVAL_SECS as f32;
    let mut seen_superseded = 0;
    let mut seen_rejected = 0;

    loop {
        ticker.tick().await;
        if shared.stopped.load(Ordering::Relaxed) {
            break;
        }

        let now = Instant::now();
        let dt = now.duration_since(last_tick).as_secs_f32();
        last_tick = now;

        let compute_start = std::time::Instant::now();
        #[cfg_attr(not(feature = "bots"), allow(unused_mut))]
        let mut inputs = shared.inputs.drain();
        let applied = inputs.len() as u64;

        let (output, ended, players) = {
            let mut inner = shared.inner.lock();
            if inner.state != RoomState::Ongoing {
                break;
            }
            let Some(game) = inner.game.as_mut() else {
                break;
            };

            #[cfg(feature = "bots")]
            game.fill_bot_inputs(&mut inputs);

            let output = game.tick(dt, &inputs);
            let players = game.state().player_count();
            let ended = check_match_end(game.state()).map(|reason| determine_result(game.state(), reason));
            if ended.is_some() {
                inner.end();
            }
            (output, ended, players)
        };
        let compute_time = compute_start.elapsed();

        let metrics = &shared.metrics;
        metrics.record_tick_time(compute_time);
        Metrics::add(&metrics.inputs_applied, applied);
        record_tick_output(metrics, &output);

        let superseded = shared.inputs.superseded_count();
        Metrics::add(&metrics.inputs_superseded, superseded - seen_superseded);
        seen_superseded = superseded;
        let rejected = shared.inputs.rejected_count();
        Metrics::add(&metrics.inputs_rejected, rejected - seen_rejected);
        seen_rejected = rejected;

        if let Some(status) = monitor.record_tick(compute_time) {
            match status {
                PerformanceStatus::Overloaded => {
                    warn!(room = %shared.id, "Tick budget exceeded: {}", monitor.status_message())
                }
                _ => info!(room = %shared.id, "Tick performance: {}", monitor.status_message()),
            }
        }

        let race_time = output.snapshot.race_time;
        let tick = output.snapshot.tick;
        broadcast_tick(&shared, output);

        if race_time >= next_stats_at {
            next_stats_at += room_consts::STATS_INTERVAL_SECS as f32;
            info!(
                room = %shared.id,
                tick,
                race_time,
                players,
                "Room stats: {}",
                monitor.status_message()
            );
        }

        if let Some(result) = ended {
            finish_match(&shared, result);
            break;
        }
    }
}

fn record_tick_output(metrics: &Metrics, output: &TickOutput) {
    Metrics::add(&metrics.collisions_total, output.contacts as u64);
    Metrics::add(&metrics.cars_sanitized, output.sanitized as u64);
    for event in &output.events {
        match event {
            GameLoopEvent::BonusPickedUp(_) => Metrics::add(&metrics.pickups_total, 1),
            GameLoopEvent::LapCompleted { .. } => Metrics::add(&metrics.laps_total, 1),
            GameLoopEvent::PlayerFinished { .. } => Metrics::add(&metrics.finishes_total, 1),
        }
    }
}

/// Snapshot first, then whatever happened during the tick
fn broadcast_tick(shared: &RoomShared, output: TickOutput) {
    shared.emit(RoomEvent::Snapshot(output.snapshot));
    for event in output.events {
        shared.emit(match event {
            GameLoopEvent::BonusPickedUp(pickup) => RoomEvent::BonusPickedUp(pickup),
            GameLoopEvent::LapCompleted { player_id, laps } => RoomEvent::LapCompleted { player_id, laps },
            GameLoopEvent::PlayerFinished { player_id, elapsed } => RoomEvent::PlayerFinished { player_id, elapsed },
        });
    }
}

fn finish_match(shared: &RoomShared, result: MatchResult) {
    Metrics::decrement(&shared.metrics.rooms_racing, 1);
    Metrics::add(&shared.metrics.matches_completed, 1);
    info!(
        room = %shared.id,
        reason = ?result.reason,
        winner = ?result.winner_name,
        race_time = result.race_time,
        "Match ended"
    );
    shared.emit(RoomEvent::MatchEnded(result));
}

/// Room errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,
    #[error("Game already in progress")]
    GameInProgress,
    #[error("Not enough players")]
    NotEnoughPlayers,
    #[error("Player not found")]
    PlayerNotFound,
    #[error("Player already in room")]
    AlreadyInRoom,
    #[error("Only the room owner can start the match")]
    NotOwner,
    #[error("Match has not started")]
    NotStarted,
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputBufferError),
}
