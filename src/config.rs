use std::str::FromStr;

use crate::game::constants::{checkpoint, room};
use crate::game::systems::checkpoint::FinishPolicy;
use crate::game::track::TrackParams;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of concurrent rooms
    pub max_rooms: usize,
    /// Maximum players per room (including bots)
    pub max_players_per_room: usize,
    /// Bots the demo binary seats in its room
    pub demo_bots: usize,
    /// Settings every new room races with
    pub race: RaceConfig,
}

/// Per-room race settings
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Simulation rate in Hz
    pub tick_rate: u32,
    pub countdown_seconds: u32,
    pub track: TrackParams,
    /// Fixed seed for reproducible tracks; fresh entropy when unset
    pub track_seed: Option<u64>,
    /// Laps to finish; 0 leaves finishing to `Room::mark_finished`
    pub laps_to_finish: u32,
    pub max_bonus_spawns: usize,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            tick_rate: room::TICK_RATE,
            countdown_seconds: room::COUNTDOWN_SECONDS,
            track: TrackParams::default(),
            track_seed: None,
            laps_to_finish: checkpoint::DEFAULT_LAPS_TO_FINISH,
            max_bonus_spawns: 4,
        }
    }
}

impl RaceConfig {
    pub fn finish_policy(&self) -> FinishPolicy {
        match self.laps_to_finish {
            0 => FinishPolicy::External,
            laps => FinishPolicy::Laps(laps),
        }
    }

    /// Laps advertised in the starter pack
    pub fn advertised_laps(&self) -> Option<u32> {
        (self.laps_to_finish > 0).then_some(self.laps_to_finish)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(20..=60).contains(&self.tick_rate) {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if self.track.width < 5 || self.track.height < 5 {
            return Err(ConfigError::TrackTooSmall {
                width: self.track.width,
                height: self.track.height,
            });
        }
        if self.track.room_count > self.track.max_rooms() {
            return Err(ConfigError::TooManyTrackRooms {
                rooms: self.track.room_count,
                max: self.track.max_rooms(),
            });
        }
        if !(0.0..=1.0).contains(&self.track.water_probability) {
            return Err(ConfigError::WaterProbability(self.track.water_probability));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_rooms: 100,
            max_players_per_room: room::DEFAULT_MAX_PLAYERS,
            demo_bots: 3,
            race: RaceConfig::default(),
        }
    }
}

/// Read and parse one variable. Unset yields `None`; unparsable or
/// rejected values are logged and also yield `None`.
fn env_value<T: FromStr>(name: &str, accept: impl Fn(&T) -> bool, expected: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(parsed) if accept(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, expected);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();
        let race = &mut config.race;

        if let Some(v) = env_value("MAX_ROOMS", |v: &usize| (1..=10_000).contains(v), "1-10000") {
            config.max_rooms = v;
        }
        if let Some(v) = env_value("MAX_PLAYERS_PER_ROOM", |v: &usize| (1..=64).contains(v), "1-64") {
            config.max_players_per_room = v;
        }
        if let Some(v) = env_value("TICK_RATE", |v: &u32| (20..=60).contains(v), "20-60") {
            race.tick_rate = v;
        }
        if let Some(v) = env_value("COUNTDOWN_SECONDS", |v: &u32| *v <= 30, "0-30") {
            race.countdown_seconds = v;
        }
        if let Some(v) = env_value("TRACK_WIDTH", |v: &usize| *v >= 5 && v % 2 == 1, "odd and >= 5") {
            race.track.width = v;
        }
        if let Some(v) = env_value("TRACK_HEIGHT", |v: &usize| *v >= 5 && v % 2 == 1, "odd and >= 5") {
            race.track.height = v;
        }
        let room_cap = race.track.max_rooms();
        if let Some(v) = env_value("TRACK_ROOMS", |v: &usize| *v <= room_cap, &format!("0-{room_cap}")) {
            race.track.room_count = v;
        }
        if let Some(v) = env_value("WATER_PROBABILITY", |v: &f32| (0.0..=1.0).contains(v), "0.0-1.0") {
            race.track.water_probability = v;
        }
        if let Some(v) = env_value("TRACK_SEED", |_: &u64| true, "a u64") {
            race.track_seed = Some(v);
        }
        if let Some(v) = env_value("LAPS_TO_FINISH", |v: &u32| *v <= 100, "0-100") {
            race.laps_to_finish = v;
        }
        if let Some(v) = env_value("MAX_BONUS_SPAWNS", |v: &usize| *v <= 64, "0-64") {
            race.max_bonus_spawns = v;
        }
        if let Some(v) = env_value("BOT_COUNT", |v: &usize| (1..=64).contains(v), "1-64") {
            config.demo_bots = v;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rooms == 0 {
            return Err(ConfigError::NoRooms);
        }
        if self.max_players_per_room == 0 {
            return Err(ConfigError::NoPlayers);
        }
        self.race.validate()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_rooms must be at least 1")]
    NoRooms,
    #[error("max_players_per_room must be at least 1")]
    NoPlayers,
    #[error("tick_rate must be 20-60 Hz, got {0}")]
    TickRate(u32),
    #[error("track must be at least 5x5, got {width}x{height}")]
    TrackTooSmall { width: usize, height: usize },
    #[error("track fits at most {max} rooms, got {rooms}")]
    TooManyTrackRooms { rooms: usize, max: usize },
    #[error("water_probability must be within 0-1, got {0}")]
    WaterProbability(f32),
}
