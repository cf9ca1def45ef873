use serde::{Deserialize, Serialize};

use crate::game::match_result::MatchResult;
use crate::game::state::{PlayerId, RaceState, RoomId};
use crate::game::systems::bonus::{BonusType, PickupEvent};
use crate::game::track::GridPos;
use crate::util::vec2::Vec2;

/// Player input delivered by the transport. Applied at the next tick,
/// latest wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub player_id: PlayerId,
    /// Desired heading in radians; `None` releases the throttle
    pub heading: Option<f32>,
    /// Client-side race clock, informational
    #[serde(default)]
    pub reported_elapsed: Option<f32>,
}

/// Everything sent from a room to its subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoomEvent {
    /// Sent once when the match leaves the lobby
    StarterPack(StarterPack),
    /// Once per second during the countdown
    Countdown(CountdownEvent),
    /// Once per tick while racing
    Snapshot(RaceSnapshot),
    BonusPickedUp(PickupEvent),
    LapCompleted { player_id: PlayerId, laps: u32 },
    PlayerFinished { player_id: PlayerId, elapsed: f32 },
    /// Final standings; the room is inert afterwards
    MatchEnded(MatchResult),
}

/// Match-start payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarterPack {
    pub room_id: RoomId,
    /// Cell codes, one row per entry
    pub grid: Vec<Vec<u16>>,
    pub width: u32,
    pub height: u32,
    pub start_positions: Vec<StartPosition>,
    pub start_angle: f32,
    pub route: Vec<GridPos>,
    /// Laps needed to finish, when the server decides finishes
    pub laps_to_finish: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartPosition {
    pub player_id: PlayerId,
    pub position: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownEvent {
    pub room_id: RoomId,
    pub seconds_remaining: u32,
}

/// Per-tick public state of a race
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub room_id: RoomId,
    pub tick: u64,
    pub race_time: f32,
    pub players: Vec<PlayerSnapshot>,
    pub bonuses: Vec<BonusSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub position: Vec2,
    pub visual_heading: f32,
    pub speed: f32,
    pub finished: bool,
    pub size_modifier: f32,
    pub laps: u32,
    pub elapsed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BonusSnapshot {
    pub id: u32,
    pub kind: BonusType,
    pub position: Vec2,
    pub active: bool,
}

impl RaceSnapshot {
    /// Players without a car are left out
    pub fn from_state(state: &RaceState) -> Self {
        let players = state
            .players
            .iter()
            .filter_map(|p| {
                let car = p.car?;
                Some(PlayerSnapshot {
                    id: p.id,
                    position: car.position,
                    visual_heading: car.visual_heading,
                    speed: car.speed,
                    finished: p.finished,
                    size_modifier: car.size_modifier,
                    laps: state.checkpoints.laps(p.id),
                    elapsed: p.elapsed,
                })
            })
            .collect();

        let bonuses = state
            .bonuses
            .spawns()
            .iter()
            .map(|s| BonusSnapshot {
                id: s.id,
                kind: s.kind,
                position: s.position,
                active: s.active,
            })
            .collect();

        Self {
            room_id: state.room_id,
            tick: state.tick,
            race_time: state.race_time,
            players,
            bonuses,
        }
    }
}

impl StarterPack {
    pub fn from_state(state: &RaceState, laps_to_finish: Option<u32>) -> Self {
        let grid = &state.track.grid;
        Self {
            room_id: state.room_id,
            grid: grid.codes(),
            width: grid.width() as u32,
            height: grid.height() as u32,
            start_positions: state
                .start_positions()
                .into_iter()
                .map(|(player_id, position)| StartPosition { player_id, position })
                .collect(),
            start_angle: state.track.start_angle,
            route: state.track.route.clone(),
            laps_to_finish,
        }
    }
}

/// Encode a message with bincode
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(message, bincode::config::standard())
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a message with bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map(|(msg, _)| msg)
        .map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Decode error: {0}")]
    Decode(String),
}
