//! Match-scoped player records and the race state a room simulates

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::systems::bonus::BonusTracker;
use crate::game::systems::checkpoint::{CheckpointTracker, FinishPolicy};
use crate::game::track::Track;
use crate::game::vehicle::Car;
use crate::util::vec2::Vec2;

/// Unique player identifier
pub type PlayerId = Uuid;

/// Unique room identifier
pub type RoomId = Uuid;

/// A player taking part in one match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Present once the match has left the lobby
    pub car: Option<Car>,
    pub finished: bool,
    /// Seconds of racing since the start, frozen at finish
    pub elapsed: f32,
    /// Last elapsed time the client reported, if any
    pub reported_elapsed: Option<f32>,
    pub is_bot: bool,
    pub id: PlayerId,
    pub name: String,
}

impl Player {
    pub fn new(id: PlayerId, name: String, is_bot: bool) -> Self {
        Self {
            car: None,
            finished: false,
            elapsed: 0.0,
            reported_elapsed: None,
            is_bot,
            id,
            name,
        }
    }

    /// Still driving: has a car and has not finished
    #[inline]
    pub fn is_racing(&self) -> bool {
        !self.finished && self.car.is_some()
    }
}

/// Roster entry handed to the race when a match starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrant {
    pub id: PlayerId,
    pub name: String,
    pub is_bot: bool,
}

/// Everything one room simulates. The track is never mutated after
/// construction.
#[derive(Debug)]
pub struct RaceState {
    pub room_id: RoomId,
    pub tick: u64,
    /// Seconds since the race went live
    pub race_time: f32,
    pub track: Track,
    /// Join order; collision pairs are visited in this order
    pub players: Vec<Player>,
    pub bonuses: BonusTracker,
    pub checkpoints: CheckpointTracker,
    pub finish_policy: FinishPolicy,
}

impl RaceState {
    /// Place one car per entrant on the start grid
    pub fn new(
        room_id: RoomId,
        track: Track,
        entrants: &[Entrant],
        finish_policy: FinishPolicy,
        max_bonus_spawns: usize,
    ) -> Self {
        let slots = track.start_slots(entrants.len());
        let mut checkpoints = CheckpointTracker::new(track.route.clone());

        let players = entrants
            .iter()
            .zip(slots)
            .map(|(entrant, slot)| {
                checkpoints.register(entrant.id);
                let mut player = Player::new(entrant.id, entrant.name.clone(), entrant.is_bot);
                player.car = Some(Car::new(entrant.id, slot, track.start_angle));
                player
            })
            .collect();

        // Separate stream from the generator so spawns don't mirror the maze
        let bonuses = BonusTracker::new(&track.bonus_candidates, max_bonus_spawns, track.seed.wrapping_add(1));

        Self {
            room_id,
            tick: 0,
            race_time: 0.0,
            track,
            players,
            bonuses,
            checkpoints,
            finish_policy,
        }
    }

    pub fn get_player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn get_player_mut(&mut self, player_id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        self.checkpoints.remove(player_id);
        self.bonuses.remove_player(player_id);
        Some(self.players.remove(index))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn racing_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_racing()).count()
    }

    /// True once at least one player exists and every player has finished
    pub fn all_finished(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.finished)
    }

    /// Current car positions in roster order
    pub fn start_positions(&self) -> Vec<(PlayerId, Vec2)> {
        self.players
            .iter()
            .filter_map(|p| p.car.map(|car| (p.id, car.position)))
            .collect()
    }
}
