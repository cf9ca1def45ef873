//! Per-player progress along the checkpoint route

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::constants::checkpoint::RADIUS;
use crate::game::state::PlayerId;
use crate::game::track::GridPos;
use crate::util::vec2::Vec2;

/// When a player counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishPolicy {
    /// Finished once this many laps are complete
    Laps(u32),
    /// Only an explicit external call finishes a player
    External,
}

impl FinishPolicy {
    pub fn is_finished(&self, laps: u32) -> bool {
        match self {
            FinishPolicy::Laps(target) => laps >= *target,
            FinishPolicy::External => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Not at the next checkpoint
    None,
    /// Moved on to the checkpoint at `next`
    Advanced { next: usize },
    /// Crossed the last checkpoint of the route
    LapCompleted { laps: u32 },
}

#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    route: Vec<GridPos>,
    /// Index of the next expected route point
    progress: HashMap<PlayerId, usize>,
    laps: HashMap<PlayerId, u32>,
}

impl CheckpointTracker {
    pub fn new(route: Vec<GridPos>) -> Self {
        Self {
            route,
            progress: HashMap::new(),
            laps: HashMap::new(),
        }
    }

    pub fn route(&self) -> &[GridPos] {
        &self.route
    }

    pub fn register(&mut self, player_id: PlayerId) {
        self.progress.entry(player_id).or_insert(0);
        self.laps.entry(player_id).or_insert(0);
    }

    pub fn remove(&mut self, player_id: PlayerId) {
        self.progress.remove(&player_id);
        self.laps.remove(&player_id);
    }

    /// Advance the player if `position` is within the tolerance radius of
    /// the next expected route point. At most one step per call.
    pub fn on_reach(&mut self, player_id: PlayerId, position: Vec2) -> CheckpointOutcome {
        // A degenerate route has nothing to lap
        if self.route.len() < 2 {
            return CheckpointOutcome::None;
        }
        let Some(index) = self.progress.get_mut(&player_id) else {
            return CheckpointOutcome::None;
        };
        let Some(target) = self.route.get(*index) else {
            *index = 0;
            return CheckpointOutcome::None;
        };
        if target.center().distance_sq_to(position) > RADIUS * RADIUS {
            return CheckpointOutcome::None;
        }

        *index += 1;
        if *index < self.route.len() {
            return CheckpointOutcome::Advanced { next: *index };
        }

        *index = 0;
        let laps = self.laps.entry(player_id).or_insert(0);
        *laps += 1;
        CheckpointOutcome::LapCompleted { laps: *laps }
    }

    pub fn laps(&self, player_id: PlayerId) -> u32 {
        self.laps.get(&player_id).copied().unwrap_or(0)
    }

    pub fn progress(&self, player_id: PlayerId) -> Option<usize> {
        self.progress.get(&player_id).copied()
    }

    /// The route cell the player has to reach next
    pub fn next_checkpoint(&self, player_id: PlayerId) -> Option<GridPos> {
        let index = self.progress(player_id)?;
        self.route.get(index).copied()
    }
}
