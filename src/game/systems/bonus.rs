//! Bonus spawn points and timed per-player effects

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::bonus::{
    MASS_INCREASE_DURATION, MASS_SIZE_MULTIPLIER, PICKUP_RADIUS, RESPAWN_COOLDOWN, SPEED_BOOST_DURATION,
    SPEED_BOOST_MULTIPLIER,
};
use crate::game::state::PlayerId;
use crate::game::track::GridPos;
use crate::util::vec2::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BonusType {
    SpeedBoost,
    MassIncrease,
}

impl BonusType {
    pub const ALL: [BonusType; 2] = [BonusType::SpeedBoost, BonusType::MassIncrease];

    /// Effect duration in seconds
    pub fn duration(&self) -> f32 {
        match self {
            BonusType::SpeedBoost => SPEED_BOOST_DURATION,
            BonusType::MassIncrease => MASS_INCREASE_DURATION,
        }
    }

    pub fn speed_multiplier(&self) -> f32 {
        match self {
            BonusType::SpeedBoost => SPEED_BOOST_MULTIPLIER,
            BonusType::MassIncrease => 1.0,
        }
    }

    pub fn size_multiplier(&self) -> f32 {
        match self {
            BonusType::SpeedBoost => 1.0,
            BonusType::MassIncrease => MASS_SIZE_MULTIPLIER,
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusSpawnPoint {
    pub id: u32,
    pub position: Vec2,
    pub kind: BonusType,
    pub active: bool,
    /// Seconds until an inactive point comes back
    pub cooldown: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveEffect {
    pub player_id: PlayerId,
    pub kind: BonusType,
    /// Seconds left
    pub remaining: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickupEvent {
    pub player_id: PlayerId,
    pub spawn_id: u32,
    pub kind: BonusType,
}

pub type PickupEvents = SmallVec<[PickupEvent; 4]>;

/// Owns the spawn points of one track and the effects they grant
#[derive(Debug)]
pub struct BonusTracker {
    spawns: Vec<BonusSpawnPoint>,
    effects: HashMap<PlayerId, ActiveEffect>,
    rng: StdRng,
}

impl BonusTracker {
    /// Place up to `max_spawns` points on randomly chosen candidate cells
    pub fn new(candidates: &[GridPos], max_spawns: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cells = candidates.to_vec();
        cells.shuffle(&mut rng);

        let spawns = cells
            .into_iter()
            .take(max_spawns)
            .enumerate()
            .map(|(i, cell)| BonusSpawnPoint {
                id: i as u32,
                position: cell.center(),
                kind: BonusType::random(&mut rng),
                active: true,
                cooldown: 0.0,
            })
            .collect();

        Self {
            spawns,
            effects: HashMap::new(),
            rng,
        }
    }

    pub fn spawns(&self) -> &[BonusSpawnPoint] {
        &self.spawns
    }

    pub fn effect(&self, player_id: PlayerId) -> Option<&ActiveEffect> {
        self.effects.get(&player_id)
    }

    /// (speed multiplier, size multiplier) from the player's active effect
    pub fn multipliers(&self, player_id: PlayerId) -> (f32, f32) {
        self.effects
            .get(&player_id)
            .map_or((1.0, 1.0), |e| (e.kind.speed_multiplier(), e.kind.size_multiplier()))
    }

    pub fn remove_player(&mut self, player_id: PlayerId) {
        self.effects.remove(&player_id);
    }

    /// Advance timers, then test pickups for the given (player, position)
    /// pairs. Callers pass only players still racing.
    pub fn step(&mut self, dt: f32, players: impl IntoIterator<Item = (PlayerId, Vec2)>) -> PickupEvents {
        for spawn in self.spawns.iter_mut().filter(|s| !s.active) {
            spawn.cooldown -= dt;
            if spawn.cooldown <= 0.0 {
                spawn.active = true;
                spawn.cooldown = 0.0;
                spawn.kind = BonusType::random(&mut self.rng);
            }
        }

        self.effects.retain(|_, effect| {
            effect.remaining -= dt;
            effect.remaining > 0.0
        });

        let mut events = PickupEvents::new();
        let radius_sq = PICKUP_RADIUS * PICKUP_RADIUS;
        for (player_id, position) in players {
            let Some(spawn) = self
                .spawns
                .iter_mut()
                .find(|s| s.active && s.position.distance_sq_to(position) <= radius_sq)
            else {
                continue;
            };

            spawn.active = false;
            spawn.cooldown = RESPAWN_COOLDOWN;
            self.effects.insert(
                player_id,
                ActiveEffect {
                    player_id,
                    kind: spawn.kind,
                    remaining: spawn.kind.duration(),
                },
            );
            events.push(PickupEvent {
                player_id,
                spawn_id: spawn.id,
                kind: spawn.kind,
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const DT: f32 = 0.05;

    fn tracker_with_one_spawn() -> BonusTracker {
        BonusTracker::new(&[GridPos::new(3, 3)], 4, 7)
    }

    #[test]
    fn test_spawn_count_capped() {
        let cells: Vec<GridPos> = (0..10).map(|i| GridPos::new(i, 1)).collect();
        let tracker = BonusTracker::new(&cells, 4, 1);
        assert_eq!(tracker.spawns().len(), 4);
        assert!(tracker.spawns().iter().all(|s| s.active));

        let empty = BonusTracker::new(&[], 4, 1);
        assert!(empty.spawns().is_empty());
    }

    #[test]
    fn test_pickup_installs_effect() {
        let mut tracker = tracker_with_one_spawn();
        let player = Uuid::new_v4();
        let spawn_pos = tracker.spawns()[0].position;
        let kind = tracker.spawns()[0].kind;

        let events = tracker.step(DT, [(player, spawn_pos + Vec2::new(0.2, 0.0))]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].player_id, player);
        assert_eq!(events[0].kind, kind);
        assert!(!tracker.spawns()[0].active);

        let effect = tracker.effect(player).unwrap();
        assert_eq!(effect.kind, kind);
        assert_eq!(tracker.multipliers(player), (kind.speed_multiplier(), kind.size_multiplier()));
    }

    #[test]
    fn test_out_of_radius_no_pickup() {
        let mut tracker = tracker_with_one_spawn();
        let player = Uuid::new_v4();
        let far = tracker.spawns()[0].position + Vec2::new(PICKUP_RADIUS + 0.1, 0.0);
        assert!(tracker.step(DT, [(player, far)]).is_empty());
        assert_eq!(tracker.multipliers(player), (1.0, 1.0));
    }

    #[test]
    fn test_cooldown_then_reactivate() {
        let mut tracker = tracker_with_one_spawn();
        let player = Uuid::new_v4();
        let spawn_pos = tracker.spawns()[0].position;

        tracker.step(DT, [(player, spawn_pos)]);
        assert!(!tracker.spawns()[0].active);

        let expected_ticks = (RESPAWN_COOLDOWN / DT).round() as i32;
        let mut ticks = 0;
        while !tracker.spawns()[0].active {
            tracker.step(DT, std::iter::empty());
            ticks += 1;
            assert!(ticks <= expected_ticks + 1, "spawn never came back");
        }
        assert!((ticks - expected_ticks).abs() <= 1);
    }

    #[test]
    fn test_reactivation_rerolls_type() {
        let mut tracker = tracker_with_one_spawn();
        let player = Uuid::new_v4();
        let spawn_pos = tracker.spawns()[0].position;
        tracker.step(DT, [(player, spawn_pos)]);

        let mut expected = tracker.rng.clone();
        let rolled = BonusType::random(&mut expected);
        while !tracker.spawns()[0].active {
            tracker.step(DT, std::iter::empty());
        }
        assert_eq!(tracker.spawns()[0].kind, rolled);
        // Exactly one roll was taken from the stream
        assert_eq!(tracker.rng.gen::<u64>(), expected.gen::<u64>());
    }

    #[test]
    fn test_effect_expires() {
        let mut tracker = tracker_with_one_spawn();
        let player = Uuid::new_v4();
        let spawn_pos = tracker.spawns()[0].position;
        tracker.step(DT, [(player, spawn_pos)]);
        let duration = tracker.effect(player).unwrap().kind.duration();

        let ticks = (duration / DT).ceil() as usize + 1;
        for _ in 0..ticks {
            tracker.step(DT, std::iter::empty());
        }
        assert!(tracker.effect(player).is_none());
        assert_eq!(tracker.multipliers(player), (1.0, 1.0));
    }

    #[test]
    fn test_new_pickup_overwrites_effect() {
        let cells = [GridPos::new(1, 1), GridPos::new(5, 1)];
        let mut tracker = BonusTracker::new(&cells, 2, 3);
        let player = Uuid::new_v4();

        let first = tracker.spawns()[0].position;
        let second = tracker.spawns()[1].position;
        tracker.step(DT, [(player, first)]);
        tracker.step(1.0, std::iter::empty());
        let events = tracker.step(DT, [(player, second)]);
        assert_eq!(events.len(), 1);

        let effect = tracker.effect(player).unwrap();
        assert_eq!(effect.kind, events[0].kind);
        assert!((effect.remaining - effect.kind.duration()).abs() < 1e-6);
    }

    #[test]
    fn test_one_spawn_one_winner() {
        let mut tracker = tracker_with_one_spawn();
        let spawn_pos = tracker.spawns()[0].position;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let events = tracker.step(DT, [(a, spawn_pos), (b, spawn_pos)]);
        assert_eq!(events.len(), 1);
        assert!(tracker.effect(b).is_none());
    }

    #[test]
    fn test_remove_player_drops_effect() {
        let mut tracker = tracker_with_one_spawn();
        let player = Uuid::new_v4();
        let spawn_pos = tracker.spawns()[0].position;
        tracker.step(DT, [(player, spawn_pos)]);
        tracker.remove_player(player);
        assert!(tracker.effect(player).is_none());
    }
}
