//! Synchronous tick pipeline for one race
//!
//! Phase order inside a tick is fixed: bonuses, input, collisions, timers
//! and checkpoints, snapshot. The room task owns the `GameLoop` and is the
//! only caller, so nothing in here needs locking.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::game::constants::room::MAX_TICK_DT;
use crate::game::state::{Player, PlayerId, RaceState};
use crate::game::systems::bonus::PickupEvent;
use crate::game::systems::checkpoint::CheckpointOutcome;
use crate::game::systems::collision;
use crate::game::vehicle::Car;
use crate::net::protocol::{InputEvent, RaceSnapshot};
use crate::util::vec2::Vec2;

/// Something worth broadcasting that happened during a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GameLoopEvent {
    BonusPickedUp(PickupEvent),
    LapCompleted { player_id: PlayerId, laps: u32 },
    PlayerFinished { player_id: PlayerId, elapsed: f32 },
}

pub type TickEvents = SmallVec<[GameLoopEvent; 4]>;

/// Result of one tick
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub snapshot: RaceSnapshot,
    pub events: TickEvents,
    /// Car pairs that touched this tick
    pub contacts: usize,
    /// Cars whose state had to be rolled back
    pub sanitized: usize,
    /// Every player has finished
    pub race_over: bool,
}

pub struct GameLoop {
    state: RaceState,
}

impl GameLoop {
    pub fn new(state: RaceState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &RaceState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RaceState {
        &mut self.state
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot::from_state(&self.state)
    }

    pub fn is_race_over(&self) -> bool {
        self.state.all_finished()
    }

    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<Player> {
        self.state.remove_player(player_id)
    }

    /// Finish a player from outside (external finish policy, client report)
    pub fn mark_finished(&mut self, player_id: PlayerId) -> Option<GameLoopEvent> {
        let player = self.state.get_player_mut(player_id)?;
        if player.finished {
            return None;
        }
        player.finished = true;
        info!(%player_id, elapsed = player.elapsed, "Player finished");
        Some(GameLoopEvent::PlayerFinished {
            player_id,
            elapsed: player.elapsed,
        })
    }

    /// Fill in an input for every racing bot from the autopilot
    #[cfg(feature = "bots")]
    pub fn fill_bot_inputs(&self, inputs: &mut HashMap<PlayerId, InputEvent>) {
        use crate::game::systems::autopilot;

        let route = self.state.checkpoints.route();
        for player in self.state.players.iter().filter(|p| p.is_bot && p.is_racing()) {
            let Some(car) = player.car else { continue };
            let next = self.state.checkpoints.progress(player.id).unwrap_or(0);
            inputs.insert(
                player.id,
                InputEvent {
                    player_id: player.id,
                    heading: autopilot::steer(&car, route, next),
                    reported_elapsed: None,
                },
            );
        }
    }

    /// Advance the race by `dt` seconds using the latest input per player.
    /// Inputs for players not in the race are ignored.
    pub fn tick(&mut self, dt: f32, inputs: &HashMap<PlayerId, InputEvent>) -> TickOutput {
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_TICK_DT) } else { 0.0 };
        let mut events = TickEvents::new();

        self.step_bonuses(dt, &mut events);
        let mut sanitized = self.apply_inputs(dt, inputs);
        let (contacts, rolled_back) = self.resolve_collisions();
        sanitized += rolled_back;
        self.advance_timers(dt, &mut events);

        self.state.tick += 1;

        TickOutput {
            snapshot: self.snapshot(),
            events,
            contacts,
            sanitized,
            race_over: self.state.all_finished(),
        }
    }

    fn step_bonuses(&mut self, dt: f32, events: &mut TickEvents) {
        let racing: SmallVec<[(PlayerId, Vec2); 8]> = self
            .state
            .players
            .iter()
            .filter(|p| !p.finished)
            .filter_map(|p| p.car.map(|car| (p.id, car.position)))
            .collect();

        for pickup in self.state.bonuses.step(dt, racing) {
            debug!(player_id = %pickup.player_id, spawn = pickup.spawn_id, kind = ?pickup.kind, "Bonus picked up");
            events.push(GameLoopEvent::BonusPickedUp(pickup));
        }
    }

    fn apply_inputs(&mut self, dt: f32, inputs: &HashMap<PlayerId, InputEvent>) -> usize {
        let state = &mut self.state;
        let grid = &state.track.grid;
        let extent = grid.extent();
        let start = state.track.start_cell.center();
        let start_angle = state.track.start_angle;
        let mut sanitized = 0;

        for player in state.players.iter_mut().filter(|p| !p.finished) {
            // No car yet: nothing to drive this tick
            let Some(car) = player.car else { continue };

            let input = inputs.get(&player.id);
            if let Some(reported) = input.and_then(|i| i.reported_elapsed) {
                player.reported_elapsed = Some(reported);
            }

            let terrain = grid.speed_modifier_or_neutral(car.position);
            let (speed_multiplier, size_modifier) = state.bonuses.multipliers(player.id);
            let before = car.with_bonus(speed_multiplier, size_modifier);
            let after = before.update(dt, input.and_then(|i| i.heading), terrain, extent);

            player.car = Some(if after.is_finite() {
                after
            } else {
                sanitized += 1;
                warn!(player_id = %player.id, ?before, "Non-finite car state, rolling back");
                if before.is_finite() {
                    before
                } else {
                    Car::new(player.id, start, start_angle).with_bonus(speed_multiplier, size_modifier)
                }
            });
        }
        sanitized
    }

    fn resolve_collisions(&mut self) -> (usize, usize) {
        let finished: SmallVec<[PlayerId; 8]> = self
            .state
            .players
            .iter()
            .filter(|p| p.finished)
            .map(|p| p.id)
            .collect();
        let mut cars: SmallVec<[Car; 8]> = self.state.players.iter().filter_map(|p| p.car).collect();

        let contacts = collision::resolve_all(&mut cars, |car| finished.contains(&car.player_id));
        if contacts == 0 {
            return (0, 0);
        }

        let mut rolled_back = 0;
        for car in cars {
            let Some(player) = self.state.get_player_mut(car.player_id) else {
                continue;
            };
            if car.is_finite() {
                player.car = Some(car);
            } else {
                rolled_back += 1;
                warn!(player_id = %car.player_id, "Non-finite collision result, keeping pre-collision state");
            }
        }
        (contacts, rolled_back)
    }

    fn advance_timers(&mut self, dt: f32, events: &mut TickEvents) {
        let state = &mut self.state;
        state.race_time += dt;

        for player in state.players.iter_mut().filter(|p| p.is_racing()) {
            player.elapsed += dt;
            let Some(car) = player.car else { continue };

            let CheckpointOutcome::LapCompleted { laps } = state.checkpoints.on_reach(player.id, car.position) else {
                continue;
            };
            info!(player_id = %player.id, laps, elapsed = player.elapsed, "Lap completed");
            events.push(GameLoopEvent::LapCompleted {
                player_id: player.id,
                laps,
            });

            if state.finish_policy.is_finished(laps) {
                player.finished = true;
                info!(player_id = %player.id, elapsed = player.elapsed, "Player finished");
                events.push(GameLoopEvent::PlayerFinished {
                    player_id: player.id,
                    elapsed: player.elapsed,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::vehicle::{ACCELERATION, MIN_SPEED};
    use crate::game::state::Entrant;
    use crate::game::systems::checkpoint::FinishPolicy;
    use crate::game::track::{generate, TrackParams};
    use uuid::Uuid;

    const DT: f32 = 0.05;

    fn entrants(count: usize) -> Vec<Entrant> {
        (0..count)
            .map(|i| Entrant {
                id: Uuid::new_v4(),
                name: format!("Driver{i}"),
                is_bot: false,
            })
            .collect()
    }

    fn game(count: usize, policy: FinishPolicy) -> GameLoop {
        let track = generate(&TrackParams::default(), Some(17));
        GameLoop::new(RaceState::new(Uuid::new_v4(), track, &entrants(count), policy, 0))
    }

    fn no_input() -> HashMap<PlayerId, InputEvent> {
        HashMap::new()
    }

    fn steer(player_id: PlayerId, heading: f32) -> HashMap<PlayerId, InputEvent> {
        let mut inputs = HashMap::new();
        inputs.insert(
            player_id,
            InputEvent {
                player_id,
                heading: Some(heading),
                reported_elapsed: None,
            },
        );
        inputs
    }

    #[test]
    fn test_idle_player_two_seconds() {
        let mut game = game(1, FinishPolicy::Laps(3));
        let id = game.state().players[0].id;

        for _ in 0..40 {
            game.tick(DT, &no_input());
        }

        let player = game.state().get_player(id).unwrap();
        assert_eq!(player.car.unwrap().speed, MIN_SPEED);
        assert!((player.elapsed - 2.0).abs() <= DT);
        assert_eq!(game.state().tick, 40);
    }

    #[test]
    fn test_input_accelerates() {
        let mut game = game(1, FinishPolicy::Laps(3));
        let id = game.state().players[0].id;
        let heading = game.state().track.start_angle;

        let output = game.tick(DT, &steer(id, heading));
        let speed = game.state().get_player(id).unwrap().car.unwrap().speed;
        assert!((speed - ACCELERATION).abs() < 1e-5);
        assert_eq!(output.snapshot.players.len(), 1);
        assert!((output.snapshot.players[0].speed - ACCELERATION).abs() < 1e-5);
    }

    #[test]
    fn test_unknown_player_input_ignored() {
        let mut game = game(1, FinishPolicy::Laps(3));
        let id = game.state().players[0].id;
        let output = game.tick(DT, &steer(Uuid::new_v4(), 0.0));
        assert_eq!(game.state().get_player(id).unwrap().car.unwrap().speed, MIN_SPEED);
        assert!(output.events.is_empty());
    }

    #[test]
    fn test_empty_race_is_noop() {
        let mut game = game(0, FinishPolicy::Laps(3));
        let output = game.tick(DT, &no_input());
        assert!(output.snapshot.players.is_empty());
        assert!(output.events.is_empty());
        assert!(!output.race_over);
    }

    #[test]
    fn test_reported_elapsed_recorded() {
        let mut game = game(1, FinishPolicy::External);
        let id = game.state().players[0].id;
        let mut inputs = steer(id, 0.0);
        inputs.get_mut(&id).unwrap().reported_elapsed = Some(4.5);
        game.tick(DT, &inputs);
        assert_eq!(game.state().get_player(id).unwrap().reported_elapsed, Some(4.5));
    }

    /// Teleport the only car along the route, one checkpoint per tick
    fn drive_route(game: &mut GameLoop, id: PlayerId) -> TickEvents {
        let route = game.state().track.route.clone();
        let mut events = TickEvents::new();
        for cell in route {
            if let Some(car) = game.state_mut().get_player_mut(id).and_then(|p| p.car.as_mut()) {
                car.position = cell.center();
                car.speed = 0.0;
            }
            events.extend(game.tick(0.01, &no_input()).events);
        }
        events
    }

    #[test]
    fn test_lap_then_finish() {
        let mut game = game(1, FinishPolicy::Laps(1));
        assert!(game.state().track.has_loop());
        let id = game.state().players[0].id;

        let events = drive_route(&mut game, id);
        assert!(events.contains(&GameLoopEvent::LapCompleted { player_id: id, laps: 1 }));
        assert!(events
            .iter()
            .any(|e| matches!(e, GameLoopEvent::PlayerFinished { player_id, .. } if *player_id == id)));
        assert!(game.is_race_over());

        // Finished players are frozen
        let elapsed = game.state().get_player(id).unwrap().elapsed;
        let output = game.tick(DT, &steer(id, 0.0));
        assert_eq!(game.state().get_player(id).unwrap().elapsed, elapsed);
        assert!(output.race_over);
    }

    #[test]
    fn test_external_policy_never_auto_finishes() {
        let mut game = game(1, FinishPolicy::External);
        let id = game.state().players[0].id;
        drive_route(&mut game, id);
        assert!(!game.state().get_player(id).unwrap().finished);

        assert!(matches!(game.mark_finished(id), Some(GameLoopEvent::PlayerFinished { .. })));
        assert!(game.mark_finished(id).is_none());
        assert!(game.is_race_over());
    }

    #[test]
    fn test_overlapping_cars_pushed_apart() {
        let mut game = game(2, FinishPolicy::Laps(3));
        let (a, b) = (game.state().players[0].id, game.state().players[1].id);
        let spot = game.state().track.start_cell.center();
        for id in [a, b] {
            let car = game.state_mut().get_player_mut(id).unwrap().car.as_mut().unwrap();
            car.position = spot;
            car.visual_heading = 0.0;
            car.heading = 0.0;
        }
        // Nudge so the contact normal is well defined
        game.state_mut().get_player_mut(b).unwrap().car.as_mut().unwrap().position += Vec2::new(0.4, 0.0);

        let output = game.tick(DT, &no_input());
        assert_eq!(output.contacts, 1);
        let pa = game.state().get_player(a).unwrap().car.unwrap().position;
        let pb = game.state().get_player(b).unwrap().car.unwrap().position;
        assert!(pb.x - pa.x > 0.5);
    }

    #[test]
    fn test_finished_car_takes_no_part_in_collisions() {
        let mut game = game(2, FinishPolicy::External);
        let (a, b) = (game.state().players[0].id, game.state().players[1].id);
        let spot = game.state().track.start_cell.center();
        for id in [a, b] {
            game.state_mut().get_player_mut(id).unwrap().car.as_mut().unwrap().position = spot;
        }
        // Overlapping but not coincident, so only the finish keeps them apart
        game.state_mut().get_player_mut(b).unwrap().car.as_mut().unwrap().position += Vec2::new(0.3, 0.0);
        game.mark_finished(b);
        let output = game.tick(DT, &no_input());
        assert_eq!(output.contacts, 0);
    }

    #[test]
    fn test_non_finite_car_is_recovered() {
        let mut game = game(1, FinishPolicy::Laps(3));
        let id = game.state().players[0].id;
        game.state_mut().get_player_mut(id).unwrap().car.as_mut().unwrap().position = Vec2::new(f32::NAN, 1.0);

        let output = game.tick(DT, &no_input());
        assert_eq!(output.sanitized, 1);
        let car = game.state().get_player(id).unwrap().car.unwrap();
        assert!(car.is_finite());
        assert!(car.position.approx_eq(game.state().track.start_cell.center(), 1e-5));
    }

    #[cfg(feature = "bots")]
    #[test]
    fn test_bots_get_inputs() {
        let track = generate(&TrackParams::default(), Some(17));
        let mut roster = entrants(2);
        roster[1].is_bot = true;
        let game = GameLoop::new(RaceState::new(Uuid::new_v4(), track, &roster, FinishPolicy::Laps(1), 0));

        let mut inputs = HashMap::new();
        game.fill_bot_inputs(&mut inputs);
        assert_eq!(inputs.len(), 1);
        assert!(inputs[&roster[1].id].heading.is_some());
    }

    #[cfg(feature = "bots")]
    #[test]
    fn test_bot_race_finishes() {
        let track = generate(&TrackParams::default(), Some(4));
        let mut roster = entrants(2);
        for entrant in &mut roster {
            entrant.is_bot = true;
        }
        let mut game = GameLoop::new(RaceState::new(Uuid::new_v4(), track, &roster, FinishPolicy::Laps(1), 2));

        for _ in 0..20_000 {
            let mut inputs = HashMap::new();
            game.fill_bot_inputs(&mut inputs);
            if game.tick(DT, &inputs).race_over {
                break;
            }
        }
        assert!(game.is_race_over());
    }
}
