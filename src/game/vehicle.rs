//! Kinematic car model.
//!
//! `Car::update` is pure: it reads the old state and returns a new one, so a
//! tick can be replayed in tests with nothing but `dt`.

use serde::{Deserialize, Serialize};

use crate::game::constants::track::NEUTRAL_SPEED;
use crate::game::constants::vehicle::{
    ACCELERATION, DECELERATION, LENGTH, MAX_SPEED, MAX_TRAVEL_FRACTION, MAX_VISUAL_STEP, MIN_SPEED,
    VISUAL_LAG, WIDTH,
};
use crate::game::state::PlayerId;
use crate::util::vec2::{shortest_arc, wrap_angle, Vec2};

/// Vehicle state owned by a player for the duration of a match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub player_id: PlayerId,
    pub position: Vec2,
    /// Last requested heading (radians)
    pub heading: f32,
    /// Lag-filtered heading used for motion and rendering
    pub visual_heading: f32,
    /// Scalar speed in cells per second, always in [MIN_SPEED, MAX_SPEED]
    pub speed: f32,
    /// Terrain multiplier applied on the last update
    pub terrain_speed_modifier: f32,
    /// Multiplier from an active speed bonus
    pub bonus_speed_multiplier: f32,
    /// Footprint multiplier from an active mass bonus
    pub size_modifier: f32,
}

impl Car {
    pub fn new(player_id: PlayerId, position: Vec2, heading: f32) -> Self {
        let heading = wrap_angle(heading);
        Self {
            player_id,
            position,
            heading,
            visual_heading: heading,
            speed: MIN_SPEED,
            terrain_speed_modifier: NEUTRAL_SPEED,
            bonus_speed_multiplier: 1.0,
            size_modifier: 1.0,
        }
    }

    /// Velocity vector along the visual heading
    #[inline]
    pub fn velocity(&self) -> Vec2 {
        Vec2::from_angle(self.visual_heading) * self.speed
    }

    /// Half extents of the footprint (half-length, half-width) with the size bonus
    #[inline]
    pub fn half_extents(&self) -> (f32, f32) {
        (
            LENGTH * 0.5 * self.size_modifier,
            WIDTH * 0.5 * self.size_modifier,
        )
    }

    /// Same car with the given bonus multipliers
    pub fn with_bonus(&self, speed_multiplier: f32, size_modifier: f32) -> Car {
        Car {
            bonus_speed_multiplier: speed_multiplier,
            size_modifier,
            ..*self
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.heading.is_finite()
            && self.visual_heading.is_finite()
            && self.speed.is_finite()
    }

    /// Advance one tick.
    ///
    /// A heading snaps `heading` and accelerates; `None` coasts. The visual
    /// heading then chases `heading` by a bounded step and the car moves
    /// along the visual heading. `extent` is the track size in cells; a
    /// single tick never moves further than half of it and the car is kept
    /// inside it.
    pub fn update(&self, dt: f32, input_heading: Option<f32>, terrain_speed_modifier: f32, extent: Vec2) -> Car {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let terrain = if terrain_speed_modifier.is_finite() {
            terrain_speed_modifier.max(0.0)
        } else {
            NEUTRAL_SPEED
        };

        let (heading, speed) = match input_heading.filter(|h| h.is_finite()) {
            Some(h) => (wrap_angle(h), self.speed + ACCELERATION),
            None => (self.heading, self.speed - DECELERATION),
        };
        let speed = speed.clamp(MIN_SPEED, MAX_SPEED);

        let lag = (VISUAL_LAG * (1.0 + speed / MAX_SPEED)).clamp(0.0, 1.0);
        let step = (shortest_arc(self.visual_heading, heading) * lag).clamp(-MAX_VISUAL_STEP, MAX_VISUAL_STEP);
        let visual_heading = wrap_angle(self.visual_heading + step);

        let max_travel = extent.x.max(extent.y) * MAX_TRAVEL_FRACTION;
        let travel = (speed * dt * terrain * self.bonus_speed_multiplier).min(max_travel);
        let position = self.position + Vec2::from_angle(visual_heading) * travel;

        Car {
            position: clamp_to_track(position, extent),
            heading,
            visual_heading,
            speed,
            terrain_speed_modifier: terrain,
            ..*self
        }
    }
}

/// Keep the car center at least half a body width inside the track bounds
fn clamp_to_track(position: Vec2, extent: Vec2) -> Vec2 {
    let margin = WIDTH * 0.5;
    if extent.x <= margin * 2.0 || extent.y <= margin * 2.0 {
        return position;
    }
    position.clamp(Vec2::new(margin, margin), extent - Vec2::new(margin, margin))
}
