/// Vehicle kinematics. Distances are in grid cells, times in seconds.
pub mod vehicle {
    /// Minimum scalar speed (a coasting car comes to rest here)
    pub const MIN_SPEED: f32 = 0.0;
    /// Maximum scalar speed before terrain/bonus multipliers
    pub const MAX_SPEED: f32 = 3.0;
    /// Speed gained per tick while a heading is held
    pub const ACCELERATION: f32 = 0.15;
    /// Speed lost per tick while coasting
    pub const DECELERATION: f32 = 0.1;
    /// Fraction of the heading gap the visual heading closes per tick at rest
    /// (doubles at MAX_SPEED)
    pub const VISUAL_LAG: f32 = 0.3;
    /// Largest visual heading change allowed in one tick (radians)
    pub const MAX_VISUAL_STEP: f32 = 0.35;
    /// Car body length along the heading
    pub const LENGTH: f32 = 0.6;
    /// Car body width across the heading
    pub const WIDTH: f32 = 0.35;
    /// A single tick never moves a car further than this fraction of the track extent
    pub const MAX_TRAVEL_FRACTION: f32 = 0.5;
}

/// Car-to-car collision response
pub mod collision {
    /// Coefficient of restitution along the contact normal
    pub const RESTITUTION: f32 = 0.5;
    /// Footprint shrink so cars that merely touch are not reported
    pub const FOOTPRINT_SHRINK: f32 = 0.05;
    /// Extra push-apart distance added to the penetration depth
    pub const SEPARATION_SLOP: f32 = 1e-3;
    /// Every car has the same inverse mass
    pub const INVERSE_MASS: f32 = 1.0;
}

/// Bonus spawn points and timed effects
pub mod bonus {
    /// Seconds a spawn point stays empty after a pickup
    pub const RESPAWN_COOLDOWN: f32 = 8.0;
    /// Distance from a spawn point center that counts as a pickup
    pub const PICKUP_RADIUS: f32 = 0.45;
    /// Speed boost duration (seconds)
    pub const SPEED_BOOST_DURATION: f32 = 4.0;
    /// Speed multiplier while boosted
    pub const SPEED_BOOST_MULTIPLIER: f32 = 1.5;
    /// Mass increase duration (seconds)
    pub const MASS_INCREASE_DURATION: f32 = 6.0;
    /// Footprint multiplier while heavy
    pub const MASS_SIZE_MULTIPLIER: f32 = 1.4;
}

/// Procedural track generation
pub mod track {
    pub const DEFAULT_WIDTH: usize = 15;
    pub const DEFAULT_HEIGHT: usize = 15;
    pub const DEFAULT_ROOM_COUNT: usize = 10;
    pub const DEFAULT_WATER_PROBABILITY: f32 = 0.1;
    /// Core placement attempts per requested room
    pub const PLACEMENT_ATTEMPTS_PER_ROOM: usize = 5;
    /// Randomized loop searches per start candidate; the longest loop wins
    pub const ROUTE_SEARCH_ATTEMPTS: usize = 6;
    /// A loop must visit at least this many distinct cells
    pub const MIN_LOOP_CELLS: usize = 3;
    /// Start candidates tried before settling for a degenerate route
    pub const MAX_START_CANDIDATES: usize = 16;

    // Terrain speed modifiers
    pub const ROAD_SPEED: f32 = 1.0;
    pub const WATER_SPEED: f32 = 0.55;
    pub const OFF_TRACK_SPEED: f32 = 0.25;
    /// Used when a sample falls outside the grid
    pub const NEUTRAL_SPEED: f32 = 1.0;
}

/// Checkpoint progress
pub mod checkpoint {
    /// Distance from a route cell center that counts as reaching it
    pub const RADIUS: f32 = 0.6;
    pub const DEFAULT_LAPS_TO_FINISH: u32 = 3;
}

/// Room lifecycle and tick loop
pub mod room {
    /// Default server tick rate in Hz
    pub const TICK_RATE: u32 = 20;
    /// Default countdown before the race starts (seconds)
    pub const COUNTDOWN_SECONDS: u32 = 3;
    /// Upper bound on a measured tick dt (scheduler stalls)
    pub const MAX_TICK_DT: f32 = 0.25;
    /// Gap between consecutive cars on the start grid, along the facing
    pub const START_GRID_SPACING: f32 = 0.8;
    /// Lateral lane offset from the start cell center line
    pub const START_LANE_OFFSET: f32 = 0.22;
    /// Outbound event channel capacity per room
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
    /// Seconds of play between per-room stats log lines
    pub const STATS_INTERVAL_SECS: u64 = 30;
    pub const DEFAULT_MAX_PLAYERS: usize = 6;
}

/// Tick duration in milliseconds for a tick rate
#[inline]
pub fn tick_duration_ms(tick_rate: u32) -> u64 {
    1000 / tick_rate.max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_bounds_ordering() {
        assert!(vehicle::MIN_SPEED < vehicle::MAX_SPEED);
        assert!(vehicle::ACCELERATION > 0.0);
        assert!(vehicle::DECELERATION > 0.0);
    }

    #[test]
    fn test_visual_lag_never_overshoots() {
        // Worst case factor at MAX_SPEED must stay below a full catch-up
        assert!(vehicle::VISUAL_LAG * 2.0 <= 1.0);
    }

    #[test]
    fn test_start_lanes_fit_in_a_cell() {
        let outer_edge = room::START_LANE_OFFSET + vehicle::WIDTH / 2.0;
        assert!(outer_edge < 0.5);
        assert!(room::START_LANE_OFFSET * 2.0 > vehicle::WIDTH);
        assert!(room::START_GRID_SPACING > vehicle::LENGTH);
    }

    #[test]
    fn test_restitution_in_unit_range() {
        assert!((0.0..=1.0).contains(&collision::RESTITUTION));
    }

    #[test]
    fn test_tick_duration() {
        assert_eq!(tick_duration_ms(20), 50);
        assert_eq!(tick_duration_ms(0), 1000);
    }

    #[test]
    fn test_terrain_speeds() {
        assert!(track::WATER_SPEED < track::ROAD_SPEED);
        assert!(track::OFF_TRACK_SPEED < track::WATER_SPEED);
    }
}
