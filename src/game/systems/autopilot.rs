//! Route-following driver for bot players

use crate::game::constants::checkpoint::RADIUS;
use crate::game::track::GridPos;
use crate::game::vehicle::Car;

/// Heading toward the next checkpoint. When the car is already inside the
/// next checkpoint's radius it aims one further so it does not circle it.
/// `None` (coast) on a route with nothing to follow.
pub fn steer(car: &Car, route: &[GridPos], next_index: usize) -> Option<f32> {
    if route.len() < 2 {
        return None;
    }

    let index = next_index % route.len();
    let mut target = route[index].center();
    if target.distance_sq_to(car.position) <= RADIUS * RADIUS {
        target = route[(index + 1) % route.len()].center();
    }

    let to_target = target - car.position;
    if to_target.length_sq() <= f32::EPSILON {
        return Some(car.heading);
    }
    Some(to_target.angle())
}
