//! Car-to-car collision: oriented-rectangle footprints, SAT detection and a
//! 1D impulse along the contact normal.

use crate::game::constants::collision::{FOOTPRINT_SHRINK, INVERSE_MASS, RESTITUTION, SEPARATION_SLOP};
use crate::game::constants::vehicle::{MAX_SPEED, MIN_SPEED};
use crate::game::vehicle::Car;
use crate::util::vec2::Vec2;

/// Squared length below which a velocity has no usable direction
const DIRECTION_EPSILON_SQ: f32 = 1e-10;

/// Squared center distance below which two cars count as coincident
const COINCIDENT_EPSILON_SQ: f32 = 1e-10;

/// Contact between two footprints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Unit normal pointing from the first car toward the second
    pub normal: Vec2,
    /// Penetration depth along `normal`
    pub depth: f32,
}

/// Footprint corners in world space, counter-clockwise from rear-right
pub fn footprint(car: &Car) -> [Vec2; 4] {
    let (half_length, half_width) = car.half_extents();
    let shrink = 1.0 - FOOTPRINT_SHRINK;
    let (hl, hw) = (half_length * shrink, half_width * shrink);

    [
        Vec2::new(-hl, -hw),
        Vec2::new(hl, -hw),
        Vec2::new(hl, hw),
        Vec2::new(-hl, hw),
    ]
    .map(|corner| car.position + corner.rotate(car.visual_heading))
}

fn project(corners: &[Vec2; 4], axis: Vec2) -> (f32, f32) {
    corners.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), c| {
        let d = c.dot(axis);
        (min.min(d), max.max(d))
    })
}

/// SAT over both rectangles' edge normals. `None` if some axis separates them
/// or the centers coincide (no usable contact normal).
pub fn detect(a: &Car, b: &Car) -> Option<Contact> {
    if (b.position - a.position).length_sq() <= COINCIDENT_EPSILON_SQ {
        return None;
    }

    let corners_a = footprint(a);
    let corners_b = footprint(b);

    let mut best: Option<Contact> = None;
    for corners in [&corners_a, &corners_b] {
        for i in 0..4 {
            let edge = corners[(i + 1) % 4] - corners[i];
            let axis = edge.perpendicular().normalize();
            if axis == Vec2::ZERO {
                // Degenerate edge, nothing to test
                continue;
            }

            let (min_a, max_a) = project(&corners_a, axis);
            let (min_b, max_b) = project(&corners_b, axis);
            let overlap = max_a.min(max_b) - min_a.max(min_b);
            if overlap.is_nan() || overlap <= 0.0 {
                return None;
            }
            if best.map_or(true, |c| overlap < c.depth) {
                best = Some(Contact { normal: axis, depth: overlap });
            }
        }
    }

    best.map(|contact| {
        if (b.position - a.position).dot(contact.normal) < 0.0 {
            Contact {
                normal: -contact.normal,
                ..contact
            }
        } else {
            contact
        }
    })
}

/// Resolve one pair. Returns the corrected cars, or `None` when they do not
/// touch. Neither input is modified.
pub fn resolve_pair(a: &Car, b: &Car) -> Option<(Car, Car)> {
    let contact = detect(a, b)?;
    let n = contact.normal;

    let push = n * ((contact.depth + SEPARATION_SLOP) * 0.5);
    let mut next_a = Car {
        position: a.position - push,
        ..*a
    };
    let mut next_b = Car {
        position: b.position + push,
        ..*b
    };

    let v1 = a.velocity();
    let v2 = b.velocity();
    let vn = (v2 - v1).dot(n);
    if vn > 0.0 {
        // Already separating
        return Some((next_a, next_b));
    }

    let j = -(1.0 + RESTITUTION) * vn / (INVERSE_MASS + INVERSE_MASS);
    apply_velocity(&mut next_a, v1 - n * (j * INVERSE_MASS));
    apply_velocity(&mut next_b, v2 + n * (j * INVERSE_MASS));

    Some((next_a, next_b))
}

/// Re-derive speed and heading from a velocity vector
fn apply_velocity(car: &mut Car, velocity: Vec2) {
    car.speed = velocity.length().clamp(MIN_SPEED, MAX_SPEED);
    if velocity.length_sq() > DIRECTION_EPSILON_SQ {
        let direction = velocity.angle();
        car.heading = direction;
        car.visual_heading = direction;
    }
}

/// Resolve every unordered pair once, writing each result back before the
/// next pair is tested. `skip` marks cars that take no part (finished).
/// Returns the number of contacts.
pub fn resolve_all(cars: &mut [Car], skip: impl Fn(&Car) -> bool) -> usize {
    let mut contacts = 0;
    for i in 0..cars.len() {
        if skip(&cars[i]) {
            continue;
        }
        for j in (i + 1)..cars.len() {
            if skip(&cars[j]) {
                continue;
            }
            if let Some((a, b)) = resolve_pair(&cars[i], &cars[j]) {
                cars[i] = a;
                cars[j] = b;
                contacts += 1;
            }
        }
    }
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::vehicle::LENGTH;
    use uuid::Uuid;

    const EPSILON: f32 = 1e-4;

    fn car_at(x: f32, y: f32, heading: f32, speed: f32) -> Car {
        let mut car = Car::new(Uuid::new_v4(), Vec2::new(x, y), heading);
        car.speed = speed;
        car
    }

    /// Footprint length along x after the shrink factor
    fn body_length() -> f32 {
        LENGTH * (1.0 - FOOTPRINT_SHRINK)
    }

    #[test]
    fn test_footprint_axis_aligned() {
        let car = car_at(5.0, 5.0, 0.0, 0.0);
        let corners = footprint(&car);
        let xs: Vec<f32> = corners.iter().map(|c| c.x).collect();
        let max_x = xs.iter().cloned().fold(f32::MIN, f32::max);
        assert!((max_x - (5.0 + body_length() / 2.0)).abs() < EPSILON);
    }

    #[test]
    fn test_apart_cars_untouched() {
        let a = car_at(2.0, 2.0, 0.0, 1.0);
        let b = car_at(5.0, 2.0, 0.0, 2.0);
        assert!(detect(&a, &b).is_none());
        assert!(resolve_pair(&a, &b).is_none());

        let mut cars = vec![a, b];
        assert_eq!(resolve_all(&mut cars, |_| false), 0);
        assert_eq!(cars[0], a);
        assert_eq!(cars[1], b);
    }

    #[test]
    fn test_rear_end_overlap() {
        // Same heading, 0.1 overlap along x; the rear car is faster
        let gap = body_length() - 0.1;
        let a = car_at(5.0, 5.0, 0.0, 2.0);
        let b = car_at(5.0 + gap, 5.0, 0.0, 1.0);

        let contact = detect(&a, &b).unwrap();
        assert!((contact.depth - 0.1).abs() < EPSILON);
        assert!(contact.normal.approx_eq(Vec2::RIGHT, EPSILON));

        let (na, nb) = resolve_pair(&a, &b).unwrap();
        assert!(detect(&na, &nb).is_none(), "penetration not resolved");

        let n = contact.normal;
        let vn_before = (b.velocity() - a.velocity()).dot(n);
        let vn_after = (nb.velocity() - na.velocity()).dot(n);
        assert!((vn_after + RESTITUTION * vn_before).abs() < EPSILON);

        // Equal masses: momentum along the normal is conserved
        let p_before = (a.velocity() + b.velocity()).dot(n);
        let p_after = (na.velocity() + nb.velocity()).dot(n);
        assert!((p_before - p_after).abs() < EPSILON);
    }

    #[test]
    fn test_separating_pair_only_pushed_apart() {
        let gap = body_length() - 0.1;
        let a = car_at(5.0, 5.0, 0.0, 0.5);
        let b = car_at(5.0 + gap, 5.0, 0.0, 2.0);

        let (na, nb) = resolve_pair(&a, &b).unwrap();
        assert_eq!(na.speed, a.speed);
        assert_eq!(nb.speed, b.speed);
        assert!(na.position.x < a.position.x);
        assert!(nb.position.x > b.position.x);
    }

    #[test]
    fn test_order_gives_mirror_result() {
        let gap = body_length() - 0.1;
        let a = car_at(5.0, 5.0, 0.0, 2.0);
        let b = car_at(5.0 + gap, 5.02, 0.1, 1.0);

        let (ab_a, ab_b) = resolve_pair(&a, &b).unwrap();
        let (ba_b, ba_a) = resolve_pair(&b, &a).unwrap();
        assert!(ab_a.position.approx_eq(ba_a.position, EPSILON));
        assert!(ab_b.position.approx_eq(ba_b.position, EPSILON));
        assert!((ab_a.speed - ba_a.speed).abs() < EPSILON);
        assert!((ab_b.speed - ba_b.speed).abs() < EPSILON);
    }

    #[test]
    fn test_head_on_bounce() {
        let gap = body_length() - 0.05;
        let a = car_at(5.0, 5.0, 0.0, 2.0);
        let b = car_at(5.0 + gap, 5.0, std::f32::consts::PI, 2.0);

        let (na, nb) = resolve_pair(&a, &b).unwrap();
        // Both reverse with half the closing speed
        assert!((na.speed - 2.0 * RESTITUTION).abs() < EPSILON);
        assert!((nb.speed - 2.0 * RESTITUTION).abs() < EPSILON);
        assert!(na.velocity().x < 0.0);
        assert!(nb.velocity().x > 0.0);
        assert_eq!(na.heading, na.visual_heading);
    }

    #[test]
    fn test_coincident_cars_are_not_a_collision() {
        let a = car_at(5.0, 5.0, 0.0, 1.0);
        let b = car_at(5.0, 5.0, 0.0, 2.0);
        assert!(detect(&a, &b).is_none());
        assert!(resolve_pair(&a, &b).is_none());

        let mut cars = vec![a, b];
        assert_eq!(resolve_all(&mut cars, |_| false), 0);
        assert_eq!(cars[0].position, a.position);
        assert_eq!(cars[1].position, b.position);
    }

    #[test]
    fn test_resolve_all_skips_finished() {
        let gap = body_length() - 0.1;
        let a = car_at(5.0, 5.0, 0.0, 2.0);
        let b = car_at(5.0 + gap, 5.0, 0.0, 1.0);
        let finished = b.player_id;

        let mut cars = vec![a, b];
        assert_eq!(resolve_all(&mut cars, |c| c.player_id == finished), 0);
        assert_eq!(cars[0], a);
    }
}
