//! Procedural track generation.
//!
//! Builds a grid maze from a handful of core cells joined into one ring of
//! corridors, prunes spurs, floods some cells with water, then picks a start
//! cell and a closed checkpoint route through it. Generation never fails:
//! every degenerate case falls back to something playable.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

use super::grid::{Grid, GridPos, Terrain};
use super::route;
use crate::game::constants::room::{START_GRID_SPACING, START_LANE_OFFSET};
use crate::game::constants::track::{
    DEFAULT_HEIGHT, DEFAULT_ROOM_COUNT, DEFAULT_WATER_PROBABILITY, DEFAULT_WIDTH, MAX_START_CANDIDATES,
    MIN_LOOP_CELLS, PLACEMENT_ATTEMPTS_PER_ROOM, ROUTE_SEARCH_ATTEMPTS,
};
use crate::util::vec2::Vec2;

/// Smallest grid that still fits a ring of cores
const MIN_DIMENSION: usize = 5;

/// Track generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackParams {
    pub width: usize,
    pub height: usize,
    pub room_count: usize,
    pub water_probability: f32,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            room_count: DEFAULT_ROOM_COUNT,
            water_probability: DEFAULT_WATER_PROBABILITY,
        }
    }
}

/// A generated track. Read-only once the race starts.
#[derive(Debug, Clone)]
pub struct Track {
    pub grid: Grid,
    pub start_cell: GridPos,
    /// Initial facing in radians (one of the four cardinal directions)
    pub start_angle: f32,
    /// Closed checkpoint route `[start, .., start]`, or `[start]` when degenerate
    pub route: Vec<GridPos>,
    /// Reachable passable cells that are not on the route
    pub bonus_candidates: Vec<GridPos>,
    /// Seed the track was generated from
    pub seed: u64,
    /// Core cells left after pruning, start included
    pub core_count: usize,
}

impl TrackParams {
    /// Most cores a grid of this size can hold; larger room counts are capped
    pub fn max_rooms(&self) -> usize {
        let (slots_x, slots_y) = core_slots(self.width.max(MIN_DIMENSION), self.height.max(MIN_DIMENSION));
        slots_x.saturating_mul(slots_y)
    }
}

impl Track {
    /// A route shorter than 2 cannot produce laps
    pub fn has_loop(&self) -> bool {
        self.route.len() >= 2
    }

    /// Start grid slots for `count` cars, two lanes abreast, rows stepping
    /// back against the start facing.
    pub fn start_slots(&self, count: usize) -> Vec<Vec2> {
        let facing = Vec2::from_angle(self.start_angle);
        let lateral = facing.perpendicular();
        let origin = self.start_cell.center();

        (0..count)
            .map(|i| {
                let row = (i / 2) as f32;
                let lane = if i % 2 == 0 { 1.0 } else { -1.0 };
                origin - facing * (row * START_GRID_SPACING) + lateral * (lane * START_LANE_OFFSET)
            })
            .collect()
    }
}

/// Generate a track. With a seed the output is fully deterministic.
pub fn generate(params: &TrackParams, seed: Option<u64>) -> Track {
    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let width = params.width.max(MIN_DIMENSION);
    let height = params.height.max(MIN_DIMENSION);
    let mut grid = Grid::new(width, height);

    let cores = place_cores(&mut grid, params.room_count, &mut rng);
    connect_cores(&mut grid, &cores);
    let pruned = prune_dead_ends(&mut grid);
    flood(&mut grid, params.water_probability, &mut rng);
    grid.recompute_shapes();

    let (start_cell, route) = choose_start(&mut grid, &mut rng);
    grid.set_terrain(start_cell, Terrain::Start);
    grid.recompute_shapes();

    let start_angle = initial_facing(&grid, start_cell, &route);
    let bonus_candidates = bonus_candidates(&grid, start_cell, &route);
    let core_count = grid
        .passable_positions()
        .filter(|p| grid.terrain(*p).is_core())
        .count();

    tracing::debug!(
        seed,
        width,
        height,
        placed_cores = cores.len(),
        pruned,
        route_len = route.len(),
        bonus_candidates = bonus_candidates.len(),
        "Track generated"
    );

    Track {
        grid,
        start_cell,
        start_angle,
        route,
        bonus_candidates,
        seed,
        core_count,
    }
}

/// Number of odd-coordinate core slots on a grid of this size
fn core_slots(width: usize, height: usize) -> (usize, usize) {
    (
        width.saturating_sub(2) / 2 + 1,
        height.saturating_sub(2) / 2 + 1,
    )
}

/// Rejection-sample core cells on odd coordinates
fn place_cores(grid: &mut Grid, room_count: usize, rng: &mut StdRng) -> Vec<GridPos> {
    let (slots_x, slots_y) = core_slots(grid.width(), grid.height());
    let target = room_count.min(slots_x.saturating_mul(slots_y));
    let attempts = target.saturating_mul(PLACEMENT_ATTEMPTS_PER_ROOM);

    let mut cores = Vec::with_capacity(target);
    for _ in 0..attempts {
        if cores.len() >= target {
            break;
        }
        let pos = GridPos::new(
            (rng.gen_range(0..slots_x) * 2 + 1) as i32,
            (rng.gen_range(0..slots_y) * 2 + 1) as i32,
        );
        // Keep a border of empty cells
        if pos.x as usize >= grid.width() - 1 || pos.y as usize >= grid.height() - 1 {
            continue;
        }
        if grid.terrain(pos) == Terrain::Empty {
            grid.set_terrain(pos, Terrain::RoadCore);
            cores.push(pos);
        }
    }
    cores
}

/// Sort cores by angle around the grid center and carve a corridor ring
fn connect_cores(grid: &mut Grid, cores: &[GridPos]) {
    if cores.len() < 2 {
        return;
    }

    let cx = grid.width() as f32 / 2.0;
    let cy = grid.height() as f32 / 2.0;
    let mut ring = cores.to_vec();
    ring.sort_by(|a, b| {
        let angle_a = (a.y as f32 - cy).atan2(a.x as f32 - cx);
        let angle_b = (b.y as f32 - cy).atan2(b.x as f32 - cx);
        angle_a
            .partial_cmp(&angle_b)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for i in 0..ring.len() {
        carve(grid, ring[i], ring[(i + 1) % ring.len()]);
    }
}

/// Manhattan corridor: horizontal leg first, then vertical. Only empty
/// cells become corridor; cores on the way keep their family.
fn carve(grid: &mut Grid, from: GridPos, to: GridPos) {
    let mut cursor = from;
    while cursor.x != to.x {
        cursor.x += (to.x - cursor.x).signum();
        mark_corridor(grid, cursor);
    }
    while cursor.y != to.y {
        cursor.y += (to.y - cursor.y).signum();
        mark_corridor(grid, cursor);
    }
}

fn mark_corridor(grid: &mut Grid, pos: GridPos) {
    if grid.terrain(pos) == Terrain::Empty {
        grid.set_terrain(pos, Terrain::RoadCorridor);
    }
}

/// Remove passable cells with at most one passable neighbor until none remain
fn prune_dead_ends(grid: &mut Grid) -> usize {
    let mut removed = 0;
    loop {
        let spurs: Vec<GridPos> = grid
            .passable_positions()
            .filter(|p| grid.passable_neighbor_count(*p) <= 1)
            .collect();
        if spurs.is_empty() {
            return removed;
        }
        for pos in &spurs {
            grid.set_terrain(*pos, Terrain::Empty);
        }
        removed += spurs.len();
    }
}

fn flood(grid: &mut Grid, probability: f32, rng: &mut StdRng) {
    let probability = if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cells: Vec<GridPos> = grid.passable_positions().collect();
    for pos in cells {
        if rng.gen::<f32>() < probability {
            let flooded = grid.terrain(pos).flooded();
            grid.set_terrain(pos, flooded);
        }
    }
}

/// Pick the start cell and its checkpoint route.
///
/// Candidates are straight road cores, then straight road corridors, then
/// straight water cells, each group shuffled. The first candidate that lies
/// on a loop wins; if none does, the first candidate is used with a
/// degenerate route, and with no candidates at all the grid center is used.
fn choose_start(grid: &mut Grid, rng: &mut StdRng) -> (GridPos, Vec<GridPos>) {
    let view: &Grid = grid;
    let straight = |p: &GridPos, accept: fn(Terrain) -> bool| {
        view.cell(*p)
            .is_some_and(|c| accept(c.terrain) && c.shape.is_straight())
    };

    let mut groups: [Vec<GridPos>; 3] = [
        view.passable_positions()
            .filter(|p| straight(p, |t: Terrain| t == Terrain::RoadCore))
            .collect(),
        view.passable_positions()
            .filter(|p| straight(p, |t: Terrain| t == Terrain::RoadCorridor))
            .collect(),
        view.passable_positions()
            .filter(|p| straight(p, |t: Terrain| t.is_water()))
            .collect(),
    ];
    for group in &mut groups {
        group.shuffle(rng);
    }

    let candidates: Vec<GridPos> = groups
        .into_iter()
        .flatten()
        .take(MAX_START_CANDIDATES)
        .collect();

    for &candidate in &candidates {
        let route = route::find_loop(grid, candidate, ROUTE_SEARCH_ATTEMPTS, rng);
        if route.len() > MIN_LOOP_CELLS {
            return (candidate, route);
        }
    }

    if let Some(&first) = candidates.first() {
        tracing::debug!(?first, "No loop through any start candidate, using degenerate route");
        return (first, vec![first]);
    }

    let center = GridPos::new((grid.width() / 2) as i32, (grid.height() / 2) as i32);
    tracing::debug!(?center, "No straight cells, starting at grid center");
    // Marking the center may make it passable, so the search has to see it first
    grid.set_terrain(center, Terrain::Start);
    grid.recompute_shapes();
    let route = route::find_loop(grid, center, ROUTE_SEARCH_ATTEMPTS, rng);
    (center, route)
}

/// Cardinal facing from the start cell toward the second route point, or the
/// start cell's own orientation when the route is degenerate
fn initial_facing(grid: &Grid, start: GridPos, route: &[GridPos]) -> f32 {
    if let Some(next) = route.get(1) {
        match (next.x - start.x, next.y - start.y) {
            (1, 0) => return 0.0,
            (-1, 0) => return PI,
            (0, 1) => return FRAC_PI_2,
            (0, -1) => return -FRAC_PI_2,
            _ => {}
        }
    }
    grid.cell(start).map_or(0.0, |c| c.shape.facing())
}

fn bonus_candidates(grid: &Grid, start: GridPos, route: &[GridPos]) -> Vec<GridPos> {
    let on_route: FxHashSet<GridPos> = route.iter().copied().collect();
    route::reachable(grid, start)
        .into_iter()
        .filter(|p| *p != start && !on_route.contains(p) && grid.is_passable(*p))
        .collect()
}
