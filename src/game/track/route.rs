//! Loop search and connectivity queries over a generated grid.

use bitvec::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use smallvec::SmallVec;
use std::collections::VecDeque;

use super::grid::{Grid, GridPos};
use crate::game::constants::track::MIN_LOOP_CELLS;

/// Search for a closed loop through `start`.
///
/// Runs `attempts` randomized depth-first searches and keeps the longest
/// cycle found. The result starts and ends at `start`; when no cycle with at
/// least `MIN_LOOP_CELLS` distinct cells exists it is just `[start]`.
pub fn find_loop<R: Rng + ?Sized>(grid: &Grid, start: GridPos, attempts: usize, rng: &mut R) -> Vec<GridPos> {
    let mut best: Vec<GridPos> = Vec::new();

    if grid.index(start).is_some() {
        for _ in 0..attempts.max(1) {
            let candidate = longest_cycle_dfs(grid, start, rng);
            if candidate.len() > best.len() {
                best = candidate;
            }
        }
    }

    if best.is_empty() {
        return vec![start];
    }
    best.push(start);
    best
}

/// One randomized DFS; returns the longest simple path from `start` whose last
/// cell is adjacent to `start` (the closing edge is not included).
fn longest_cycle_dfs<R: Rng + ?Sized>(grid: &Grid, start: GridPos, rng: &mut R) -> Vec<GridPos> {
    let mut visited = bitvec![0; grid.width() * grid.height()];
    let Some(start_idx) = grid.index(start) else {
        return Vec::new();
    };
    visited.set(start_idx, true);

    let mut path = vec![start];
    let mut stack: Vec<SmallVec<[GridPos; 4]>> = vec![shuffled_neighbors(grid, start, rng)];
    let mut best: Vec<GridPos> = Vec::new();

    while let Some(frontier) = stack.last_mut() {
        let Some(next) = frontier.pop() else {
            stack.pop();
            path.pop();
            continue;
        };

        if next == start {
            // Stepping back along the edge we came in on is not a cycle
            if path.len() >= MIN_LOOP_CELLS && path.len() > best.len() {
                best.clone_from(&path);
            }
            continue;
        }

        let Some(idx) = grid.index(next) else {
            continue;
        };
        if visited[idx] {
            continue;
        }
        visited.set(idx, true);
        path.push(next);
        stack.push(shuffled_neighbors(grid, next, rng));
    }

    best
}

fn shuffled_neighbors<R: Rng + ?Sized>(grid: &Grid, pos: GridPos, rng: &mut R) -> SmallVec<[GridPos; 4]> {
    let mut neighbors = grid.passable_neighbors(pos);
    neighbors.shuffle(rng);
    neighbors
}

/// Every passable cell reachable from `start` (BFS order, `start` first).
/// The start cell itself is included even when it is not passable.
pub fn reachable(grid: &Grid, start: GridPos) -> Vec<GridPos> {
    let Some(start_idx) = grid.index(start) else {
        return Vec::new();
    };

    let mut visited = bitvec![0; grid.width() * grid.height()];
    visited.set(start_idx, true);

    let mut order = Vec::new();
    let mut queue = VecDeque::from([start]);

    while let Some(pos) = queue.pop_front() {
        order.push(pos);
        for next in grid.passable_neighbors(pos) {
            if let Some(idx) = grid.index(next) {
                if !visited[idx] {
                    visited.set(idx, true);
                    queue.push_back(next);
                }
            }
        }
    }

    order
}

/// True if consecutive route cells are orthogonal neighbors
pub fn is_contiguous(route: &[GridPos]) -> bool {
    route.windows(2).all(|pair| pair[0].manhattan(pair[1]) == 1)
}
