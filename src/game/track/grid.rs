//! Track grid: terrain families, shape sub-codes and the integer cell codes
//! sent to clients.
//!
//! A cell code is `family * 100 + shape`. The shape sub-code only selects the
//! client sprite; it is always recomputed from the 4-neighborhood by
//! [`Grid::recompute_shapes`] and never written by hand.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::track::{NEUTRAL_SPEED, OFF_TRACK_SPEED, ROAD_SPEED, WATER_SPEED};
use crate::util::vec2::Vec2;

/// Integer grid coordinate (column `x`, row `y`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Cell containing a continuous track position
    #[inline]
    pub fn from_world(position: Vec2) -> Self {
        Self {
            x: position.x.floor() as i32,
            y: position.y.floor() as i32,
        }
    }

    /// Continuous position of the cell center
    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x as f32 + 0.5, self.y as f32 + 0.5)
    }

    /// Orthogonal neighbors in top, bottom, left, right order
    #[inline]
    pub fn neighbors(&self) -> [GridPos; 4] {
        [
            GridPos::new(self.x, self.y - 1),
            GridPos::new(self.x, self.y + 1),
            GridPos::new(self.x - 1, self.y),
            GridPos::new(self.x + 1, self.y),
        ]
    }

    /// Manhattan distance
    #[inline]
    pub fn manhattan(&self, other: GridPos) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Terrain family of a cell (hundreds digit of the cell code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Empty,
    RoadCore,
    RoadCorridor,
    WaterCore,
    WaterCorridor,
    /// Start cell: a road core with a distinguished code
    Start,
}

impl Terrain {
    pub fn base_code(&self) -> u16 {
        match self {
            Terrain::Empty => 0,
            Terrain::RoadCore => 100,
            Terrain::RoadCorridor => 200,
            Terrain::WaterCore => 300,
            Terrain::WaterCorridor => 400,
            Terrain::Start => 500,
        }
    }

    #[inline]
    pub fn is_passable(&self) -> bool {
        !matches!(self, Terrain::Empty)
    }

    /// Room/junction family (start counts as a core)
    pub fn is_core(&self) -> bool {
        matches!(self, Terrain::RoadCore | Terrain::WaterCore | Terrain::Start)
    }

    pub fn is_corridor(&self) -> bool {
        matches!(self, Terrain::RoadCorridor | Terrain::WaterCorridor)
    }

    pub fn is_water(&self) -> bool {
        matches!(self, Terrain::WaterCore | Terrain::WaterCorridor)
    }

    /// Water variant of a road family; other terrain is unchanged
    pub fn flooded(&self) -> Terrain {
        match self {
            Terrain::RoadCore => Terrain::WaterCore,
            Terrain::RoadCorridor => Terrain::WaterCorridor,
            other => *other,
        }
    }

    pub fn speed_modifier(&self) -> f32 {
        match self {
            Terrain::Empty => OFF_TRACK_SPEED,
            Terrain::WaterCore | Terrain::WaterCorridor => WATER_SPEED,
            Terrain::RoadCore | Terrain::RoadCorridor | Terrain::Start => ROAD_SPEED,
        }
    }
}

/// Which orthogonal neighbors are passable (tens/units of the cell code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Shape {
    /// Junction, crossing, dead end or isolated
    Open = 0,
    /// Left and right only
    Horizontal = 1,
    /// Top and bottom only
    Vertical = 2,
    TopRight = 3,
    TopLeft = 4,
    BottomRight = 5,
    BottomLeft = 6,
}

impl Shape {
    pub fn from_neighbors(top: bool, bottom: bool, left: bool, right: bool) -> Shape {
        match (top, bottom, left, right) {
            (false, false, true, true) => Shape::Horizontal,
            (true, true, false, false) => Shape::Vertical,
            (true, false, false, true) => Shape::TopRight,
            (true, false, true, false) => Shape::TopLeft,
            (false, true, false, true) => Shape::BottomRight,
            (false, true, true, false) => Shape::BottomLeft,
            _ => Shape::Open,
        }
    }

    #[inline]
    pub fn is_straight(&self) -> bool {
        matches!(self, Shape::Horizontal | Shape::Vertical)
    }

    /// Default facing for a straight cell
    pub fn facing(&self) -> f32 {
        match self {
            Shape::Vertical => std::f32::consts::FRAC_PI_2,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub terrain: Terrain,
    pub shape: Shape,
}

impl Cell {
    pub const EMPTY: Cell = Cell {
        terrain: Terrain::Empty,
        shape: Shape::Open,
    };

    /// Integer code sent to clients
    pub fn code(&self) -> u16 {
        if self.terrain.is_passable() {
            self.terrain.base_code() + self.shape as u16
        } else {
            0
        }
    }
}

/// Row-major track grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::EMPTY; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Continuous size of the track in cells
    #[inline]
    pub fn extent(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    #[inline]
    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    /// Flat index of an in-bounds position
    #[inline]
    pub fn index(&self, pos: GridPos) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| pos.y as usize * self.width + pos.x as usize)
    }

    pub fn cell(&self, pos: GridPos) -> Option<Cell> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Terrain at a position; out-of-bounds reads as empty
    pub fn terrain(&self, pos: GridPos) -> Terrain {
        self.cell(pos).map_or(Terrain::Empty, |c| c.terrain)
    }

    #[inline]
    pub fn is_passable(&self, pos: GridPos) -> bool {
        self.terrain(pos).is_passable()
    }

    /// Change a cell's terrain. Shapes go stale until `recompute_shapes`.
    pub(crate) fn set_terrain(&mut self, pos: GridPos, terrain: Terrain) {
        if let Some(i) = self.index(pos) {
            self.cells[i].terrain = terrain;
        }
    }

    pub fn passable_neighbors(&self, pos: GridPos) -> SmallVec<[GridPos; 4]> {
        pos.neighbors()
            .into_iter()
            .filter(|n| self.is_passable(*n))
            .collect()
    }

    pub fn passable_neighbor_count(&self, pos: GridPos) -> usize {
        pos.neighbors()
            .iter()
            .filter(|n| self.is_passable(**n))
            .count()
    }

    /// All positions in row-major order
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| GridPos::new(x as i32, y as i32)))
    }

    /// Passable positions in row-major order
    pub fn passable_positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        self.positions().filter(move |p| self.is_passable(*p))
    }

    /// Recompute every shape sub-code from the final terrain.
    /// A pure function of terrain, so calling it twice changes nothing.
    pub fn recompute_shapes(&mut self) {
        let shapes: Vec<Shape> = self
            .positions()
            .map(|pos| {
                if !self.is_passable(pos) {
                    return Shape::Open;
                }
                let [top, bottom, left, right] = pos.neighbors().map(|n| self.is_passable(n));
                Shape::from_neighbors(top, bottom, left, right)
            })
            .collect();

        for (cell, shape) in self.cells.iter_mut().zip(shapes) {
            cell.shape = shape;
        }
    }

    /// Terrain speed modifier under a continuous position, `None` off-grid
    pub fn speed_modifier_at(&self, position: Vec2) -> Option<f32> {
        if !position.is_finite() {
            return None;
        }
        self.cell(GridPos::from_world(position))
            .map(|c| c.terrain.speed_modifier())
    }

    /// Speed modifier with the neutral fallback for off-grid samples
    pub fn speed_modifier_or_neutral(&self, position: Vec2) -> f32 {
        self.speed_modifier_at(position).unwrap_or(NEUTRAL_SPEED)
    }

    /// Cell codes as rows, for the starter pack
    pub fn codes(&self) -> Vec<Vec<u16>> {
        self.cells
            .chunks(self.width.max(1))
            .map(|row| row.iter().map(Cell::code).collect())
            .collect()
    }
}
