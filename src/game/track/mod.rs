//! Grid-based track: terrain, generation and the checkpoint route.

pub mod generator;
pub mod grid;
pub mod route;

pub use generator::{generate, Track, TrackParams};
pub use grid::{Cell, Grid, GridPos, Shape, Terrain};
