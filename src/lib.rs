//! Maze Racer Server Library
//!
//! Simulation core for real-time multiplayer racing on procedurally
//! generated maze tracks. Transport is left to the embedding application:
//! it feeds `InputEvent`s into a `RoomRegistry` and forwards the
//! `RoomEvent`s each room broadcasts.
//!
//! # Features
//!
//! - `bots` - Route-following bots that can fill rooms (enabled by default)

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod lobby;
pub mod metrics;
