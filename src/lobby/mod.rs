//! Rooms, their lifecycle and the registry that owns them

pub mod manager;
pub mod player;
pub mod room;
