pub mod bonus;
pub mod checkpoint;
pub mod collision;

#[cfg(feature = "bots")]
pub mod autopilot;
