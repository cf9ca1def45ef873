//! Latest-wins input slots
//!
//! Transport handlers overwrite a per-player slot from any thread; the room's
//! tick task takes the whole map at the top of each tick. Inputs superseded
//! before a tick boundary are dropped on purpose.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::game::state::PlayerId;
use crate::net::protocol::InputEvent;

/// Per-player latest input, shared between transport and the tick task
#[derive(Debug, Default)]
pub struct InputBuffer {
    slots: Mutex<HashMap<PlayerId, InputEvent>>,
    /// Inputs overwritten before a tick consumed them
    superseded: AtomicU64,
    /// Inputs refused at submission
    rejected: AtomicU64,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an input, replacing any pending one for the same player.
    ///
    /// Non-finite headings or elapsed times are refused.
    pub fn submit(&self, event: InputEvent) -> Result<(), InputBufferError> {
        if event.heading.is_some_and(|h| !h.is_finite()) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(InputBufferError::InvalidHeading);
        }
        if event.reported_elapsed.is_some_and(|t| !t.is_finite() || t < 0.0) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(InputBufferError::InvalidElapsed);
        }

        if self.slots.lock().insert(event.player_id, event).is_some() {
            self.superseded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Take every pending input, leaving the slots empty
    pub fn drain(&self) -> HashMap<PlayerId, InputEvent> {
        std::mem::take(&mut *self.slots.lock())
    }

    /// Drop a player's pending input (player left)
    pub fn remove(&self, player_id: PlayerId) {
        self.slots.lock().remove(&player_id);
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn superseded_count(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Input submission errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    #[error("heading is not a finite angle")]
    InvalidHeading,
    #[error("reported elapsed time is not a finite, non-negative number")]
    InvalidElapsed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    fn input(player_id: PlayerId, heading: Option<f32>) -> InputEvent {
        InputEvent {
            player_id,
            heading,
            reported_elapsed: None,
        }
    }

    #[test]
    fn test_latest_input_wins() {
        let buffer = InputBuffer::new();
        let player = Uuid::new_v4();

        buffer.submit(input(player, Some(0.1))).unwrap();
        buffer.submit(input(player, Some(0.2))).unwrap();
        buffer.submit(input(player, None)).unwrap();

        assert_eq!(buffer.pending_count(), 1);
        assert_eq!(buffer.superseded_count(), 2);

        let drained = buffer.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[&player].heading, None);
    }

    #[test]
    fn test_drain_clears_slots() {
        let buffer = InputBuffer::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        buffer.submit(input(a, Some(1.0))).unwrap();
        buffer.submit(input(b, Some(2.0))).unwrap();
        assert_eq!(buffer.drain().len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_invalid_input_rejected() {
        let buffer = InputBuffer::new();
        let player = Uuid::new_v4();

        assert_eq!(
            buffer.submit(input(player, Some(f32::NAN))),
            Err(InputBufferError::InvalidHeading)
        );
        let bad_elapsed = InputEvent {
            reported_elapsed: Some(-1.0),
            ..input(player, None)
        };
        assert_eq!(buffer.submit(bad_elapsed), Err(InputBufferError::InvalidElapsed));
        assert!(buffer.is_empty());
        assert_eq!(buffer.rejected_count(), 2);
    }

    #[test]
    fn test_remove_player_slot() {
        let buffer = InputBuffer::new();
        let player = Uuid::new_v4();
        buffer.submit(input(player, Some(0.0))).unwrap();
        buffer.remove(player);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concurrent_submitters() {
        let buffer = Arc::new(InputBuffer::new());
        let players: Vec<PlayerId> = (0..8).map(|_| Uuid::new_v4()).collect();

        let handles: Vec<_> = players
            .iter()
            .map(|&player| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        buffer.submit(input(player, Some(i as f32 * 0.01))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = buffer.drain();
        assert_eq!(drained.len(), players.len());
        for player in &players {
            assert!((drained[player].heading.unwrap() - 0.99).abs() < 1e-6);
        }
    }
}
