//! Match result and standings
//!
//! Finished players rank first, then shorter elapsed time, then more laps.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::game::state::{PlayerId, RaceState, RoomId};

/// Final result of one match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub room_id: RoomId,
    pub winner_id: Option<PlayerId>,
    pub winner_name: Option<String>,
    pub standings: Vec<Standing>,
    /// Seconds the race was live
    pub race_time: f32,
    pub reason: MatchEndReason,
}

/// One line of the standings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standing {
    pub player_id: PlayerId,
    pub name: String,
    pub rank: u32,
    pub finished: bool,
    pub elapsed: f32,
    pub laps: u32,
    pub is_bot: bool,
}

/// Reason why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchEndReason {
    /// Every remaining player finished
    AllFinished,
    /// The last player left
    Abandoned,
    /// Stopped from outside before anyone could finish
    Cancelled,
}

/// Build standings from the race state
pub fn determine_result(state: &RaceState, reason: MatchEndReason) -> MatchResult {
    let mut standings: Vec<Standing> = state
        .players
        .iter()
        .map(|p| Standing {
            player_id: p.id,
            name: p.name.clone(),
            rank: 0,
            finished: p.finished,
            elapsed: p.elapsed,
            laps: state.checkpoints.laps(p.id),
            is_bot: p.is_bot,
        })
        .collect();

    standings.sort_by(|a, b| {
        b.finished
            .cmp(&a.finished)
            .then_with(|| a.elapsed.partial_cmp(&b.elapsed).unwrap_or(Ordering::Equal))
            .then_with(|| b.laps.cmp(&a.laps))
    });

    for (i, standing) in standings.iter_mut().enumerate() {
        standing.rank = (i + 1) as u32;
    }

    let (winner_id, winner_name) = match standings.first() {
        Some(first) if first.finished => (Some(first.player_id), Some(first.name.clone())),
        _ => (None, None),
    };

    MatchResult {
        room_id: state.room_id,
        winner_id,
        winner_name,
        standings,
        race_time: state.race_time,
        reason,
    }
}

/// Check if the match should end on its own
pub fn check_match_end(state: &RaceState) -> Option<MatchEndReason> {
    if state.players.is_empty() {
        return Some(MatchEndReason::Abandoned);
    }
    if state.all_finished() {
        return Some(MatchEndReason::AllFinished);
    }
    None
}
