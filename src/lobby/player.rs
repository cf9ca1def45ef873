use uuid::Uuid;

use crate::game::state::{Entrant, PlayerId, RoomId};

/// Roster entry for a player in a room, human or bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyPlayer {
    pub id: PlayerId,
    pub name: String,
    pub room_id: Option<RoomId>,
    pub is_bot: bool,
}

impl LobbyPlayer {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            room_id: None,
            is_bot: false,
        }
    }

    /// Bot with a fresh id
    pub fn bot(name: String) -> Self {
        Self {
            is_bot: true,
            ..Self::new(Uuid::new_v4(), name)
        }
    }

    /// What the race needs to know about this player
    pub fn entrant(&self) -> Entrant {
        Entrant {
            id: self.id,
            name: self.name.clone(),
            is_bot: self.is_bot,
        }
    }
}
