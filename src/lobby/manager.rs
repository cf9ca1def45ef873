use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::game::state::{PlayerId, RoomId};
use crate::lobby::player::LobbyPlayer;
use crate::lobby::room::{Room, RoomError, RoomInfo, RoomState};
use crate::metrics::Metrics;
use crate::net::protocol::{InputEvent, RoomEvent, StarterPack};

/// Owns every room and knows which room each player is in.
/// Constructed once at startup and handed to the transport layer.
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    player_rooms: HashMap<PlayerId, RoomId>,
    config: ServerConfig,
    metrics: Arc<Metrics>,
}

impl RoomRegistry {
    pub fn new(config: ServerConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            config,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Create a room with `owner` as its first player
    pub fn create_room(&mut self, name: String, owner: LobbyPlayer) -> Result<RoomId, RegistryError> {
        if self.rooms.len() >= self.config.max_rooms {
            return Err(RegistryError::TooManyRooms);
        }
        if self.player_rooms.contains_key(&owner.id) {
            return Err(RegistryError::AlreadyInRoom);
        }

        let room = Room::new(
            name,
            self.config.max_players_per_room,
            self.config.race.clone(),
            self.metrics.clone(),
        );
        let room_id = room.id();
        let owner_id = owner.id;
        let is_bot = owner.is_bot;
        room.add_player(owner)?;

        info!(room = %room_id, name = %room.name, "Room created");
        self.rooms.insert(room_id, room);
        self.player_rooms.insert(owner_id, room_id);
        Metrics::add(&self.metrics.rooms_active, 1);
        self.count_player(is_bot);

        Ok(room_id)
    }

    pub fn join_room(&mut self, room_id: RoomId, player: LobbyPlayer) -> Result<(), RegistryError> {
        let player_id = player.id;
        if self.player_rooms.contains_key(&player_id) {
            return Err(RegistryError::AlreadyInRoom);
        }

        let room = self.rooms.get(&room_id).ok_or(RegistryError::RoomNotFound)?;
        let is_bot = player.is_bot;
        room.add_player(player)?;
        self.player_rooms.insert(player_id, room_id);
        self.count_player(is_bot);

        Ok(())
    }

    /// Add an autopilot-driven player to a room in the lobby
    #[cfg(feature = "bots")]
    pub fn add_bot(&mut self, room_id: RoomId) -> Result<PlayerId, RegistryError> {
        let room = self.rooms.get(&room_id).ok_or(RegistryError::RoomNotFound)?;
        let bot = LobbyPlayer::bot(format!("Bot {}", room.player_count() + 1));
        let bot_id = bot.id;
        self.join_room(room_id, bot)?;
        Ok(bot_id)
    }

    /// Leave the current room. The room is stopped and removed once no
    /// humans remain in it.
    pub fn leave_room(&mut self, player_id: PlayerId) -> Result<RoomId, RegistryError> {
        let room_id = self.player_rooms.remove(&player_id).ok_or(RegistryError::NotInRoom)?;

        let Some(room) = self.rooms.get(&room_id) else {
            return Ok(room_id);
        };
        if let Some(player) = room.remove_player(player_id) {
            self.uncount_player(player.is_bot);
        }

        if room.human_count() == 0 {
            self.remove_room(room_id);
        }
        Ok(room_id)
    }

    /// Stop a room and drop everyone in it
    pub fn remove_room(&mut self, room_id: RoomId) -> Option<RoomInfo> {
        let room = self.rooms.remove(&room_id)?;
        room.stop();

        let info = room.info();
        for player_id in room.player_ids() {
            self.player_rooms.remove(&player_id);
        }
        Metrics::decrement(&self.metrics.players_total, info.player_count as u64);
        Metrics::decrement(&self.metrics.bots_total, info.bot_count as u64);
        Metrics::decrement(&self.metrics.rooms_active, 1);

        info!(room = %room_id, "Room removed");
        Some(info)
    }

    /// Remove rooms whose match is over. Returns how many were removed.
    pub fn remove_ended_rooms(&mut self) -> usize {
        let ended: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.state() == RoomState::Ended)
            .map(|(id, _)| *id)
            .collect();

        for room_id in &ended {
            self.remove_room(*room_id);
        }
        ended.len()
    }

    /// Start a room's match on behalf of its owner
    pub fn start_room(&self, room_id: RoomId, requested_by: PlayerId) -> Result<StarterPack, RegistryError> {
        let room = self.rooms.get(&room_id).ok_or(RegistryError::RoomNotFound)?;
        Ok(room.start(requested_by)?)
    }

    /// Route an input to the sender's room
    pub fn submit_input(&self, event: InputEvent) -> Result<(), RegistryError> {
        Ok(self.room_of(event.player_id)?.submit_input(event)?)
    }

    pub fn mark_finished(&self, player_id: PlayerId) -> Result<(), RegistryError> {
        Ok(self.room_of(player_id)?.mark_finished(player_id)?)
    }

    pub fn subscribe(&self, room_id: RoomId) -> Result<broadcast::Receiver<RoomEvent>, RegistryError> {
        let room = self.rooms.get(&room_id).ok_or(RegistryError::RoomNotFound)?;
        Ok(room.subscribe())
    }

    fn room_of(&self, player_id: PlayerId) -> Result<&Room, RegistryError> {
        let room_id = self.player_rooms.get(&player_id).ok_or(RegistryError::NotInRoom)?;
        self.rooms.get(room_id).ok_or(RegistryError::RoomNotFound)
    }

    pub fn get_room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn get_player_room(&self, player_id: PlayerId) -> Option<RoomId> {
        self.player_rooms.get(&player_id).copied()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Players across all rooms, bots included
    pub fn total_player_count(&self) -> usize {
        self.player_rooms.len()
    }

    /// Rooms for a room browser
    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        self.rooms.values().map(Room::info).collect()
    }

    /// Stop every room
    pub fn shutdown_all(&mut self) {
        let ids: Vec<RoomId> = self.rooms.keys().copied().collect();
        for room_id in ids {
            self.remove_room(room_id);
        }
        info!("All rooms shut down");
    }

    fn count_player(&self, is_bot: bool) {
        Metrics::add(&self.metrics.players_total, 1);
        if is_bot {
            Metrics::add(&self.metrics.bots_total, 1);
        }
    }

    fn uncount_player(&self, is_bot: bool) {
        Metrics::decrement(&self.metrics.players_total, 1);
        if is_bot {
            Metrics::decrement(&self.metrics.bots_total, 1);
        }
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Too many rooms")]
    TooManyRooms,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Already in a room")]
    AlreadyInRoom,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Room error: {0}")]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    fn create_player(name: &str) -> LobbyPlayer {
        LobbyPlayer::new(Uuid::new_v4(), name.to_string())
    }

    fn registry(max_rooms: usize) -> RoomRegistry {
        let mut config = ServerConfig {
            max_rooms,
            ..ServerConfig::default()
        };
        config.race.track_seed = Some(4);
        config.race.countdown_seconds = 0;
        RoomRegistry::new(config, Arc::new(Metrics::new()))
    }

    #[test]
    fn test_create_room() {
        let mut registry = registry(10);
        let owner = create_player("Owner");
        let owner_id = owner.id;

        let room_id = registry.create_room("Test Room".to_string(), owner).unwrap();

        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.get_player_room(owner_id), Some(room_id));
        assert_eq!(registry.get_room(room_id).unwrap().owner(), Some(owner_id));
        assert_eq!(registry.metrics().rooms_active.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_max_rooms() {
        let mut registry = registry(2);
        registry.create_room("Room 1".to_string(), create_player("A")).unwrap();
        registry.create_room("Room 2".to_string(), create_player("B")).unwrap();

        let result = registry.create_room("Room 3".to_string(), create_player("C"));
        assert_eq!(result, Err(RegistryError::TooManyRooms));
    }

    #[test]
    fn test_cannot_join_twice() {
        let mut registry = registry(10);
        let player = create_player("Player1");
        let room_a = registry.create_room("A".to_string(), player.clone()).unwrap();
        let room_b = registry.create_room("B".to_string(), create_player("Other")).unwrap();

        assert_eq!(registry.join_room(room_a, player.clone()), Err(RegistryError::AlreadyInRoom));
        assert_eq!(registry.join_room(room_b, player), Err(RegistryError::AlreadyInRoom));
    }

    #[test]
    fn test_join_unknown_room() {
        let mut registry = registry(10);
        let result = registry.join_room(Uuid::new_v4(), create_player("Lost"));
        assert_eq!(result, Err(RegistryError::RoomNotFound));
    }

    #[test]
    fn test_room_full() {
        let mut registry = registry(10);
        let room_id = registry.create_room("Full".to_string(), create_player("P0")).unwrap();
        for i in 1..6 {
            registry.join_room(room_id, create_player(&format!("P{i}"))).unwrap();
        }
        let result = registry.join_room(room_id, create_player("P6"));
        assert_eq!(result, Err(RegistryError::Room(RoomError::RoomFull)));
        assert_eq!(registry.total_player_count(), 6);
    }

    #[test]
    fn test_last_human_leaving_removes_room() {
        let mut registry = registry(10);
        let host = create_player("Host");
        let guest = create_player("Guest");
        let (host_id, guest_id) = (host.id, guest.id);
        let room_id = registry.create_room("Test".to_string(), host).unwrap();
        registry.join_room(room_id, guest).unwrap();

        registry.leave_room(host_id).unwrap();
        assert!(registry.get_room(room_id).is_some());
        assert_eq!(registry.get_room(room_id).unwrap().owner(), Some(guest_id));

        registry.leave_room(guest_id).unwrap();
        assert!(registry.get_room(room_id).is_none());
        assert_eq!(registry.leave_room(guest_id), Err(RegistryError::NotInRoom));
        assert_eq!(registry.metrics().rooms_active.load(Ordering::Relaxed), 0);
        assert_eq!(registry.metrics().players_total.load(Ordering::Relaxed), 0);
    }

    #[cfg(feature = "bots")]
    #[test]
    fn test_bots_do_not_keep_room_alive() {
        let mut registry = registry(10);
        let host = create_player("Host");
        let host_id = host.id;
        let room_id = registry.create_room("Test".to_string(), host).unwrap();
        let bot_id = registry.add_bot(room_id).unwrap();
        assert_eq!(registry.get_player_room(bot_id), Some(room_id));
        assert_eq!(registry.metrics().bots_total.load(Ordering::Relaxed), 1);

        registry.leave_room(host_id).unwrap();
        assert_eq!(registry.room_count(), 0);
        assert!(registry.get_player_room(bot_id).is_none());
        assert_eq!(registry.metrics().bots_total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_list_rooms() {
        let mut registry = registry(10);
        registry.create_room("Room A".to_string(), create_player("A")).unwrap();
        registry.create_room("Room B".to_string(), create_player("B")).unwrap();

        let rooms = registry.list_rooms();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.iter().all(|r| r.player_count == 1 && r.state == RoomState::Lobby));
    }

    #[test]
    fn test_input_requires_room() {
        let registry = registry(10);
        let result = registry.submit_input(InputEvent {
            player_id: Uuid::new_v4(),
            heading: None,
            reported_elapsed: None,
        });
        assert_eq!(result, Err(RegistryError::NotInRoom));
    }

    #[test]
    fn test_start_room() {
        tokio_test::block_on(async {
            let mut registry = registry(10);
            let host = create_player("Host");
            let guest = create_player("Guest");
            let (host_id, guest_id) = (host.id, guest.id);
            let room_id = registry.create_room("Race".to_string(), host).unwrap();
            registry.join_room(room_id, guest).unwrap();

            assert_eq!(
                registry.start_room(room_id, guest_id).unwrap_err(),
                RegistryError::Room(RoomError::NotOwner)
            );
            let pack = registry.start_room(room_id, host_id).unwrap();
            assert_eq!(pack.room_id, room_id);
            assert_eq!(pack.start_positions.len(), 2);

            registry.submit_input(InputEvent {
                player_id: guest_id,
                heading: Some(0.0),
                reported_elapsed: Some(0.5),
            })
            .unwrap();

            registry.shutdown_all();
            assert_eq!(registry.room_count(), 0);
            assert_eq!(registry.total_player_count(), 0);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_ended_rooms() {
        let mut registry = registry(10);
        let host = create_player("Host");
        let host_id = host.id;
        let room_id = registry.create_room("Race".to_string(), host).unwrap();
        let mut rx = registry.subscribe(room_id).unwrap();
        registry.start_room(room_id, host_id).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        registry.mark_finished(host_id).unwrap();
        loop {
            if let Ok(RoomEvent::MatchEnded(_)) = rx.recv().await {
                break;
            }
        }

        assert_eq!(registry.remove_ended_rooms(), 1);
        assert_eq!(registry.room_count(), 0);
        assert!(registry.get_player_room(host_id).is_none());
    }
}
