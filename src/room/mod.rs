// Room module: players, rooms, game settings, and the room registry.

pub mod registry;

pub use registry::RoomRegistry;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::game::role::Role;
use crate::protocol::messages::PlayerDto;
use crate::protocol::PlayerId;

/// Minimum players required to start a game.
pub const MIN_PLAYERS: usize = 6;
/// Maximum players a room can hold.
pub const MAX_PLAYERS: usize = 12;

/// A room shared between the registry (owner) and an active game.
pub type SharedRoom = Arc<RwLock<Room>>;

/// Domain errors for room operations, mapped to wire codes by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room not found")]
    RoomNotFound,
    #[error("wrong password")]
    WrongPassword,
    #[error("room is full")]
    RoomFull,
    #[error("nickname already in use")]
    NicknameInUse,
    #[error("game has already started")]
    GameAlreadyStarted,
    #[error("player not found")]
    PlayerNotFound,
    #[error("only the host can do this")]
    NotHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Alive,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// Lobby: accepting players.
    Waiting,
    /// Game in progress; joins are rejected.
    Playing,
    /// Game finished.
    Ended,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    pub is_host: bool,
    pub is_ready: bool,
    pub is_connected: bool,
    pub status: PlayerStatus,
    /// Assigned when the game starts.
    pub role: Option<Role>,
}

impl Player {
    pub fn new(id: PlayerId, nickname: String, is_host: bool) -> Self {
        Self {
            id,
            nickname,
            is_host,
            is_ready: false,
            is_connected: true,
            status: PlayerStatus::Alive,
            role: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == PlayerStatus::Alive
    }

    pub fn to_dto(&self) -> PlayerDto {
        PlayerDto {
            id: self.id.clone(),
            nickname: self.nickname.clone(),
            is_host: self.is_host,
            is_ready: self.is_ready,
            is_connected: self.is_connected,
            status: self.status,
        }
    }
}

/// Role counts and the night timer, configured by the host.
///
/// Counts are validated against the player roster at game start, not at
/// update time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    pub villagers: u32,
    pub mafia: u32,
    pub godfather: u32,
    pub doctor: u32,
    pub detective: u32,
    /// Night phase length in seconds; day phases run twice as long.
    pub night_timer: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            villagers: 3,
            mafia: 2,
            godfather: 0,
            doctor: 1,
            detective: 1,
            night_timer: 60,
        }
    }
}

impl GameSettings {
    pub fn total_players(&self) -> usize {
        (self.villagers + self.mafia + self.godfather + self.doctor + self.detective) as usize
    }

    /// Start-time validation against the actual roster size.
    pub fn validate_for_start(&self, player_count: usize) -> Result<(), String> {
        if self.total_players() != player_count {
            return Err(format!(
                "settings cover {} players but the room has {}",
                self.total_players(),
                player_count
            ));
        }
        if self.mafia + self.godfather < 1 {
            return Err("at least one mafia-team role is required".to_string());
        }
        if self.godfather > 1 {
            return Err("at most one godfather is allowed".to_string());
        }
        if self.doctor > 1 {
            return Err("at most one doctor is allowed".to_string());
        }
        if self.detective > 1 {
            return Err("at most one detective is allowed".to_string());
        }
        Ok(())
    }
}

/// A game room: membership, host, settings, and lifecycle state.
///
/// Invariants: at most one host among members; `player_order` is a
/// permutation of the `players` keys in join order; nicknames are unique.
#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub password_hash: Option<String>,
    pub state: RoomState,
    pub settings: GameSettings,
    pub players: HashMap<PlayerId, Player>,
    pub player_order: Vec<PlayerId>,
}

impl Room {
    pub fn new(code: String, password_hash: Option<String>) -> Self {
        Self {
            code,
            password_hash,
            state: RoomState::Waiting,
            settings: GameSettings::default(),
            players: HashMap::new(),
            player_order: Vec::new(),
        }
    }

    /// Add a player. The first joiner becomes host.
    pub fn add_player(&mut self, mut player: Player) -> Result<(), RoomError> {
        if self.players.len() >= MAX_PLAYERS {
            return Err(RoomError::RoomFull);
        }
        if self.state != RoomState::Waiting {
            return Err(RoomError::GameAlreadyStarted);
        }
        if self
            .players
            .values()
            .any(|p| p.nickname == player.nickname)
        {
            return Err(RoomError::NicknameInUse);
        }

        if self.players.is_empty() {
            player.is_host = true;
        }

        self.player_order.push(player.id.clone());
        self.players.insert(player.id.clone(), player);
        Ok(())
    }

    /// Remove a player. If the host leaves and others remain, the first
    /// remaining player in join order is promoted and returned.
    pub fn remove_player(&mut self, player_id: &str) -> Option<(Player, Option<PlayerId>)> {
        let player = self.players.remove(player_id)?;
        self.player_order.retain(|id| id != player_id);

        let new_host = if player.is_host && !self.player_order.is_empty() {
            let next = self.player_order[0].clone();
            if let Some(promoted) = self.players.get_mut(&next) {
                promoted.is_host = true;
            }
            Some(next)
        } else {
            None
        };

        Some((player, new_host))
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.get_mut(player_id)
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.values().find(|p| p.is_host)
    }

    pub fn set_ready(&mut self, player_id: &str, ready: bool) -> Result<(), RoomError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(RoomError::PlayerNotFound)?;
        player.is_ready = ready;
        Ok(())
    }

    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.is_ready)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive()).count()
    }

    /// Players as DTOs, in join order.
    pub fn player_dtos(&self) -> Vec<PlayerDto> {
        self.player_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .map(Player::to_dto)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room::new("ABCDEF".to_string(), None)
    }

    fn join(room: &mut Room, id: &str, nickname: &str) {
        room.add_player(Player::new(id.to_string(), nickname.to_string(), false))
            .unwrap();
    }

    #[test]
    fn first_joiner_becomes_host() {
        let mut room = room();
        join(&mut room, "p1", "Ana");
        join(&mut room, "p2", "Bo");

        assert!(room.players["p1"].is_host);
        assert!(!room.players["p2"].is_host);
        assert_eq!(room.host().unwrap().id, "p1");
    }

    #[test]
    fn exactly_one_host_after_succession() {
        let mut room = room();
        join(&mut room, "p1", "Ana");
        join(&mut room, "p2", "Bo");
        join(&mut room, "p3", "Cy");

        let (left, new_host) = room.remove_player("p1").unwrap();
        assert!(left.is_host);
        assert_eq!(new_host.as_deref(), Some("p2"));
        assert_eq!(room.players.values().filter(|p| p.is_host).count(), 1);
    }

    #[test]
    fn non_host_departure_keeps_host() {
        let mut room = room();
        join(&mut room, "p1", "Ana");
        join(&mut room, "p2", "Bo");

        let (_, new_host) = room.remove_player("p2").unwrap();
        assert!(new_host.is_none());
        assert!(room.players["p1"].is_host);
    }

    #[test]
    fn player_order_tracks_joins_minus_departures() {
        let mut room = room();
        for (id, name) in [("p1", "Ana"), ("p2", "Bo"), ("p3", "Cy"), ("p4", "Di")] {
            join(&mut room, id, name);
        }
        room.remove_player("p2");

        assert_eq!(room.player_order, vec!["p1", "p3", "p4"]);
        let mut keys: Vec<_> = room.players.keys().cloned().collect();
        keys.sort();
        let mut order = room.player_order.clone();
        order.sort();
        assert_eq!(keys, order);
    }

    #[test]
    fn nicknames_are_unique() {
        let mut room = room();
        join(&mut room, "p1", "Ana");
        let err = room
            .add_player(Player::new("p2".to_string(), "Ana".to_string(), false))
            .unwrap_err();
        assert_eq!(err, RoomError::NicknameInUse);
    }

    #[test]
    fn join_rejected_while_playing() {
        let mut room = room();
        join(&mut room, "p1", "Ana");
        room.state = RoomState::Playing;

        let err = room
            .add_player(Player::new("p2".to_string(), "Bo".to_string(), false))
            .unwrap_err();
        assert_eq!(err, RoomError::GameAlreadyStarted);
    }

    #[test]
    fn room_full_at_max_players() {
        let mut room = room();
        for i in 0..MAX_PLAYERS {
            join(&mut room, &format!("p{i}"), &format!("n{i}"));
        }
        let err = room
            .add_player(Player::new("px".to_string(), "nx".to_string(), false))
            .unwrap_err();
        assert_eq!(err, RoomError::RoomFull);
    }

    #[test]
    fn ready_toggle_is_idempotent() {
        let mut room = room();
        join(&mut room, "p1", "Ana");
        for _ in 0..3 {
            room.set_ready("p1", true).unwrap();
        }
        assert!(room.players["p1"].is_ready);
        room.set_ready("p1", false).unwrap();
        assert!(!room.players["p1"].is_ready);
    }

    #[test]
    fn settings_validation_for_start() {
        let settings = GameSettings::default();
        assert_eq!(settings.total_players(), 7);
        assert!(settings.validate_for_start(7).is_ok());
        assert!(settings.validate_for_start(6).is_err());

        let no_mafia = GameSettings {
            villagers: 6,
            mafia: 0,
            godfather: 0,
            ..GameSettings::default()
        };
        assert!(no_mafia.validate_for_start(8).is_err());

        let two_godfathers = GameSettings {
            villagers: 2,
            mafia: 1,
            godfather: 2,
            ..GameSettings::default()
        };
        assert!(two_godfathers.validate_for_start(7).is_err());

        let two_doctors = GameSettings {
            villagers: 2,
            doctor: 2,
            ..GameSettings::default()
        };
        assert_eq!(two_doctors.total_players(), 7);
        assert!(two_doctors.validate_for_start(7).is_err());
    }
}
