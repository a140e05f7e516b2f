use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};

use crate::protocol::ids::generate_room_code;
use crate::protocol::PlayerId;

use super::{GameSettings, Player, Room, RoomError, RoomState, SharedRoom};

/// How long a player of an in-progress game may stay disconnected before
/// being removed.
pub const RECONNECT_WINDOW: Duration = Duration::from_secs(60);

/// How long an empty room persists before deletion.
pub const EMPTY_ROOM_TTL: Duration = Duration::from_secs(300);

/// A disconnected player awaiting reconnection. Exists only while the
/// underlying player is still in a playing room with `is_connected == false`.
#[derive(Debug)]
struct DisconnectedEntry {
    room_code: String,
    expires_at: Instant,
    generation: u64,
    cancel: watch::Sender<bool>,
}

/// Notification that a disconnected player's window elapsed. Consumed by
/// the router, which removes the player and broadcasts the departure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectTimeout {
    pub room_code: String,
    pub player_id: PlayerId,
}

/// Thread-safe registry of rooms keyed by code.
///
/// Owns room lifecycle (creation, TTL expiry, deletion) and the
/// disconnect/reconnect bookkeeping for in-progress games.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, SharedRoom>>,
    disconnected: Mutex<HashMap<PlayerId, DisconnectedEntry>>,
    ttl_timers: Mutex<HashMap<String, watch::Sender<bool>>>,
    timeout_tx: mpsc::UnboundedSender<ReconnectTimeout>,
    generation: Mutex<u64>,
}

impl RoomRegistry {
    /// Create a registry and the channel on which reconnect timeouts are
    /// delivered.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ReconnectTimeout>) {
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            disconnected: Mutex::new(HashMap::new()),
            ttl_timers: Mutex::new(HashMap::new()),
            timeout_tx,
            generation: Mutex::new(0),
        });
        (registry, timeout_rx)
    }

    /// Create a room with a fresh unique code. The password, if non-empty,
    /// is stored as a SHA-256 hex digest.
    pub fn create_room(&self, password: &str) -> SharedRoom {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");

        let code = loop {
            let candidate = generate_room_code();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let password_hash = (!password.is_empty()).then(|| hash_password(password));
        let room: SharedRoom = Arc::new(RwLock::new(Room::new(code.clone(), password_hash)));
        rooms.insert(code.clone(), room.clone());

        tracing::info!(room = %code, has_password = !password.is_empty(), "room created");
        room
    }

    pub fn get_room(&self, code: &str) -> Result<SharedRoom, RoomError> {
        self.rooms
            .read()
            .expect("rooms lock poisoned")
            .get(code)
            .cloned()
            .ok_or(RoomError::RoomNotFound)
    }

    /// Add a player to a room, verifying the password and cancelling any
    /// pending empty-room TTL.
    pub fn join_room(
        &self,
        code: &str,
        password: &str,
        player_id: &str,
        nickname: &str,
    ) -> Result<SharedRoom, RoomError> {
        let room = self.get_room(code)?;

        {
            let room = room.read().expect("room lock poisoned");
            if room.has_password()
                && room.password_hash.as_deref() != Some(hash_password(password).as_str())
            {
                return Err(RoomError::WrongPassword);
            }
        }

        self.cancel_room_ttl(code);

        let player = Player::new(player_id.to_string(), nickname.to_string(), false);
        room.write().expect("room lock poisoned").add_player(player)?;

        tracing::info!(room = %code, player_id, nickname, "player joined room");
        Ok(room)
    }

    /// Remove a player. Returns the removed player and the promoted host,
    /// if any. Arms the empty-room TTL when the last player leaves.
    pub fn leave_room(
        self: &Arc<Self>,
        code: &str,
        player_id: &str,
    ) -> Result<(Player, Option<PlayerId>), RoomError> {
        let room = self.get_room(code)?;

        self.cancel_reconnect_timer(player_id);

        let (player, new_host, now_empty) = {
            let mut room = room.write().expect("room lock poisoned");
            let (player, new_host) = room
                .remove_player(player_id)
                .ok_or(RoomError::PlayerNotFound)?;
            (player, new_host, room.is_empty())
        };

        tracing::info!(
            room = %code,
            player_id,
            nickname = %player.nickname,
            new_host = new_host.as_deref().unwrap_or(""),
            "player left room"
        );

        if now_empty {
            self.arm_room_ttl(code);
        }

        Ok((player, new_host))
    }

    pub fn set_ready(&self, code: &str, player_id: &str, ready: bool) -> Result<(), RoomError> {
        let room = self.get_room(code)?;
        let result = room
            .write()
            .expect("room lock poisoned")
            .set_ready(player_id, ready);
        result
    }

    /// Host-only settings update. Count validation happens at game start.
    pub fn update_settings(
        &self,
        code: &str,
        player_id: &str,
        settings: GameSettings,
    ) -> Result<(), RoomError> {
        let room = self.get_room(code)?;
        let mut room = room.write().expect("room lock poisoned");
        let player = room.player(player_id).ok_or(RoomError::PlayerNotFound)?;
        if !player.is_host {
            return Err(RoomError::NotHost);
        }
        room.settings = settings;
        tracing::debug!(room = %code, by = player_id, "settings updated");
        Ok(())
    }

    pub fn delete_room(&self, code: &str) {
        self.cancel_room_ttl(code);
        if self
            .rooms
            .write()
            .expect("rooms lock poisoned")
            .remove(code)
            .is_some()
        {
            tracing::info!(room = %code, "room deleted");
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().expect("rooms lock poisoned").len()
    }

    /// Mark a player of an in-progress game as disconnected and arm the
    /// reconnection timer. Returns false when the room is not playing (the
    /// caller should evict the player instead).
    pub fn mark_disconnected(self: &Arc<Self>, code: &str, player_id: &str) -> bool {
        let Ok(room) = self.get_room(code) else {
            return false;
        };

        {
            let mut room = room.write().expect("room lock poisoned");
            if room.state != RoomState::Playing {
                return false;
            }
            let Some(player) = room.player_mut(player_id) else {
                return false;
            };
            player.is_connected = false;
        }

        let generation = {
            let mut gen = self.generation.lock().expect("generation lock poisoned");
            *gen += 1;
            *gen
        };

        let expires_at = Instant::now() + RECONNECT_WINDOW;
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        {
            let mut disconnected = self.disconnected.lock().expect("disconnected lock poisoned");
            // Replacing an existing entry implicitly cancels its timer when
            // the old sender drops.
            disconnected.insert(
                player_id.to_string(),
                DisconnectedEntry {
                    room_code: code.to_string(),
                    expires_at,
                    generation,
                    cancel: cancel_tx,
                },
            );
        }

        tracing::info!(
            room = %code,
            player_id,
            timeout_secs = RECONNECT_WINDOW.as_secs(),
            "player disconnected, awaiting reconnect"
        );

        let registry = Arc::clone(self);
        let player_id = player_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(expires_at) => {
                    registry.handle_reconnect_expiry(&player_id, generation);
                }
                _ = cancel_rx.changed() => {}
            }
        });

        true
    }

    fn handle_reconnect_expiry(&self, player_id: &str, generation: u64) {
        let entry = {
            let mut disconnected = self.disconnected.lock().expect("disconnected lock poisoned");
            match disconnected.get(player_id) {
                Some(entry) if entry.generation == generation => disconnected.remove(player_id),
                _ => None,
            }
        };

        let Some(entry) = entry else {
            // Reconnected (or superseded) before the timer fired.
            return;
        };

        tracing::info!(room = %entry.room_code, player_id, "reconnection window expired");
        let _ = self.timeout_tx.send(ReconnectTimeout {
            room_code: entry.room_code,
            player_id: player_id.to_string(),
        });
    }

    /// Look up a live disconnect record. Expiry is strict: at exactly the
    /// window boundary the record counts as timed out.
    pub fn can_reconnect(&self, player_id: &str) -> Option<String> {
        let disconnected = self.disconnected.lock().expect("disconnected lock poisoned");
        disconnected
            .get(player_id)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.room_code.clone())
    }

    /// Restore a disconnected player: cancel the timer and flip
    /// `is_connected` back on.
    pub fn reconnect(&self, player_id: &str) -> Result<SharedRoom, RoomError> {
        let entry = {
            let mut disconnected = self.disconnected.lock().expect("disconnected lock poisoned");
            let live = disconnected
                .get(player_id)
                .is_some_and(|entry| Instant::now() < entry.expires_at);
            if !live {
                return Err(RoomError::PlayerNotFound);
            }
            disconnected.remove(player_id).expect("checked above")
        };
        let _ = entry.cancel.send(true);

        let room = self.get_room(&entry.room_code)?;
        {
            let mut room = room.write().expect("room lock poisoned");
            let player = room.player_mut(player_id).ok_or(RoomError::PlayerNotFound)?;
            player.is_connected = true;
        }

        tracing::info!(room = %entry.room_code, player_id, "player reconnected");
        Ok(room)
    }

    /// Cancel a pending reconnect timer, e.g. when the player is removed.
    pub fn cancel_reconnect_timer(&self, player_id: &str) {
        let mut disconnected = self.disconnected.lock().expect("disconnected lock poisoned");
        if let Some(entry) = disconnected.remove(player_id) {
            let _ = entry.cancel.send(true);
        }
    }

    fn arm_room_ttl(self: &Arc<Self>, code: &str) {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        {
            let mut timers = self.ttl_timers.lock().expect("ttl lock poisoned");
            timers.insert(code.to_string(), cancel_tx);
        }

        tracing::info!(room = %code, ttl_secs = EMPTY_ROOM_TTL.as_secs(), "empty room TTL armed");

        let registry = Arc::clone(self);
        let code = code.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(EMPTY_ROOM_TTL) => {
                    registry.handle_ttl_expiry(&code);
                }
                _ = cancel_rx.changed() => {}
            }
        });
    }

    fn handle_ttl_expiry(&self, code: &str) {
        {
            let mut timers = self.ttl_timers.lock().expect("ttl lock poisoned");
            if timers.remove(code).is_none() {
                return;
            }
        }

        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        let still_empty = rooms
            .get(code)
            .is_some_and(|room| room.read().expect("room lock poisoned").is_empty());
        if still_empty {
            rooms.remove(code);
            tracing::info!(room = %code, "empty room expired and deleted");
        }
    }

    fn cancel_room_ttl(&self, code: &str) {
        let mut timers = self.ttl_timers.lock().expect("ttl lock poisoned");
        if let Some(cancel) = timers.remove(code) {
            let _ = cancel.send(true);
            tracing::debug!(room = %code, "empty room TTL cancelled");
        }
    }

    /// Teardown: cancel every outstanding TTL and reconnect timer.
    pub fn shutdown(&self) {
        let mut timers = self.ttl_timers.lock().expect("ttl lock poisoned");
        for (_, cancel) in timers.drain() {
            let _ = cancel.send(true);
        }
        drop(timers);

        let mut disconnected = self.disconnected.lock().expect("disconnected lock poisoned");
        for (_, entry) in disconnected.drain() {
            let _ = entry.cancel.send(true);
        }
    }
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
