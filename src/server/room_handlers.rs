use std::sync::Arc;

use crate::protocol::messages::{
    CreateRoomPayload, JoinRoomPayload, PlayerDisconnectedPayload, PlayerJoinedPayload,
    PlayerLeftPayload, PlayerReadyPayload, PlayerReconnectedPayload, ReadyPayload,
    ReconnectPayload, RoomCreatedPayload, RoomJoinedPayload, RoomStatePayload, VoiceLeftPayload,
};
use crate::protocol::{validation, ErrorCode, ServerMessage};
use crate::room::registry::ReconnectTimeout;
use crate::room::{GameSettings, RoomError, RoomState, SharedRoom};

use super::{GameServer, PlayerSession};

impl GameServer {
    pub(super) fn handle_create_room(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: CreateRoomPayload,
    ) {
        let player_id = session.player_id();

        if let Err(reason) = validation::validate_nickname(&payload.nickname) {
            self.send_error(&player_id, ErrorCode::InvalidNickname, &reason);
            return;
        }
        if self.hub.client_room(&player_id).is_some() {
            self.send_error(&player_id, ErrorCode::CreateFailed, "Already in a room");
            return;
        }

        let room = self.registry.create_room(&payload.password);
        let code = room.read().expect("room lock poisoned").code.clone();

        if let Err(err) = self
            .registry
            .join_room(&code, &payload.password, &player_id, &payload.nickname)
        {
            self.send_error(&player_id, ErrorCode::JoinFailed, &err.to_string());
            return;
        }

        self.hub.join_room(&player_id, &code);

        self.send(
            &player_id,
            ServerMessage::RoomCreated(RoomCreatedPayload {
                room_code: code.clone(),
                player_id: player_id.clone(),
            }),
        );
        self.send_room_state(&player_id, &room);

        tracing::info!(room = %code, player_id = %player_id, nickname = %payload.nickname, "room created and joined");
    }

    pub(super) fn handle_join_room(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: JoinRoomPayload,
    ) {
        let player_id = session.player_id();

        if let Err(reason) = validation::validate_nickname(&payload.nickname) {
            self.send_error(&player_id, ErrorCode::InvalidNickname, &reason);
            return;
        }
        if let Err(reason) = validation::validate_room_code(&payload.room_code) {
            self.send_error(&player_id, ErrorCode::InvalidRoomCode, &reason);
            return;
        }
        if self.hub.client_room(&player_id).is_some() {
            self.send_error(&player_id, ErrorCode::JoinFailed, "Already in a room");
            return;
        }

        let room = match self.registry.join_room(
            &payload.room_code,
            &payload.password,
            &player_id,
            &payload.nickname,
        ) {
            Ok(room) => room,
            Err(err) => {
                let code = match err {
                    RoomError::RoomNotFound => ErrorCode::RoomNotFound,
                    RoomError::WrongPassword => ErrorCode::WrongPassword,
                    RoomError::RoomFull => ErrorCode::RoomFull,
                    RoomError::NicknameInUse => ErrorCode::NicknameInUse,
                    RoomError::GameAlreadyStarted => ErrorCode::GameStarted,
                    RoomError::PlayerNotFound | RoomError::NotHost => ErrorCode::JoinFailed,
                };
                self.send_error(&player_id, code, &err.to_string());
                return;
            }
        };

        self.hub.join_room(&player_id, &payload.room_code);

        let (players, settings, joined_dto) = {
            let room = room.read().expect("room lock poisoned");
            let dto = room.player(&player_id).map(|p| p.to_dto());
            (room.player_dtos(), room.settings, dto)
        };

        self.send(
            &player_id,
            ServerMessage::RoomJoined(Box::new(RoomJoinedPayload {
                room_code: payload.room_code.clone(),
                player_id: player_id.clone(),
                players,
                settings,
            })),
        );

        if let Some(player) = joined_dto {
            self.hub.broadcast_to_room(
                &payload.room_code,
                ServerMessage::PlayerJoined(PlayerJoinedPayload { player }),
                Some(&player_id),
            );
        }

        tracing::info!(room = %payload.room_code, player_id = %player_id, nickname = %payload.nickname, "player joined room");
    }

    pub(super) fn handle_leave_room(self: &Arc<Self>, session: &PlayerSession) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };

        let was_playing = self
            .registry
            .get_room(&code)
            .map(|room| room.read().expect("room lock poisoned").state == RoomState::Playing)
            .unwrap_or(false);

        let (player, new_host) = match self.registry.leave_room(&code, &player_id) {
            Ok(result) => result,
            Err(_) => {
                self.send_error(&player_id, ErrorCode::LeaveFailed, "Failed to leave room");
                return;
            }
        };

        self.hub.leave_room(&player_id);

        self.hub.broadcast_to_room(
            &code,
            ServerMessage::PlayerLeft(PlayerLeftPayload {
                player_id: player.id,
                new_host,
            }),
            None,
        );

        // A departure mid-game can hand either side the win.
        if was_playing {
            self.runtime.check_win_after_departure(&code);
        }

        tracing::info!(room = %code, player_id = %player_id, "player left room");
    }

    pub(super) fn handle_reconnect(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: ReconnectPayload,
    ) {
        let current_id = session.player_id();
        let original_id = payload.player_id;

        if self.registry.can_reconnect(&original_id).is_none() {
            self.send_error(
                &current_id,
                ErrorCode::ReconnectFailed,
                "No active session to reconnect to",
            );
            return;
        }

        let room = match self.registry.reconnect(&original_id) {
            Ok(room) => room,
            Err(err) => {
                self.send_error(&current_id, ErrorCode::ReconnectFailed, &err.to_string());
                return;
            }
        };
        let code = room.read().expect("room lock poisoned").code.clone();

        let Some((role_payload, phase_payload)) =
            self.runtime.reconnect_state(&code, &original_id)
        else {
            self.send_error(&current_id, ErrorCode::ReconnectFailed, "Game no longer exists");
            return;
        };

        // Re-key the connection to its pre-disconnect identity.
        self.hub.rekey(&current_id, &original_id);
        session.set_player_id(original_id.clone());
        self.hub.join_room(&original_id, &code);

        let nickname = room
            .read()
            .expect("room lock poisoned")
            .player(&original_id)
            .map(|p| p.nickname.clone())
            .unwrap_or_default();

        self.send_room_state(&original_id, &room);
        self.send(&original_id, ServerMessage::RoleAssigned(role_payload));
        self.send(&original_id, ServerMessage::PhaseChanged(phase_payload));

        self.hub.broadcast_to_room(
            &code,
            ServerMessage::PlayerReconnected(PlayerReconnectedPayload {
                player_id: original_id.clone(),
                nickname,
            }),
            Some(&original_id),
        );

        tracing::info!(room = %code, player_id = %original_id, "player reconnected");
    }

    pub(super) fn handle_ready(self: &Arc<Self>, session: &PlayerSession, payload: ReadyPayload) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };

        if self
            .registry
            .set_ready(&code, &player_id, payload.ready)
            .is_err()
        {
            self.send_error(&player_id, ErrorCode::ReadyFailed, "Failed to set ready state");
            return;
        }

        self.hub.broadcast_to_room(
            &code,
            ServerMessage::PlayerReady(PlayerReadyPayload {
                player_id,
                ready: payload.ready,
            }),
            None,
        );
    }

    pub(super) fn handle_update_settings(
        self: &Arc<Self>,
        session: &PlayerSession,
        settings: GameSettings,
    ) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };

        match self.registry.update_settings(&code, &player_id, settings) {
            Ok(()) => {
                self.hub
                    .broadcast_to_room(&code, ServerMessage::SettingsUpdated(settings), None);
            }
            Err(RoomError::NotHost) => {
                self.send_error(&player_id, ErrorCode::NotHost, "Only host can update settings");
            }
            Err(_) => {
                self.send_error(&player_id, ErrorCode::SettingsFailed, "Failed to update settings");
            }
        }
    }

    pub(super) fn send_room_state(&self, player_id: &str, room: &SharedRoom) {
        let payload = {
            let room = room.read().expect("room lock poisoned");
            RoomStatePayload {
                room_code: room.code.clone(),
                players: room.player_dtos(),
                settings: room.settings,
                state: room.state,
            }
        };
        self.send(player_id, ServerMessage::RoomState(Box::new(payload)));
    }

    /// Connection teardown: leave voice, then either park the player for
    /// reconnection (game in progress) or evict them.
    pub fn handle_disconnect(self: &Arc<Self>, session: &PlayerSession) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            return;
        };

        if let Some(voice) = &self.voice {
            voice.leave_voice(&code, &player_id);
            self.hub.broadcast_to_room(
                &code,
                ServerMessage::VoiceLeft(VoiceLeftPayload {
                    player_id: player_id.clone(),
                }),
                None,
            );
        }

        if self.registry.mark_disconnected(&code, &player_id) {
            self.hub.broadcast_to_room(
                &code,
                ServerMessage::PlayerDisconnected(PlayerDisconnectedPayload {
                    player_id: player_id.clone(),
                }),
                Some(&player_id),
            );
            tracing::info!(room = %code, player_id = %player_id, "player disconnected during game, awaiting reconnect");
            return;
        }

        match self.registry.leave_room(&code, &player_id) {
            Ok((player, new_host)) => {
                self.hub.broadcast_to_room(
                    &code,
                    ServerMessage::PlayerLeft(PlayerLeftPayload {
                        player_id: player.id,
                        new_host,
                    }),
                    Some(&player_id),
                );
            }
            Err(err) => {
                tracing::warn!(room = %code, player_id = %player_id, error = %err, "error removing player on disconnect");
            }
        }
    }

    /// A parked player's reconnection window elapsed: evict them and
    /// re-evaluate the win condition.
    pub(crate) fn handle_reconnect_timeout(self: &Arc<Self>, timeout: ReconnectTimeout) {
        let ReconnectTimeout {
            room_code,
            player_id,
        } = timeout;

        match self.registry.leave_room(&room_code, &player_id) {
            Ok((player, new_host)) => {
                self.hub.broadcast_to_room(
                    &room_code,
                    ServerMessage::PlayerLeft(PlayerLeftPayload {
                        player_id: player.id,
                        new_host,
                    }),
                    None,
                );
            }
            Err(err) => {
                tracing::warn!(room = %room_code, player_id = %player_id, error = %err, "error removing timed-out player");
                return;
            }
        }

        self.runtime.check_win_after_departure(&room_code);
        tracing::info!(room = %room_code, player_id = %player_id, "disconnected player removed after timeout");
    }
}
