use std::sync::Arc;

use crate::game::GameError;
use crate::protocol::messages::{
    DayVotePayload, GhostChatBroadcastPayload, GhostChatPayload, NightActionPayload,
};
use crate::protocol::{ErrorCode, PlayerId, ServerMessage};

use super::{GameServer, PlayerSession};

const MAX_GHOST_CHAT_LEN: usize = 500;

fn non_empty(target_id: String) -> Option<PlayerId> {
    (!target_id.is_empty()).then_some(target_id)
}

impl GameServer {
    pub(super) fn handle_start_game(self: &Arc<Self>, session: &PlayerSession) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };

        match self.runtime.start_game(&code, &player_id) {
            Ok(()) => {
                tracing::info!(room = %code, host = %player_id, "game started");
            }
            Err(err) => {
                let code = match err {
                    GameError::NotHost => ErrorCode::NotHost,
                    GameError::NotEnoughPlayers => ErrorCode::NotEnoughPlayers,
                    GameError::NotAllReady => ErrorCode::NotAllReady,
                    _ => ErrorCode::StartFailed,
                };
                self.send_error(&player_id, code, &err.to_string());
            }
        }
    }

    pub(super) fn handle_night_action(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: NightActionPayload,
    ) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };

        let result =
            self.runtime
                .submit_night_action(&code, &player_id, non_empty(payload.target_id));
        if let Err(err) = result {
            let code = match err {
                GameError::InvalidPhase => ErrorCode::InvalidPhase,
                GameError::PlayerDead => ErrorCode::PlayerDead,
                GameError::InvalidTarget
                | GameError::MafiaTargetsMafia
                | GameError::CannotTargetSelf => ErrorCode::InvalidTarget,
                _ => ErrorCode::ActionFailed,
            };
            self.send_error(&player_id, code, &err.to_string());
        }
    }

    pub(super) fn handle_day_vote(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: DayVotePayload,
    ) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };

        let result = self
            .runtime
            .submit_day_vote(&code, &player_id, non_empty(payload.target_id));
        if let Err(err) = result {
            let code = match err {
                GameError::InvalidPhase => ErrorCode::InvalidPhase,
                GameError::PlayerDead => ErrorCode::PlayerDead,
                GameError::InvalidTarget | GameError::CannotTargetSelf => ErrorCode::InvalidTarget,
                _ => ErrorCode::VoteFailed,
            };
            self.send_error(&player_id, code, &err.to_string());
        }
    }

    /// Dead-only chat, fanned out to the dead subset of the room.
    /// Eligibility is status at send time.
    pub(super) fn handle_ghost_chat(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: GhostChatPayload,
    ) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };

        if payload.message.is_empty() || payload.message.chars().count() > MAX_GHOST_CHAT_LEN {
            self.send_error(
                &player_id,
                ErrorCode::InvalidMessage,
                "Message must be 1-500 characters",
            );
            return;
        }

        let Some(game) = self.runtime.game(&code) else {
            self.send_error(&player_id, ErrorCode::ActionFailed, "Game not found");
            return;
        };

        let (is_dead, nickname, dead_ids) = {
            let game = game.read().expect("game lock poisoned");
            let room = game.room.read().expect("room lock poisoned");
            let Some(player) = room.player(&player_id) else {
                self.send_error(&player_id, ErrorCode::ActionFailed, "Player not found");
                return;
            };
            let dead_ids: Vec<PlayerId> = room
                .players
                .values()
                .filter(|p| !p.is_alive())
                .map(|p| p.id.clone())
                .collect();
            (!player.is_alive(), player.nickname.clone(), dead_ids)
        };

        if !is_dead {
            self.send_error(
                &player_id,
                ErrorCode::NotDead,
                "Only dead players can use ghost chat",
            );
            return;
        }

        let message_len = payload.message.len();
        self.hub.broadcast_to_players(
            &code,
            &dead_ids,
            ServerMessage::GhostChatBroadcast(GhostChatBroadcastPayload {
                from_id: player_id.clone(),
                from_nickname: nickname,
                message: payload.message,
                timestamp: chrono::Utc::now().timestamp_millis(),
            }),
        );

        tracing::debug!(room = %code, from = %player_id, message_len, "ghost chat sent");
    }
}
