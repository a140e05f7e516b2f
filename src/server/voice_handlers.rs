use std::sync::Arc;

use crate::protocol::messages::{
    SpeakingStatePayload, VoiceAnswerPayload, VoiceCandidatePayload, VoiceJoinedPayload,
    VoiceLeftPayload, VoiceOfferPayload,
};
use crate::protocol::{ErrorCode, ServerMessage};

use super::{GameServer, PlayerSession};

impl GameServer {
    pub(super) fn handle_voice_join(self: &Arc<Self>, session: &PlayerSession) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };
        let Some(voice) = &self.voice else {
            self.send_error(&player_id, ErrorCode::VoiceUnavailable, "Voice chat is not available");
            return;
        };

        voice.join_voice(&code, &player_id);

        self.hub.broadcast_to_room(
            &code,
            ServerMessage::VoiceJoined(VoiceJoinedPayload {
                player_id: player_id.clone(),
            }),
            Some(&player_id),
        );

        tracing::info!(room = %code, player = %player_id, "player joined voice");
    }

    pub(super) fn handle_voice_leave(self: &Arc<Self>, session: &PlayerSession) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            return;
        };

        if let Some(voice) = &self.voice {
            voice.leave_voice(&code, &player_id);
        }

        self.hub.broadcast_to_room(
            &code,
            ServerMessage::VoiceLeft(VoiceLeftPayload {
                player_id: player_id.clone(),
            }),
            Some(&player_id),
        );

        tracing::info!(room = %code, player = %player_id, "player left voice");
    }

    pub(super) fn handle_voice_offer(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: VoiceOfferPayload,
    ) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };
        let Some(voice) = &self.voice else {
            self.send_error(&player_id, ErrorCode::VoiceUnavailable, "Voice chat is not available");
            return;
        };

        match voice.handle_offer(&code, &player_id, &payload.sdp) {
            Ok(sdp) => {
                self.send(&player_id, ServerMessage::VoiceAnswer(VoiceAnswerPayload { sdp }));
                tracing::debug!(room = %code, player = %player_id, "voice offer/answer complete");
            }
            Err(err) => {
                self.send_error(&player_id, ErrorCode::VoiceOfferFailed, &err.to_string());
            }
        }
    }

    pub(super) fn handle_voice_candidate(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: VoiceCandidatePayload,
    ) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            self.send_error(&player_id, ErrorCode::NotInRoom, "Not in a room");
            return;
        };
        let Some(voice) = &self.voice else {
            self.send_error(&player_id, ErrorCode::VoiceUnavailable, "Voice chat is not available");
            return;
        };

        if let Err(err) = voice.add_ice_candidate(&code, &player_id, payload) {
            tracing::warn!(player = %player_id, error = %err, "failed to add ICE candidate");
        }
    }

    pub(super) fn handle_speaking_state(
        self: &Arc<Self>,
        session: &PlayerSession,
        payload: SpeakingStatePayload,
    ) {
        let player_id = session.player_id();
        let Some(code) = self.hub.client_room(&player_id) else {
            return;
        };

        if let Some(voice) = &self.voice {
            voice.set_speaking(&code, &player_id, payload.speaking);
        }

        self.hub.broadcast_to_room(
            &code,
            ServerMessage::SpeakingState(SpeakingStatePayload {
                player_id: player_id.clone(),
                speaking: payload.speaking,
            }),
            Some(&player_id),
        );
    }
}
