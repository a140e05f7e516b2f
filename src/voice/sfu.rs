use dashmap::DashMap;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::SfuConfig;
use crate::protocol::messages::VoiceCandidatePayload;
use crate::protocol::PlayerId;

use super::routing::{derive_routing, PlayerRouting, VoicePhase, VoicePlayer};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error("voice room not found: {0}")]
    RoomNotFound(String),
    #[error("participant not found: {0}")]
    ParticipantNotFound(PlayerId),
}

/// SDP negotiation seam. The media plane (codecs, ICE, RTP forwarding)
/// lives in an external engine behind this trait; the core only shuttles
/// session descriptions through it.
pub trait MediaNegotiator: Send + Sync {
    fn answer(&self, room_code: &str, player_id: &str, offer_sdp: &str) -> String;
}

/// In-process negotiator used in tests and local development: echoes the
/// offer back as the answer.
pub struct LoopbackNegotiator;

impl MediaNegotiator for LoopbackNegotiator {
    fn answer(&self, _room_code: &str, _player_id: &str, offer_sdp: &str) -> String {
        offer_sdp.to_string()
    }
}

/// A voice participant handle: permissions, speaking indicator, and the
/// ICE candidates forwarded for the media engine.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: PlayerId,
    pub can_speak: bool,
    pub can_hear: Vec<PlayerId>,
    pub is_speaking: bool,
    pub candidates: Vec<VoiceCandidatePayload>,
}

impl Participant {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            can_speak: true,
            can_hear: Vec::new(),
            is_speaking: false,
            candidates: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct VoiceRoom {
    participants: HashMap<PlayerId, Participant>,
}

/// Selective forwarding unit signaling facade: voice rooms keyed by room
/// code, participant handles, and routing application.
pub struct Sfu {
    config: SfuConfig,
    rooms: DashMap<String, VoiceRoom>,
    negotiator: Box<dyn MediaNegotiator>,
}

impl Sfu {
    pub fn new(config: SfuConfig, negotiator: Box<dyn MediaNegotiator>) -> Self {
        tracing::info!(
            udp_port_range = %format!("{}-{}", config.udp_port_min, config.udp_port_max),
            stun_server = %config.stun_server,
            "SFU initialized"
        );
        Self {
            config,
            rooms: DashMap::new(),
            negotiator,
        }
    }

    pub fn config(&self) -> &SfuConfig {
        &self.config
    }

    /// Add a participant, creating the voice room on first join.
    /// Idempotent for an already-joined player.
    pub fn join_voice(&self, room_code: &str, player_id: &str) {
        let mut room = self.rooms.entry(room_code.to_string()).or_default();
        room.participants
            .entry(player_id.to_string())
            .or_insert_with(|| Participant::new(player_id.to_string()));
        tracing::debug!(room = %room_code, player = %player_id, "player joined voice");
    }

    /// Remove a participant; the room is dropped when it empties.
    pub fn leave_voice(&self, room_code: &str, player_id: &str) {
        let now_empty = {
            let Some(mut room) = self.rooms.get_mut(room_code) else {
                return;
            };
            room.participants.remove(player_id);
            room.participants.is_empty()
        };
        if now_empty {
            self.rooms.remove(room_code);
            tracing::debug!(room = %room_code, "voice room removed");
        }
    }

    /// Negotiate an SDP answer for a participant's offer.
    pub fn handle_offer(
        &self,
        room_code: &str,
        player_id: &str,
        offer_sdp: &str,
    ) -> Result<String, VoiceError> {
        let room = self
            .rooms
            .get(room_code)
            .ok_or_else(|| VoiceError::RoomNotFound(room_code.to_string()))?;
        if !room.participants.contains_key(player_id) {
            return Err(VoiceError::ParticipantNotFound(player_id.to_string()));
        }
        drop(room);
        Ok(self.negotiator.answer(room_code, player_id, offer_sdp))
    }

    /// Record an ICE candidate for the media engine to consume.
    pub fn add_ice_candidate(
        &self,
        room_code: &str,
        player_id: &str,
        candidate: VoiceCandidatePayload,
    ) -> Result<(), VoiceError> {
        let mut room = self
            .rooms
            .get_mut(room_code)
            .ok_or_else(|| VoiceError::RoomNotFound(room_code.to_string()))?;
        let participant = room
            .participants
            .get_mut(player_id)
            .ok_or_else(|| VoiceError::ParticipantNotFound(player_id.to_string()))?;
        participant.candidates.push(candidate);
        Ok(())
    }

    pub fn set_speaking(&self, room_code: &str, player_id: &str, speaking: bool) {
        if let Some(mut room) = self.rooms.get_mut(room_code) {
            if let Some(participant) = room.participants.get_mut(player_id) {
                participant.is_speaking = speaking;
            }
        }
    }

    /// Apply a derived routing table to the joined participants. Players
    /// who have not joined voice are skipped.
    pub fn apply_routing(&self, room_code: &str, phase: VoicePhase, players: &[VoicePlayer]) {
        let routing = derive_routing(phase, players);
        let Some(mut room) = self.rooms.get_mut(room_code) else {
            return;
        };
        for (player_id, state) in routing {
            if let Some(participant) = room.participants.get_mut(&player_id) {
                participant.can_speak = state.can_speak;
                participant.can_hear = state.can_hear;
            }
        }
    }

    /// Snapshot a participant's current permissions.
    pub fn participant_routing(&self, room_code: &str, player_id: &str) -> Option<PlayerRouting> {
        let room = self.rooms.get(room_code)?;
        room.participants.get(player_id).map(|p| PlayerRouting {
            can_speak: p.can_speak,
            can_hear: p.can_hear.clone(),
        })
    }

    pub fn participant_count(&self, room_code: &str) -> usize {
        self.rooms
            .get(room_code)
            .map(|room| room.participants.len())
            .unwrap_or(0)
    }

    pub fn remove_room(&self, room_code: &str) {
        if self.rooms.remove(room_code).is_some() {
            tracing::debug!(room = %room_code, "voice room removed");
        }
    }

    /// Teardown: drop every voice room.
    pub fn close(&self) {
        self.rooms.clear();
        tracing::info!("SFU shut down");
    }
}
