use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::game::role::{Role, Team};
use crate::game::GamePhase;
use crate::room::{GameSettings, PlayerStatus, RoomState};
use crate::voice::routing::VoicePhase;

use super::error_codes::ErrorCode;
use super::PlayerId;

/// Wire envelope for every frame in both directions:
/// `{ "type": "<string>", "payload": <object> }`.
///
/// Inbound payloads are decoded lazily by the handler registered for the
/// type; see [`ClientMessage::decode`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Envelope {
    pub fn parse(frame: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(frame).map_err(DecodeError::MalformedFrame)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound frame decoding errors, each mapping to a distinct wire code.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("invalid payload for `{kind}`: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MalformedFrame(_) => ErrorCode::InvalidMessage,
            Self::UnknownType(_) => ErrorCode::UnknownMessage,
            Self::InvalidPayload { .. } => ErrorCode::InvalidPayload,
        }
    }
}

/// Messages accepted from clients.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    CreateRoom(CreateRoomPayload),
    JoinRoom(JoinRoomPayload),
    LeaveRoom,
    Reconnect(ReconnectPayload),
    Ready(ReadyPayload),
    UpdateSettings(GameSettings),
    StartGame,
    NightAction(NightActionPayload),
    DayVote(DayVotePayload),
    GhostChat(GhostChatPayload),
    VoiceJoin,
    VoiceLeave,
    VoiceOffer(VoiceOfferPayload),
    /// Accepted for protocol symmetry; the server is the answering side.
    VoiceAnswer(VoiceAnswerPayload),
    VoiceCandidate(VoiceCandidatePayload),
    SpeakingState(SpeakingStatePayload),
}

impl ClientMessage {
    /// Decode an envelope into a typed client message.
    pub fn decode(envelope: Envelope) -> Result<Self, DecodeError> {
        fn payload<T: serde::de::DeserializeOwned>(
            kind: &str,
            value: Value,
        ) -> Result<T, DecodeError> {
            serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload {
                kind: kind.to_string(),
                source,
            })
        }

        let Envelope { kind, payload: raw } = envelope;
        let message = match kind.as_str() {
            "create_room" => Self::CreateRoom(payload(&kind, raw)?),
            "join_room" => Self::JoinRoom(payload(&kind, raw)?),
            "leave_room" => Self::LeaveRoom,
            "reconnect" => Self::Reconnect(payload(&kind, raw)?),
            "ready" => Self::Ready(payload(&kind, raw)?),
            "update_settings" => Self::UpdateSettings(payload(&kind, raw)?),
            "start_game" => Self::StartGame,
            "night_action" => Self::NightAction(payload(&kind, raw)?),
            "day_vote" => Self::DayVote(payload(&kind, raw)?),
            "ghost_chat" => Self::GhostChat(payload(&kind, raw)?),
            "voice_join" => Self::VoiceJoin,
            "voice_leave" => Self::VoiceLeave,
            "voice_offer" => Self::VoiceOffer(payload(&kind, raw)?),
            "voice_answer" => Self::VoiceAnswer(payload(&kind, raw)?),
            "voice_candidate" => Self::VoiceCandidate(payload(&kind, raw)?),
            "speaking_state" => Self::SpeakingState(payload(&kind, raw)?),
            _ => return Err(DecodeError::UnknownType(kind)),
        };
        Ok(message)
    }
}

/// Messages sent to clients. Serializes to the wire envelope directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected(ConnectedPayload),
    Error(ErrorPayload),
    RoomCreated(RoomCreatedPayload),
    /// Boxed to keep the enum small; carries the full player roster.
    RoomJoined(Box<RoomJoinedPayload>),
    RoomState(Box<RoomStatePayload>),
    PlayerJoined(PlayerJoinedPayload),
    PlayerLeft(PlayerLeftPayload),
    PlayerReady(PlayerReadyPayload),
    PlayerDisconnected(PlayerDisconnectedPayload),
    PlayerReconnected(PlayerReconnectedPayload),
    SettingsUpdated(GameSettings),
    GameStarting,
    RoleAssigned(RoleAssignedPayload),
    PhaseChanged(PhaseChangedPayload),
    TimerTick(TimerTickPayload),
    NightResult(Box<NightResultPayload>),
    VoteUpdate(VoteUpdatePayload),
    MafiaVote(MafiaVotePayload),
    DayResult(Box<DayResultPayload>),
    GameOver(Box<GameOverPayload>),
    GhostChatBroadcast(GhostChatBroadcastPayload),
    VoiceJoined(VoiceJoinedPayload),
    VoiceLeft(VoiceLeftPayload),
    VoiceOffer(VoiceOfferPayload),
    VoiceAnswer(VoiceAnswerPayload),
    VoiceCandidate(VoiceCandidatePayload),
    SpeakingState(SpeakingStatePayload),
    VoiceRouting(Box<VoiceRoutingPayload>),
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }
}

// --- Inbound payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateRoomPayload {
    pub nickname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinRoomPayload {
    pub room_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectPayload {
    /// The player id issued before the disconnect.
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadyPayload {
    pub ready: bool,
}

/// Night action target. Empty string means no target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NightActionPayload {
    #[serde(default)]
    pub target_id: String,
}

/// Day vote target. Empty string means abstain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayVotePayload {
    #[serde(default)]
    pub target_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GhostChatPayload {
    pub message: String,
}

// --- Outbound payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectedPayload {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomCreatedPayload {
    pub room_code: String,
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomJoinedPayload {
    pub room_code: String,
    pub player_id: PlayerId,
    pub players: Vec<PlayerDto>,
    pub settings: GameSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomStatePayload {
    pub room_code: String,
    pub players: Vec<PlayerDto>,
    pub settings: GameSettings,
    pub state: RoomState,
}

/// Player representation sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerDto {
    pub id: PlayerId,
    pub nickname: String,
    pub is_host: bool,
    pub is_ready: bool,
    pub is_connected: bool,
    pub status: PlayerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerJoinedPayload {
    pub player: PlayerDto,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerLeftPayload {
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_host: Option<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerReadyPayload {
    pub player_id: PlayerId,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerDisconnectedPayload {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerReconnectedPayload {
    pub player_id: PlayerId,
    pub nickname: String,
}

/// Mafia-team member revealed to their teammates at role assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MafiaTeammate {
    pub id: PlayerId,
    pub nickname: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleAssignedPayload {
    pub role: Role,
    pub team: Team,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teammates: Vec<MafiaTeammate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseChangedPayload {
    pub phase: GamePhase,
    pub round: u32,
    pub timer: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerTickPayload {
    pub remaining: u64,
}

/// Investigation outcome, delivered only to the detective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvestigationResult {
    pub target_id: PlayerId,
    pub target_nickname: String,
    pub is_mafia: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NightResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub killed: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub killed_nickname: Option<String>,
    pub was_saved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation: Option<InvestigationResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteUpdatePayload {
    /// Full voter -> target map; `None` target is an abstention.
    pub votes: HashMap<PlayerId, Option<PlayerId>>,
    pub submitted: Vec<PlayerId>,
}

/// Mafia-team vote update, sent to living mafia members only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MafiaVotePayload {
    pub voter_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated_nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated_role: Option<Role>,
    pub votes: HashMap<PlayerId, u32>,
    pub no_majority: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameOverPlayer {
    pub id: PlayerId,
    pub nickname: String,
    pub role: Role,
    pub status: PlayerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameOverPayload {
    pub winner: Team,
    pub players: Vec<GameOverPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GhostChatBroadcastPayload {
    pub from_id: PlayerId,
    pub from_nickname: String,
    pub message: String,
    pub timestamp: i64,
}

// --- Voice payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceJoinedPayload {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceLeftPayload {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceOfferPayload {
    pub sdp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceAnswerPayload {
    pub sdp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceCandidatePayload {
    pub candidate: String,
    pub sdp_mid: String,
    pub sdp_mline_index: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username_fragment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeakingStatePayload {
    #[serde(default)]
    pub player_id: PlayerId,
    pub speaking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceRoutingEntry {
    pub player_id: PlayerId,
    pub can_speak: bool,
    pub can_hear: Vec<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceRoutingPayload {
    pub phase: VoicePhase,
    pub players: Vec<VoiceRoutingEntry>,
}
