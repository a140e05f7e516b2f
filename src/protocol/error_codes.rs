use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable wire error codes sent in `error` frames.
///
/// The serialized form of each code is part of the client protocol and must
/// not change; clients match on these strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Protocol errors
    InvalidMessage,
    InvalidPayload,
    UnknownMessage,

    // Input validation
    InvalidNickname,
    InvalidRoomCode,

    // Room errors
    RoomNotFound,
    WrongPassword,
    RoomFull,
    NicknameInUse,
    GameStarted,
    NotInRoom,

    // Authorization / lobby preconditions
    NotHost,
    NotEnoughPlayers,
    NotAllReady,

    // Game preconditions
    InvalidPhase,
    PlayerDead,
    InvalidTarget,
    NotDead,

    // Operation failures (generic, with a human message)
    CreateFailed,
    JoinFailed,
    LeaveFailed,
    ReadyFailed,
    SettingsFailed,
    StartFailed,
    ActionFailed,
    VoteFailed,
    ReconnectFailed,

    // Voice errors
    VoiceUnavailable,
    VoiceJoinFailed,
    VoiceOfferFailed,
}

impl ErrorCode {
    /// Wire representation, identical to the serde rename.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessage => "invalid_message",
            Self::InvalidPayload => "invalid_payload",
            Self::UnknownMessage => "unknown_message",
            Self::InvalidNickname => "invalid_nickname",
            Self::InvalidRoomCode => "invalid_room_code",
            Self::RoomNotFound => "room_not_found",
            Self::WrongPassword => "wrong_password",
            Self::RoomFull => "room_full",
            Self::NicknameInUse => "nickname_in_use",
            Self::GameStarted => "game_started",
            Self::NotInRoom => "not_in_room",
            Self::NotHost => "not_host",
            Self::NotEnoughPlayers => "not_enough_players",
            Self::NotAllReady => "not_all_ready",
            Self::InvalidPhase => "invalid_phase",
            Self::PlayerDead => "player_dead",
            Self::InvalidTarget => "invalid_target",
            Self::NotDead => "not_dead",
            Self::CreateFailed => "create_failed",
            Self::JoinFailed => "join_failed",
            Self::LeaveFailed => "leave_failed",
            Self::ReadyFailed => "ready_failed",
            Self::SettingsFailed => "settings_failed",
            Self::StartFailed => "start_failed",
            Self::ActionFailed => "action_failed",
            Self::VoteFailed => "vote_failed",
            Self::ReconnectFailed => "reconnect_failed",
            Self::VoiceUnavailable => "voice_unavailable",
            Self::VoiceJoinFailed => "voice_join_failed",
            Self::VoiceOfferFailed => "voice_offer_failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
