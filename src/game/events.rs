use crate::protocol::messages::{
    DayResultPayload, GameOverPayload, MafiaVotePayload, NightResultPayload, PhaseChangedPayload,
    RoleAssignedPayload, VoteUpdatePayload,
};
use crate::protocol::PlayerId;
use crate::voice::routing::{VoicePhase, VoicePlayer};

/// Events emitted by the game runtime through the sink installed at
/// startup. The router maps them to outbound frames and SFU routing
/// updates; targeted variants carry the recipient explicitly.
#[derive(Debug, Clone)]
pub enum GameEvent {
    GameStarted {
        room_code: String,
    },
    RoleAssigned {
        room_code: String,
        target: PlayerId,
        payload: RoleAssignedPayload,
    },
    PhaseChanged {
        room_code: String,
        payload: PhaseChangedPayload,
    },
    TimerTick {
        room_code: String,
        remaining: u64,
    },
    /// Broadcast night outcome; `target` narrows delivery to one player
    /// (the detective's investigation copy).
    NightResult {
        room_code: String,
        target: Option<PlayerId>,
        payload: NightResultPayload,
    },
    VoteUpdate {
        room_code: String,
        payload: VoteUpdatePayload,
    },
    MafiaVote {
        room_code: String,
        targets: Vec<PlayerId>,
        payload: MafiaVotePayload,
    },
    DayResult {
        room_code: String,
        payload: DayResultPayload,
    },
    GameOver {
        room_code: String,
        payload: GameOverPayload,
    },
    /// Re-derive and apply voice routing from the given snapshot.
    VoiceRouting {
        room_code: String,
        phase: VoicePhase,
        players: Vec<VoicePlayer>,
    },
}
