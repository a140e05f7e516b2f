use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::game::role::Team;
use crate::game::GamePhase;
use crate::protocol::PlayerId;

/// Phases the voice table distinguishes. Coarser than the game's state
/// machine; see the `From<GamePhase>` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoicePhase {
    Lobby,
    Night,
    Day,
    GameOver,
}

impl From<GamePhase> for VoicePhase {
    fn from(phase: GamePhase) -> Self {
        match phase {
            GamePhase::RoleReveal => Self::Lobby,
            GamePhase::Night | GamePhase::NightResult => Self::Night,
            GamePhase::Day | GamePhase::DayResult => Self::Day,
            GamePhase::GameOver => Self::GameOver,
        }
    }
}

/// Per-player input to the routing derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePlayer {
    pub id: PlayerId,
    pub team: Team,
    pub is_alive: bool,
}

/// Per-player output: transmit permission and the audible set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRouting {
    pub can_speak: bool,
    pub can_hear: Vec<PlayerId>,
}

/// Derive speak/hear capabilities from phase, team, and alive state.
///
/// | Phase     | Alive town        | Alive mafia             | Dead              |
/// |-----------|-------------------|-------------------------|-------------------|
/// | lobby     | speak, hear all   | speak, hear all         | (none in lobby)   |
/// | night     | muted, hear ∅     | speak, hear alive mafia | muted, hear ∅     |
/// | day       | speak, hear alive | speak, hear alive       | muted, hear alive |
/// | game_over | speak, hear all   | speak, hear all         | speak, hear all   |
pub fn derive_routing(
    phase: VoicePhase,
    players: &[VoicePlayer],
) -> HashMap<PlayerId, PlayerRouting> {
    let all: Vec<PlayerId> = players.iter().map(|p| p.id.clone()).collect();
    let alive: Vec<PlayerId> = players
        .iter()
        .filter(|p| p.is_alive)
        .map(|p| p.id.clone())
        .collect();
    let alive_mafia: Vec<PlayerId> = players
        .iter()
        .filter(|p| p.is_alive && p.team == Team::Mafia)
        .map(|p| p.id.clone())
        .collect();

    players
        .iter()
        .map(|player| {
            let routing = match phase {
                VoicePhase::Lobby | VoicePhase::GameOver => PlayerRouting {
                    can_speak: true,
                    can_hear: all.clone(),
                },
                VoicePhase::Night => {
                    if player.is_alive && player.team == Team::Mafia {
                        PlayerRouting {
                            can_speak: true,
                            can_hear: alive_mafia.clone(),
                        }
                    } else {
                        PlayerRouting {
                            can_speak: false,
                            can_hear: Vec::new(),
                        }
                    }
                }
                VoicePhase::Day => PlayerRouting {
                    can_speak: player.is_alive,
                    can_hear: alive.clone(),
                },
            };
            (player.id.clone(), routing)
        })
        .collect()
}
