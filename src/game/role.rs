use serde::{Deserialize, Serialize};

/// A player's role, assigned at game start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Villager,
    Mafia,
    Godfather,
    Doctor,
    Detective,
}

/// The team a role wins with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Town,
    Mafia,
}

impl Role {
    pub fn team(self) -> Team {
        match self {
            Self::Mafia | Self::Godfather => Team::Mafia,
            Self::Villager | Self::Doctor | Self::Detective => Team::Town,
        }
    }

    /// Whether this role submits a night action.
    pub fn can_act_at_night(self) -> bool {
        !matches!(self, Self::Villager)
    }
}
