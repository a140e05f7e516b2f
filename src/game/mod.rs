// Game module: the per-room game state machine, role assignment, night and
// day resolution, and the runtime that drives phase timers.

pub mod events;
pub mod role;
pub mod runtime;

pub use events::GameEvent;
pub use runtime::GameRuntime;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::time::{Duration, Instant};

use crate::protocol::messages::{
    GameOverPlayer, MafiaTeammate, RoleAssignedPayload, VoteUpdatePayload,
};
use crate::protocol::PlayerId;
use crate::room::{PlayerStatus, RoomState, SharedRoom, MAX_PLAYERS, MIN_PLAYERS};
use crate::voice::routing::VoicePlayer;

use role::{Role, Team};

/// Phases of the game state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    RoleReveal,
    Night,
    NightResult,
    Day,
    DayResult,
    GameOver,
}

/// Domain errors for game operations, mapped to wire codes by the router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("game not started")]
    GameNotStarted,
    #[error("invalid phase for this action")]
    InvalidPhase,
    #[error("player not found")]
    PlayerNotFound,
    #[error("player is dead")]
    PlayerDead,
    #[error("invalid target")]
    InvalidTarget,
    #[error("cannot target self")]
    CannotTargetSelf,
    #[error("mafia cannot target mafia")]
    MafiaTargetsMafia,
    #[error("only the host can do this")]
    NotHost,
    #[error("not enough players")]
    NotEnoughPlayers,
    #[error("not all players are ready")]
    NotAllReady,
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Actions collected during a night phase. Reset at every night entry.
#[derive(Debug, Default)]
pub struct NightActions {
    /// Mafia-team votes; `None` target means the voter passed.
    pub mafia_votes: HashMap<PlayerId, Option<PlayerId>>,
    /// Collective mafia target after godfather override / plurality.
    pub resolved_mafia_target: Option<PlayerId>,
    pub doctor_target: Option<PlayerId>,
    pub detective_target: Option<PlayerId>,
    /// Arrival order of the first vote each target received; breaks
    /// plurality ties deterministically.
    first_vote_seq: HashMap<PlayerId, u64>,
}

/// Votes collected during a day phase. Reset at every day entry.
#[derive(Debug, Default)]
pub struct DayVotes {
    /// Voter -> target; `None` is an abstention. Overwritable until
    /// resolution.
    pub votes: HashMap<PlayerId, Option<PlayerId>>,
    /// Grows monotonically until resolution.
    pub submitted: HashSet<PlayerId>,
    first_vote_seq: HashMap<PlayerId, u64>,
}

/// Outcome of a night phase.
#[derive(Debug, Clone, Default)]
pub struct NightOutcome {
    pub killed: Option<(PlayerId, String)>,
    pub was_saved: bool,
    pub investigation: Option<Investigation>,
}

/// Detective investigation result, delivered only to the detective.
#[derive(Debug, Clone)]
pub struct Investigation {
    pub target_id: PlayerId,
    pub target_nickname: String,
    pub is_mafia: bool,
}

/// Outcome of a day phase.
#[derive(Debug, Clone, Default)]
pub struct DayOutcome {
    pub eliminated: Option<(PlayerId, String, Role)>,
    pub vote_counts: HashMap<PlayerId, u32>,
    pub no_majority: bool,
}

/// An active game instance. Owned by the [`GameRuntime`]; holds a shared
/// handle to its room (the registry keeps ownership of the map entry).
#[derive(Debug)]
pub struct Game {
    pub room: SharedRoom,
    pub room_code: String,
    pub phase: GamePhase,
    /// Incremented on every night entry; the first night is round 1.
    pub round: u32,
    pub phase_end_time: Option<Instant>,
    pub roles: HashMap<PlayerId, Role>,
    pub night_actions: NightActions,
    pub day_votes: DayVotes,
    pub last_night_result: Option<NightOutcome>,
    pub last_day_result: Option<DayOutcome>,
    pub winner: Option<Team>,
    arrival_seq: u64,
}

impl Game {
    /// Create a game from a waiting room: validates the roster and
    /// settings, assigns roles, and moves the room to `playing`.
    pub fn new(room: SharedRoom) -> Result<Self, GameError> {
        let (room_code, roles) = {
            let mut locked = room.write().expect("room lock poisoned");

            if locked.state != RoomState::Waiting {
                return Err(GameError::InvalidPhase);
            }
            let count = locked.player_count();
            if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&count) {
                return Err(GameError::NotEnoughPlayers);
            }
            if !locked.all_ready() {
                return Err(GameError::NotAllReady);
            }
            locked
                .settings
                .validate_for_start(count)
                .map_err(GameError::InvalidSettings)?;

            // Build the role pool and shuffle it over the join order.
            let settings = locked.settings;
            let mut pool: Vec<Role> = Vec::with_capacity(count);
            pool.extend(std::iter::repeat_n(Role::Mafia, settings.mafia as usize));
            pool.extend(std::iter::repeat_n(
                Role::Godfather,
                settings.godfather as usize,
            ));
            pool.extend(std::iter::repeat_n(Role::Doctor, settings.doctor as usize));
            pool.extend(std::iter::repeat_n(
                Role::Detective,
                settings.detective as usize,
            ));
            pool.extend(std::iter::repeat_n(
                Role::Villager,
                count - pool.len(),
            ));
            pool.shuffle(&mut rand::rng());

            let mut roles = HashMap::with_capacity(count);
            let order = locked.player_order.clone();
            for (player_id, role) in order.into_iter().zip(pool) {
                if let Some(player) = locked.player_mut(&player_id) {
                    player.role = Some(role);
                }
                roles.insert(player_id, role);
            }

            locked.state = RoomState::Playing;
            (locked.code.clone(), roles)
        };

        Ok(Self {
            room,
            room_code,
            phase: GamePhase::RoleReveal,
            round: 0,
            phase_end_time: None,
            roles,
            night_actions: NightActions::default(),
            day_votes: DayVotes::default(),
            last_night_result: None,
            last_day_result: None,
            winner: None,
            arrival_seq: 0,
        })
    }

    fn next_seq(&mut self) -> u64 {
        self.arrival_seq += 1;
        self.arrival_seq
    }

    /// Enter the night phase: bump the round and reset collected actions.
    pub fn start_night(&mut self, duration: Duration) {
        self.phase = GamePhase::Night;
        self.round += 1;
        self.phase_end_time = Some(Instant::now() + duration);
        self.night_actions = NightActions::default();
    }

    /// Enter the day phase: reset votes.
    pub fn start_day(&mut self, duration: Duration) {
        self.phase = GamePhase::Day;
        self.phase_end_time = Some(Instant::now() + duration);
        self.day_votes = DayVotes::default();
    }

    /// Seconds until the current phase deadline.
    pub fn remaining_secs(&self) -> u64 {
        self.phase_end_time
            .map(|end| end.saturating_duration_since(Instant::now()).as_secs())
            .unwrap_or(0)
    }

    /// Record a night action. Returns the actor's role on success.
    pub fn submit_night_action(
        &mut self,
        player_id: &str,
        target_id: Option<PlayerId>,
    ) -> Result<Role, GameError> {
        if self.phase != GamePhase::Night {
            return Err(GameError::InvalidPhase);
        }

        let role = *self.roles.get(player_id).ok_or(GameError::PlayerNotFound)?;
        {
            let room = self.room.read().expect("room lock poisoned");
            let player = room.player(player_id).ok_or(GameError::PlayerNotFound)?;
            if !player.is_alive() {
                return Err(GameError::PlayerDead);
            }
            if !role.can_act_at_night() {
                return Err(GameError::InvalidPhase);
            }

            if let Some(target) = target_id.as_deref() {
                let target_player = room.player(target).ok_or(GameError::InvalidTarget)?;
                if !target_player.is_alive() {
                    return Err(GameError::InvalidTarget);
                }
                match role {
                    Role::Mafia | Role::Godfather => {
                        let target_role =
                            self.roles.get(target).ok_or(GameError::InvalidTarget)?;
                        if target_role.team() == Team::Mafia {
                            return Err(GameError::MafiaTargetsMafia);
                        }
                    }
                    Role::Detective => {
                        if target == player_id {
                            return Err(GameError::CannotTargetSelf);
                        }
                    }
                    // Doctor may protect anyone, self included.
                    Role::Doctor | Role::Villager => {}
                }
            }
        }

        match role {
            Role::Mafia | Role::Godfather => {
                if let Some(target) = &target_id {
                    // Arrival order is fixed at validation time and never
                    // revised, even if the vote is later overwritten.
                    if !self.night_actions.first_vote_seq.contains_key(target) {
                        let seq = self.next_seq();
                        self.night_actions
                            .first_vote_seq
                            .insert(target.clone(), seq);
                    }
                }
                self.night_actions
                    .mafia_votes
                    .insert(player_id.to_string(), target_id);
                self.resolve_mafia_target();
            }
            Role::Doctor => self.night_actions.doctor_target = target_id,
            Role::Detective => self.night_actions.detective_target = target_id,
            // Already rejected by the can_act_at_night check above.
            Role::Villager => return Err(GameError::InvalidPhase),
        }

        Ok(role)
    }

    /// Compute the collective mafia target: a godfather's non-empty vote
    /// wins outright; otherwise plurality, ties to the target whose first
    /// vote arrived earliest.
    fn resolve_mafia_target(&mut self) {
        let mut counts: HashMap<&PlayerId, u32> = HashMap::new();
        let mut godfather_vote: Option<&PlayerId> = None;

        for (voter, target) in &self.night_actions.mafia_votes {
            let Some(target) = target else { continue };
            *counts.entry(target).or_insert(0) += 1;
            if self.roles.get(voter) == Some(&Role::Godfather) {
                godfather_vote = Some(target);
            }
        }

        if let Some(target) = godfather_vote {
            self.night_actions.resolved_mafia_target = Some(target.clone());
            return;
        }

        let best = counts
            .into_iter()
            .min_by_key(|(target, count)| {
                let first_seq = self
                    .night_actions
                    .first_vote_seq
                    .get(*target)
                    .copied()
                    .unwrap_or(u64::MAX);
                (std::cmp::Reverse(*count), first_seq)
            })
            .map(|(target, _)| target.clone());
        self.night_actions.resolved_mafia_target = best;
    }

    /// Whether every living night-capable role has submitted.
    pub fn all_night_actions_complete(&self) -> bool {
        let room = self.room.read().expect("room lock poisoned");
        for (player_id, role) in &self.roles {
            let Some(player) = room.player(player_id) else {
                continue;
            };
            if !player.is_alive() || !role.can_act_at_night() {
                continue;
            }
            let submitted = match role {
                Role::Mafia | Role::Godfather => {
                    self.night_actions.mafia_votes.contains_key(player_id)
                }
                Role::Doctor => self.night_actions.doctor_target.is_some(),
                Role::Detective => self.night_actions.detective_target.is_some(),
                Role::Villager => true,
            };
            if !submitted {
                return false;
            }
        }
        true
    }

    /// Resolve the night: apply the kill (unless saved or round 1),
    /// compute the investigation, and record the outcome.
    pub fn resolve_night(&mut self) -> NightOutcome {
        self.phase = GamePhase::NightResult;
        let mut outcome = NightOutcome::default();

        let mafia_target = self.night_actions.resolved_mafia_target.clone();
        let doctor_target = self.night_actions.doctor_target.clone();

        // Round 1 is a grace night: the kill is suppressed so roles can
        // orient; every other effect still runs.
        if self.round > 1 {
            if let Some(target) = mafia_target {
                if Some(&target) == doctor_target.as_ref() {
                    outcome.was_saved = true;
                } else {
                    let mut room = self.room.write().expect("room lock poisoned");
                    if let Some(player) = room.player_mut(&target) {
                        player.status = PlayerStatus::Dead;
                        outcome.killed = Some((target, player.nickname.clone()));
                    }
                }
            }
        }

        if let Some(target) = self.night_actions.detective_target.clone() {
            let room = self.room.read().expect("room lock poisoned");
            if let Some(player) = room.player(&target) {
                // The godfather reads as innocent: only plain mafia shows.
                let is_mafia = self.roles.get(&target) == Some(&Role::Mafia);
                outcome.investigation = Some(Investigation {
                    target_id: target,
                    target_nickname: player.nickname.clone(),
                    is_mafia,
                });
            }
        }

        self.last_night_result = Some(outcome.clone());
        outcome
    }

    /// Record or overwrite a day vote. `None` is an abstention.
    pub fn submit_day_vote(
        &mut self,
        voter_id: &str,
        target_id: Option<PlayerId>,
    ) -> Result<(), GameError> {
        if self.phase != GamePhase::Day {
            return Err(GameError::InvalidPhase);
        }

        {
            let room = self.room.read().expect("room lock poisoned");
            let voter = room.player(voter_id).ok_or(GameError::PlayerNotFound)?;
            if !voter.is_alive() {
                return Err(GameError::PlayerDead);
            }

            if let Some(target) = target_id.as_deref() {
                let target_player = room.player(target).ok_or(GameError::InvalidTarget)?;
                if !target_player.is_alive() {
                    return Err(GameError::InvalidTarget);
                }
                if target == voter_id {
                    return Err(GameError::CannotTargetSelf);
                }
            }
        }

        if let Some(target) = &target_id {
            if !self.day_votes.first_vote_seq.contains_key(target) {
                let seq = self.next_seq();
                self.day_votes.first_vote_seq.insert(target.clone(), seq);
            }
        }
        self.day_votes.votes.insert(voter_id.to_string(), target_id);
        self.day_votes.submitted.insert(voter_id.to_string());
        Ok(())
    }

    /// Whether every living player has submitted a vote or abstention.
    pub fn all_day_votes_complete(&self) -> bool {
        let room = self.room.read().expect("room lock poisoned");
        room.players
            .values()
            .filter(|p| p.is_alive())
            .all(|p| self.day_votes.votes.contains_key(&p.id))
    }

    /// Resolve the day: eliminate the top candidate if the majority
    /// threshold is met, ties to the earliest-first-vote target.
    pub fn resolve_day(&mut self) -> DayOutcome {
        self.phase = GamePhase::DayResult;
        let mut outcome = DayOutcome::default();

        for target in self.day_votes.votes.values().flatten() {
            *outcome.vote_counts.entry(target.clone()).or_insert(0) += 1;
        }

        let alive = self
            .room
            .read()
            .expect("room lock poisoned")
            .alive_count();
        let threshold = (alive / 2 + 1) as u32;

        let top = outcome
            .vote_counts
            .iter()
            .min_by_key(|(target, count)| {
                let first_seq = self
                    .day_votes
                    .first_vote_seq
                    .get(*target)
                    .copied()
                    .unwrap_or(u64::MAX);
                (std::cmp::Reverse(**count), first_seq)
            })
            .map(|(target, count)| (target.clone(), *count));

        match top {
            Some((target, count)) if count >= threshold => {
                let mut room = self.room.write().expect("room lock poisoned");
                if let Some(player) = room.player_mut(&target) {
                    player.status = PlayerStatus::Dead;
                    let role = self.roles.get(&target).copied().unwrap_or(Role::Villager);
                    outcome.eliminated = Some((target.clone(), player.nickname.clone(), role));
                }
            }
            _ => outcome.no_majority = true,
        }

        self.last_day_result = Some(outcome.clone());
        outcome
    }

    /// Evaluate the win condition after any death.
    ///
    /// Mafia wins when it at least matches the town (including the
    /// degenerate 0-alive case); town wins when no mafia remains.
    pub fn check_win(&self) -> Option<Team> {
        let room = self.room.read().expect("room lock poisoned");
        let mut mafia_alive = 0usize;
        let mut town_alive = 0usize;

        for player in room.players.values() {
            if !player.is_alive() {
                continue;
            }
            match self.roles.get(&player.id).map(|r| r.team()) {
                Some(Team::Mafia) => mafia_alive += 1,
                _ => town_alive += 1,
            }
        }

        if mafia_alive >= town_alive {
            Some(Team::Mafia)
        } else if mafia_alive == 0 {
            Some(Team::Town)
        } else {
            None
        }
    }

    /// Terminal transition: record the winner and close the room.
    pub fn end_game(&mut self, winner: Team) {
        self.phase = GamePhase::GameOver;
        self.winner = Some(winner);
        self.phase_end_time = None;
        self.room.write().expect("room lock poisoned").state = RoomState::Ended;
    }

    // --- Read-side helpers for event payloads ---

    pub fn role_of(&self, player_id: &str) -> Option<Role> {
        self.roles.get(player_id).copied()
    }

    /// Role-reveal payload for one player; mafia-team members see their
    /// teammates' identities and roles.
    pub fn role_reveal_payload(&self, player_id: &str) -> Option<RoleAssignedPayload> {
        let role = self.role_of(player_id)?;
        let teammates = if role.team() == Team::Mafia {
            self.mafia_teammates(player_id)
        } else {
            Vec::new()
        };
        Some(RoleAssignedPayload {
            role,
            team: role.team(),
            teammates,
        })
    }

    pub fn mafia_teammates(&self, player_id: &str) -> Vec<MafiaTeammate> {
        let room = self.room.read().expect("room lock poisoned");
        let mut teammates: Vec<MafiaTeammate> = self
            .roles
            .iter()
            .filter(|(id, role)| id.as_str() != player_id && role.team() == Team::Mafia)
            .filter_map(|(id, role)| {
                room.player(id).map(|p| MafiaTeammate {
                    id: id.clone(),
                    nickname: p.nickname.clone(),
                    role: *role,
                })
            })
            .collect();
        teammates.sort_by(|a, b| a.id.cmp(&b.id));
        teammates
    }

    /// Living mafia-team member ids, for targeted mafia_vote fan-out.
    pub fn alive_mafia_ids(&self) -> Vec<PlayerId> {
        let room = self.room.read().expect("room lock poisoned");
        self.roles
            .iter()
            .filter(|(_, role)| role.team() == Team::Mafia)
            .filter(|(id, _)| room.player(id).is_some_and(|p| p.is_alive()))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn dead_player_ids(&self) -> Vec<PlayerId> {
        let room = self.room.read().expect("room lock poisoned");
        room.players
            .values()
            .filter(|p| !p.is_alive())
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn detective_id(&self) -> Option<PlayerId> {
        self.roles
            .iter()
            .find(|(_, role)| **role == Role::Detective)
            .map(|(id, _)| id.clone())
    }

    pub fn vote_update_payload(&self) -> VoteUpdatePayload {
        VoteUpdatePayload {
            votes: self.day_votes.votes.clone(),
            submitted: {
                let mut submitted: Vec<_> =
                    self.day_votes.submitted.iter().cloned().collect();
                submitted.sort();
                submitted
            },
        }
    }

    /// Per-player team/alive snapshot for voice routing derivation.
    pub fn voice_players(&self) -> Vec<VoicePlayer> {
        let room = self.room.read().expect("room lock poisoned");
        room.player_order
            .iter()
            .filter_map(|id| room.player(id))
            .map(|p| VoicePlayer {
                id: p.id.clone(),
                team: self
                    .roles
                    .get(&p.id)
                    .map(|r| r.team())
                    .unwrap_or(Team::Town),
                is_alive: p.is_alive(),
            })
            .collect()
    }

    /// Full roster with roles revealed, for the game-over broadcast.
    pub fn game_over_players(&self) -> Vec<GameOverPlayer> {
        let room = self.room.read().expect("room lock poisoned");
        room.player_order
            .iter()
            .filter_map(|id| room.player(id))
            .map(|p| GameOverPlayer {
                id: p.id.clone(),
                nickname: p.nickname.clone(),
                role: self.roles.get(&p.id).copied().unwrap_or(Role::Villager),
                status: p.status,
            })
            .collect()
    }
}
