use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};

use crate::protocol::messages::{
    DayResultPayload, GameOverPayload, MafiaVotePayload, NightResultPayload, PhaseChangedPayload,
    RoleAssignedPayload,
};
use crate::protocol::PlayerId;
use crate::room::RoomRegistry;
use crate::voice::routing::VoicePhase;

use super::role::Team;
use super::{Game, GameError, GameEvent, GamePhase};

/// Pause on the role-reveal screen before the first night.
pub const ROLE_REVEAL_DELAY: Duration = Duration::from_secs(5);
/// Pause on night/day results before the next phase.
pub const RESULT_DISPLAY_DELAY: Duration = Duration::from_secs(3);

type SharedGame = Arc<RwLock<Game>>;

/// What to do when a room's timer expires.
#[derive(Debug, Clone, Copy)]
enum TimerAction {
    EnterNight,
    EnterDay,
    ResolveNight,
    ResolveDay,
}

/// Cancellation handle coupling a room's deadline and its ticker. Dropping
/// or signalling the sender stops both tasks; cancelling twice is a no-op.
struct PhaseTimer {
    cancel: watch::Sender<bool>,
}

/// Drives active games: owns the games map, schedules phase timers, and
/// emits [`GameEvent`]s through the sink installed at startup.
pub struct GameRuntime {
    registry: Arc<RoomRegistry>,
    games: RwLock<HashMap<String, SharedGame>>,
    timers: Mutex<HashMap<String, PhaseTimer>>,
    events: mpsc::UnboundedSender<GameEvent>,
}

impl GameRuntime {
    pub fn new(
        registry: Arc<RoomRegistry>,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            games: RwLock::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn game(&self, room_code: &str) -> Option<SharedGame> {
        self.games
            .read()
            .expect("games lock poisoned")
            .get(room_code)
            .cloned()
    }

    fn emit(&self, event: GameEvent) {
        let _ = self.events.send(event);
    }

    fn emit_voice_routing(&self, room_code: &str, game: &Game) {
        self.emit(GameEvent::VoiceRouting {
            room_code: room_code.to_string(),
            phase: VoicePhase::from(game.phase),
            players: game.voice_players(),
        });
    }

    /// Start a game: verify the caller is host, validate the roster, assign
    /// roles, and arm the role-reveal transition into the first night.
    pub fn start_game(self: &Arc<Self>, room_code: &str, host_id: &str) -> Result<(), GameError> {
        let room = self
            .registry
            .get_room(room_code)
            .map_err(|_| GameError::GameNotStarted)?;

        {
            let room = room.read().expect("room lock poisoned");
            let caller = room.player(host_id).ok_or(GameError::PlayerNotFound)?;
            if !caller.is_host {
                return Err(GameError::NotHost);
            }
        }

        if self
            .games
            .read()
            .expect("games lock poisoned")
            .contains_key(room_code)
        {
            return Err(GameError::InvalidPhase);
        }

        let game = Game::new(room)?;
        let player_order = {
            let room = game.room.read().expect("room lock poisoned");
            room.player_order.clone()
        };
        let reveals: Vec<(PlayerId, RoleAssignedPayload)> = player_order
            .iter()
            .filter_map(|id| game.role_reveal_payload(id).map(|p| (id.clone(), p)))
            .collect();
        let voice_players = game.voice_players();
        let player_count = player_order.len();

        self.games
            .write()
            .expect("games lock poisoned")
            .insert(room_code.to_string(), Arc::new(RwLock::new(game)));

        tracing::info!(room = %room_code, players = player_count, "game started");

        self.emit(GameEvent::GameStarted {
            room_code: room_code.to_string(),
        });
        for (player_id, payload) in reveals {
            self.emit(GameEvent::RoleAssigned {
                room_code: room_code.to_string(),
                target: player_id,
                payload,
            });
        }
        self.emit(GameEvent::VoiceRouting {
            room_code: room_code.to_string(),
            phase: VoicePhase::Lobby,
            players: voice_players,
        });

        self.arm_timer(room_code, ROLE_REVEAL_DELAY, false, TimerAction::EnterNight);
        Ok(())
    }

    fn enter_night(self: &Arc<Self>, room_code: &str) {
        let Some(game) = self.game(room_code) else {
            return;
        };

        let night_timer = {
            let mut game = game.write().expect("game lock poisoned");
            let night_timer = {
                let room = game.room.read().expect("room lock poisoned");
                room.settings.night_timer
            };
            game.start_night(Duration::from_secs(night_timer));

            tracing::info!(room = %room_code, round = game.round, "night phase started");
            self.emit(GameEvent::PhaseChanged {
                room_code: room_code.to_string(),
                payload: PhaseChangedPayload {
                    phase: GamePhase::Night,
                    round: game.round,
                    timer: night_timer,
                },
            });
            self.emit_voice_routing(room_code, &game);
            night_timer
        };

        self.arm_timer(
            room_code,
            Duration::from_secs(night_timer),
            true,
            TimerAction::ResolveNight,
        );
    }

    fn enter_day(self: &Arc<Self>, room_code: &str) {
        let Some(game) = self.game(room_code) else {
            return;
        };

        let day_timer = {
            let mut game = game.write().expect("game lock poisoned");
            // Discussion plus voting gets twice the night length.
            let day_timer = {
                let room = game.room.read().expect("room lock poisoned");
                room.settings.night_timer * 2
            };
            game.start_day(Duration::from_secs(day_timer));

            tracing::info!(room = %room_code, round = game.round, "day phase started");
            self.emit(GameEvent::PhaseChanged {
                room_code: room_code.to_string(),
                payload: PhaseChangedPayload {
                    phase: GamePhase::Day,
                    round: game.round,
                    timer: day_timer,
                },
            });
            self.emit_voice_routing(room_code, &game);
            day_timer
        };

        // No countdown broadcast during the day; just the deadline.
        self.arm_timer(
            room_code,
            Duration::from_secs(day_timer),
            false,
            TimerAction::ResolveDay,
        );
    }

    /// Record a night action; resolves the night early once every living
    /// actor has submitted.
    pub fn submit_night_action(
        self: &Arc<Self>,
        room_code: &str,
        player_id: &str,
        target_id: Option<PlayerId>,
    ) -> Result<(), GameError> {
        let game = self.game(room_code).ok_or(GameError::GameNotStarted)?;

        let complete = {
            let mut game = game.write().expect("game lock poisoned");
            let role = game.submit_night_action(player_id, target_id.clone())?;

            tracing::debug!(
                room = %room_code,
                player = player_id,
                target = target_id.as_deref().unwrap_or(""),
                "night action submitted"
            );

            if role.team() == Team::Mafia {
                self.emit(GameEvent::MafiaVote {
                    room_code: room_code.to_string(),
                    targets: game.alive_mafia_ids(),
                    payload: MafiaVotePayload {
                        voter_id: player_id.to_string(),
                        target_id,
                    },
                });
            }

            game.all_night_actions_complete()
        };

        if complete {
            self.cancel_timer(room_code);
            self.resolve_night(room_code);
        }
        Ok(())
    }

    fn resolve_night(self: &Arc<Self>, room_code: &str) {
        let Some(game) = self.game(room_code) else {
            // Game removed while the timer was in flight.
            return;
        };

        let winner = {
            let mut game = game.write().expect("game lock poisoned");
            if game.phase != GamePhase::Night {
                // Already resolved by early completion.
                return;
            }
            let outcome = game.resolve_night();

            tracing::info!(
                room = %room_code,
                killed = outcome.killed.as_ref().map(|(_, n)| n.as_str()).unwrap_or(""),
                saved = outcome.was_saved,
                "night resolved"
            );

            self.emit(GameEvent::NightResult {
                room_code: room_code.to_string(),
                target: None,
                payload: NightResultPayload {
                    killed: outcome.killed.as_ref().map(|(id, _)| id.clone()),
                    killed_nickname: outcome.killed.as_ref().map(|(_, n)| n.clone()),
                    was_saved: outcome.was_saved,
                    investigation: None,
                },
            });

            if let Some(investigation) = &outcome.investigation {
                if let Some(detective) = game.detective_id() {
                    self.emit(GameEvent::NightResult {
                        room_code: room_code.to_string(),
                        target: Some(detective),
                        payload: NightResultPayload {
                            killed: None,
                            killed_nickname: None,
                            was_saved: false,
                            investigation: Some(
                                crate::protocol::messages::InvestigationResult {
                                    target_id: investigation.target_id.clone(),
                                    target_nickname: investigation.target_nickname.clone(),
                                    is_mafia: investigation.is_mafia,
                                },
                            ),
                        },
                    });
                }
            }

            self.emit_voice_routing(room_code, &game);
            game.check_win()
        };

        match winner {
            Some(winner) => self.end_game(room_code, winner),
            None => self.arm_timer(
                room_code,
                RESULT_DISPLAY_DELAY,
                false,
                TimerAction::EnterDay,
            ),
        }
    }

    /// Record or overwrite a day vote; resolves the day early once every
    /// living player has submitted.
    pub fn submit_day_vote(
        self: &Arc<Self>,
        room_code: &str,
        voter_id: &str,
        target_id: Option<PlayerId>,
    ) -> Result<(), GameError> {
        let game = self.game(room_code).ok_or(GameError::GameNotStarted)?;

        let complete = {
            let mut game = game.write().expect("game lock poisoned");
            game.submit_day_vote(voter_id, target_id.clone())?;

            tracing::debug!(
                room = %room_code,
                voter = voter_id,
                target = target_id.as_deref().unwrap_or(""),
                "day vote submitted"
            );

            self.emit(GameEvent::VoteUpdate {
                room_code: room_code.to_string(),
                payload: game.vote_update_payload(),
            });

            game.all_day_votes_complete()
        };

        if complete {
            self.cancel_timer(room_code);
            self.resolve_day(room_code);
        }
        Ok(())
    }

    fn resolve_day(self: &Arc<Self>, room_code: &str) {
        let Some(game) = self.game(room_code) else {
            return;
        };

        let winner = {
            let mut game = game.write().expect("game lock poisoned");
            if game.phase != GamePhase::Day {
                return;
            }
            let outcome = game.resolve_day();

            tracing::info!(
                room = %room_code,
                eliminated = outcome.eliminated.as_ref().map(|(_, n, _)| n.as_str()).unwrap_or(""),
                no_majority = outcome.no_majority,
                "day resolved"
            );

            self.emit(GameEvent::DayResult {
                room_code: room_code.to_string(),
                payload: DayResultPayload {
                    eliminated: outcome.eliminated.as_ref().map(|(id, _, _)| id.clone()),
                    eliminated_nickname: outcome
                        .eliminated
                        .as_ref()
                        .map(|(_, nickname, _)| nickname.clone()),
                    eliminated_role: outcome.eliminated.as_ref().map(|(_, _, role)| *role),
                    votes: outcome.vote_counts.clone(),
                    no_majority: outcome.no_majority,
                },
            });

            self.emit_voice_routing(room_code, &game);
            game.check_win()
        };

        match winner {
            Some(winner) => self.end_game(room_code, winner),
            None => self.arm_timer(
                room_code,
                RESULT_DISPLAY_DELAY,
                false,
                TimerAction::EnterNight,
            ),
        }
    }

    /// Terminal transition: announce the winner with all roles revealed,
    /// then drop the game and its timers.
    fn end_game(self: &Arc<Self>, room_code: &str, winner: Team) {
        let Some(game) = self.game(room_code) else {
            return;
        };

        {
            let mut game = game.write().expect("game lock poisoned");
            game.end_game(winner);

            tracing::info!(room = %room_code, winner = ?winner, "game ended");

            self.emit(GameEvent::GameOver {
                room_code: room_code.to_string(),
                payload: GameOverPayload {
                    winner,
                    players: game.game_over_players(),
                },
            });
            self.emit_voice_routing(room_code, &game);
        }

        self.cancel_timer(room_code);
        self.games
            .write()
            .expect("games lock poisoned")
            .remove(room_code);
    }

    /// Re-evaluate the win condition after a player was removed mid-game
    /// (reconnect timeout or explicit leave).
    pub fn check_win_after_departure(self: &Arc<Self>, room_code: &str) {
        let Some(game) = self.game(room_code) else {
            return;
        };
        let winner = {
            let game = game.read().expect("game lock poisoned");
            if game.phase == GamePhase::GameOver {
                return;
            }
            game.check_win()
        };
        if let Some(winner) = winner {
            self.end_game(room_code, winner);
        }
    }

    /// State resent to a player who reconnects mid-game: their role reveal
    /// and the current phase with the remaining timer.
    pub fn reconnect_state(
        &self,
        room_code: &str,
        player_id: &str,
    ) -> Option<(RoleAssignedPayload, PhaseChangedPayload)> {
        let game = self.game(room_code)?;
        let game = game.read().expect("game lock poisoned");
        let reveal = game.role_reveal_payload(player_id)?;
        let phase = PhaseChangedPayload {
            phase: game.phase,
            round: game.round,
            timer: game.remaining_secs(),
        };
        Some((reveal, phase))
    }

    /// Drop a game without announcing a result (room deletion).
    pub fn remove_game(&self, room_code: &str) {
        self.cancel_timer(room_code);
        self.games
            .write()
            .expect("games lock poisoned")
            .remove(room_code);
    }

    /// Teardown: cancel every phase timer and drop all games.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().expect("timers lock poisoned");
        for (_, timer) in timers.drain() {
            let _ = timer.cancel.send(true);
        }
        drop(timers);
        self.games.write().expect("games lock poisoned").clear();
    }

    // --- Timer management ---

    /// Arm the room's phase timer, replacing (and thereby cancelling) any
    /// existing one. With `tick` set, a 1 Hz ticker emits the remaining
    /// seconds until the deadline fires the action.
    fn arm_timer(self: &Arc<Self>, room_code: &str, duration: Duration, tick: bool, action: TimerAction) {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        {
            let mut timers = self.timers.lock().expect("timers lock poisoned");
            // Replacing the entry drops the previous sender, which stops
            // the previous task through its watch receiver.
            timers.insert(room_code.to_string(), PhaseTimer { cancel: cancel_tx });
        }

        let runtime = Arc::clone(self);
        let room_code = room_code.to_string();
        let deadline = Instant::now() + duration;

        tokio::spawn(async move {
            if tick {
                let mut interval = tokio::time::interval_at(
                    Instant::now() + Duration::from_secs(1),
                    Duration::from_secs(1),
                );
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let now = Instant::now();
                            if now >= deadline {
                                runtime.fire(&room_code, action);
                                return;
                            }
                            let remaining = (deadline - now).as_secs();
                            let _ = runtime.events.send(GameEvent::TimerTick {
                                room_code: room_code.clone(),
                                remaining,
                            });
                        }
                        _ = cancel_rx.changed() => return,
                    }
                }
            } else {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        runtime.fire(&room_code, action);
                    }
                    _ = cancel_rx.changed() => {}
                }
            }
        });
    }

    fn fire(self: &Arc<Self>, room_code: &str, action: TimerAction) {
        match action {
            TimerAction::EnterNight => self.enter_night(room_code),
            TimerAction::EnterDay => self.enter_day(room_code),
            TimerAction::ResolveNight => self.resolve_night(room_code),
            TimerAction::ResolveDay => self.resolve_day(room_code),
        }
    }

    /// Cancel the room's phase timer and ticker. No-op when none is armed.
    fn cancel_timer(&self, room_code: &str) {
        let mut timers = self.timers.lock().expect("timers lock poisoned");
        if let Some(timer) = timers.remove(room_code) {
            let _ = timer.cancel.send(true);
        }
    }
}
