use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::game::{GameEvent, GameRuntime};
use crate::hub::Hub;
use crate::protocol::{ClientMessage, ErrorCode, PlayerId, ServerMessage};
use crate::room::registry::ReconnectTimeout;
use crate::room::RoomRegistry;
use crate::voice::{LoopbackNegotiator, Sfu};

mod game_events;
mod game_handlers;
mod room_handlers;
mod voice_handlers;

/// Mutable connection identity. Reconnection re-keys a session to the
/// player id issued before the disconnect.
pub struct PlayerSession {
    player_id: RwLock<PlayerId>,
}

impl PlayerSession {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id: RwLock::new(player_id),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id.read().expect("session lock poisoned").clone()
    }

    pub(crate) fn set_player_id(&self, player_id: PlayerId) {
        *self.player_id.write().expect("session lock poisoned") = player_id;
    }
}

/// The message router: dispatches inbound messages to room and game
/// operations, maps domain errors to wire codes, and fans game events out
/// through the hub and the SFU.
pub struct GameServer {
    hub: Arc<Hub>,
    registry: Arc<RoomRegistry>,
    runtime: Arc<GameRuntime>,
    voice: Option<Arc<Sfu>>,
    config: Arc<Config>,
}

impl GameServer {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let hub = Hub::new();
        let (registry, timeout_rx) = RoomRegistry::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let runtime = GameRuntime::new(Arc::clone(&registry), event_tx);
        let voice = Arc::new(Sfu::new(config.sfu.clone(), Box::new(LoopbackNegotiator)));

        let server = Arc::new(Self {
            hub,
            registry,
            runtime,
            voice: Some(voice),
            config,
        });

        tokio::spawn(Arc::clone(&server).run_event_pump(event_rx));
        tokio::spawn(Arc::clone(&server).run_timeout_pump(timeout_rx));

        server
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn runtime(&self) -> &Arc<GameRuntime> {
        &self.runtime
    }

    pub fn voice(&self) -> Option<&Arc<Sfu>> {
        self.voice.as_ref()
    }

    /// Route an inbound message to its handler.
    pub fn handle_message(self: &Arc<Self>, session: &PlayerSession, message: ClientMessage) {
        match message {
            ClientMessage::CreateRoom(payload) => self.handle_create_room(session, payload),
            ClientMessage::JoinRoom(payload) => self.handle_join_room(session, payload),
            ClientMessage::LeaveRoom => self.handle_leave_room(session),
            ClientMessage::Reconnect(payload) => self.handle_reconnect(session, payload),
            ClientMessage::Ready(payload) => self.handle_ready(session, payload),
            ClientMessage::UpdateSettings(settings) => {
                self.handle_update_settings(session, settings);
            }
            ClientMessage::StartGame => self.handle_start_game(session),
            ClientMessage::NightAction(payload) => self.handle_night_action(session, payload),
            ClientMessage::DayVote(payload) => self.handle_day_vote(session, payload),
            ClientMessage::GhostChat(payload) => self.handle_ghost_chat(session, payload),
            ClientMessage::VoiceJoin => self.handle_voice_join(session),
            ClientMessage::VoiceLeave => self.handle_voice_leave(session),
            ClientMessage::VoiceOffer(payload) => self.handle_voice_offer(session, payload),
            ClientMessage::VoiceAnswer(_) => {
                // The server is the answering side; a client answer has
                // nothing to apply to.
                tracing::debug!(player_id = %session.player_id(), "ignoring client voice answer");
            }
            ClientMessage::VoiceCandidate(payload) => {
                self.handle_voice_candidate(session, payload);
            }
            ClientMessage::SpeakingState(payload) => self.handle_speaking_state(session, payload),
        }
    }

    pub(crate) fn send(&self, player_id: &str, message: ServerMessage) {
        self.hub.send_message(player_id, message);
    }

    pub(crate) fn send_error(&self, player_id: &str, code: ErrorCode, message: &str) {
        self.hub
            .send_message(player_id, ServerMessage::error(code, message));
    }

    async fn run_timeout_pump(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<ReconnectTimeout>,
    ) {
        while let Some(timeout) = rx.recv().await {
            self.handle_reconnect_timeout(timeout);
        }
    }

    async fn run_event_pump(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<GameEvent>) {
        while let Some(event) = rx.recv().await {
            self.dispatch_game_event(event);
        }
    }

    /// Teardown: cancel all timers, drop all games and voice rooms.
    pub fn shutdown(&self) {
        self.runtime.shutdown();
        self.registry.shutdown();
        if let Some(voice) = &self.voice {
            voice.close();
        }
    }
}
