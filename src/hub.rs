use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{PlayerId, ServerMessage};

/// Outbound queue capacity per connection. A full queue closes the peer
/// (slow-consumer policy).
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// A registered connection: its outbound queue and current room.
struct ClientHandle {
    sender: mpsc::Sender<Arc<ServerMessage>>,
    room_code: Option<String>,
}

enum HubCommand {
    Register {
        player_id: PlayerId,
        sender: mpsc::Sender<Arc<ServerMessage>>,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        player_id: PlayerId,
    },
    Broadcast {
        room_code: String,
        message: Arc<ServerMessage>,
        exclude: Option<PlayerId>,
    },
}

#[derive(Default)]
struct HubState {
    clients: HashMap<PlayerId, ClientHandle>,
    rooms: HashMap<String, HashSet<PlayerId>>,
}

/// Process-wide registry of connections and per-room membership sets.
///
/// Register/unregister/broadcast flow through a single event loop so
/// broadcasts are serialized: a broadcast dequeued at time T reaches every
/// member's queue before the next broadcast is dequeued. Membership
/// mutations outside the loop take a short-scoped lock on the state.
pub struct Hub {
    state: RwLock<HubState>,
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        let (commands, rx) = mpsc::unbounded_channel();
        let hub = Arc::new(Self {
            state: RwLock::new(HubState::default()),
            commands,
        });
        tokio::spawn(Self::run(Arc::clone(&hub), rx));
        hub
    }

    async fn run(hub: Arc<Self>, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Register {
                    player_id,
                    sender,
                    ack,
                } => {
                    hub.insert_client(player_id, sender);
                    let _ = ack.send(());
                }
                HubCommand::Unregister { player_id } => {
                    hub.remove_client(&player_id);
                }
                HubCommand::Broadcast {
                    room_code,
                    message,
                    exclude,
                } => {
                    hub.deliver_broadcast(&room_code, message, exclude.as_deref());
                }
            }
        }
    }

    fn insert_client(&self, player_id: PlayerId, sender: mpsc::Sender<Arc<ServerMessage>>) {
        let mut state = self.state.write().expect("hub lock poisoned");
        tracing::debug!(player_id = %player_id, "client registered");
        state.clients.insert(
            player_id,
            ClientHandle {
                sender,
                room_code: None,
            },
        );
    }

    fn remove_client(&self, player_id: &str) {
        let mut state = self.state.write().expect("hub lock poisoned");
        if let Some(handle) = state.clients.remove(player_id) {
            if let Some(code) = &handle.room_code {
                if let Some(members) = state.rooms.get_mut(code) {
                    members.remove(player_id);
                    if members.is_empty() {
                        state.rooms.remove(code);
                    }
                }
            }
            // Dropping the handle closes the outbound queue, which ends
            // the connection's write pump.
            tracing::debug!(player_id, "client unregistered");
        }
    }

    fn deliver_broadcast(
        &self,
        room_code: &str,
        message: Arc<ServerMessage>,
        exclude: Option<&str>,
    ) {
        let members: Vec<PlayerId> = {
            let state = self.state.read().expect("hub lock poisoned");
            let Some(members) = state.rooms.get(room_code) else {
                return;
            };
            members
                .iter()
                .filter(|id| Some(id.as_str()) != exclude)
                .cloned()
                .collect()
        };

        for player_id in members {
            self.send_to_player(&player_id, Arc::clone(&message));
        }
    }

    /// Register a connection's outbound queue. Resolves once the event
    /// loop has processed the registration.
    pub async fn register(&self, player_id: &str, sender: mpsc::Sender<Arc<ServerMessage>>) {
        let (ack, done) = oneshot::channel();
        let _ = self.commands.send(HubCommand::Register {
            player_id: player_id.to_string(),
            sender,
            ack,
        });
        let _ = done.await;
    }

    /// Remove a connection from the global set and its room, closing its
    /// outbound queue.
    pub fn unregister(&self, player_id: &str) {
        let _ = self.commands.send(HubCommand::Unregister {
            player_id: player_id.to_string(),
        });
    }

    /// Queue a room broadcast on the event loop.
    pub fn broadcast_to_room(
        &self,
        room_code: &str,
        message: ServerMessage,
        exclude: Option<&str>,
    ) {
        let _ = self.commands.send(HubCommand::Broadcast {
            room_code: room_code.to_string(),
            message: Arc::new(message),
            exclude: exclude.map(str::to_string),
        });
    }

    /// Assign a connection to a room, leaving any previous room first.
    pub fn join_room(&self, player_id: &str, room_code: &str) {
        let mut state = self.state.write().expect("hub lock poisoned");
        Self::leave_room_locked(&mut state, player_id);

        state
            .rooms
            .entry(room_code.to_string())
            .or_default()
            .insert(player_id.to_string());
        if let Some(handle) = state.clients.get_mut(player_id) {
            handle.room_code = Some(room_code.to_string());
        }
        tracing::debug!(player_id, room = %room_code, "client joined room");
    }

    /// Remove a connection from its current room, if any.
    pub fn leave_room(&self, player_id: &str) {
        let mut state = self.state.write().expect("hub lock poisoned");
        Self::leave_room_locked(&mut state, player_id);
    }

    fn leave_room_locked(state: &mut HubState, player_id: &str) {
        let Some(handle) = state.clients.get_mut(player_id) else {
            return;
        };
        let Some(code) = handle.room_code.take() else {
            return;
        };
        if let Some(members) = state.rooms.get_mut(&code) {
            members.remove(player_id);
            if members.is_empty() {
                state.rooms.remove(&code);
            }
        }
    }

    /// Move a connection to a different player id (reconnection), keeping
    /// its queue and room assignment.
    pub fn rekey(&self, from: &str, to: &str) -> bool {
        let mut state = self.state.write().expect("hub lock poisoned");
        let Some(handle) = state.clients.remove(from) else {
            return false;
        };
        if let Some(code) = &handle.room_code {
            if let Some(members) = state.rooms.get_mut(code) {
                members.remove(from);
                members.insert(to.to_string());
            }
        }
        state.clients.insert(to.to_string(), handle);
        true
    }

    /// The room a connection currently belongs to.
    pub fn client_room(&self, player_id: &str) -> Option<String> {
        let state = self.state.read().expect("hub lock poisoned");
        state.clients.get(player_id)?.room_code.clone()
    }

    pub fn room_size(&self, room_code: &str) -> usize {
        let state = self.state.read().expect("hub lock poisoned");
        state.rooms.get(room_code).map(HashSet::len).unwrap_or(0)
    }

    /// Deliver directly to one connection's queue.
    pub fn send_to_player(&self, player_id: &str, message: Arc<ServerMessage>) {
        let sender = {
            let state = self.state.read().expect("hub lock poisoned");
            let Some(handle) = state.clients.get(player_id) else {
                return;
            };
            handle.sender.clone()
        };

        if sender.try_send(message).is_err() {
            // Non-blocking enqueue: overflow closes the slow peer.
            tracing::warn!(player_id, "client send queue full, closing");
            self.unregister(player_id);
        }
    }

    pub fn send_message(&self, player_id: &str, message: ServerMessage) {
        self.send_to_player(player_id, Arc::new(message));
    }

    /// Deliver to a subset of a room's members (e.g. dead-only ghost chat,
    /// mafia-only vote updates).
    pub fn broadcast_to_players(
        &self,
        room_code: &str,
        player_ids: &[PlayerId],
        message: ServerMessage,
    ) {
        let targets: Vec<PlayerId> = {
            let state = self.state.read().expect("hub lock poisoned");
            let Some(members) = state.rooms.get(room_code) else {
                return;
            };
            player_ids
                .iter()
                .filter(|id| members.contains(*id))
                .cloned()
                .collect()
        };

        let message = Arc::new(message);
        for player_id in targets {
            self.send_to_player(&player_id, Arc::clone(&message));
        }
    }
}
