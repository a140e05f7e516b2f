use crate::game::GameEvent;
use crate::protocol::messages::{TimerTickPayload, VoiceRoutingEntry, VoiceRoutingPayload};
use crate::protocol::ServerMessage;
use crate::voice::routing::derive_routing;

use super::GameServer;

impl GameServer {
    /// Map a game event to outbound frames (and SFU routing updates).
    pub(super) fn dispatch_game_event(&self, event: GameEvent) {
        match event {
            GameEvent::GameStarted { room_code } => {
                self.hub
                    .broadcast_to_room(&room_code, ServerMessage::GameStarting, None);
            }
            GameEvent::RoleAssigned {
                target, payload, ..
            } => {
                self.send(&target, ServerMessage::RoleAssigned(payload));
            }
            GameEvent::PhaseChanged { room_code, payload } => {
                self.hub
                    .broadcast_to_room(&room_code, ServerMessage::PhaseChanged(payload), None);
            }
            GameEvent::TimerTick {
                room_code,
                remaining,
            } => {
                self.hub.broadcast_to_room(
                    &room_code,
                    ServerMessage::TimerTick(TimerTickPayload { remaining }),
                    None,
                );
            }
            GameEvent::NightResult {
                room_code,
                target,
                payload,
            } => {
                let message = ServerMessage::NightResult(Box::new(payload));
                match target {
                    // The detective's investigation copy is targeted.
                    Some(player_id) => self.send(&player_id, message),
                    None => self.hub.broadcast_to_room(&room_code, message, None),
                }
            }
            GameEvent::VoteUpdate { room_code, payload } => {
                self.hub
                    .broadcast_to_room(&room_code, ServerMessage::VoteUpdate(payload), None);
            }
            GameEvent::MafiaVote {
                room_code,
                targets,
                payload,
            } => {
                self.hub.broadcast_to_players(
                    &room_code,
                    &targets,
                    ServerMessage::MafiaVote(payload),
                );
            }
            GameEvent::DayResult { room_code, payload } => {
                self.hub
                    .broadcast_to_room(&room_code, ServerMessage::DayResult(Box::new(payload)), None);
            }
            GameEvent::GameOver { room_code, payload } => {
                self.hub
                    .broadcast_to_room(&room_code, ServerMessage::GameOver(Box::new(payload)), None);
            }
            GameEvent::VoiceRouting {
                room_code,
                phase,
                players,
            } => {
                if let Some(voice) = &self.voice {
                    voice.apply_routing(&room_code, phase, &players);
                }

                let routing = derive_routing(phase, &players);
                let entries: Vec<VoiceRoutingEntry> = players
                    .iter()
                    .filter_map(|player| {
                        routing.get(&player.id).map(|state| VoiceRoutingEntry {
                            player_id: player.id.clone(),
                            can_speak: state.can_speak,
                            can_hear: state.can_hear.clone(),
                        })
                    })
                    .collect();

                self.hub.broadcast_to_room(
                    &room_code,
                    ServerMessage::VoiceRouting(Box::new(VoiceRoutingPayload {
                        phase,
                        players: entries,
                    })),
                    None,
                );
            }
        }
    }
}
