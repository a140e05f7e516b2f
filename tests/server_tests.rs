//! End-to-end scenarios driven through the router with channel-backed
//! test clients, covering room lifecycle, game flow, and reconnection.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

use mafia_server::config::Config;
use mafia_server::game::role::{Role, Team};
use mafia_server::game::runtime::{RESULT_DISPLAY_DELAY, ROLE_REVEAL_DELAY};
use mafia_server::game::GamePhase;
use mafia_server::protocol::ids::generate_player_id;
use mafia_server::protocol::messages::*;
use mafia_server::protocol::{ClientMessage, ErrorCode, ServerMessage};
use mafia_server::room::{GameSettings, PlayerStatus, RoomState};
use mafia_server::server::{GameServer, PlayerSession};

struct TestClient {
    session: Arc<PlayerSession>,
    rx: mpsc::Receiver<Arc<ServerMessage>>,
}

impl TestClient {
    fn id(&self) -> String {
        self.session.player_id()
    }
}

async fn connect(server: &Arc<GameServer>) -> TestClient {
    let player_id = generate_player_id();
    let (tx, rx) = mpsc::channel(256);
    server.hub().register(&player_id, tx).await;
    TestClient {
        session: Arc::new(PlayerSession::new(player_id)),
        rx,
    }
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

async fn drain(client: &mut TestClient) -> Vec<ServerMessage> {
    settle().await;
    let mut messages = Vec::new();
    while let Ok(message) = client.rx.try_recv() {
        messages.push((*message).clone());
    }
    messages
}

fn send(server: &Arc<GameServer>, client: &TestClient, message: ClientMessage) {
    server.handle_message(&client.session, message);
}

fn new_server() -> Arc<GameServer> {
    GameServer::new(Arc::new(Config::default()))
}

/// Create a room with `count` players; returns the clients (creator first,
/// the host) and the room code. Queues are drained.
async fn setup_room(server: &Arc<GameServer>, count: usize) -> (Vec<TestClient>, String) {
    let mut clients = Vec::new();

    let mut host = connect(server).await;
    send(
        server,
        &host,
        ClientMessage::CreateRoom(CreateRoomPayload {
            nickname: "n1".to_string(),
            password: String::new(),
        }),
    );
    let messages = drain(&mut host).await;
    let code = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::RoomCreated(p) => Some(p.room_code.clone()),
            _ => None,
        })
        .expect("room_created");
    clients.push(host);

    for i in 2..=count {
        let client = connect(server).await;
        send(
            server,
            &client,
            ClientMessage::JoinRoom(JoinRoomPayload {
                room_code: code.clone(),
                password: String::new(),
                nickname: format!("n{i}"),
            }),
        );
        clients.push(client);
    }
    for client in &mut clients {
        drain(client).await;
    }

    (clients, code)
}

/// Ready everyone, apply settings from the host, and start the game.
async fn start_game(
    server: &Arc<GameServer>,
    clients: &mut [TestClient],
    settings: GameSettings,
) {
    for client in clients.iter() {
        send(server, client, ClientMessage::Ready(ReadyPayload { ready: true }));
    }
    send(server, &clients[0], ClientMessage::UpdateSettings(settings));
    settle().await;
    send(server, &clients[0], ClientMessage::StartGame);
    for client in clients.iter_mut() {
        drain(client).await;
    }
}

/// Pin the role layout so scenarios are deterministic:
/// index 0 = mafia, 1 = godfather, 2 = doctor, 3 = detective, rest
/// villagers (for the 7-player godfather settings).
fn fix_roles(server: &Arc<GameServer>, code: &str, clients: &[TestClient], roles: &[Role]) {
    let game = server.runtime().game(code).expect("game exists");
    let mut game = game.write().unwrap();
    for (client, role) in clients.iter().zip(roles) {
        let id = client.id();
        game.roles.insert(id.clone(), *role);
        game.room.write().unwrap().player_mut(&id).unwrap().role = Some(*role);
    }
}

fn godfather_settings() -> GameSettings {
    GameSettings {
        villagers: 3,
        mafia: 1,
        godfather: 1,
        doctor: 1,
        detective: 1,
        night_timer: 60,
    }
}

const GODFATHER_LAYOUT: [Role; 7] = [
    Role::Mafia,
    Role::Godfather,
    Role::Doctor,
    Role::Detective,
    Role::Villager,
    Role::Villager,
    Role::Villager,
];

fn night_action(target: Option<&str>) -> ClientMessage {
    ClientMessage::NightAction(NightActionPayload {
        target_id: target.unwrap_or("").to_string(),
    })
}

fn day_vote(target: Option<&str>) -> ClientMessage {
    ClientMessage::DayVote(DayVotePayload {
        target_id: target.unwrap_or("").to_string(),
    })
}

async fn enter_night(clients: &mut [TestClient]) {
    tokio::time::sleep(ROLE_REVEAL_DELAY + Duration::from_millis(20)).await;
    for client in clients.iter_mut() {
        drain(client).await;
    }
}

/// Submit a pass/minimal action for every night actor so the night
/// resolves early, then step through the result display into day.
async fn skip_night(
    server: &Arc<GameServer>,
    clients: &mut [TestClient],
    layout: &[Role],
) {
    for (client, role) in clients.iter().zip(layout) {
        match role {
            Role::Mafia | Role::Godfather => send(server, client, night_action(None)),
            Role::Doctor => {
                let target = clients[0].id();
                send(server, client, night_action(Some(&target)));
            }
            Role::Detective => {
                let target = clients[0].id();
                send(server, client, night_action(Some(&target)));
            }
            Role::Villager => {}
        }
    }
    settle().await;
    tokio::time::sleep(RESULT_DISPLAY_DELAY + Duration::from_millis(20)).await;
    for client in clients.iter_mut() {
        drain(client).await;
    }
}

fn find_error(messages: &[ServerMessage]) -> Option<&ErrorPayload> {
    messages.iter().find_map(|m| match m {
        ServerMessage::Error(p) => Some(p),
        _ => None,
    })
}

// --- Scenario 1: host succession ---

#[tokio::test(start_paused = true)]
async fn host_succession_on_leave() {
    let server = new_server();
    let (mut clients, _code) = setup_room(&server, 3).await;
    let p1 = clients[0].id();
    let p2 = clients[1].id();

    send(&server, &clients[0], ClientMessage::LeaveRoom);
    settle().await;

    for client in &mut clients[1..] {
        let messages = drain(client).await;
        let left = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::PlayerLeft(p) => Some(p.clone()),
                _ => None,
            })
            .expect("player_left broadcast");
        assert_eq!(left.player_id, p1);
        assert_eq!(left.new_host.as_deref(), Some(p2.as_str()));
    }

    // The promoted host can now change settings; the third player cannot.
    send(
        &server,
        &clients[1],
        ClientMessage::UpdateSettings(GameSettings::default()),
    );
    let messages = drain(&mut clients[1]).await;
    assert!(messages
        .iter()
        .any(|m| matches!(m, ServerMessage::SettingsUpdated(_))));

    send(
        &server,
        &clients[2],
        ClientMessage::UpdateSettings(GameSettings::default()),
    );
    let messages = drain(&mut clients[2]).await;
    assert_eq!(find_error(&messages).unwrap().code, ErrorCode::NotHost);
}

// --- Scenario 2: grace first night ---

#[tokio::test(start_paused = true)]
async fn first_night_is_a_grace_round() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 6).await;
    let layout = [
        Role::Mafia,
        Role::Mafia,
        Role::Doctor,
        Role::Detective,
        Role::Villager,
        Role::Villager,
    ];
    start_game(
        &server,
        &mut clients,
        GameSettings {
            villagers: 2,
            mafia: 2,
            godfather: 0,
            doctor: 1,
            detective: 1,
            night_timer: 60,
        },
    )
    .await;
    fix_roles(&server, &code, &clients, &layout);
    enter_night(&mut clients).await;

    // Mafia targets p4 (index 3); doctor protects p5 (index 4).
    let target = clients[3].id();
    let protected = clients[4].id();
    let investigate = clients[0].id();
    send(&server, &clients[0], night_action(Some(&target)));
    send(&server, &clients[1], night_action(Some(&target)));
    send(&server, &clients[2], night_action(Some(&protected)));
    send(&server, &clients[3], night_action(Some(&investigate)));

    let messages = drain(&mut clients[4]).await;
    let result = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::NightResult(p) => Some(p.clone()),
            _ => None,
        })
        .expect("night_result broadcast");
    assert!(result.killed.is_none());
    assert!(!result.was_saved);

    // Nobody died; the game advances to day.
    let game = server.runtime().game(&code).unwrap();
    assert_eq!(game.read().unwrap().room.read().unwrap().alive_count(), 6);

    tokio::time::sleep(RESULT_DISPLAY_DELAY + Duration::from_millis(20)).await;
    let messages = drain(&mut clients[0]).await;
    assert!(messages.iter().any(|m| matches!(
        m,
        ServerMessage::PhaseChanged(p) if p.phase == GamePhase::Day
    )));
}

// --- Scenarios 3 and 4: godfather override, detective sees godfather ---

#[tokio::test(start_paused = true)]
async fn godfather_override_and_innocent_reading() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;
    fix_roles(&server, &code, &clients, &GODFATHER_LAYOUT);
    enter_night(&mut clients).await;

    // Night 1: detective investigates the godfather.
    let gf = clients[1].id();
    send(&server, &clients[0], night_action(None));
    send(&server, &clients[1], night_action(None));
    let self_protect = clients[2].id();
    send(&server, &clients[2], night_action(Some(&self_protect)));
    send(&server, &clients[3], night_action(Some(&gf)));
    settle().await;

    let messages = drain(&mut clients[3]).await;
    let investigation = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::NightResult(p) => p.investigation.clone(),
            _ => None,
        })
        .expect("targeted investigation");
    assert_eq!(investigation.target_id, gf);
    assert!(!investigation.is_mafia);

    // Nobody else received the investigation.
    let messages = drain(&mut clients[4]).await;
    assert!(messages.iter().all(|m| match m {
        ServerMessage::NightResult(p) => p.investigation.is_none(),
        _ => true,
    }));

    // Step into day; everyone abstains; back to night 2.
    tokio::time::sleep(RESULT_DISPLAY_DELAY + Duration::from_millis(20)).await;
    for client in clients.iter() {
        send(&server, client, day_vote(None));
    }
    settle().await;
    tokio::time::sleep(RESULT_DISPLAY_DELAY + Duration::from_millis(20)).await;
    for client in clients.iter_mut() {
        drain(client).await;
    }

    // Night 2: m1 votes v1, godfather votes v2, doctor protects v1.
    let v1 = clients[4].id();
    let v2 = clients[5].id();
    let m1 = clients[0].id();
    send(&server, &clients[0], night_action(Some(&v1)));
    send(&server, &clients[1], night_action(Some(&v2)));
    send(&server, &clients[2], night_action(Some(&v1)));
    send(&server, &clients[3], night_action(Some(&m1)));
    settle().await;

    let messages = drain(&mut clients[6]).await;
    let result = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::NightResult(p) => Some(p.clone()),
            _ => None,
        })
        .expect("night_result broadcast");
    assert_eq!(result.killed.as_deref(), Some(v2.as_str()));
    assert!(!result.was_saved);

    // Investigating the plain mafia reads guilty.
    let messages = drain(&mut clients[3]).await;
    let investigation = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::NightResult(p) => p.investigation.clone(),
            _ => None,
        })
        .expect("night 2 investigation");
    assert_eq!(investigation.target_id, m1);
    assert!(investigation.is_mafia);
}

// --- Scenario 5: majority elimination ---

#[tokio::test(start_paused = true)]
async fn majority_elimination_with_role_reveal() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;
    fix_roles(&server, &code, &clients, &GODFATHER_LAYOUT);
    enter_night(&mut clients).await;
    skip_night(&server, &mut clients, &GODFATHER_LAYOUT).await;

    // Reduce to 5 alive so the threshold is 3.
    {
        let game = server.runtime().game(&code).unwrap();
        let game = game.read().unwrap();
        let mut room = game.room.write().unwrap();
        for client in &clients[5..7] {
            room.player_mut(&client.id()).unwrap().status = PlayerStatus::Dead;
        }
    }

    // Votes: three on the mafia, one elsewhere, one abstention.
    let x = clients[0].id();
    let y = clients[1].id();
    send(&server, &clients[1], day_vote(Some(&x)));
    send(&server, &clients[2], day_vote(Some(&x)));
    send(&server, &clients[3], day_vote(Some(&x)));
    send(&server, &clients[4], day_vote(Some(&y)));
    send(&server, &clients[0], day_vote(None));

    let messages = drain(&mut clients[2]).await;
    let result = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::DayResult(p) => Some(p.clone()),
            _ => None,
        })
        .expect("day_result broadcast");
    assert_eq!(result.eliminated.as_deref(), Some(x.as_str()));
    assert_eq!(result.eliminated_role, Some(Role::Mafia));
    assert!(!result.no_majority);
    assert_eq!(result.votes[&x], 3);

    // Vote updates carried full voter detail before resolution.
    let updates: Vec<&VoteUpdatePayload> = messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::VoteUpdate(p) => Some(p),
            _ => None,
        })
        .collect();
    assert!(!updates.is_empty());
    let last = updates.last().unwrap();
    assert_eq!(last.votes[&clients[1].id()].as_deref(), Some(x.as_str()));
    assert_eq!(last.submitted.len(), 5);
}

// --- Scenario 6: reconnect within the window ---

#[tokio::test(start_paused = true)]
async fn reconnect_within_window_restores_state() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;
    fix_roles(&server, &code, &clients, &GODFATHER_LAYOUT);
    enter_night(&mut clients).await;
    skip_night(&server, &mut clients, &GODFATHER_LAYOUT).await;

    // A villager drops mid-day.
    let dropped = clients[4].id();
    server.handle_disconnect(&clients[4].session);
    server.hub().unregister(&dropped);
    settle().await;

    let messages = drain(&mut clients[0]).await;
    assert!(messages.iter().any(|m| matches!(
        m,
        ServerMessage::PlayerDisconnected(p) if p.player_id == dropped
    )));

    tokio::time::sleep(Duration::from_secs(20)).await;

    // Fresh connection reclaims the original identity.
    let mut returning = connect(&server).await;
    send(
        &server,
        &returning,
        ClientMessage::Reconnect(ReconnectPayload {
            player_id: dropped.clone(),
        }),
    );
    let messages = drain(&mut returning).await;
    assert_eq!(returning.id(), dropped);

    let state = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::RoomState(p) => Some(p.clone()),
            _ => None,
        })
        .expect("room_state resent");
    assert_eq!(state.room_code, code);
    assert_eq!(state.state, RoomState::Playing);

    let role = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::RoleAssigned(p) => Some(p.clone()),
            _ => None,
        })
        .expect("role_assigned resent");
    assert_eq!(role.role, Role::Villager);

    let phase = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::PhaseChanged(p) => Some(p.clone()),
            _ => None,
        })
        .expect("phase_changed resent");
    assert_eq!(phase.phase, GamePhase::Day);
    // Day timer is 120 s; about 20 s elapsed before reconnecting.
    assert!((95..=101).contains(&phase.timer), "timer was {}", phase.timer);

    // Others see the reconnection; the host never changed.
    let messages = drain(&mut clients[0]).await;
    assert!(messages.iter().any(|m| matches!(
        m,
        ServerMessage::PlayerReconnected(p) if p.player_id == dropped
    )));
    let room = server.registry().get_room(&code).unwrap();
    assert_eq!(room.read().unwrap().host().unwrap().id, clients[0].id());
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_window_is_rejected() {
    let server = new_server();
    let (mut clients, _code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;
    enter_night(&mut clients).await;

    let dropped = clients[4].id();
    server.handle_disconnect(&clients[4].session);
    server.hub().unregister(&dropped);

    tokio::time::sleep(Duration::from_secs(61)).await;

    let mut returning = connect(&server).await;
    send(
        &server,
        &returning,
        ClientMessage::Reconnect(ReconnectPayload {
            player_id: dropped,
        }),
    );
    let messages = drain(&mut returning).await;
    assert_eq!(
        find_error(&messages).unwrap().code,
        ErrorCode::ReconnectFailed
    );
}

// --- Ghost chat ---

#[tokio::test(start_paused = true)]
async fn ghost_chat_reaches_the_dead_only() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;
    fix_roles(&server, &code, &clients, &GODFATHER_LAYOUT);
    enter_night(&mut clients).await;

    // Two villagers die by fiat.
    {
        let game = server.runtime().game(&code).unwrap();
        let game = game.read().unwrap();
        let mut room = game.room.write().unwrap();
        for client in &clients[4..6] {
            room.player_mut(&client.id()).unwrap().status = PlayerStatus::Dead;
        }
    }

    send(
        &server,
        &clients[4],
        ClientMessage::GhostChat(GhostChatPayload {
            message: "anyone else down here?".to_string(),
        }),
    );

    let messages = drain(&mut clients[5]).await;
    let chat = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::GhostChatBroadcast(p) => Some(p.clone()),
            _ => None,
        })
        .expect("ghost chat delivered to the dead");
    assert_eq!(chat.from_id, clients[4].id());
    assert_eq!(chat.message, "anyone else down here?");

    // The living hear nothing.
    let messages = drain(&mut clients[0]).await;
    assert!(messages
        .iter()
        .all(|m| !matches!(m, ServerMessage::GhostChatBroadcast(_))));

    // The living cannot speak from beyond either.
    send(
        &server,
        &clients[0],
        ClientMessage::GhostChat(GhostChatPayload {
            message: "hello?".to_string(),
        }),
    );
    let messages = drain(&mut clients[0]).await;
    assert_eq!(find_error(&messages).unwrap().code, ErrorCode::NotDead);
}

// --- Preconditions and error mapping ---

#[tokio::test(start_paused = true)]
async fn join_is_rejected_once_playing() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;

    let mut late = connect(&server).await;
    send(
        &server,
        &late,
        ClientMessage::JoinRoom(JoinRoomPayload {
            room_code: code,
            password: String::new(),
            nickname: "late".to_string(),
        }),
    );
    let messages = drain(&mut late).await;
    assert_eq!(find_error(&messages).unwrap().code, ErrorCode::GameStarted);
}

#[tokio::test(start_paused = true)]
async fn start_game_preconditions_map_to_codes() {
    let server = new_server();
    let (mut clients, _code) = setup_room(&server, 7).await;

    // Not all ready yet.
    send(&server, &clients[0], ClientMessage::StartGame);
    let messages = drain(&mut clients[0]).await;
    assert_eq!(find_error(&messages).unwrap().code, ErrorCode::NotAllReady);

    // Non-host cannot start.
    for client in clients.iter() {
        send(&server, client, ClientMessage::Ready(ReadyPayload { ready: true }));
    }
    settle().await;
    send(&server, &clients[1], ClientMessage::StartGame);
    let messages = drain(&mut clients[1]).await;
    assert_eq!(find_error(&messages).unwrap().code, ErrorCode::NotHost);

    // Mismatched settings fail as start_failed.
    send(
        &server,
        &clients[0],
        ClientMessage::UpdateSettings(GameSettings {
            villagers: 5,
            ..godfather_settings()
        }),
    );
    settle().await;
    send(&server, &clients[0], ClientMessage::StartGame);
    let messages = drain(&mut clients[0]).await;
    assert_eq!(find_error(&messages).unwrap().code, ErrorCode::StartFailed);
}

#[tokio::test(start_paused = true)]
async fn day_vote_during_night_is_invalid_phase() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;
    fix_roles(&server, &code, &clients, &GODFATHER_LAYOUT);
    enter_night(&mut clients).await;

    let target = clients[0].id();
    send(&server, &clients[4], day_vote(Some(&target)));
    let messages = drain(&mut clients[4]).await;
    assert_eq!(find_error(&messages).unwrap().code, ErrorCode::InvalidPhase);
}

#[tokio::test(start_paused = true)]
async fn mafia_vote_updates_go_to_mafia_only() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;
    fix_roles(&server, &code, &clients, &GODFATHER_LAYOUT);
    enter_night(&mut clients).await;

    let target = clients[4].id();
    send(&server, &clients[0], night_action(Some(&target)));

    let messages = drain(&mut clients[1]).await;
    let vote = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::MafiaVote(p) => Some(p.clone()),
            _ => None,
        })
        .expect("godfather sees the mafia vote");
    assert_eq!(vote.voter_id, clients[0].id());
    assert_eq!(vote.target_id.as_deref(), Some(target.as_str()));

    let messages = drain(&mut clients[4]).await;
    assert!(messages
        .iter()
        .all(|m| !matches!(m, ServerMessage::MafiaVote(_))));
}

#[tokio::test(start_paused = true)]
async fn role_reveal_is_targeted_and_mafia_see_teammates() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;

    for client in clients.iter() {
        send(&server, client, ClientMessage::Ready(ReadyPayload { ready: true }));
    }
    send(
        &server,
        &clients[0],
        ClientMessage::UpdateSettings(godfather_settings()),
    );
    settle().await;
    send(&server, &clients[0], ClientMessage::StartGame);
    settle().await;

    let mut mafia_count = 0;
    let mut town_count = 0;
    for client in clients.iter_mut() {
        let messages = drain(client).await;
        let reveal = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::RoleAssigned(p) => Some(p.clone()),
                _ => None,
            })
            .expect("every player gets exactly their own reveal");
        match reveal.team {
            Team::Mafia => {
                mafia_count += 1;
                // Both mafia-team members see one teammate.
                assert_eq!(reveal.teammates.len(), 1);
            }
            Team::Town => {
                town_count += 1;
                assert!(reveal.teammates.is_empty());
            }
        }
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::GameStarting)));
    }
    assert_eq!(mafia_count, 2);
    assert_eq!(town_count, 5);

    // Game over cleanup is not yet due: the game is live.
    assert!(server.runtime().game(&code).is_some());
}

#[tokio::test(start_paused = true)]
async fn voice_routing_broadcast_follows_phases() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 7).await;
    start_game(&server, &mut clients, godfather_settings()).await;
    fix_roles(&server, &code, &clients, &GODFATHER_LAYOUT);

    tokio::time::sleep(ROLE_REVEAL_DELAY + Duration::from_millis(20)).await;
    let messages = drain(&mut clients[4]).await;
    let routing = messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::VoiceRouting(p) => Some(p.clone()),
            _ => None,
        })
        .last()
        .expect("voice_routing broadcast on phase change");

    assert_eq!(routing.phase, mafia_server::voice::VoicePhase::Night);
    let my_id = clients[4].id();
    let me = routing
        .players
        .iter()
        .find(|p| p.player_id == my_id)
        .unwrap();
    // Alive town is muted and deaf at night.
    assert!(!me.can_speak);
    assert!(me.can_hear.is_empty());

    let mafia_id = clients[0].id();
    let mafia = routing
        .players
        .iter()
        .find(|p| p.player_id == mafia_id)
        .unwrap();
    assert!(mafia.can_speak);
    assert_eq!(mafia.can_hear.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn voice_join_and_offer_round_trip() {
    let server = new_server();
    let (mut clients, code) = setup_room(&server, 3).await;

    send(&server, &clients[0], ClientMessage::VoiceJoin);
    settle().await;

    let messages = drain(&mut clients[1]).await;
    assert!(messages.iter().any(|m| matches!(
        m,
        ServerMessage::VoiceJoined(p) if p.player_id == clients[0].id()
    )));

    send(
        &server,
        &clients[0],
        ClientMessage::VoiceOffer(VoiceOfferPayload {
            sdp: "v=0".to_string(),
        }),
    );
    let messages = drain(&mut clients[0]).await;
    assert!(messages.iter().any(|m| matches!(
        m,
        ServerMessage::VoiceAnswer(p) if p.sdp == "v=0"
    )));

    assert_eq!(server.voice().unwrap().participant_count(&code), 1);
    send(&server, &clients[0], ClientMessage::VoiceLeave);
    settle().await;
    assert_eq!(server.voice().unwrap().participant_count(&code), 0);
}
