use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::hub::OUTBOUND_QUEUE_CAPACITY;
use crate::protocol::ids::generate_player_id;
use crate::protocol::messages::ConnectedPayload;
use crate::protocol::ServerMessage;
use crate::server::{GameServer, PlayerSession};

use super::connection::{read_pump, write_pump};

/// Upgrade handler: assigns a player id, registers the connection with the
/// hub, announces it to the client, and runs the pumps.
pub(super) async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(server): State<Arc<GameServer>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

async fn handle_socket(socket: WebSocket, server: Arc<GameServer>) {
    let (sink, stream) = socket.split();
    let player_id = generate_player_id();
    let (tx, rx) = mpsc::channel::<Arc<ServerMessage>>(OUTBOUND_QUEUE_CAPACITY);

    server.hub().register(&player_id, tx.clone()).await;
    tracing::info!(player_id = %player_id, "websocket connection established");

    let _ = tx.try_send(Arc::new(ServerMessage::Connected(ConnectedPayload {
        player_id: player_id.clone(),
    })));
    // From here on the hub holds the only sender; dropping ours lets an
    // unregister close the queue and end the write pump.
    drop(tx);

    let session = Arc::new(PlayerSession::new(player_id));
    let write_task = tokio::spawn(write_pump(sink, rx));

    read_pump(stream, Arc::clone(&server), Arc::clone(&session)).await;

    // Read side is done: run the disconnect flow, then tear down the
    // connection. Unregistering closes the queue, ending the write pump.
    server.handle_disconnect(&session);
    server.hub().unregister(&session.player_id());
    let _ = write_task.await;

    tracing::info!(player_id = %session.player_id(), "websocket connection closed");
}
