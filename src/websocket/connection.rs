use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, Instant, MissedTickBehavior};

use crate::protocol::{ClientMessage, Envelope, ErrorCode, ServerMessage};
use crate::server::{GameServer, PlayerSession};

/// Time allowed to write a frame to the peer.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Read deadline, refreshed by any inbound frame (pongs included).
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Ping cadence; must be shorter than [`PONG_WAIT`].
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Maximum inbound frame size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Write pump: drains the outbound queue, coalescing immediately-available
/// frames into one newline-separated payload, and keeps the peer alive
/// with periodic pings. Exits when the queue closes or a write fails.
pub(super) async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<ServerMessage>>,
) {
    let mut ping = tokio::time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = outbound.recv() => {
                let Some(message) = maybe else {
                    // Queue closed by the hub; say goodbye.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };

                let mut frame = match serde_json::to_string(&*message) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to encode outbound message");
                        continue;
                    }
                };
                // Batch whatever else is already queued; the receiver
                // tolerates newline-separated concatenated objects.
                while let Ok(next) = outbound.try_recv() {
                    match serde_json::to_string(&*next) {
                        Ok(encoded) => {
                            frame.push('\n');
                            frame.push_str(&encoded);
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "failed to encode outbound message");
                        }
                    }
                }

                match timeout(WRITE_WAIT, sink.send(Message::Text(frame.into()))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
            _ = ping.tick() => {
                match timeout(WRITE_WAIT, sink.send(Message::Ping(Vec::new().into()))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }
}

/// Read pump: enforces the frame size limit and the keep-alive deadline,
/// decodes frames, and hands them to the router. Returns on any read
/// error, close frame, or deadline expiry.
pub(super) async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    server: Arc<GameServer>,
    session: Arc<PlayerSession>,
) {
    loop {
        let frame = match timeout(PONG_WAIT, stream.next()).await {
            Err(_) => {
                tracing::warn!(player_id = %session.player_id(), "keep-alive deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                tracing::warn!(player_id = %session.player_id(), error = %err, "websocket read error");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                let player_id = session.player_id();

                if text.len() > MAX_MESSAGE_SIZE {
                    tracing::warn!(
                        player_id = %player_id,
                        size = text.len(),
                        max = MAX_MESSAGE_SIZE,
                        "inbound frame exceeds size limit"
                    );
                    server.hub().send_message(
                        &player_id,
                        ServerMessage::error(ErrorCode::InvalidMessage, "Message too large"),
                    );
                    continue;
                }

                let envelope = match Envelope::parse(text.as_str()) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::warn!(player_id = %player_id, error = %err, "failed to parse frame");
                        server.hub().send_message(
                            &player_id,
                            ServerMessage::error(err.error_code(), "Failed to parse message"),
                        );
                        continue;
                    }
                };

                let message = match ClientMessage::decode(envelope) {
                    Ok(message) => message,
                    Err(err) => {
                        server.hub().send_message(
                            &player_id,
                            ServerMessage::error(err.error_code(), &err.to_string()),
                        );
                        continue;
                    }
                };

                server.handle_message(&session, message);
            }
            Message::Close(_) => {
                tracing::debug!(player_id = %session.player_id(), "websocket closed by peer");
                break;
            }
            // Any frame refreshes the deadline; axum answers pings itself.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {
                tracing::debug!(player_id = %session.player_id(), "ignoring binary frame");
            }
        }
    }
}
