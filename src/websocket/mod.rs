// WebSocket module: axum routes, the upgrade handler, and the per-peer
// read/write pumps with keep-alive.

pub mod connection;
mod handler;
pub mod routes;

pub use connection::{MAX_MESSAGE_SIZE, PING_PERIOD, PONG_WAIT, WRITE_WAIT};
pub use routes::create_router;
