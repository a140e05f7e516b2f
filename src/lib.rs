#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! # Mafia Server
//!
//! Authoritative WebSocket server for a real-time social-deduction game.
//!
//! The server owns room membership, role assignment, phase progression,
//! night/day resolution, voting, win detection, reconnection, and the
//! voice-routing permissions derived from game state. Everything is held
//! in memory; there is no persistence across restarts.

/// Environment configuration
pub mod config;

/// Game state machine, roles, and the phase-timer runtime
pub mod game;

/// Connection registry and room fan-out
pub mod hub;

/// Structured logging setup
pub mod logging;

/// Wire protocol: envelope, messages, error codes, identifiers
pub mod protocol;

/// Rooms, players, settings, and the room registry
pub mod room;

/// Message router and game-event fan-out
pub mod server;

/// Voice routing derivation and the SFU signaling facade
pub mod voice;

/// HTTP routes, websocket upgrade, and connection pumps
pub mod websocket;
