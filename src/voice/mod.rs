// Voice module: routing derivation (pure) and the SFU signaling facade.

pub mod routing;
pub mod sfu;

pub use routing::{derive_routing, VoicePhase, VoicePlayer};
pub use sfu::{LoopbackNegotiator, MediaNegotiator, Sfu, VoiceError};
