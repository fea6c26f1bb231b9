//! Bidirectional messaging session with the main game.
//!
//! Newline-delimited JSON over one persistent TCP connection. The game pushes
//! song positions, mic profiles and recording commands; the client streams
//! per-beat pitch detection results back.
//!
//! Architecture:
//! - Receive thread: polls the socket, routes decoded messages
//! - Probe thread: sends a no-op message when the peer looks idle, so a
//!   silently dead mobile connection surfaces as a send failure
//! - Owner tick: consumes deferred recording commands, checks staleness
//!
//! Protocol:
//! - Each line is a JSON object with a `MessageType` tag
//! - Inbound (game → client): positions, profiles, recording commands
//! - Outbound (client → game): pitch event batches, liveness probes

mod client;
mod protocol;
mod router;
mod transport;


pub use client::{CompanionClient, ConnectEvent, RecordingControl, RecordingEvent};
pub use protocol::{BeatPitchEventDto, ClientMessage, ServerMessage};
pub use router::{PendingActions, ProtocolRouter};
pub use transport::{
    SessionTransport, RECEIVE_POLL_INTERVAL_MILLIS, STILL_ALIVE_CHECK_INTERVAL_MILLIS,
};
