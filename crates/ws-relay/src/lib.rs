//! WebSocket relay between browser-automation clients and a remote browser
//! server.
//!
//! Every client connection gets its own connection to the backend. Frames
//! from the client pass through a chain of [`MessageInspector`]s (in
//! practice the credential-decrypting [`payload_codec::PayloadCodec`]) before
//! they are forwarded; frames from the backend are forwarded untouched.
//!
//! # Architecture
//!
//! ```text
//! Client  <--WS-->  ws-relay  <--WS-->  browser server
//!                     |
//!               [Inspectors]
//! ```
//!
//! The relay checks the upgrade path, connects to the backend, and runs the
//! two forwarding legs side by side. When either leg stops, both connections
//! are closed together.

pub mod listener;
pub mod path;
pub mod relay;

pub use listener::{
    Relay, RelayConfig, ShutdownPolicy, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE,
};
pub use relay::{ConnectionContext, Direction, InspectionResult, LegEnd, MessageInspector};
