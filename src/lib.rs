//! # periscope — real-time submarine tracking protocol engine
//!
//! Client-side engine for a monitoring server that reports encrypted
//! submarines over a persistent WebSocket channel: it keeps the channel
//! alive through network churn, reassembles out-of-order transmission
//! fragments, and recovers per-submarine XOR keys by incremental brute
//! force.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐    WebSocket    ┌──────────────┐
//! │ ConnectionSession │ ◄─────────────► │   server     │
//! │ (backoff, writer) │   JSON frames   └──────────────┘
//! └─────────┬─────────┘
//!           ▼
//! ┌───────────────────┐      ┌─────────────────────────┐
//! │    Dispatcher     │ ───► │     EntityRegistry      │
//! │ (typed routing)   │      │ submarines, trajectories │
//! └───────────────────┘      │ fragment buffers, keys   │
//!                            └───────────▲─────────────┘
//! ┌───────────────────┐                  │
//! │ KeyRecoveryEngine │ ─────────────────┘
//! │ (50ms tick/entity)│        ByteCipher ◄─► MorseCodec
//! └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON message envelope and typed payloads
//! - [`cipher`] — single-byte XOR over base64 payloads
//! - [`morse`] — fixed-table Morse decoder for intercepted chatter
//! - [`fragments`] — out-of-order multi-part reassembly
//! - [`registry`] — authoritative entity state, sole owner of mutation
//! - [`dispatch`] — routes decoded messages to registry mutations
//! - [`recovery`] — per-entity brute-force key search state machine
//! - [`session`] — connection lifecycle with bounded exponential backoff
//!
//! The engine renders nothing and persists nothing: map, table and chat
//! widgets consume [`session::TrackerEvent`]s and the registry accessors.

pub mod cipher;
pub mod dispatch;
pub mod fragments;
pub mod morse;
pub mod protocol;
pub mod recovery;
pub mod registry;
pub mod session;

// Re-exports for convenience
pub use dispatch::Dispatcher;
pub use fragments::{FragmentBuffer, FragmentOutcome};
pub use protocol::{
    ClientMessage, Coordinates, DetectedSubmarine, Position, Profile, ProtocolError,
    ServerMessage,
};
pub use recovery::KeyRecoveryEngine;
pub use registry::{
    EntityRegistry, InterceptedMessage, Submarine, SubmarineState, ViewMode,
    ENCRYPTED_PLACEHOLDER,
};
pub use session::{
    BackoffPolicy, ConnectionSession, ConnectionStatus, SessionConfig, TrackerEvent,
};
