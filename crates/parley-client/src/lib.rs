//! Client
//!
//! Action-based chat session state machine for the Parley protocol.
//! Manages the connection lifecycle for a single identity, announces the
//! join, and keeps an ordered, de-duplicated log of received chat events.
//!
//! # Architecture
//!
//! The session follows the Sans-IO and Action-Based patterns: consumer
//! intents (`login`, `send_message`, `teardown`) and transport completions
//! are fed into the pure state machine, which returns actions
//! ([`SessionAction`]) for the caller to execute.
//!
//! # Components
//!
//! - [`Session`]: connection lifecycle state machine
//! - [`MessageChannel`]: append-only ordered log of received events
//! - [`SessionAction`]: actions produced for the driver
//! - [`SessionError`]: errors surfaced to the caller
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectionHandle`]: WebSocket connection handle
//! - [`transport::connect`]: connect to a broker

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod channel;
mod error;
mod event;
mod session;

#[cfg(feature = "transport")]
pub mod transport;

pub use channel::{Logged, MessageChannel, Seq};
pub use error::SessionError;
pub use event::{ConnectToken, SessionAction};
pub use parley_proto::{ChatEvent, EventKind, Frame, Identity, InvalidIdentity};
pub use session::{
    ConnectionState, DEFAULT_BROADCAST_TOPIC, DEFAULT_ENDPOINT, DEFAULT_JOIN_DESTINATION,
    DEFAULT_SEND_DESTINATION, Session, SessionConfig,
};
