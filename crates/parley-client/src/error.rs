//! Session error types.
//!
//! Identity and readiness errors surface synchronously from the offending
//! call. Transport failures never appear here: they arrive through
//! [`crate::Session::connect_failed`] and become the
//! `Failed { reason }` state instead of an `Err`.

use thiserror::Error;

use crate::session::ConnectionState;

/// Errors surfaced to callers of session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Login attempted with an empty or whitespace-only display name.
    /// Rejected before any state transition or I/O.
    #[error(transparent)]
    InvalidIdentity(#[from] parley_proto::InvalidIdentity),

    /// Operation attempted in a state that does not permit it.
    #[error("not ready: cannot {operation} while {state}")]
    NotReady {
        /// State at the time of the call.
        state: ConnectionState,
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// Send attempted with empty or whitespace-only content.
    #[error("message content must be non-empty")]
    EmptyMessage,

    /// Inbound frame body was not a valid chat event. The frame is dropped
    /// and the session stays connected.
    #[error(transparent)]
    Decode(#[from] parley_proto::DecodeError),
}
