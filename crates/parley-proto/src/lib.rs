//! Wire types for the Parley chat protocol.
//!
//! Two layers, both free of I/O:
//!
//! - [`Frame`]: a STOMP-flavoured text frame carrying a command, headers, and
//!   an opaque body. This is the unit the transport moves; it never looks
//!   inside the body.
//! - [`ChatEvent`]: the JSON chat event model (`sender`/`type`/`content`)
//!   carried in `Message` and `Send` frame bodies. Decoding is strict: any
//!   other shape is a [`DecodeError`].
//!
//! The session layer owns (de)serialization of [`ChatEvent`]; the transport
//! layer only ever sees [`Frame`]s.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
mod frame;

pub use error::ProtocolError;
pub use event::{ChatEvent, DecodeError, EventKind, Identity, InvalidIdentity};
pub use frame::{Command, Frame};
