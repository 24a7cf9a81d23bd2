//! Frame-level protocol errors.
//!
//! These cover the text frame codec only. Chat event body errors are the
//! separate [`crate::DecodeError`] so callers can tell "the frame was
//! garbage" apart from "the frame was fine but the body was not a chat
//! event".

use thiserror::Error;

/// Errors from encoding or decoding text frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame structure is invalid (missing command line, bad header syntax).
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Command line is not a known command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Frame does not end with the NUL terminator.
    #[error("missing frame terminator")]
    MissingTerminator,
}
