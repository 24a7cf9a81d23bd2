//! Chat event model and its JSON wire form.
//!
//! The broker speaks one JSON object shape:
//!
//! ```json
//! { "sender": "alice", "type": "CHAT", "content": "hi" }
//! ```
//!
//! Decoding is strict: unknown fields, missing fields, a blank sender, or
//! an unrecognized `type` all yield [`DecodeError`]. Events are immutable
//! once constructed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A user-chosen display name, non-empty after trimming.
///
/// Uniqueness is not enforced here; that is a broker concern. Validation
/// runs both at construction and during deserialization, so a blank
/// `sender` on the wire is a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

/// Rejected display name: empty or whitespace-only.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("identity must be a non-empty display name")]
pub struct InvalidIdentity;

impl Identity {
    /// Validate and wrap a display name.
    ///
    /// # Errors
    ///
    /// [`InvalidIdentity`] if the name is empty or whitespace-only.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidIdentity> {
        let name = name.into();
        if name.trim().is_empty() { Err(InvalidIdentity) } else { Ok(Self(name)) }
    }

    /// The display name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = InvalidIdentity;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A user joined the room.
    Join,
    /// A user left the room.
    Leave,
    /// A user sent a message.
    Chat,
}

/// One chat event as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatEvent {
    /// Who produced the event.
    pub sender: Identity,
    /// Event kind, serialized as the `type` field.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Human-readable content. For `Join`/`Leave` this is the announcement
    /// text; for `Chat` it is the message itself.
    pub content: String,
}

/// Malformed chat event body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed chat event: {reason}")]
pub struct DecodeError {
    reason: String,
}

impl ChatEvent {
    /// Construct an event.
    pub fn new(sender: Identity, kind: EventKind, content: impl Into<String>) -> Self {
        Self { sender, kind, content: content.into() }
    }

    /// Encode to the JSON wire form.
    pub fn to_json(&self) -> String {
        // INVARIANT: serialization of this struct cannot fail: all fields
        // are strings or unit enum variants.
        #[allow(clippy::expect_used)]
        serde_json::to_string(self).expect("invariant: ChatEvent serializes infallibly")
    }

    /// Decode from the JSON wire form.
    ///
    /// # Errors
    ///
    /// [`DecodeError`] for any input that is not exactly the
    /// `{sender, type, content}` object shape.
    pub fn from_json(body: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(body).map_err(|e| DecodeError { reason: e.to_string() })
    }
}
