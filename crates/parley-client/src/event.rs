//! Session actions.
//!
//! The session is sans-IO: every operation returns a list of
//! [`SessionAction`]s for the driver to execute against the transport
//! adapter. Completions flow back in through
//! [`crate::Session::connect_succeeded`] /
//! [`crate::Session::connect_failed`] and
//! [`crate::Session::handle_frame`].

use parley_proto::Frame;

/// Token identifying one connect attempt.
///
/// Minted by `login`; completions carrying a stale token are ignored. This
/// is what makes teardown-while-connecting safe: teardown invalidates the
/// token, so the late completion cannot transition state or publish a
/// join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectToken(pub(crate) u64);

/// Actions the session produces for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open the underlying channel to the broker. The driver reports the
    /// outcome via `connect_succeeded`/`connect_failed` with this token.
    Connect {
        /// Broker endpoint to dial.
        endpoint: String,
        /// Token to hand back with the completion.
        token: ConnectToken,
    },

    /// Subscribe to a broadcast topic. Inbound frames for the topic come
    /// back through `handle_frame`.
    Subscribe {
        /// Topic to subscribe to.
        topic: String,
    },

    /// Publish an outbound frame body to a destination.
    Publish {
        /// Destination to publish to.
        destination: String,
        /// Serialized chat event body.
        body: String,
    },

    /// Close the channel and release all subscriptions. Idempotent at the
    /// adapter.
    Disconnect,
}

impl SessionAction {
    /// Render a `Publish` action as the wire frame it becomes.
    ///
    /// Convenience for drivers and tests; `Connect`/`Subscribe`/
    /// `Disconnect` map to adapter calls rather than single frames.
    pub fn to_frame(&self) -> Option<Frame> {
        match self {
            Self::Publish { destination, body } => Some(Frame::send(destination, body.clone())),
            Self::Connect { .. } | Self::Subscribe { .. } | Self::Disconnect => None,
        }
    }
}
