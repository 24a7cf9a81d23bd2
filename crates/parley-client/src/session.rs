//! Chat session state machine.
//!
//! Owns the connection lifecycle for a single identity and guarantees
//! ordered, de-duplicated delivery of chat events into the
//! [`MessageChannel`]. Uses the action pattern: consumer intents and
//! transport completions mutate owned state and return actions for the
//! driver to execute. No I/O happens here, which keeps every transition
//! directly testable.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐  login   ┌────────────┐  connect ok   ┌───────────┐
//! │ Disconnected │─────────>│ Connecting │──────────────>│ Connected │
//! └──────────────┘          └────────────┘               └───────────┘
//!        ↑                        │ connect failed             │
//!        │ teardown               ↓                            │ teardown
//!        │                  ┌────────────┐      login          │
//!        └──────────────────│   Failed   │───> Connecting <────┘
//!                           └────────────┘
//! ```
//!
//! Exactly one connect attempt is in flight at a time: each `login` mints
//! a fresh [`ConnectToken`] and completions carrying a stale token are
//! ignored. Teardown while `Connecting` invalidates the token, so the
//! eventual completion can neither transition state nor publish a join.

use std::collections::HashSet;
use std::fmt;

use parley_proto::{ChatEvent, Command, EventKind, Frame, Identity};
use tracing::{debug, warn};

use crate::channel::MessageChannel;
use crate::error::SessionError;
use crate::event::{ConnectToken, SessionAction};

/// Default broker endpoint, matching the reference deployment.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";

/// Default broadcast topic carrying all chat events for the room.
pub const DEFAULT_BROADCAST_TOPIC: &str = "/topic/public";

/// Default destination for the join announcement.
pub const DEFAULT_JOIN_DESTINATION: &str = "/app/chat.addUser";

/// Default destination for user messages.
pub const DEFAULT_SEND_DESTINATION: &str = "/app/chat.sendMessage";

/// Connection lifecycle state. Exactly one value at any time, owned
/// exclusively by the [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// Connect attempt in flight.
    Connecting,
    /// Channel open, join announced, sends accepted.
    Connected,
    /// Last connect attempt failed. Retry requires a fresh login.
    Failed {
        /// Why the attempt failed.
        reason: String,
    },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

/// Session configuration: endpoint and broker destinations.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker endpoint to dial.
    pub endpoint: String,
    /// Broadcast topic to subscribe to once connected.
    pub broadcast_topic: String,
    /// Destination for the join announcement.
    pub join_destination: String,
    /// Destination for user messages.
    pub send_destination: String,
}

impl SessionConfig {
    /// Configuration for the given endpoint with default destinations.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Self::default() }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            broadcast_topic: DEFAULT_BROADCAST_TOPIC.to_string(),
            join_destination: DEFAULT_JOIN_DESTINATION.to_string(),
            send_destination: DEFAULT_SEND_DESTINATION.to_string(),
        }
    }
}

/// State machine for one chat session.
///
/// Independently constructable; holds no global state. The consumer calls
/// [`login`](Self::login), [`send_message`](Self::send_message), and
/// [`teardown`](Self::teardown); the driver feeds back
/// [`connect_succeeded`](Self::connect_succeeded) /
/// [`connect_failed`](Self::connect_failed) and inbound frames via
/// [`handle_frame`](Self::handle_frame).
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    state: ConnectionState,
    /// Display name for the session lifetime. Set by `login`, cleared by
    /// `teardown`.
    identity: Option<Identity>,
    /// Current connect attempt number; completions must match.
    attempt: u64,
    /// Topic we hold a subscription for while connected.
    subscription: Option<String>,
    /// Senders with a `Join` logged in the current epoch. Used for join
    /// de-duplication and the join-before-chat ordering invariant.
    joined: HashSet<String>,
    channel: MessageChannel,
}

impl Session {
    /// Create a session in [`ConnectionState::Disconnected`].
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            identity: None,
            attempt: 0,
            subscription: None,
            joined: HashSet::new(),
            channel: MessageChannel::new(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// The ordered log of received chat events.
    pub fn events(&self) -> &MessageChannel {
        &self.channel
    }

    /// Identity for the current session, if logged in.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Topic currently subscribed to, if connected.
    pub fn subscription(&self) -> Option<&str> {
        self.subscription.as_deref()
    }

    /// Log in with a display name and start connecting.
    ///
    /// The identity is validated before any state transition: a blank name
    /// leaves the session `Disconnected`. Allowed from `Disconnected` and
    /// `Failed`; a session that is already connecting or connected must be
    /// torn down first.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidIdentity`] for a blank display name
    /// - [`SessionError::NotReady`] while `Connecting` or `Connected`
    pub fn login(&mut self, name: &str) -> Result<Vec<SessionAction>, SessionError> {
        let identity = Identity::new(name)?;

        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed { .. } => {},
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(SessionError::NotReady {
                    state: self.state.clone(),
                    operation: "login",
                });
            },
        }

        self.identity = Some(identity);
        self.attempt += 1;
        self.state = ConnectionState::Connecting;
        debug!(endpoint = %self.config.endpoint, attempt = self.attempt, "connecting");

        Ok(vec![SessionAction::Connect {
            endpoint: self.config.endpoint.clone(),
            token: ConnectToken(self.attempt),
        }])
    }

    /// Report a successful connect.
    ///
    /// Subscribes to the broadcast topic and announces the join: the own
    /// `Join` event is appended locally (so the channel immediately reads
    /// `[Join(me)]`) and published exactly once, before any user `Chat`
    /// can be accepted. A stale token is ignored without effect.
    pub fn connect_succeeded(&mut self, token: ConnectToken) -> Vec<SessionAction> {
        if self.state != ConnectionState::Connecting || token.0 != self.attempt {
            warn!(?token, state = %self.state, "ignoring stale connect success");
            return Vec::new();
        }
        let Some(identity) = self.identity.clone() else {
            // Cannot happen: Connecting is only entered via login.
            warn!("connect success without identity; ignoring");
            return Vec::new();
        };

        self.state = ConnectionState::Connected;
        self.subscription = Some(self.config.broadcast_topic.clone());
        self.channel.begin_epoch();
        self.joined.clear();

        let join = ChatEvent::new(
            identity.clone(),
            EventKind::Join,
            format!("{identity} joined the chat"),
        );
        self.joined.insert(identity.as_str().to_string());
        self.channel.append(join.clone());
        debug!(identity = %identity, "connected, announcing join");

        vec![
            SessionAction::Subscribe { topic: self.config.broadcast_topic.clone() },
            SessionAction::Publish {
                destination: self.config.join_destination.clone(),
                body: join.to_json(),
            },
        ]
    }

    /// Report a failed connect.
    ///
    /// Transitions to `Failed { reason }`; no automatic retry. A stale
    /// token is ignored without effect.
    pub fn connect_failed(&mut self, token: ConnectToken, reason: &str) -> Vec<SessionAction> {
        if self.state != ConnectionState::Connecting || token.0 != self.attempt {
            warn!(?token, state = %self.state, "ignoring stale connect failure");
            return Vec::new();
        }

        self.state = ConnectionState::Failed { reason: reason.to_string() };
        self.subscription = None;
        debug!(reason, "connect failed");
        Vec::new()
    }

    /// Publish a chat message.
    ///
    /// The message appears in the channel when the broker echoes it back,
    /// keeping one ordering authority for all participants.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotReady`] outside `Connected`; never silently
    ///   dropped
    /// - [`SessionError::EmptyMessage`] for empty or whitespace-only
    ///   content
    pub fn send_message(&mut self, content: &str) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != ConnectionState::Connected {
            return Err(SessionError::NotReady { state: self.state.clone(), operation: "send" });
        }
        if content.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let Some(identity) = self.identity.clone() else {
            // Cannot happen: Connected is only entered with an identity.
            return Err(SessionError::NotReady { state: self.state.clone(), operation: "send" });
        };

        let chat = ChatEvent::new(identity, EventKind::Chat, content);
        Ok(vec![SessionAction::Publish {
            destination: self.config.send_destination.clone(),
            body: chat.to_json(),
        }])
    }

    /// Process an inbound frame from the transport.
    ///
    /// Only `Message` frames for the subscribed topic are considered;
    /// everything else is dropped. A malformed body yields
    /// [`SessionError::Decode`], drops the frame, and leaves the session
    /// connected. Frames arriving outside `Connected` (late delivery after
    /// teardown) are ignored.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connected {
            debug!(state = %self.state, "dropping frame outside connected state");
            return Ok(());
        }
        if frame.command != Command::Message {
            debug!(command = %frame.command, "dropping non-message frame");
            return Ok(());
        }
        if frame.destination() != self.subscription.as_deref() {
            debug!(destination = ?frame.destination(), "dropping frame for unknown topic");
            return Ok(());
        }

        let event = ChatEvent::from_json(&frame.body).inspect_err(|e| {
            warn!(error = %e, "dropping malformed chat event");
        })?;
        self.log_event(event);
        Ok(())
    }

    /// Tear down the session.
    ///
    /// Releases the subscription, forgets the identity, and invalidates
    /// any in-flight connect attempt. The channel history is retained; the
    /// core never discards entries implicitly. Idempotent.
    pub fn teardown(&mut self) -> Vec<SessionAction> {
        // Invalidate any in-flight completion.
        self.attempt += 1;

        let had_channel = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        );

        self.state = ConnectionState::Disconnected;
        self.identity = None;
        self.subscription = None;
        self.joined.clear();

        if had_channel {
            debug!("tearing down session");
            vec![SessionAction::Disconnect]
        } else {
            Vec::new()
        }
    }

    /// Append an event, enforcing join-first ordering and de-duplication.
    ///
    /// A `Chat` or `Leave` from a sender without a logged `Join` in this
    /// epoch gets a synthesized `Join` appended first, so the channel
    /// invariant holds even against a non-cooperating broker. Duplicate
    /// `Join`s (including the broker's echo of our own announcement) are
    /// dropped.
    fn log_event(&mut self, event: ChatEvent) {
        let sender = event.sender.as_str().to_string();
        match event.kind {
            EventKind::Join => {
                if !self.joined.insert(sender) {
                    debug!(sender = %event.sender, "dropping duplicate join");
                    return;
                }
            },
            EventKind::Chat => {
                if self.joined.insert(sender) {
                    self.synthesize_join(&event.sender);
                }
            },
            EventKind::Leave => {
                if !self.joined.remove(&sender) {
                    self.synthesize_join(&event.sender);
                }
            },
        }
        self.channel.append(event);
    }

    /// Append an implied `Join` for a sender the broker never announced.
    fn synthesize_join(&mut self, sender: &Identity) {
        warn!(sender = %sender, "no join seen for sender, synthesizing one");
        self.channel.append(ChatEvent::new(
            sender.clone(),
            EventKind::Join,
            format!("{sender} joined the chat"),
        ));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message(body: &str) -> Frame {
        Frame::message(DEFAULT_BROADCAST_TOPIC, body)
    }

    fn event_json(sender: &str, kind: &str, content: &str) -> String {
        format!(r#"{{"sender":"{sender}","type":"{kind}","content":"{content}"}}"#)
    }

    fn logged_in() -> (Session, ConnectToken) {
        let mut session = Session::new(SessionConfig::default());
        let actions = session.login("alice").unwrap();
        let token = match actions[0] {
            SessionAction::Connect { token, .. } => token,
            ref other => panic!("expected Connect, got {other:?}"),
        };
        (session, token)
    }

    fn connected() -> Session {
        let (mut session, token) = logged_in();
        session.connect_succeeded(token);
        session
    }

    #[test]
    fn login_starts_connecting() {
        let mut session = Session::new(SessionConfig::default());
        let actions = session.login("alice").unwrap();

        assert_eq!(*session.state(), ConnectionState::Connecting);
        assert_eq!(session.identity().map(Identity::as_str), Some("alice"));
        assert!(matches!(
            &actions[..],
            [SessionAction::Connect { endpoint, .. }] if endpoint == DEFAULT_ENDPOINT
        ));
    }

    #[test]
    fn blank_identity_rejected_before_transition() {
        let mut session = Session::new(SessionConfig::default());
        for name in ["", "   ", "\t\n"] {
            let result = session.login(name);
            assert!(matches!(result, Err(SessionError::InvalidIdentity(_))));
            assert_eq!(*session.state(), ConnectionState::Disconnected);
            assert!(session.identity().is_none());
        }
    }

    #[test]
    fn login_while_connecting_rejected() {
        let (mut session, _) = logged_in();
        let result = session.login("bob");
        assert!(matches!(result, Err(SessionError::NotReady { .. })));
        assert_eq!(session.identity().map(Identity::as_str), Some("alice"));
    }

    #[test]
    fn connect_success_subscribes_and_announces_join() {
        let (mut session, token) = logged_in();
        let actions = session.connect_succeeded(token);

        assert_eq!(*session.state(), ConnectionState::Connected);
        assert_eq!(session.subscription(), Some(DEFAULT_BROADCAST_TOPIC));
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            &actions[0],
            SessionAction::Subscribe { topic } if topic == DEFAULT_BROADCAST_TOPIC
        ));
        match &actions[1] {
            SessionAction::Publish { destination, body } => {
                assert_eq!(destination, DEFAULT_JOIN_DESTINATION);
                assert_eq!(
                    *body,
                    event_json("alice", "JOIN", "alice joined the chat")
                );
            },
            other => panic!("expected Publish, got {other:?}"),
        }

        // Channel immediately holds exactly the own join.
        let kinds: Vec<_> = session.events().iter().map(|l| l.event.kind).collect();
        assert_eq!(kinds, [EventKind::Join]);
    }

    #[test]
    fn connect_failure_records_reason() {
        let (mut session, token) = logged_in();
        let actions = session.connect_failed(token, "broker unreachable");

        assert!(actions.is_empty());
        assert_eq!(
            *session.state(),
            ConnectionState::Failed { reason: "broker unreachable".to_string() }
        );
    }

    #[test]
    fn login_retries_from_failed() {
        let (mut session, token) = logged_in();
        session.connect_failed(token, "nope");

        let actions = session.login("alice").unwrap();
        assert_eq!(*session.state(), ConnectionState::Connecting);
        assert!(matches!(&actions[..], [SessionAction::Connect { .. }]));
    }

    #[test]
    fn send_publishes_chat_event() {
        let mut session = connected();
        let actions = session.send_message("hi").unwrap();

        match &actions[..] {
            [SessionAction::Publish { destination, body }] => {
                assert_eq!(destination, DEFAULT_SEND_DESTINATION);
                assert_eq!(*body, event_json("alice", "CHAT", "hi"));
            },
            other => panic!("expected single Publish, got {other:?}"),
        }

        // Not appended locally; the broker echo is the ordering authority.
        assert_eq!(session.events().len(), 1);
    }

    #[test]
    fn send_outside_connected_is_not_ready() {
        let mut session = Session::new(SessionConfig::default());
        assert!(matches!(
            session.send_message("hi"),
            Err(SessionError::NotReady { operation: "send", .. })
        ));

        let (mut session, token) = logged_in();
        session.connect_failed(token, "x");
        assert!(matches!(session.send_message("hi"), Err(SessionError::NotReady { .. })));
        assert!(session.events().is_empty());
    }

    #[test]
    fn blank_message_rejected() {
        let mut session = connected();
        assert_eq!(session.send_message("   "), Err(SessionError::EmptyMessage));
        assert_eq!(session.send_message(""), Err(SessionError::EmptyMessage));
    }

    #[test]
    fn echo_appends_after_join() {
        // The happy path: login, connect, send, receive the echo.
        let mut session = connected();
        session.send_message("hi").unwrap();
        session.handle_frame(&message(&event_json("alice", "CHAT", "hi"))).unwrap();

        let log: Vec<_> = session
            .events()
            .iter()
            .map(|l| (l.event.kind, l.event.content.clone()))
            .collect();
        assert_eq!(log, [
            (EventKind::Join, "alice joined the chat".to_string()),
            (EventKind::Chat, "hi".to_string()),
        ]);
    }

    #[test]
    fn malformed_frame_is_contained() {
        let mut session = connected();
        let before = session.events().len();

        let result = session.handle_frame(&message("{not json"));
        assert!(matches!(result, Err(SessionError::Decode(_))));
        assert_eq!(session.events().len(), before);
        assert_eq!(*session.state(), ConnectionState::Connected);

        // Session keeps working afterwards.
        session.handle_frame(&message(&event_json("bob", "JOIN", "bob joined"))).unwrap();
        assert_eq!(session.events().len(), before + 1);
    }

    #[test]
    fn wrong_shape_is_contained() {
        let mut session = connected();
        for body in [r#"{"sender":"a","type":"CHAT"}"#, r#"{"who":"a"}"#, "[]"] {
            assert!(matches!(
                session.handle_frame(&message(body)),
                Err(SessionError::Decode(_))
            ));
        }
        assert_eq!(*session.state(), ConnectionState::Connected);
    }

    #[test]
    fn frames_preserve_delivery_order() {
        let mut session = connected();
        for i in 0..5 {
            let body = event_json("bob", "CHAT", &format!("m{i}"));
            session.handle_frame(&message(&body)).unwrap();
        }

        let chats: Vec<_> = session
            .events()
            .iter()
            .filter(|l| l.event.kind == EventKind::Chat)
            .map(|l| l.event.content.clone())
            .collect();
        assert_eq!(chats, ["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn teardown_while_connecting_ignores_late_success() {
        let (mut session, token) = logged_in();
        let actions = session.teardown();
        assert_eq!(actions, [SessionAction::Disconnect]);
        assert_eq!(*session.state(), ConnectionState::Disconnected);

        // Late completion: must not transition nor append a join.
        let late = session.connect_succeeded(token);
        assert!(late.is_empty());
        assert_eq!(*session.state(), ConnectionState::Disconnected);
        assert!(session.events().is_empty());
    }

    #[test]
    fn teardown_while_connecting_ignores_late_failure() {
        let (mut session, token) = logged_in();
        session.teardown();

        let late = session.connect_failed(token, "too late");
        assert!(late.is_empty());
        assert_eq!(*session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn teardown_is_idempotent_and_keeps_history() {
        let mut session = connected();
        session.handle_frame(&message(&event_json("bob", "JOIN", "hi"))).unwrap();
        let history = session.events().len();

        let first = session.teardown();
        assert_eq!(first, [SessionAction::Disconnect]);
        assert!(session.identity().is_none());
        assert!(session.subscription().is_none());

        let second = session.teardown();
        assert!(second.is_empty());
        assert_eq!(session.events().len(), history);
    }

    #[test]
    fn late_frames_after_teardown_are_ignored() {
        let mut session = connected();
        session.teardown();

        session.handle_frame(&message(&event_json("bob", "CHAT", "ghost"))).unwrap();
        assert_eq!(session.events().len(), 1); // Only the own join remains.
    }

    #[test]
    fn own_join_echo_is_deduplicated() {
        let mut session = connected();
        session
            .handle_frame(&message(&event_json("alice", "JOIN", "alice joined the chat")))
            .unwrap();

        let joins = session
            .events()
            .iter()
            .filter(|l| l.event.kind == EventKind::Join)
            .count();
        assert_eq!(joins, 1);
    }

    #[test]
    fn chat_before_join_synthesizes_join() {
        let mut session = connected();
        session.handle_frame(&message(&event_json("mallory", "CHAT", "first"))).unwrap();

        let log: Vec<_> = session
            .events()
            .iter()
            .map(|l| (l.event.sender.as_str().to_string(), l.event.kind))
            .collect();
        assert_eq!(log, [
            ("alice".to_string(), EventKind::Join),
            ("mallory".to_string(), EventKind::Join),
            ("mallory".to_string(), EventKind::Chat),
        ]);
    }

    #[test]
    fn leave_retires_sender_so_rejoin_is_logged() {
        let mut session = connected();
        session.handle_frame(&message(&event_json("bob", "JOIN", "in"))).unwrap();
        session.handle_frame(&message(&event_json("bob", "LEAVE", "out"))).unwrap();
        session.handle_frame(&message(&event_json("bob", "JOIN", "back"))).unwrap();

        let bob_kinds: Vec<_> = session
            .events()
            .iter()
            .filter(|l| l.event.sender.as_str() == "bob")
            .map(|l| l.event.kind)
            .collect();
        assert_eq!(bob_kinds, [EventKind::Join, EventKind::Leave, EventKind::Join]);
    }

    #[test]
    fn frames_for_other_topics_are_dropped() {
        let mut session = connected();
        let frame = Frame::message("/topic/other", &event_json("bob", "CHAT", "x"));
        session.handle_frame(&frame).unwrap();
        assert_eq!(session.events().len(), 1);
    }

    #[test]
    fn non_message_frames_are_dropped() {
        let mut session = connected();
        let frame = Frame::new(Command::Error).with_header("message", "boom");
        session.handle_frame(&frame).unwrap();
        assert_eq!(session.events().len(), 1);
        assert_eq!(*session.state(), ConnectionState::Connected);
    }

    #[test]
    fn reconnect_keeps_old_entries_in_order() {
        let mut session = connected();
        session.handle_frame(&message(&event_json("bob", "JOIN", "hi"))).unwrap();
        session.teardown();

        let actions = session.login("alice").unwrap();
        let token = match actions[0] {
            SessionAction::Connect { token, .. } => token,
            ref other => panic!("expected Connect, got {other:?}"),
        };
        session.connect_succeeded(token);

        // Old epoch entries retained, new join appended after them.
        assert_eq!(session.events().len(), 3);
        let seqs: Vec<_> = session.events().iter().map(|l| l.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
    }
}
