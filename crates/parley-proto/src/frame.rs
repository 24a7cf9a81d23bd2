//! STOMP-flavoured text frame codec.
//!
//! Wire layout:
//!
//! ```text
//! COMMAND \n
//! header:value \n
//! ...
//! \n
//! body \0
//! ```
//!
//! Headers split on the first `:`; values may contain further colons. The
//! body is opaque to this layer and runs from the blank line to the NUL
//! terminator. Decoding is total: malformed input yields
//! [`ProtocolError`], never a panic.

use std::fmt;

use crate::error::ProtocolError;

/// Frame commands understood by the protocol.
///
/// Clients emit `Connect`, `Subscribe`, `Unsubscribe`, `Send`, and
/// `Disconnect`; brokers emit `Connected`, `Message`, and `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Client handshake request.
    Connect,
    /// Broker handshake acknowledgement.
    Connected,
    /// Client publish to a destination.
    Send,
    /// Client subscription to a topic.
    Subscribe,
    /// Client subscription release.
    Unsubscribe,
    /// Client graceful close.
    Disconnect,
    /// Broker broadcast to a subscribed topic.
    Message,
    /// Broker-reported error.
    Error,
}

impl Command {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Error => "ERROR",
        }
    }

    /// Parse a command line.
    fn parse(line: &str) -> Result<Self, ProtocolError> {
        match line {
            "CONNECT" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            "ERROR" => Ok(Self::Error),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete protocol frame.
///
/// Pure data holder. The body is an opaque string to this layer; chat event
/// (de)serialization happens above in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order. Duplicate names are allowed; lookups return
    /// the first match.
    pub headers: Vec<(String, String)>,
    /// Opaque body.
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and no body.
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Client handshake frame.
    pub fn connect() -> Self {
        Self::new(Command::Connect).with_header("accept-version", "1.2")
    }

    /// Subscription frame binding `id` to `topic`.
    pub fn subscribe(id: u64, topic: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id.to_string())
            .with_header("destination", topic)
    }

    /// Subscription release frame.
    pub fn unsubscribe(id: u64) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id.to_string())
    }

    /// Publish frame carrying `body` to `destination`.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        let mut frame = Self::new(Command::Send).with_header("destination", destination);
        frame.body = body.into();
        frame
    }

    /// Broker broadcast frame for `topic` (used by brokers and tests).
    pub fn message(topic: &str, body: impl Into<String>) -> Self {
        let mut frame = Self::new(Command::Message).with_header("destination", topic);
        frame.body = body.into();
        frame
    }

    /// Graceful close frame.
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with the given name, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// The `destination` header, required on `Send` and `Message` frames.
    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// The `id` header of `Subscribe`/`Unsubscribe` frames.
    pub fn subscription(&self) -> Option<&str> {
        self.header("id")
    }

    /// Encode to the wire text form.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one frame from its wire text form.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::MissingTerminator`] without a trailing NUL
    /// - [`ProtocolError::UnknownCommand`] for an unrecognized command line
    /// - [`ProtocolError::MalformedFrame`] for bad header syntax or a
    ///   missing blank line
    pub fn decode(input: &str) -> Result<Self, ProtocolError> {
        let Some(inner) = input.strip_suffix('\0') else {
            return Err(ProtocolError::MissingTerminator);
        };
        if inner.contains('\0') {
            return Err(ProtocolError::MalformedFrame("embedded NUL".to_string()));
        }

        let Some((head, body)) = inner.split_once("\n\n") else {
            return Err(ProtocolError::MalformedFrame("missing blank line".to_string()));
        };

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| ProtocolError::MalformedFrame("empty frame".to_string()))?;
        let command = Command::parse(command_line)?;

        let mut headers = Vec::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                return Err(ProtocolError::MalformedFrame(format!("header without colon: {line}")));
            };
            if name.is_empty() {
                return Err(ProtocolError::MalformedFrame("empty header name".to_string()));
            }
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Self { command, headers, body: body.to_string() })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_message_frame() {
        let frame = Frame::message("/topic/public", "{\"x\":1}");
        let decoded = Frame::decode(&frame.encode()).unwrap();

        assert_eq!(decoded.command, Command::Message);
        assert_eq!(decoded.destination(), Some("/topic/public"));
        assert_eq!(decoded.body, "{\"x\":1}");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn body_may_contain_blank_lines() {
        let frame = Frame::send("/app/chat.sendMessage", "line one\n\nline two");
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.body, "line one\n\nline two");
    }

    #[test]
    fn header_value_may_contain_colons() {
        let frame = Frame::new(Command::Connected).with_header("session", "a:b:c");
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.header("session"), Some("a:b:c"));
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let result = Frame::decode("MESSAGE\n\nbody");
        assert_eq!(result, Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let result = Frame::decode("SHOUT\n\n\0");
        assert!(matches!(result, Err(ProtocolError::UnknownCommand(c)) if c == "SHOUT"));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let result = Frame::decode("SEND\ndestination\n\n\0");
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn missing_blank_line_is_rejected() {
        let result = Frame::decode("SEND\ndestination:/x\0");
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn subscribe_frame_carries_id_and_destination() {
        let frame = Frame::subscribe(7, "/topic/public");
        assert_eq!(frame.subscription(), Some("7"));
        assert_eq!(frame.destination(), Some("/topic/public"));
    }

    #[test]
    fn first_duplicate_header_wins() {
        let frame =
            Frame::new(Command::Message).with_header("destination", "/a").with_header("destination", "/b");
        assert_eq!(frame.destination(), Some("/a"));
    }
}
