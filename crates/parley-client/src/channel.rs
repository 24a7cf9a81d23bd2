//! Append-only message channel.
//!
//! The channel is the ordered log of chat events the consumer renders.
//! `append` is the only mutator and is crate-private: only the session
//! writes here, on inbound frame decode. The consumer re-enumerates the
//! full history whenever it likes via [`MessageChannel::iter`]; entries are
//! never discarded or reordered by the core.

use parley_proto::ChatEvent;

/// Opaque order token assigned at append time.
///
/// `Ord` follows local append order. Tokens from the same connection epoch
/// also reflect broker delivery order; across epochs only the local append
/// order is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq {
    epoch: u64,
    index: u64,
}

/// One channel entry: a chat event plus its order token.
///
/// Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logged {
    /// Order token for this entry.
    pub seq: Seq,
    /// The event itself.
    pub event: ChatEvent,
}

/// Ordered, append-only log of received chat events.
#[derive(Debug, Default)]
pub struct MessageChannel {
    entries: Vec<Logged>,
    epoch: u64,
    next_index: u64,
}

impl MessageChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new connection epoch.
    ///
    /// Called by the session on each successful connect. Existing entries
    /// keep their tokens; new appends sort after everything already logged.
    pub(crate) fn begin_epoch(&mut self) {
        self.epoch += 1;
        self.next_index = 0;
    }

    /// Append an event, assigning it the next order token.
    pub(crate) fn append(&mut self, event: ChatEvent) -> Seq {
        let seq = Seq { epoch: self.epoch, index: self.next_index };
        self.next_index += 1;
        self.entries.push(Logged { seq, event });
        seq
    }

    /// Iterate the full history from the beginning.
    pub fn iter(&self) -> impl Iterator<Item = &Logged> {
        self.entries.iter()
    }

    /// Number of logged events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the channel is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently appended entry, if any.
    pub fn last(&self) -> Option<&Logged> {
        self.entries.last()
    }
}

impl<'a> IntoIterator for &'a MessageChannel {
    type Item = &'a Logged;
    type IntoIter = std::slice::Iter<'a, Logged>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
