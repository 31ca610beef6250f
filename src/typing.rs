//! Typing aggregator
//!
//! Tracks `Idle -> Typing -> Idle` per (connection, scope) and derives the
//! set of usernames typing in each conversation. A typing entry expires
//! `timeout` after its last renewing signal even if no stop signal arrives.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::timer::ExpiryTimers;
use crate::types::ConnectionId;

/// Where a connection is typing, from the typist's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypingScope {
    Global,
    /// Private conversation with the given peer
    Private(ConnectionId),
}

/// A conversation whose typing set can change
///
/// Private conversations are keyed by the unordered pair of parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversation {
    Global,
    Private(ConnectionId, ConnectionId),
}

impl Conversation {
    pub fn of(connection_id: ConnectionId, scope: TypingScope) -> Self {
        match scope {
            TypingScope::Global => Conversation::Global,
            TypingScope::Private(peer) if connection_id <= peer => {
                Conversation::Private(connection_id, peer)
            }
            TypingScope::Private(peer) => Conversation::Private(peer, connection_id),
        }
    }
}

/// Emitted whenever a conversation's typing set changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingChanged {
    pub conversation: Conversation,
    pub users: Vec<String>,
}

type TypingKey = (ConnectionId, TypingScope);

#[derive(Debug)]
struct TypingEntry {
    username: String,
    started: u64,
}

#[derive(Debug)]
pub struct TypingAggregator {
    typing: HashMap<TypingKey, TypingEntry>,
    timers: ExpiryTimers<TypingKey>,
    started: u64,
}

impl TypingAggregator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            typing: HashMap::new(),
            timers: ExpiryTimers::new(timeout),
            started: 0,
        }
    }

    /// Apply a typing start/stop signal
    ///
    /// A start signal on an already typing key only restarts its timeout
    /// and reports no change.
    pub fn signal(
        &mut self,
        connection_id: ConnectionId,
        username: &str,
        scope: TypingScope,
        is_typing: bool,
        now: Instant,
    ) -> Option<TypingChanged> {
        let key = (connection_id, scope);
        if is_typing {
            self.timers.schedule(key, now);
            if self.typing.contains_key(&key) {
                return None;
            }
            self.started += 1;
            self.typing.insert(
                key,
                TypingEntry {
                    username: username.to_string(),
                    started: self.started,
                },
            );
            debug!(connection = %connection_id, ?scope, "Typing started");
        } else {
            self.timers.cancel(&key);
            self.typing.remove(&key)?;
            debug!(connection = %connection_id, ?scope, "Typing stopped");
        }
        Some(self.changed(Conversation::of(connection_id, scope)))
    }

    /// Force every entry whose timeout elapsed back to idle
    pub fn expire(&mut self, now: Instant) -> Vec<TypingChanged> {
        let expired = self.timers.pop_expired(now);
        let mut conversations = Vec::new();
        for key in expired {
            if self.typing.remove(&key).is_some() {
                debug!(connection = %key.0, scope = ?key.1, "Typing expired");
                let conversation = Conversation::of(key.0, key.1);
                if !conversations.contains(&conversation) {
                    conversations.push(conversation);
                }
            }
        }
        conversations.into_iter().map(|c| self.changed(c)).collect()
    }

    /// Drop all typing state involving a closed connection
    ///
    /// Reports a change for every conversation that lost an entry,
    /// including private ones where a surviving peer was typing towards
    /// the closed connection.
    pub fn purge(&mut self, connection_id: ConnectionId) -> Vec<TypingChanged> {
        let keys: Vec<TypingKey> = self
            .typing
            .keys()
            .filter(|(conn, scope)| {
                *conn == connection_id || *scope == TypingScope::Private(connection_id)
            })
            .copied()
            .collect();

        let mut conversations = Vec::new();
        for key in keys {
            self.timers.cancel(&key);
            self.typing.remove(&key);
            let conversation = Conversation::of(key.0, key.1);
            if !conversations.contains(&conversation) {
                conversations.push(conversation);
            }
        }
        conversations.into_iter().map(|c| self.changed(c)).collect()
    }

    /// Usernames typing in a conversation, in the order they started
    pub fn typing_set(&self, conversation: Conversation) -> Vec<String> {
        let mut entries: Vec<&TypingEntry> = self
            .typing
            .iter()
            .filter(|((conn, scope), _)| Conversation::of(*conn, *scope) == conversation)
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by_key(|e| e.started);
        entries.into_iter().map(|e| e.username.clone()).collect()
    }

    /// Earliest pending expiry
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn changed(&self, conversation: Conversation) -> TypingChanged {
        TypingChanged {
            conversation,
            users: self.typing_set(conversation),
        }
    }
}
