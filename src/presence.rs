//! Presence store
//!
//! The authoritative list of joined users, kept in join order. Every
//! change publishes a fresh snapshot to subscribers.

use tokio::sync::watch;
use tracing::debug;

use crate::message::PresenceEntry;
use crate::registry::User;
use crate::types::ConnectionId;

/// Ordered-by-join list of connected users
pub type PresenceSnapshot = Vec<PresenceEntry>;

/// Join-ordered set of currently connected users
#[derive(Debug)]
pub struct PresenceStore {
    members: Vec<PresenceEntry>,
    changes: watch::Sender<PresenceSnapshot>,
}

impl Default for PresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            members: Vec::new(),
            changes,
        }
    }

    /// Subscribe to `PresenceChanged` snapshots
    ///
    /// The receiver always holds the latest snapshot; intermediate ones
    /// may be skipped by slow observers.
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.changes.subscribe()
    }

    /// Append a user and publish the new snapshot
    pub fn add(&mut self, user: &User) -> PresenceSnapshot {
        self.members.retain(|m| m.id != user.connection_id);
        self.members.push(PresenceEntry {
            id: user.connection_id,
            username: user.username.clone(),
        });
        debug!(connection = %user.connection_id, "Presence: member joined");
        self.publish()
    }

    /// Remove a connection and publish the new snapshot
    ///
    /// Returns `None` (and publishes nothing) if the connection was not present.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<PresenceSnapshot> {
        let before = self.members.len();
        self.members.retain(|m| m.id != connection_id);
        if self.members.len() == before {
            return None;
        }
        debug!(connection = %connection_id, "Presence: member left");
        Some(self.publish())
    }

    /// Current members in join order
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.members.clone()
    }

    fn publish(&self) -> PresenceSnapshot {
        let snapshot = self.snapshot();
        self.changes.send_replace(snapshot.clone());
        snapshot
    }
}
