//! Identity registry
//!
//! Maps a joined connection to its chosen display name. Usernames are not
//! required to be unique; the connection is the identity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::types::ConnectionId;

/// A connection that completed the join handshake
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub connection_id: ConnectionId,
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

/// Connection → User bookkeeping
///
/// Pure map mutation; the session manager propagates the resulting
/// presence changes.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    users: HashMap<ConnectionId, User>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a joined connection
    ///
    /// Fails with `DuplicateJoin` if the connection already joined; the
    /// existing entry is left untouched.
    pub fn register(&mut self, connection_id: ConnectionId, username: String) -> Result<User, AppError> {
        if self.users.contains_key(&connection_id) {
            return Err(AppError::DuplicateJoin(connection_id));
        }
        let user = User {
            connection_id,
            username,
            joined_at: Utc::now(),
        };
        self.users.insert(connection_id, user.clone());
        Ok(user)
    }

    /// Remove a connection's user
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Result<User, AppError> {
        self.users
            .remove(&connection_id)
            .ok_or(AppError::NotFound(connection_id))
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&User> {
        self.users.get(&connection_id)
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.users.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
