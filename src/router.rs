//! Message router
//!
//! Owns the open connections, stamps messages with ids and timestamps,
//! and fans them out: broadcast to every open connection, private to the
//! sender and the recipient only.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::AppError;
use crate::message::{Message, Notice, NoticeKind, Scope, ServerMessage, SystemNotice};
use crate::registry::IdentityRegistry;
use crate::types::{ConnectionId, MessageSequence};

/// Requested destination of a submitted message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Broadcast,
    To(ConnectionId),
}

#[derive(Debug, Default)]
pub struct MessageRouter {
    connections: HashMap<ConnectionId, Connection>,
    sequence: MessageSequence,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start routing to a newly attached connection
    pub fn attach(&mut self, id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.connections.insert(id, Connection::new(id, sender));
    }

    /// Stop routing to a connection and hand it back
    pub fn detach(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Route a user message
    ///
    /// Fails without delivering anything when the body is blank, the sender
    /// has not joined, or a private recipient is not connected.
    pub fn submit(
        &mut self,
        registry: &IdentityRegistry,
        sender_id: ConnectionId,
        body: &str,
        target: Target,
    ) -> Result<Message, AppError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::EmptyMessage);
        }
        let sender = registry
            .get(sender_id)
            .ok_or(AppError::NotJoined(sender_id))?;

        let scope = match target {
            Target::Broadcast => Scope::Broadcast,
            Target::To(recipient) => {
                if !registry.contains(recipient) {
                    return Err(AppError::RecipientOffline(recipient));
                }
                Scope::Private(recipient)
            }
        };

        let message = Message {
            id: self.sequence.next_id(),
            sender_id,
            sender: sender.username.clone(),
            body: body.to_string(),
            timestamp: Utc::now(),
            scope,
        };

        match scope {
            Scope::Broadcast => {
                debug!(id = %message.id, sender = %sender_id, "Broadcasting message");
                self.broadcast(message.clone().into());
            }
            Scope::Private(recipient) => {
                debug!(id = %message.id, sender = %sender_id, %recipient, "Routing private message");
                self.send_to(sender_id, message.clone().into());
                if recipient != sender_id {
                    self.send_to(recipient, message.clone().into());
                }
            }
        }

        Ok(message)
    }

    /// Confirm to the sender alone that its message reached routing
    pub fn acknowledge(&self, sender_id: ConnectionId, ack: u64, message: &Message) {
        self.send_to(
            sender_id,
            ServerMessage::Ack {
                ack,
                id: message.id,
                timestamp: message.timestamp,
            },
        );
    }

    /// Build a join/leave notice and broadcast it
    pub fn announce(&mut self, kind: NoticeKind, username: &str) -> SystemNotice {
        let notice = SystemNotice {
            kind,
            notice: Notice {
                username: username.to_string(),
                id: self.sequence.next_id(),
                timestamp: Utc::now(),
            },
        };
        self.broadcast(notice.clone().into());
        notice
    }

    /// Deliver to every open connection
    pub fn broadcast(&self, msg: ServerMessage) {
        for conn in self.connections.values() {
            if let Err(e) = conn.send(msg.clone()) {
                warn!("Dropping frame for {}: {}", conn.id, e);
            }
        }
    }

    /// Deliver to one connection. Returns false if it was not delivered.
    pub fn send_to(&self, id: ConnectionId, msg: ServerMessage) -> bool {
        let Some(conn) = self.connections.get(&id) else {
            debug!("No open connection {}", id);
            return false;
        };
        match conn.send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping frame for {}: {}", id, e);
                false
            }
        }
    }
}
