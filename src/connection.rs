//! Connection struct definition
//!
//! Represents one attached transport channel with its lifecycle state and
//! outbound queue.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Lifecycle of an open connection
///
/// `Connected -> Joined`. Closing is detaching the connection from the
/// router, from either state; a closed connection is gone and a client
/// must open a new one to rejoin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Joined,
}

/// Attached connection information
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// Current lifecycle state
    pub state: SessionState,
}

impl Connection {
    /// Create a new, not yet joined connection
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            sender,
            state: SessionState::Connected,
        }
    }

    /// Queue a message for this connection without waiting
    ///
    /// A full queue drops the message for this connection only, so one
    /// slow peer never stalls delivery to the others.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    pub fn is_joined(&self) -> bool {
        self.state == SessionState::Joined
    }

    /// Move to `Joined`. Returns false unless the connection was `Connected`.
    pub fn mark_joined(&mut self) -> bool {
        if self.state != SessionState::Connected {
            return false;
        }
        self.state = SessionState::Joined;
        true
    }
}
