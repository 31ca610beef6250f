//! Error types for the chat server
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::ConnectionId;

/// Application-level errors
///
/// Covers transport failures (connection termination) and protocol
/// errors. None of them is fatal to the server process.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Join on a connection that already joined
    #[error("Connection {0} already joined")]
    DuplicateJoin(ConnectionId),

    /// No joined user for the connection
    #[error("No user for connection {0}")]
    NotFound(ConnectionId),

    /// Message or typing signal from a connection that has not joined
    #[error("Connection {0} has not joined")]
    NotJoined(ConnectionId),

    /// Message body was empty after trimming
    #[error("Empty message")]
    EmptyMessage,

    /// Private message target is not connected
    #[error("Recipient {0} is offline")]
    RecipientOffline(ConnectionId),

    /// Connection lost and reconnection attempts exhausted
    #[error("Transport lost after {attempts} reconnection attempts")]
    TransportLost { attempts: u32 },
}

/// Message send errors
///
/// Occurs when a frame cannot be queued for a connection.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection's outbound queue is full
    #[error("Outbound queue full")]
    Full,
}
