//! Presence Chat Server Library
//!
//! A WebSocket chat server built with tokio-tungstenite using the Actor
//! pattern for state management, plus a reconnecting client.
//!
//! # Features
//! - Join with a display name (no uniqueness enforced)
//! - Broadcast messages to everyone, private messages to one connection
//! - Live presence list in join order
//! - Global and per-conversation typing indicators with automatic expiry
//! - Join/leave announcements
//! - Client-side bounded reconnection with a fixed delay
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `SessionManager` is the central actor owning registry, presence,
//!   typing and routing state
//! - Each connection has a `handler` task communicating with the manager
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use presence_chat::{serve, ServerConfig, SessionManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
//!
//!     tokio::spawn(SessionManager::new(cmd_rx, &config).run());
//!     serve(listener, cmd_tx, config.outbound_buffer).await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod feed;
pub mod handler;
pub mod message;
pub mod presence;
pub mod registry;
pub mod router;
pub mod session;
pub mod timer;
pub mod types;
pub mod typing;

// Re-export main types for convenience
pub use client::{ChatClient, ClientCommand, ClientHandle};
pub use config::{ClientConfig, ReconnectPolicy, ServerConfig};
pub use connection::{Connection, SessionState};
pub use error::{AppError, SendError};
pub use feed::{ChatFeed, ConnectionStatus, FeedEntry, LogNotifier, Notification, Notifier};
pub use handler::{handle_connection, serve};
pub use message::{
    ClientMessage, Message, Notice, NoticeKind, PresenceEntry, Scope, ServerMessage, SystemNotice,
    TypingSignal,
};
pub use presence::{PresenceSnapshot, PresenceStore};
pub use registry::{IdentityRegistry, User};
pub use router::{MessageRouter, Target};
pub use session::{SessionCommand, SessionManager};
pub use types::{ConnectionId, MessageId};
pub use typing::{Conversation, TypingAggregator, TypingScope};
