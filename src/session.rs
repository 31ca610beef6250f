//! SessionManager actor implementation
//!
//! The central actor that owns all chat state: identities, presence,
//! typing and the open connections. Every transport event arrives as a
//! `SessionCommand` on one queue and is handled to completion, fan-out
//! included, before the next one. Typing expiry is driven from the same
//! loop so it is serialized with the commands.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::{NoticeKind, ServerMessage, TypingSignal};
use crate::presence::{PresenceSnapshot, PresenceStore};
use crate::registry::IdentityRegistry;
use crate::router::{MessageRouter, Target};
use crate::typing::{Conversation, TypingAggregator, TypingChanged, TypingScope};
use crate::types::ConnectionId;

/// Commands sent from connection handlers to the SessionManager actor
#[derive(Debug)]
pub enum SessionCommand {
    /// Transport attached
    Connect {
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Transport closed (logout or network loss)
    Disconnect { connection_id: ConnectionId },
    /// Join request with the desired display name
    Join {
        connection_id: ConnectionId,
        username: String,
    },
    /// Broadcast chat message
    SendMessage {
        connection_id: ConnectionId,
        body: String,
        ack: Option<u64>,
    },
    /// Private chat message
    PrivateMessage {
        connection_id: ConnectionId,
        to: ConnectionId,
        body: String,
        ack: Option<u64>,
    },
    /// Typing indicator update
    Typing {
        connection_id: ConnectionId,
        signal: TypingSignal,
    },
    /// Current presence snapshot
    Snapshot {
        reply: oneshot::Sender<PresenceSnapshot>,
    },
    /// Disconnect everyone and stop
    Shutdown,
}

/// The main SessionManager actor
pub struct SessionManager {
    registry: IdentityRegistry,
    presence: PresenceStore,
    typing: TypingAggregator,
    router: MessageRouter,
    /// Command receiver channel
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionManager {
    /// Create a new SessionManager with the given command receiver
    pub fn new(receiver: mpsc::Receiver<SessionCommand>, config: &ServerConfig) -> Self {
        Self {
            registry: IdentityRegistry::new(),
            presence: PresenceStore::new(),
            typing: TypingAggregator::new(config.typing_timeout()),
            router: MessageRouter::new(),
            receiver,
        }
    }

    /// Follow presence changes from outside the actor
    pub fn subscribe_presence(&self) -> watch::Receiver<PresenceSnapshot> {
        self.presence.subscribe()
    }

    /// Run the SessionManager event loop
    ///
    /// Processes commands and typing expiries until all senders are dropped
    /// or `Shutdown` arrives, then tells every connection it is closing.
    pub async fn run(mut self) {
        info!("SessionManager started");

        loop {
            let deadline = self.typing.next_deadline();
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                _ = wait_until(deadline) => {
                    self.handle_typing_expiry(Instant::now());
                }
            }
        }

        self.router.broadcast(ServerMessage::Disconnect {
            reason: "server shutting down".to_string(),
        });
        info!("SessionManager shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect {
                connection_id,
                sender,
            } => self.handle_connect(connection_id, sender),
            SessionCommand::Disconnect { connection_id } => self.handle_disconnect(connection_id),
            SessionCommand::Join {
                connection_id,
                username,
            } => self.handle_join(connection_id, username),
            SessionCommand::SendMessage {
                connection_id,
                body,
                ack,
            } => self.handle_message(connection_id, body, Target::Broadcast, ack),
            SessionCommand::PrivateMessage {
                connection_id,
                to,
                body,
                ack,
            } => self.handle_message(connection_id, body, Target::To(to), ack),
            SessionCommand::Typing {
                connection_id,
                signal,
            } => self.handle_typing(connection_id, signal),
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.presence.snapshot());
            }
            // Handled by the run loop
            SessionCommand::Shutdown => {}
        }
    }

    /// Handle new transport connection
    fn handle_connect(&mut self, connection_id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        info!("Connection {} attached", connection_id);
        self.router.attach(connection_id, sender);
        debug!(
            "Total connections: {}, joined users: {}",
            self.router.connection_count(),
            self.registry.len()
        );
    }

    /// Handle transport disconnect
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let Some(connection) = self.router.detach(connection_id) else {
            return;
        };

        if !connection.is_joined() {
            info!("Connection {} closed before joining", connection_id);
            return;
        }

        for change in self.typing.purge(connection_id) {
            self.publish_typing(change);
        }

        let user = match self.registry.unregister(connection_id) {
            Ok(user) => user,
            Err(e) => {
                warn!("Joined connection without identity: {}", e);
                return;
            }
        };
        info!("User '{}' ({}) left", user.username, connection_id);

        let snapshot = self.presence.remove(connection_id);
        self.router.announce(NoticeKind::UserLeft, &user.username);
        if let Some(snapshot) = snapshot {
            self.router.broadcast(ServerMessage::UserList(snapshot));
        }

        debug!(
            "Total connections: {}, joined users: {}",
            self.router.connection_count(),
            self.registry.len()
        );
    }

    /// Handle join request
    fn handle_join(&mut self, connection_id: ConnectionId, username: String) {
        if self.router.connection(connection_id).is_none() {
            return;
        }
        let username = username.trim();
        if username.is_empty() {
            debug!("Ignoring empty username from {}", connection_id);
            return;
        }

        let user = match self.registry.register(connection_id, username.to_string()) {
            Ok(user) => user,
            Err(AppError::DuplicateJoin(_)) => {
                debug!("Ignoring repeated join from {}", connection_id);
                return;
            }
            Err(e) => {
                warn!("Join failed for {}: {}", connection_id, e);
                return;
            }
        };
        if let Some(connection) = self.router.connection_mut(connection_id) {
            connection.mark_joined();
        }
        info!("Connection {} joined as '{}'", connection_id, user.username);

        let snapshot = self.presence.add(&user);
        self.router.announce(NoticeKind::UserJoined, &user.username);
        self.router.broadcast(ServerMessage::UserList(snapshot));

        let typing = self.typing.typing_set(Conversation::Global);
        if !typing.is_empty() {
            self.router
                .send_to(connection_id, ServerMessage::TypingUsers(typing));
        }
    }

    /// Handle broadcast or private chat message
    fn handle_message(
        &mut self,
        connection_id: ConnectionId,
        body: String,
        target: Target,
        ack: Option<u64>,
    ) {
        let message = match self.router.submit(&self.registry, connection_id, &body, target) {
            Ok(message) => message,
            Err(AppError::RecipientOffline(recipient)) => {
                debug!(
                    "Dropping private message from {} to offline {}",
                    connection_id, recipient
                );
                return;
            }
            Err(e) => {
                debug!("Dropping message from {}: {}", connection_id, e);
                return;
            }
        };

        // Sending ends typing in that conversation
        let scope = match target {
            Target::Broadcast => TypingScope::Global,
            Target::To(peer) => TypingScope::Private(peer),
        };
        if let Some(change) =
            self.typing
                .signal(connection_id, &message.sender, scope, false, Instant::now())
        {
            self.publish_typing(change);
        }

        if let Some(ack) = ack {
            self.router.acknowledge(connection_id, ack, &message);
        }
    }

    /// Handle typing indicator update
    fn handle_typing(&mut self, connection_id: ConnectionId, signal: TypingSignal) {
        let Some(user) = self.registry.get(connection_id) else {
            debug!("Ignoring typing from unjoined {}", connection_id);
            return;
        };
        let scope = match signal {
            TypingSignal::Global(_) => TypingScope::Global,
            TypingSignal::Private { to, .. } => {
                if !self.registry.contains(to) {
                    debug!("Ignoring typing towards offline {}", to);
                    return;
                }
                TypingScope::Private(to)
            }
        };
        let username = user.username.clone();

        if let Some(change) = self.typing.signal(
            connection_id,
            &username,
            scope,
            signal.is_typing(),
            Instant::now(),
        ) {
            self.publish_typing(change);
        }
    }

    fn handle_typing_expiry(&mut self, now: Instant) {
        for change in self.typing.expire(now) {
            self.publish_typing(change);
        }
    }

    /// Global typing goes to everyone, private typing to its two parties
    fn publish_typing(&self, change: TypingChanged) {
        match change.conversation {
            Conversation::Global => {
                self.router.broadcast(ServerMessage::TypingUsers(change.users));
            }
            Conversation::Private(a, b) => {
                self.router.send_to(
                    a,
                    ServerMessage::PrivateTyping {
                        with: b,
                        users: change.users.clone(),
                    },
                );
                if a != b {
                    self.router.send_to(
                        b,
                        ServerMessage::PrivateTyping {
                            with: a,
                            users: change.users,
                        },
                    );
                }
            }
        }
    }
}

/// Resolve at `deadline`, or never when there is none
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
