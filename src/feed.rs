//! Client-side chat feed
//!
//! Folds server frames into the state a front end renders: the
//! append-only message list, the presence list and who is typing. Also
//! decides which frames deserve a notification.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::message::{
    Message, NoticeKind, PresenceEntry, Scope, ServerMessage, SystemNotice,
};
use crate::types::{ConnectionId, MessageId};

/// Longest body shown in a notification before it is cut
const PREVIEW_CHARS: usize = 50;

/// Transport status as seen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    /// Reconnection attempts exhausted. Terminal.
    Failed,
}

/// One line of the feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEntry {
    Chat(Message),
    System(SystemNotice),
}

impl FeedEntry {
    pub fn id(&self) -> MessageId {
        match self {
            FeedEntry::Chat(m) => m.id,
            FeedEntry::System(n) => n.notice.id,
        }
    }
}

/// Something worth telling the user about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Message {
        sender: String,
        body: String,
        is_private: bool,
    },
    UserJoined(String),
    UserLeft(String),
}

/// Notification dispatcher
pub trait Notifier: Send {
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::Message {
                sender,
                body,
                is_private,
            } => {
                let title = if *is_private {
                    format!("{} (Private)", sender)
                } else {
                    sender.clone()
                };
                info!("{}: {}", title, preview(body));
            }
            Notification::UserJoined(username) => info!("User Joined: {} joined the chat", username),
            Notification::UserLeft(username) => info!("User Left: {} left the chat", username),
        }
    }
}

/// Cut a body to the notification preview length
pub fn preview(body: &str) -> String {
    if body.chars().count() > PREVIEW_CHARS {
        let cut: String = body.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        body.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ChatFeed {
    /// Our id on the current connection
    pub connection_id: Option<ConnectionId>,
    pub status: ConnectionStatus,
    /// Every message and notice received, in arrival order. Kept across
    /// reconnects.
    pub messages: Vec<FeedEntry>,
    pub users: Vec<PresenceEntry>,
    pub typing_users: Vec<String>,
    /// Typing sets of private conversations, keyed by peer
    pub private_typing: HashMap<ConnectionId, Vec<String>>,
}

impl Default for ChatFeed {
    fn default() -> Self {
        Self {
            connection_id: None,
            status: ConnectionStatus::Connecting,
            messages: Vec::new(),
            users: Vec::new(),
            typing_users: Vec::new(),
            private_typing: HashMap::new(),
        }
    }
}

impl ChatFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one server frame
    pub fn apply(&mut self, msg: ServerMessage) -> Option<Notification> {
        match msg {
            ServerMessage::Connect { id } => {
                self.connection_id = Some(id);
                self.status = ConnectionStatus::Connected;
                // Typing state belonged to the previous connection
                self.typing_users.clear();
                self.private_typing.clear();
                None
            }
            ServerMessage::Disconnect { reason } => {
                debug!("Server disconnect: {}", reason);
                self.status = ConnectionStatus::Disconnected;
                None
            }
            ServerMessage::ReceiveMessage(message) | ServerMessage::PrivateMessage(message) => {
                let notification = (Some(message.sender_id) != self.connection_id).then(|| {
                    Notification::Message {
                        sender: message.sender.clone(),
                        body: message.body.clone(),
                        is_private: message.is_private(),
                    }
                });
                self.messages.push(FeedEntry::Chat(message));
                notification
            }
            ServerMessage::UserList(users) => {
                // Peers that left can no longer be typing to us
                self.private_typing
                    .retain(|peer, _| users.iter().any(|u| u.id == *peer));
                self.users = users;
                None
            }
            ServerMessage::UserJoined(notice) => {
                let username = notice.username.clone();
                self.messages.push(FeedEntry::System(SystemNotice {
                    kind: NoticeKind::UserJoined,
                    notice,
                }));
                Some(Notification::UserJoined(username))
            }
            ServerMessage::UserLeft(notice) => {
                let username = notice.username.clone();
                self.messages.push(FeedEntry::System(SystemNotice {
                    kind: NoticeKind::UserLeft,
                    notice,
                }));
                Some(Notification::UserLeft(username))
            }
            ServerMessage::TypingUsers(users) => {
                self.typing_users = users;
                None
            }
            ServerMessage::PrivateTyping { with, users } => {
                if users.is_empty() {
                    self.private_typing.remove(&with);
                } else {
                    self.private_typing.insert(with, users);
                }
                None
            }
            ServerMessage::Ack { ack, id, .. } => {
                debug!("Message delivered: ack {} as id {}", ack, id);
                None
            }
        }
    }

    /// Broadcast messages and notices, for the global view
    pub fn global_entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.messages.iter().filter(|e| match e {
            FeedEntry::Chat(m) => !m.is_private(),
            FeedEntry::System(_) => true,
        })
    }

    /// Private messages exchanged with `peer`
    pub fn conversation_with(&self, peer: ConnectionId) -> impl Iterator<Item = &Message> {
        let me = self.connection_id;
        self.messages.iter().filter_map(move |e| match e {
            FeedEntry::Chat(m) => match m.scope {
                Scope::Private(to) if m.sender_id == peer || (Some(m.sender_id) == me && to == peer) => {
                    Some(m)
                }
                _ => None,
            },
            FeedEntry::System(_) => None,
        })
    }

    /// Users other than ourselves
    pub fn others(&self) -> impl Iterator<Item = &PresenceEntry> {
        let me = self.connection_id;
        self.users.iter().filter(move |u| Some(u.id) != me)
    }
}
