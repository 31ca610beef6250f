//! Message protocol definitions
//!
//! JSON event envelopes `{"event": ..., "data": ...}` using Serde's
//! adjacently tagged enums. Event names are part of the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, MessageId};

/// Client → Server message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the chat with a display name
    UserJoin(String),
    /// Broadcast a message to everyone
    SendMessage {
        message: String,
        /// Acknowledgment token echoed back in `ServerMessage::Ack`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<u64>,
    },
    /// Send a message to a single connection
    PrivateMessage {
        to: ConnectionId,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<u64>,
    },
    /// Typing indicator update
    Typing(TypingSignal),
}

/// Payload of the `typing` event
///
/// A bare boolean targets the global conversation; the object form
/// targets the private conversation with `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypingSignal {
    Global(bool),
    Private {
        #[serde(rename = "isTyping")]
        is_typing: bool,
        to: ConnectionId,
    },
}

impl TypingSignal {
    pub fn is_typing(&self) -> bool {
        match *self {
            TypingSignal::Global(is_typing) => is_typing,
            TypingSignal::Private { is_typing, .. } => is_typing,
        }
    }
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Transport attached, connection ID issued
    Connect { id: ConnectionId },
    /// Server is closing this connection
    Disconnect { reason: String },
    /// Broadcast chat message
    ReceiveMessage(Message),
    /// Private chat message (sender and recipient only)
    PrivateMessage(Message),
    /// Presence snapshot in join order
    UserList(Vec<PresenceEntry>),
    /// A user completed the join handshake
    UserJoined(Notice),
    /// A joined user's connection closed
    UserLeft(Notice),
    /// Usernames currently typing in the global conversation
    TypingUsers(Vec<String>),
    /// Usernames currently typing in the private conversation with `with`
    PrivateTyping {
        with: ConnectionId,
        users: Vec<String>,
    },
    /// A submitted message reached the routing stage
    Ack {
        ack: u64,
        id: MessageId,
        timestamp: DateTime<Utc>,
    },
}

/// Delivery scope of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Broadcast,
    Private(ConnectionId),
}

/// A routed chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MessageFrame", try_from = "MessageFrame")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: ConnectionId,
    pub sender: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub scope: Scope,
}

impl Message {
    pub fn is_private(&self) -> bool {
        matches!(self.scope, Scope::Private(_))
    }
}

impl From<Message> for ServerMessage {
    fn from(message: Message) -> Self {
        match message.scope {
            Scope::Broadcast => ServerMessage::ReceiveMessage(message),
            Scope::Private(_) => ServerMessage::PrivateMessage(message),
        }
    }
}

/// On-the-wire shape of `Message`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageFrame {
    id: MessageId,
    sender: String,
    sender_id: ConnectionId,
    message: String,
    timestamp: DateTime<Utc>,
    is_private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<ConnectionId>,
}

impl From<Message> for MessageFrame {
    fn from(m: Message) -> Self {
        let to = match m.scope {
            Scope::Broadcast => None,
            Scope::Private(recipient) => Some(recipient),
        };
        Self {
            id: m.id,
            sender: m.sender,
            sender_id: m.sender_id,
            message: m.body,
            timestamp: m.timestamp,
            is_private: to.is_some(),
            to,
        }
    }
}

impl TryFrom<MessageFrame> for Message {
    type Error = String;

    fn try_from(f: MessageFrame) -> Result<Self, Self::Error> {
        let scope = match (f.is_private, f.to) {
            (false, _) => Scope::Broadcast,
            (true, Some(recipient)) => Scope::Private(recipient),
            (true, None) => return Err("private message without recipient".to_string()),
        };
        Ok(Self {
            id: f.id,
            sender_id: f.sender_id,
            sender: f.sender,
            body: f.message,
            timestamp: f.timestamp,
            scope,
        })
    }
}

/// One row of a presence snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub id: ConnectionId,
    pub username: String,
}

/// Payload of `user_joined` / `user_left`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub username: String,
    pub id: MessageId,
    pub timestamp: DateTime<Utc>,
}

/// Kind of system notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    UserJoined,
    UserLeft,
}

/// Server-generated join/leave announcement. Always broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemNotice {
    pub kind: NoticeKind,
    pub notice: Notice,
}

impl SystemNotice {
    /// Human-readable text shown in a feed
    pub fn text(&self) -> String {
        match self.kind {
            NoticeKind::UserJoined => format!("{} joined the chat", self.notice.username),
            NoticeKind::UserLeft => format!("{} left the chat", self.notice.username),
        }
    }
}

impl From<SystemNotice> for ServerMessage {
    fn from(n: SystemNotice) -> Self {
        match n.kind {
            NoticeKind::UserJoined => ServerMessage::UserJoined(n.notice),
            NoticeKind::UserLeft => ServerMessage::UserLeft(n.notice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(scope: Scope) -> Message {
        Message {
            id: MessageId(7),
            sender_id: ConnectionId::new(),
            sender: "Alice".to_string(),
            body: "hi".to_string(),
            timestamp: Utc::now(),
            scope,
        }
    }

    #[test]
    fn test_user_join_deserialize() {
        let json = r#"{"event": "user_join", "data": "Alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, ClientMessage::UserJoin("Alice".to_string()));
    }

    #[test]
    fn test_send_message_ack_optional() {
        let json = r#"{"event": "send_message", "data": {"message": "hello"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SendMessage {
                message: "hello".to_string(),
                ack: None
            }
        );

        let json = r#"{"event": "send_message", "data": {"message": "hello", "ack": 4}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::SendMessage { ack, .. } => assert_eq!(ack, Some(4)),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_private_message_deserialize() {
        let to = ConnectionId::new();
        let json = format!(
            r#"{{"event": "private_message", "data": {{"to": "{}", "message": "secret"}}}}"#,
            to
        );
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        match msg {
            ClientMessage::PrivateMessage { to: parsed, message, ack } => {
                assert_eq!(parsed, to);
                assert_eq!(message, "secret");
                assert!(ack.is_none());
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_typing_signal_forms() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"event": "typing", "data": true}"#).unwrap();
        assert_eq!(msg, ClientMessage::Typing(TypingSignal::Global(true)));

        let peer = ConnectionId::new();
        let json = format!(
            r#"{{"event": "typing", "data": {{"isTyping": false, "to": "{}"}}}}"#,
            peer
        );
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Typing(TypingSignal::Private {
                is_typing: false,
                to: peer
            })
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        let json = r#"{"event": "create_room", "data": null}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_broadcast_message_serialize() {
        let msg: ServerMessage = sample_message(Scope::Broadcast).into();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "receive_message");
        assert_eq!(value["data"]["message"], "hi");
        assert_eq!(value["data"]["sender"], "Alice");
        assert_eq!(value["data"]["isPrivate"], false);
        assert_eq!(value["data"]["id"], 7);
        assert!(value["data"].get("senderId").is_some());
        assert!(value["data"].get("to").is_none());
    }

    #[test]
    fn test_private_message_serialize() {
        let recipient = ConnectionId::new();
        let msg: ServerMessage = sample_message(Scope::Private(recipient)).into();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "private_message");
        assert_eq!(value["data"]["isPrivate"], true);
        assert_eq!(value["data"]["to"], recipient.to_string());
    }

    #[test]
    fn test_private_without_recipient_rejected() {
        let json = format!(
            r#"{{"id": 1, "sender": "A", "senderId": "{}", "message": "x",
                "timestamp": "2024-01-01T00:00:00Z", "isPrivate": true}}"#,
            ConnectionId::new()
        );
        assert!(serde_json::from_str::<Message>(&json).is_err());
    }

    #[test]
    fn test_system_notice_event_names() {
        let notice = Notice {
            username: "Bob".to_string(),
            id: MessageId(3),
            timestamp: Utc::now(),
        };
        let left = SystemNotice {
            kind: NoticeKind::UserLeft,
            notice,
        };
        assert_eq!(left.text(), "Bob left the chat");

        let value = serde_json::to_value(ServerMessage::from(left)).unwrap();
        assert_eq!(value["event"], "user_left");
        assert_eq!(value["data"]["username"], "Bob");
        assert_eq!(value["data"]["id"], 3);
    }

    #[test]
    fn test_typing_users_serialize() {
        let msg = ServerMessage::TypingUsers(vec!["Alice".to_string()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"event":"typing_users","data":["Alice"]}"#);
    }
}
