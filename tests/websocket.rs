//! Integration tests driving the real WebSocket server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use presence_chat::{
    serve, ChatClient, ChatFeed, ClientConfig, ConnectionStatus, FeedEntry, Notification,
    Notifier, ReconnectPolicy, ServerConfig, SessionCommand, SessionManager,
};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

/// Start the session manager and accept loop on `listener`
///
/// Returns the command sender and the accept task so a test can take the
/// server down.
async fn start_server_on(
    listener: TcpListener,
) -> (mpsc::Sender<SessionCommand>, JoinHandle<()>) {
    let config = ServerConfig::default();
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(SessionManager::new(cmd_rx, &config).run());
    let accept = tokio::spawn(serve(listener, cmd_tx.clone(), config.outbound_buffer));
    (cmd_tx, accept)
}

/// Helper: start the server on a random port and return its address.
async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    start_server_on(listener).await;
    addr
}

async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn emit(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Connect and return the socket plus the issued connection id
async fn connect(addr: SocketAddr) -> (Ws, String) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    let first = next_event(&mut ws).await;
    assert_eq!(first["event"], "connect");
    let id = first["data"]["id"].as_str().unwrap().to_string();
    (ws, id)
}

/// Connect, join, and consume the joiner's own notice and user list
async fn join(addr: SocketAddr, name: &str) -> (Ws, String) {
    let (mut ws, id) = connect(addr).await;
    emit(&mut ws, json!({"event": "user_join", "data": name})).await;

    let joined = next_event(&mut ws).await;
    assert_eq!(joined["event"], "user_joined");
    assert_eq!(joined["data"]["username"], name);
    let list = next_event(&mut ws).await;
    assert_eq!(list["event"], "user_list");
    (ws, id)
}

/// Consume another user's join notice and the user list that follows
async fn expect_join_of(ws: &mut Ws, name: &str) {
    let joined = next_event(ws).await;
    assert_eq!(joined["event"], "user_joined");
    assert_eq!(joined["data"]["username"], name);
    assert_eq!(next_event(ws).await["event"], "user_list");
}

#[tokio::test]
async fn test_broadcast_then_private_scenario() {
    let addr = start_server().await;
    let (mut alice, alice_id) = join(addr, "Alice").await;
    let (mut bob, bob_id) = join(addr, "Bob").await;
    expect_join_of(&mut alice, "Bob").await;

    emit(
        &mut alice,
        json!({"event": "send_message", "data": {"message": "hi", "ack": 1}}),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let msg = next_event(ws).await;
        assert_eq!(msg["event"], "receive_message");
        assert_eq!(msg["data"]["message"], "hi");
        assert_eq!(msg["data"]["sender"], "Alice");
        assert_eq!(msg["data"]["senderId"], alice_id.as_str());
        assert_eq!(msg["data"]["isPrivate"], false);
    }
    let ack = next_event(&mut alice).await;
    assert_eq!(ack["event"], "ack");
    assert_eq!(ack["data"]["ack"], 1);

    emit(
        &mut alice,
        json!({"event": "private_message", "data": {"to": bob_id, "message": "secret"}}),
    )
    .await;
    for ws in [&mut alice, &mut bob] {
        let msg = next_event(ws).await;
        assert_eq!(msg["event"], "private_message");
        assert_eq!(msg["data"]["message"], "secret");
        assert_eq!(msg["data"]["isPrivate"], true);
        assert_eq!(msg["data"]["to"], bob_id.as_str());
    }

    let (mut carol, _) = join(addr, "Carol").await;
    expect_join_of(&mut bob, "Carol").await;
    emit(
        &mut bob,
        json!({"event": "send_message", "data": {"message": "after"}}),
    )
    .await;

    // Carol sees only what was sent after she joined
    let msg = next_event(&mut carol).await;
    assert_eq!(msg["event"], "receive_message");
    assert_eq!(msg["data"]["message"], "after");
}

#[tokio::test]
async fn test_user_list_in_join_order() {
    let addr = start_server().await;
    let (mut alice, alice_id) = join(addr, "Alice").await;
    let (_bob, bob_id) = join(addr, "Bob").await;

    assert_eq!(next_event(&mut alice).await["event"], "user_joined");
    let list = next_event(&mut alice).await;
    assert_eq!(list["event"], "user_list");
    assert_eq!(
        list["data"],
        json!([
            {"id": alice_id, "username": "Alice"},
            {"id": bob_id, "username": "Bob"},
        ])
    );
}

#[tokio::test]
async fn test_leave_notice_before_user_list() {
    let addr = start_server().await;
    let (mut alice, _) = join(addr, "Alice").await;
    let (mut bob, bob_id) = join(addr, "Bob").await;
    expect_join_of(&mut alice, "Bob").await;

    alice.close(None).await.unwrap();

    let left = next_event(&mut bob).await;
    assert_eq!(left["event"], "user_left");
    assert_eq!(left["data"]["username"], "Alice");
    let list = next_event(&mut bob).await;
    assert_eq!(list["event"], "user_list");
    assert_eq!(list["data"], json!([{"id": bob_id, "username": "Bob"}]));
}

#[tokio::test]
async fn test_private_to_unknown_id_is_dropped() {
    let addr = start_server().await;
    let (mut alice, _) = join(addr, "Alice").await;

    emit(
        &mut alice,
        json!({"event": "private_message", "data": {
            "to": "00000000-0000-4000-8000-000000000000",
            "message": "anyone?",
            "ack": 5,
        }}),
    )
    .await;
    emit(
        &mut alice,
        json!({"event": "send_message", "data": {"message": "still here"}}),
    )
    .await;

    let msg = next_event(&mut alice).await;
    assert_eq!(msg["event"], "receive_message");
    assert_eq!(msg["data"]["message"], "still here");
}

#[tokio::test]
async fn test_typing_and_invalid_frames() {
    let addr = start_server().await;
    let (mut alice, _) = join(addr, "Alice").await;

    alice
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    emit(&mut alice, json!({"event": "create_room"})).await;

    let (mut bob, _) = join(addr, "Bob").await;
    expect_join_of(&mut alice, "Bob").await;

    emit(&mut alice, json!({"event": "typing", "data": true})).await;
    let typing = next_event(&mut bob).await;
    assert_eq!(typing["event"], "typing_users");
    assert_eq!(typing["data"], json!(["Alice"]));

    emit(&mut alice, json!({"event": "typing", "data": false})).await;
    let typing = next_event(&mut bob).await;
    assert_eq!(typing["data"], json!([]));
}

#[derive(Clone, Default)]
struct RecordingNotifier(Arc<Mutex<Vec<Notification>>>);

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.0.lock().unwrap().push(notification.clone());
    }
}

async fn wait_for(feed: &mut watch::Receiver<ChatFeed>, pred: impl Fn(&ChatFeed) -> bool) {
    tokio::time::timeout(WAIT, async {
        loop {
            if pred(&*feed.borrow_and_update()) {
                return;
            }
            feed.changed().await.unwrap();
        }
    })
    .await
    .expect("timed out waiting for feed");
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        url: format!("ws://{}", addr),
        reconnect: ReconnectPolicy {
            max_attempts: 20,
            delay: Duration::from_millis(50),
        },
    }
}

#[tokio::test]
async fn test_clients_exchange_messages() {
    let addr = start_server().await;
    let alice_notes = RecordingNotifier::default();
    let bob_notes = RecordingNotifier::default();

    let (alice, alice_task) =
        ChatClient::spawn(client_config(addr), "Alice", Box::new(alice_notes.clone()));
    let (bob, bob_task) =
        ChatClient::spawn(client_config(addr), "Bob", Box::new(bob_notes.clone()));

    let mut alice_feed = alice.feed();
    let mut bob_feed = bob.feed();
    wait_for(&mut alice_feed, |f| f.users.len() == 2).await;
    wait_for(&mut bob_feed, |f| f.users.len() == 2).await;

    alice.send("hello bob").await.unwrap();
    wait_for(&mut bob_feed, |f| {
        f.messages
            .iter()
            .any(|e| matches!(e, FeedEntry::Chat(m) if m.body == "hello bob"))
    })
    .await;
    wait_for(&mut alice_feed, |f| {
        f.messages
            .iter()
            .any(|e| matches!(e, FeedEntry::Chat(m) if m.body == "hello bob"))
    })
    .await;

    assert!(bob_notes.0.lock().unwrap().contains(&Notification::Message {
        sender: "Alice".to_string(),
        body: "hello bob".to_string(),
        is_private: false,
    }));
    assert!(!alice_notes
        .0
        .lock()
        .unwrap()
        .iter()
        .any(|n| matches!(n, Notification::Message { .. })));

    alice.disconnect().await.unwrap();
    assert!(alice_task.await.unwrap().is_ok());
    wait_for(&mut bob_feed, |f| f.users.len() == 1).await;

    bob.disconnect().await.unwrap();
    assert!(bob_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_client_connects_once_server_appears() {
    // Reserve a port, release it, and only start listening after the
    // client has begun retrying
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let (client, task) =
        ChatClient::spawn(client_config(addr), "Late", Box::new(RecordingNotifier::default()));
    tokio::time::sleep(Duration::from_millis(150)).await;

    let listener = TcpListener::bind(addr).await.unwrap();
    start_server_on(listener).await;

    let mut feed = client.feed();
    wait_for(&mut feed, |f| {
        f.status == ConnectionStatus::Connected && f.users.iter().any(|u| u.username == "Late")
    })
    .await;

    client.disconnect().await.unwrap();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_client_rejoins_after_server_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (cmd_tx, accept) = start_server_on(listener).await;

    let (client, task) =
        ChatClient::spawn(client_config(addr), "Dana", Box::new(RecordingNotifier::default()));
    let mut feed = client.feed();
    wait_for(&mut feed, |f| {
        f.status == ConnectionStatus::Connected && f.users.iter().any(|u| u.username == "Dana")
    })
    .await;
    let first_id = feed.borrow().connection_id;
    assert!(first_id.is_some());

    client.send("before restart").await.unwrap();
    wait_for(&mut feed, |f| {
        f.messages
            .iter()
            .any(|e| matches!(e, FeedEntry::Chat(m) if m.body == "before restart"))
    })
    .await;

    // Stop accepting, then close every open connection
    accept.abort();
    let _ = accept.await;
    cmd_tx.send(SessionCommand::Shutdown).await.unwrap();
    wait_for(&mut feed, |f| f.status != ConnectionStatus::Connected).await;

    let listener = TcpListener::bind(addr).await.unwrap();
    start_server_on(listener).await;

    wait_for(&mut feed, |f| {
        f.status == ConnectionStatus::Connected
            && f.connection_id.is_some()
            && f.connection_id != first_id
            && f.users.iter().any(|u| u.username == "Dana")
    })
    .await;

    let current = feed.borrow().clone();
    assert_eq!(current.users.len(), 1);
    assert!(current
        .messages
        .iter()
        .any(|e| matches!(e, FeedEntry::Chat(m) if m.body == "before restart")));

    client.disconnect().await.unwrap();
    assert!(task.await.unwrap().is_ok());
}
