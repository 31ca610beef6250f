//! Chat transport client
//!
//! Connects to the server over WebSocket, joins with a username and keeps
//! the local `ChatFeed` up to date. On transport loss it reconnects with a
//! fixed delay, up to a bounded number of attempts; every reconnect is a
//! new connection with a fresh join and no history replay.

use std::future::Future;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::feed::{ChatFeed, ConnectionStatus, Notifier};
use crate::message::{ClientMessage, ServerMessage, TypingSignal};
use crate::types::ConnectionId;

/// Requests from the front end to the client task
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Send(String),
    SendPrivate { to: ConnectionId, body: String },
    Typing(TypingSignal),
    Disconnect,
}

/// How a connected session ended
enum SessionEnd {
    /// The user asked to leave
    Closed,
    /// The transport dropped
    Lost,
}

/// Front-end side of a running client
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<ClientCommand>,
    feed: watch::Receiver<ChatFeed>,
}

impl ClientHandle {
    /// Broadcast a message. Blank bodies are not sent.
    pub async fn send(&self, body: &str) -> Result<(), AppError> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(());
        }
        self.command(ClientCommand::Send(body.to_string())).await
    }

    /// Send a private message. Blank bodies are not sent.
    pub async fn send_private(&self, to: ConnectionId, body: &str) -> Result<(), AppError> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(());
        }
        self.command(ClientCommand::SendPrivate {
            to,
            body: body.to_string(),
        })
        .await
    }

    /// Report typing in the global conversation
    pub async fn typing(&self, is_typing: bool) -> Result<(), AppError> {
        self.command(ClientCommand::Typing(TypingSignal::Global(is_typing)))
            .await
    }

    /// Report typing in the private conversation with `to`
    pub async fn typing_with(&self, to: ConnectionId, is_typing: bool) -> Result<(), AppError> {
        self.command(ClientCommand::Typing(TypingSignal::Private { is_typing, to }))
            .await
    }

    pub async fn disconnect(&self) -> Result<(), AppError> {
        self.command(ClientCommand::Disconnect).await
    }

    /// Subscribe to feed updates
    pub fn feed(&self) -> watch::Receiver<ChatFeed> {
        self.feed.clone()
    }

    async fn command(&self, cmd: ClientCommand) -> Result<(), AppError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| AppError::ChannelSend)
    }
}

pub struct ChatClient {
    config: ClientConfig,
    username: String,
    feed: ChatFeed,
    feed_tx: watch::Sender<ChatFeed>,
    notifier: Box<dyn Notifier>,
    next_ack: u64,
}

impl ChatClient {
    /// Start a client task and return its handle
    pub fn spawn(
        config: ClientConfig,
        username: impl Into<String>,
        notifier: Box<dyn Notifier>,
    ) -> (ClientHandle, JoinHandle<Result<(), AppError>>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (feed_tx, feed_rx) = watch::channel(ChatFeed::new());
        let client = Self {
            config,
            username: username.into(),
            feed: ChatFeed::new(),
            feed_tx,
            notifier,
            next_ack: 0,
        };
        let task = tokio::spawn(client.run(cmd_rx));
        (
            ClientHandle {
                commands: cmd_tx,
                feed: feed_rx,
            },
            task,
        )
    }

    /// Connect, and keep reconnecting until the user disconnects or the
    /// attempts run out
    pub async fn run(mut self, mut commands: mpsc::Receiver<ClientCommand>) -> Result<(), AppError> {
        let policy = self.config.reconnect;
        let url = self.config.url.clone();
        let mut attempts = 0;

        loop {
            self.set_status(ConnectionStatus::Connecting);
            let connect = tokio_tungstenite::connect_async(url.as_str());
            let Some(connected) = self.unless_left(&mut commands, connect).await else {
                return Ok(());
            };
            match connected {
                Ok((ws_stream, _)) => {
                    attempts = 0;
                    info!("Connected to {}", url);
                    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
                    let end = self
                        .session(&mut ws_sender, &mut ws_receiver, &mut commands)
                        .await;
                    self.set_status(ConnectionStatus::Disconnected);
                    if let SessionEnd::Closed = end {
                        info!("Disconnected");
                        return Ok(());
                    }
                    warn!("Connection to {} lost", url);
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", url, e);
                }
            }

            if attempts >= policy.max_attempts {
                self.set_status(ConnectionStatus::Failed);
                return Err(AppError::TransportLost { attempts });
            }
            attempts += 1;
            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                policy.delay, attempts, policy.max_attempts
            );
            let backoff = tokio::time::sleep(policy.delay);
            if self.unless_left(&mut commands, backoff).await.is_none() {
                return Ok(());
            }
        }
    }

    /// Await `fut` while no session is up
    ///
    /// Returns `None` once the user disconnects or drops the handle. Other
    /// commands are discarded since there is nobody to send them to.
    async fn unless_left<F: Future>(
        &mut self,
        commands: &mut mpsc::Receiver<ClientCommand>,
        fut: F,
    ) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Some(out),
                cmd = commands.recv() => match cmd {
                    Some(ClientCommand::Disconnect) | None => {
                        self.set_status(ConnectionStatus::Disconnected);
                        info!("Disconnected while offline");
                        return None;
                    }
                    Some(cmd) => debug!("Not connected, dropping {:?}", cmd),
                },
            }
        }
    }

    /// Drive one connected session
    async fn session<S, R>(
        &mut self,
        ws_sender: &mut S,
        ws_receiver: &mut R,
        commands: &mut mpsc::Receiver<ClientCommand>,
    ) -> SessionEnd
    where
        S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
        R: futures_util::Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        let join = ClientMessage::UserJoin(self.username.clone());
        if let Err(e) = send_frame(ws_sender, &join).await {
            warn!("Failed to join: {}", e);
            return SessionEnd::Lost;
        }

        loop {
            tokio::select! {
                frame = ws_receiver.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => self.receive(msg),
                            Err(e) => warn!("Invalid frame from server: {}", e),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        return SessionEnd::Lost;
                    }
                },
                cmd = commands.recv() => match cmd {
                    Some(ClientCommand::Disconnect) | None => {
                        let _ = ws_sender.close().await;
                        return SessionEnd::Closed;
                    }
                    Some(cmd) => {
                        if let Some(frame) = self.to_frame(cmd) {
                            if let Err(e) = send_frame(ws_sender, &frame).await {
                                debug!("Send failed: {}", e);
                                return SessionEnd::Lost;
                            }
                        }
                    }
                },
            }
        }
    }

    /// Wire frame for a command; `Disconnect` has none
    fn to_frame(&mut self, cmd: ClientCommand) -> Option<ClientMessage> {
        let frame = match cmd {
            ClientCommand::Send(message) => ClientMessage::SendMessage {
                message,
                ack: Some(self.ack()),
            },
            ClientCommand::SendPrivate { to, body } => ClientMessage::PrivateMessage {
                to,
                message: body,
                ack: Some(self.ack()),
            },
            ClientCommand::Typing(signal) => ClientMessage::Typing(signal),
            ClientCommand::Disconnect => return None,
        };
        Some(frame)
    }

    fn ack(&mut self) -> u64 {
        self.next_ack += 1;
        self.next_ack
    }

    fn receive(&mut self, msg: ServerMessage) {
        if let Some(notification) = self.feed.apply(msg) {
            self.notifier.notify(&notification);
        }
        self.feed_tx.send_replace(self.feed.clone());
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.feed.status = status;
        self.feed_tx.send_replace(self.feed.clone());
    }
}

async fn send_frame<S>(ws_sender: &mut S, msg: &ClientMessage) -> Result<(), AppError>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(msg)?;
    ws_sender.send(WsMessage::Text(json.into())).await?;
    Ok(())
}
