//! WebSocket connection handler
//!
//! Handles individual transport connections: WebSocket handshake,
//! frame parsing, and bidirectional communication with the SessionManager.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::session::SessionCommand;
use crate::types::ConnectionId;

/// Accept connections forever, spawning a handler task for each
pub async fn serve(listener: TcpListener, cmd_tx: mpsc::Sender<SessionCommand>, outbound_buffer: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, outbound_buffer).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, attaches the connection to the
/// SessionManager and pumps frames both ways until either side closes.
/// `outbound_buffer` bounds the queue of frames waiting to be written.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<SessionCommand>,
    outbound_buffer: usize,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} opened from {}", connection_id, peer_addr);

    // Channel for server -> client frames
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(outbound_buffer);

    // The connect frame goes out before anything the session may queue
    let connected_msg = ServerMessage::Connect { id: connection_id };
    let json = serde_json::to_string(&connected_msg)?;
    ws_sender.send(Message::Text(json.into())).await?;

    if cmd_tx
        .send(SessionCommand::Connect {
            connection_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to attach {} - session manager closed", connection_id);
        return Err(AppError::ChannelSend);
    }

    let cmd_tx_read = cmd_tx.clone();

    // Read task (WebSocket -> SessionCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        let cmd = client_message_to_command(connection_id, client_msg);
                        if cmd_tx_read.send(cmd).await.is_err() {
                            debug!("Session manager closed, ending read task for {}", connection_id);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Invalid frame from {}: {}", connection_id, e);
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", connection_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", connection_id);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", connection_id);
                }
                Ok(_) => {
                    // Binary or raw frames - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", connection_id);
    });

    // Write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize frame: {}", e);
                }
            }
        }
        debug!("Write task ended for {}", connection_id);

        let _ = ws_sender.close().await;
    });

    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", connection_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", connection_id);
        }
    }

    let _ = cmd_tx
        .send(SessionCommand::Disconnect { connection_id })
        .await;

    info!("Connection {} closed", connection_id);

    Ok(())
}

/// Convert a ClientMessage to a SessionCommand
pub fn client_message_to_command(connection_id: ConnectionId, msg: ClientMessage) -> SessionCommand {
    match msg {
        ClientMessage::UserJoin(username) => SessionCommand::Join {
            connection_id,
            username,
        },
        ClientMessage::SendMessage { message, ack } => SessionCommand::SendMessage {
            connection_id,
            body: message,
            ack,
        },
        ClientMessage::PrivateMessage { to, message, ack } => SessionCommand::PrivateMessage {
            connection_id,
            to,
            body: message,
            ack,
        },
        ClientMessage::Typing(signal) => SessionCommand::Typing {
            connection_id,
            signal,
        },
    }
}
