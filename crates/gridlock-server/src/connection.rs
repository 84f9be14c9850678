//! Connection pipeline: one reader and one writer task per socket.
//!
//! The reader decodes frames and dispatches them; directory operations go
//! to the hub, moves go straight to the bound room. The writer drains the
//! outbound queue and keeps the socket alive with periodic pings. Neither
//! task ever blocks another component.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use gridlock_protocol::{
    decode_client_frame, encode_server_message, ClientCommand, ConnectionId, DecodeError,
    ErrorCode, MovePayload, RoomId, ServerMessage,
};

use crate::config::ServerConfig;
use crate::hub::HubHandle;
use crate::room::{RoomCommand, RoomHandle};

const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 16;

/// Random alphanumeric id, used for connections and rooms alike.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
        .collect()
}

/// Sender half of a connection's outbound queue.
///
/// Delivery is one non-blocking `try_send`; a full queue drops the message
/// with a warning. Slow consumers lose messages, never stall the server.
#[derive(Clone, Debug)]
pub struct Outbound {
    conn_id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
}

impl Outbound {
    pub fn new(conn_id: ConnectionId, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { conn_id, tx }
    }

    pub fn send(&self, message: ServerMessage) {
        if self.tx.try_send(message).is_err() {
            warn!(conn = %self.conn_id, "outbound queue unavailable, dropping message");
        }
    }

    pub fn send_error(&self, code: ErrorCode) {
        self.send_error_with(code, code.default_message().to_string());
    }

    pub fn send_error_with(&self, code: ErrorCode, message: String) {
        self.send(ServerMessage::Error { code, message });
    }
}

/// Accept loop. Each socket gets its own pipeline.
pub async fn serve(listener: TcpListener, hub: HubHandle, config: ServerConfig) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "inbound connection");
                tokio::spawn(handle_socket(stream, hub.clone(), config.clone()));
            }
            Err(err) => warn!(error = %err, "accept failed"),
        }
    }
}

async fn handle_socket(stream: TcpStream, hub: HubHandle, config: ServerConfig) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(error = %err, "websocket handshake failed");
            return;
        }
    };

    let conn_id = ConnectionId(generate_id());
    let (out_tx, out_rx) = mpsc::channel(config.outbound_queue);
    let outbound = Outbound::new(conn_id.clone(), out_tx);
    let (binding_tx, binding_rx) = watch::channel(None);

    let (sink, source) = ws.split();
    let mut writer = tokio::spawn(write_loop(sink, out_rx, config.ping_period, conn_id.clone()));

    if !hub.register(conn_id.clone(), outbound.clone(), binding_tx).await {
        info!(conn = %conn_id, "admission refused, closing");
        outbound.send_error_with(ErrorCode::Internal, "server at capacity".to_string());
        drop(outbound);
        let _ = writer.await;
        return;
    }

    read_loop(source, outbound, &hub, binding_rx, &config, &conn_id).await;

    hub.unregister(conn_id.clone()).await;
    // Let the writer flush what is already queued, then cut it loose.
    if tokio::time::timeout(Duration::from_secs(5), &mut writer).await.is_err() {
        writer.abort();
    }
    info!(conn = %conn_id, "connection closed");
}

/// What the reader does with one inbound text frame.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    CreateRoom,
    JoinRoom(RoomId),
    SubmitMove(MovePayload),
    ListRooms,
    Reply(ErrorCode, String),
}

fn interpret_frame(text: &str, max_frame_bytes: usize) -> Action {
    if text.len() > max_frame_bytes {
        return Action::Reply(
            ErrorCode::MessageTooLarge,
            ErrorCode::MessageTooLarge.default_message().to_string(),
        );
    }
    match decode_client_frame(text) {
        Ok(ClientCommand::CreateRoom) => Action::CreateRoom,
        Ok(ClientCommand::JoinRoom(room_id)) => Action::JoinRoom(room_id),
        Ok(ClientCommand::MakeMove(mov)) => Action::SubmitMove(mov),
        Ok(ClientCommand::ListRooms) => Action::ListRooms,
        Err(err @ DecodeError::Envelope(_)) => {
            Action::Reply(ErrorCode::InvalidMessage, err.to_string())
        }
        Err(err @ DecodeError::UnknownType(_)) => {
            Action::Reply(ErrorCode::UnknownMessageType, err.to_string())
        }
        Err(err @ DecodeError::Payload { .. }) => {
            Action::Reply(ErrorCode::InvalidPayload, err.to_string())
        }
    }
}

async fn read_loop(
    mut source: SplitStream<WebSocketStream<TcpStream>>,
    outbound: Outbound,
    hub: &HubHandle,
    binding: watch::Receiver<Option<RoomHandle>>,
    config: &ServerConfig,
    conn_id: &ConnectionId,
) {
    loop {
        let message = match tokio::time::timeout(config.read_timeout, source.next()).await {
            Err(_) => {
                info!(conn = %conn_id, "no traffic within read timeout, dropping");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(err))) => {
                debug!(conn = %conn_id, error = %err, "read error");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return,
            Message::Binary(_) => {
                outbound.send_error(ErrorCode::InvalidMessage);
                continue;
            }
            _ => continue,
        };

        match interpret_frame(&text, config.max_frame_bytes) {
            Action::CreateRoom => hub.create_room(conn_id.clone()).await,
            Action::JoinRoom(room_id) => hub.join_room(conn_id.clone(), room_id).await,
            Action::ListRooms => hub.list_rooms(conn_id.clone()).await,
            Action::SubmitMove(mov) => {
                let bound = binding.borrow().clone();
                match bound {
                    Some(room) => room.send(RoomCommand::Move {
                        conn_id: conn_id.clone(),
                        mov,
                    }),
                    None => outbound.send_error(ErrorCode::NotInRoom),
                }
            }
            Action::Reply(code, message) => outbound.send_error_with(code, message),
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::Receiver<ServerMessage>,
    ping_period: Duration,
    conn_id: ConnectionId,
) {
    // First ping fires one period in, not immediately.
    let start = tokio::time::Instant::now() + ping_period;
    let mut ping = tokio::time::interval_at(start, ping_period);
    loop {
        tokio::select! {
            queued = rx.recv() => match queued {
                Some(message) => {
                    let text = match encode_server_message(&message) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(conn = %conn_id, error = %err, "failed to encode message");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}
