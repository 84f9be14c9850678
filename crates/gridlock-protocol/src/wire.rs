//! Frame encoding and decoding.
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": ...}`. Client
//! frames are decoded in two phases so the failure modes stay distinct: a
//! frame that is not an envelope, an envelope with an unknown type, and a
//! known type with a bad payload each map to a different error code.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{ConnectionId, RoomId};
use crate::types::Mark;

/// Board as it appears on the wire: "X", "O", or "" per cell.
pub type WireBoard = Vec<Vec<String>>;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw envelope of an inbound frame. The payload stays opaque until the
/// type has been matched.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// One cell coordinate pair as submitted by a client.
///
/// Signed on purpose: out-of-range values must reach the rules check
/// rather than die in deserialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePayload {
    pub row: i32,
    pub col: i32,
}

#[derive(Debug, Deserialize)]
struct JoinRoomPayload {
    #[serde(rename = "roomId")]
    room_id: RoomId,
}

#[derive(Debug, Deserialize)]
struct MakeMovePayload {
    #[serde(rename = "move")]
    mov: MovePayload,
}

/// A fully decoded client request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    CreateRoom,
    JoinRoom(RoomId),
    MakeMove(MovePayload),
    ListRooms,
}

/// Why an inbound frame could not be turned into a [`ClientCommand`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("invalid payload for {command}: {source}")]
    Payload {
        command: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one inbound text frame.
pub fn decode_client_frame(text: &str) -> Result<ClientCommand, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Envelope)?;
    match envelope.kind.as_str() {
        "CREATE_ROOM" => Ok(ClientCommand::CreateRoom),
        "LIST_ROOMS" => Ok(ClientCommand::ListRooms),
        "JOIN_ROOM" => {
            let payload: JoinRoomPayload =
                serde_json::from_value(envelope.payload).map_err(|source| DecodeError::Payload {
                    command: "JOIN_ROOM",
                    source,
                })?;
            Ok(ClientCommand::JoinRoom(payload.room_id))
        }
        "MAKE_MOVE" => {
            let payload: MakeMovePayload =
                serde_json::from_value(envelope.payload).map_err(|source| DecodeError::Payload {
                    command: "MAKE_MOVE",
                    source,
                })?;
            Ok(ClientCommand::MakeMove(payload.mov))
        }
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

/// Directory entry for one room in a `ROOM_LIST` reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub players: Vec<ConnectionId>,
    pub is_full: bool,
}

/// Every message the server can push to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    RoomCreated {
        room_id: RoomId,
        player_id: ConnectionId,
        symbol: Mark,
    },
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: RoomId,
        player_id: ConnectionId,
        symbol: Mark,
        /// Present only on reconnection: the board, pre-serialized.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_state: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoined { player_id: ConnectionId },
    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_id: ConnectionId },
    #[serde(rename_all = "camelCase")]
    PlayerReconnected { player_id: ConnectionId },
    #[serde(rename_all = "camelCase")]
    GameStart {
        board: WireBoard,
        current_turn: Mark,
        players: BTreeMap<ConnectionId, Mark>,
    },
    #[serde(rename_all = "camelCase")]
    GameUpdate {
        board: WireBoard,
        current_turn: Mark,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_move: Option<MovePayload>,
    },
    #[serde(rename_all = "camelCase")]
    GameOver {
        board: WireBoard,
        /// Connection id of the winner; empty string on a draw.
        winner: String,
        is_draw: bool,
    },
    RoomList { rooms: Vec<RoomInfo> },
    Error { code: crate::ErrorCode, message: String },
}

/// Encode one outbound message as a JSON text frame.
pub fn encode_server_message(message: &ServerMessage) -> Result<String, WireError> {
    Ok(serde_json::to_string(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use serde_json::json;

    #[test]
    fn decode_create_room() {
        let cmd = decode_client_frame(r#"{"type":"CREATE_ROOM"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::CreateRoom);
    }

    #[test]
    fn decode_join_room() {
        let cmd =
            decode_client_frame(r#"{"type":"JOIN_ROOM","payload":{"roomId":"abc123"}}"#).unwrap();
        assert_eq!(cmd, ClientCommand::JoinRoom(RoomId::from("abc123")));
    }

    #[test]
    fn decode_make_move() {
        let cmd = decode_client_frame(r#"{"type":"MAKE_MOVE","payload":{"move":{"row":2,"col":0}}}"#)
            .unwrap();
        assert_eq!(cmd, ClientCommand::MakeMove(MovePayload { row: 2, col: 0 }));
    }

    #[test]
    fn decode_rejects_non_envelope() {
        let err = decode_client_frame("not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Envelope(_)));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let err = decode_client_frame(r#"{"type":"DANCE"}"#).unwrap_err();
        match err {
            DecodeError::UnknownType(kind) => assert_eq!(kind, "DANCE"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_bad_payload_for_known_type() {
        let err = decode_client_frame(r#"{"type":"JOIN_ROOM","payload":{"room":42}}"#).unwrap_err();
        match err {
            DecodeError::Payload { command, .. } => assert_eq!(command, "JOIN_ROOM"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        // CREATE_ROOM and LIST_ROOMS carry no payload at all.
        assert_eq!(
            decode_client_frame(r#"{"type":"LIST_ROOMS"}"#).unwrap(),
            ClientCommand::ListRooms
        );
    }

    #[test]
    fn room_created_wire_shape() {
        let msg = ServerMessage::RoomCreated {
            room_id: RoomId::from("r1"),
            player_id: ConnectionId::from("p1"),
            symbol: Mark::X,
        };
        let value: Value = serde_json::from_str(&encode_server_message(&msg).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "ROOM_CREATED",
                "payload": {"roomId": "r1", "playerId": "p1", "symbol": "X"}
            })
        );
    }

    #[test]
    fn game_update_omits_absent_last_move() {
        let empty: WireBoard = vec![vec![String::new(); 3]; 3];
        let msg = ServerMessage::GameUpdate {
            board: empty,
            current_turn: Mark::O,
            last_move: None,
        };
        let value: Value = serde_json::from_str(&encode_server_message(&msg).unwrap()).unwrap();
        assert_eq!(value["payload"]["currentTurn"], json!("O"));
        assert!(value["payload"].get("lastMove").is_none());
    }

    #[test]
    fn game_over_wire_shape() {
        let board: WireBoard = vec![
            vec!["X".into(), "X".into(), "X".into()],
            vec!["O".into(), "O".into(), "".into()],
            vec!["".into(), "".into(), "".into()],
        ];
        let msg = ServerMessage::GameOver {
            board,
            winner: "p1".into(),
            is_draw: false,
        };
        let value: Value = serde_json::from_str(&encode_server_message(&msg).unwrap()).unwrap();
        assert_eq!(value["type"], json!("GAME_OVER"));
        assert_eq!(value["payload"]["winner"], json!("p1"));
        assert_eq!(value["payload"]["isDraw"], json!(false));
        assert_eq!(value["payload"]["board"][0], json!(["X", "X", "X"]));
    }

    #[test]
    fn error_message_wire_shape() {
        let msg = ServerMessage::Error {
            code: ErrorCode::NotInRoom,
            message: ErrorCode::NotInRoom.default_message().to_string(),
        };
        let value: Value = serde_json::from_str(&encode_server_message(&msg).unwrap()).unwrap();
        assert_eq!(value["type"], json!("ERROR"));
        assert_eq!(value["payload"]["code"], json!("not_in_room"));
    }

    #[test]
    fn server_messages_round_trip() {
        let msg = ServerMessage::RoomList {
            rooms: vec![RoomInfo {
                room_id: RoomId::from("r9"),
                players: vec![ConnectionId::from("a"), ConnectionId::from("b")],
                is_full: true,
            }],
        };
        let text = encode_server_message(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }
}
