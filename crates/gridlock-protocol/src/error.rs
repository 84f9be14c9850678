use serde::{Deserialize, Serialize};

/// The closed set of error codes a client can receive.
///
/// Clients switch on the code; the message is advisory text for humans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame was not a well-formed message envelope.
    InvalidMessage,
    /// Envelope type was recognized but the payload did not parse.
    InvalidPayload,
    /// Envelope type is not one the server knows.
    UnknownMessageType,
    /// Operation requires a room binding and the connection has none.
    NotInRoom,
    /// Connection holds no role in the room it addressed.
    NotInGame,
    /// Move rejected by the rules (out of bounds, occupied, game over).
    InvalidMove,
    /// Move submitted out of turn.
    NotYourTurn,
    /// No room exists under the requested id.
    RoomNotFound,
    /// Room already has both roles assigned.
    RoomFull,
    /// Inbound frame exceeded the size limit.
    MessageTooLarge,
    /// Catch-all for server-side failures, including capacity refusals.
    Internal,
}

impl ErrorCode {
    /// Default human-readable text sent alongside the code.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::InvalidMessage => "malformed message",
            ErrorCode::InvalidPayload => "invalid payload",
            ErrorCode::UnknownMessageType => "unknown message type",
            ErrorCode::NotInRoom => "you are not in a room",
            ErrorCode::NotInGame => "you are not part of this game",
            ErrorCode::InvalidMove => "invalid move",
            ErrorCode::NotYourTurn => "it is not your turn",
            ErrorCode::RoomNotFound => "room not found",
            ErrorCode::RoomFull => "the room is already full",
            ErrorCode::MessageTooLarge => "message exceeds the maximum allowed size",
            ErrorCode::Internal => "internal server error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::UnknownMessageType).unwrap(),
            "\"unknown_message_type\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::RoomFull).unwrap(),
            "\"room_full\""
        );
        let code: ErrorCode = serde_json::from_str("\"not_your_turn\"").unwrap();
        assert_eq!(code, ErrorCode::NotYourTurn);
    }
}
