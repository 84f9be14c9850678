//! Wire protocol shared between the game server and its clients.
//!
//! Everything that crosses the transport lives here: message envelopes,
//! client commands, server messages, and the closed error-code set.

pub mod error;
pub mod ids;
pub mod types;
pub mod wire;

pub use error::ErrorCode;
pub use ids::{ConnectionId, RoomId};
pub use types::Mark;
pub use wire::{
    decode_client_frame, encode_server_message, ClientCommand, DecodeError, Envelope,
    MovePayload, RoomInfo, ServerMessage, WireBoard, WireError,
};
