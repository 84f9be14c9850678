//! Gridlock Game Server
//!
//! Coordinates two-player game rooms over WebSocket. One hub task owns the
//! directory of connections and rooms; each room runs as its own task; each
//! connection gets a reader and a writer task. Components talk exclusively
//! through message channels.

pub mod config;
pub mod connection;
pub mod hub;
pub mod room;

pub use config::ServerConfig;
pub use connection::{generate_id, Outbound};
pub use hub::{Hub, HubCommand, HubHandle};
pub use room::{Member, Room, RoomCommand, RoomHandle};
