//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the server
    pub bind_address: SocketAddr,
    /// Maximum concurrently registered connections
    pub max_connections: usize,
    /// Maximum concurrently live rooms
    pub max_rooms: usize,
    /// How long an empty room lingers before it is retired
    pub empty_room_grace: Duration,
    /// Reader gives up on a silent connection after this long
    pub read_timeout: Duration,
    /// Writer keepalive interval; must stay below `read_timeout`
    pub ping_period: Duration,
    /// Inbound frames larger than this are rejected
    pub max_frame_bytes: usize,
    /// Depth of each connection's outbound queue
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            max_rooms: 500,
            empty_room_grace: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            max_frame_bytes: 16 * 1024,
            outbound_queue: 256,
        }
    }
}

impl ServerConfig {
    /// Build a config from `GRIDLOCK_*` environment variables, falling back
    /// to defaults. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let grace_secs = parse_env(
            "GRIDLOCK_ROOM_GRACE_SECS",
            defaults.empty_room_grace.as_secs(),
        );
        Self {
            bind_address: parse_env("GRIDLOCK_BIND", defaults.bind_address),
            max_connections: parse_env("GRIDLOCK_MAX_CONNECTIONS", defaults.max_connections),
            max_rooms: parse_env("GRIDLOCK_MAX_ROOMS", defaults.max_rooms),
            empty_room_grace: Duration::from_secs(grace_secs),
            ..defaults
        }
    }
}

fn parse_env<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => parse_or(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T: std::str::FromStr + Copy>(name: &str, raw: &str, default: T) -> T {
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(%name, %raw, "unparseable value in environment, using default");
            default
        }
    }
}
