//! Hub task: the single owner of the connection and room directories.
//!
//! Every registration, room creation, join, listing, and retirement funnels
//! through one inbox, so directory state never needs a lock. The hub holds
//! each connection's room binding behind a watch channel; readers resolve
//! moves against it without asking the hub.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use gridlock_protocol::{ConnectionId, ErrorCode, Mark, RoomId, RoomInfo, ServerMessage};

use crate::config::ServerConfig;
use crate::connection::{generate_id, Outbound};
use crate::room::{Member, Room, RoomCommand, RoomHandle};

const HUB_QUEUE: usize = 256;

/// Commands the hub accepts through its inbox.
#[derive(Debug)]
pub enum HubCommand {
    Register {
        conn_id: ConnectionId,
        outbound: Outbound,
        binding: watch::Sender<Option<RoomHandle>>,
        reply: oneshot::Sender<bool>,
    },
    Unregister {
        conn_id: ConnectionId,
    },
    CreateRoom {
        conn_id: ConnectionId,
    },
    JoinRoom {
        conn_id: ConnectionId,
        room_id: RoomId,
    },
    /// Sent by a room after it seats a member; only then does the binding
    /// become visible to the member's reader.
    ConfirmBinding {
        conn_id: ConnectionId,
        room_id: RoomId,
    },
    ListRooms {
        conn_id: ConnectionId,
    },
    RetireRoom {
        room_id: RoomId,
    },
    Shutdown,
}

/// Cloneable handle for talking to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Admit a connection. Returns false when the hub is full or gone;
    /// the caller must then close the transport.
    pub async fn register(
        &self,
        conn_id: ConnectionId,
        outbound: Outbound,
        binding: watch::Sender<Option<RoomHandle>>,
    ) -> bool {
        let (reply, reply_rx) = oneshot::channel();
        let command = HubCommand::Register {
            conn_id,
            outbound,
            binding,
            reply,
        };
        if self.tx.send(command).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub async fn unregister(&self, conn_id: ConnectionId) {
        let _ = self.tx.send(HubCommand::Unregister { conn_id }).await;
    }

    pub async fn create_room(&self, conn_id: ConnectionId) {
        let _ = self.tx.send(HubCommand::CreateRoom { conn_id }).await;
    }

    pub async fn join_room(&self, conn_id: ConnectionId, room_id: RoomId) {
        let _ = self.tx.send(HubCommand::JoinRoom { conn_id, room_id }).await;
    }

    pub async fn list_rooms(&self, conn_id: ConnectionId) {
        let _ = self.tx.send(HubCommand::ListRooms { conn_id }).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(HubCommand::Shutdown).await;
    }
}

struct ConnectionEntry {
    outbound: Outbound,
    binding: Option<RoomId>,
    binding_tx: watch::Sender<Option<RoomHandle>>,
}

/// State owned by the hub task.
pub struct Hub {
    config: ServerConfig,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomId, RoomHandle>,
    tx: mpsc::Sender<HubCommand>,
    rx: mpsc::Receiver<HubCommand>,
}

impl Hub {
    pub fn spawn(config: ServerConfig) -> HubHandle {
        let (tx, rx) = mpsc::channel(HUB_QUEUE);
        let hub = Hub {
            config,
            connections: HashMap::new(),
            rooms: HashMap::new(),
            tx: tx.clone(),
            rx,
        };
        tokio::spawn(hub.run());
        HubHandle { tx }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                HubCommand::Register {
                    conn_id,
                    outbound,
                    binding,
                    reply,
                } => {
                    let accepted = self.handle_register(conn_id, outbound, binding);
                    let _ = reply.send(accepted);
                }
                HubCommand::Unregister { conn_id } => self.handle_unregister(conn_id),
                HubCommand::CreateRoom { conn_id } => self.handle_create_room(conn_id),
                HubCommand::JoinRoom { conn_id, room_id } => {
                    self.handle_join_room(conn_id, room_id)
                }
                HubCommand::ConfirmBinding { conn_id, room_id } => {
                    self.handle_confirm_binding(conn_id, room_id)
                }
                HubCommand::ListRooms { conn_id } => self.handle_list_rooms(conn_id),
                HubCommand::RetireRoom { room_id } => self.handle_retire_room(room_id),
                HubCommand::Shutdown => break,
            }
        }
        for room in self.rooms.values() {
            room.send(RoomCommand::Shutdown);
        }
        info!("hub stopped");
    }

    fn handle_register(
        &mut self,
        conn_id: ConnectionId,
        outbound: Outbound,
        binding_tx: watch::Sender<Option<RoomHandle>>,
    ) -> bool {
        if self.connections.len() >= self.config.max_connections {
            warn!(
                conn = %conn_id,
                limit = self.config.max_connections,
                "connection refused, at capacity"
            );
            return false;
        }
        info!(conn = %conn_id, total = self.connections.len() + 1, "connection registered");
        self.connections.insert(
            conn_id,
            ConnectionEntry {
                outbound,
                binding: None,
                binding_tx,
            },
        );
        true
    }

    fn handle_unregister(&mut self, conn_id: ConnectionId) {
        let Some(entry) = self.connections.remove(&conn_id) else {
            return;
        };
        info!(conn = %conn_id, total = self.connections.len(), "connection unregistered");
        if let Some(room_id) = entry.binding {
            if let Some(room) = self.rooms.get(&room_id) {
                room.send(RoomCommand::Leave { conn_id });
            }
        }
    }

    fn handle_create_room(&mut self, conn_id: ConnectionId) {
        let Some(entry) = self.connections.get(&conn_id) else {
            warn!(conn = %conn_id, "create from unregistered connection");
            return;
        };
        let outbound = entry.outbound.clone();

        if self.rooms.len() >= self.config.max_rooms {
            warn!(limit = self.config.max_rooms, "room refused, at capacity");
            outbound.send_error_with(ErrorCode::Internal, "room capacity reached".to_string());
            return;
        }

        // Creating a room implicitly leaves the previous one.
        self.detach(&conn_id);

        let room_id = RoomId(generate_id());
        let handle = Room::spawn(
            room_id.clone(),
            Member {
                id: conn_id.clone(),
                outbound: outbound.clone(),
            },
            self.tx.clone(),
            self.config.empty_room_grace,
        );
        self.rooms.insert(room_id.clone(), handle.clone());
        self.bind(&conn_id, handle);
        info!(room = %room_id, conn = %conn_id, total = self.rooms.len(), "room created");

        outbound.send(ServerMessage::RoomCreated {
            room_id,
            player_id: conn_id,
            symbol: Mark::X,
        });
    }

    fn handle_join_room(&mut self, conn_id: ConnectionId, room_id: RoomId) {
        let Some(entry) = self.connections.get(&conn_id) else {
            warn!(conn = %conn_id, "join from unregistered connection");
            return;
        };
        let outbound = entry.outbound.clone();
        let Some(room) = self.rooms.get(&room_id).cloned() else {
            outbound.send_error(ErrorCode::RoomNotFound);
            return;
        };
        // The binding is not touched here. The room decides whether the
        // join sticks and confirms back through its own command.
        room.send(RoomCommand::Join {
            member: Member {
                id: conn_id,
                outbound,
            },
        });
    }

    fn handle_confirm_binding(&mut self, conn_id: ConnectionId, room_id: RoomId) {
        let Some(room) = self.rooms.get(&room_id).cloned() else {
            return;
        };
        let Some(entry) = self.connections.get_mut(&conn_id) else {
            // Connection vanished between join and confirmation.
            room.send(RoomCommand::Leave { conn_id });
            return;
        };
        if let Some(previous) = entry.binding.take() {
            if previous != room_id {
                if let Some(old) = self.rooms.get(&previous) {
                    old.send(RoomCommand::Leave {
                        conn_id: conn_id.clone(),
                    });
                }
            }
        }
        self.bind(&conn_id, room);
    }

    fn handle_list_rooms(&self, conn_id: ConnectionId) {
        let Some(entry) = self.connections.get(&conn_id) else {
            return;
        };
        let mut rooms: Vec<RoomInfo> = self
            .rooms
            .keys()
            .map(|room_id| {
                let players: Vec<ConnectionId> = self
                    .connections
                    .iter()
                    .filter(|(_, e)| e.binding.as_ref() == Some(room_id))
                    .map(|(id, _)| id.clone())
                    .collect();
                RoomInfo {
                    room_id: room_id.clone(),
                    is_full: players.len() >= 2,
                    players,
                }
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        entry.outbound.send(ServerMessage::RoomList { rooms });
    }

    /// Idempotent: retiring an already-gone room is a no-op.
    fn handle_retire_room(&mut self, room_id: RoomId) {
        let Some(room) = self.rooms.remove(&room_id) else {
            return;
        };
        info!(room = %room_id, total = self.rooms.len(), "room retired");
        room.send(RoomCommand::Shutdown);
        for entry in self.connections.values_mut() {
            if entry.binding.as_ref() == Some(&room_id) {
                entry.binding = None;
                let _ = entry.binding_tx.send(None);
            }
        }
    }

    fn bind(&mut self, conn_id: &ConnectionId, room: RoomHandle) {
        if let Some(entry) = self.connections.get_mut(conn_id) {
            entry.binding = Some(room.id.clone());
            let _ = entry.binding_tx.send(Some(room));
        }
    }

    /// Drop any current binding, telling the old room the member left.
    fn detach(&mut self, conn_id: &ConnectionId) {
        let Some(entry) = self.connections.get_mut(conn_id) else {
            return;
        };
        let Some(room_id) = entry.binding.take() else {
            return;
        };
        let _ = entry.binding_tx.send(None);
        if let Some(room) = self.rooms.get(&room_id) {
            room.send(RoomCommand::Leave {
                conn_id: conn_id.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn small_config() -> ServerConfig {
        ServerConfig {
            max_connections: 4,
            max_rooms: 2,
            empty_room_grace: Duration::from_millis(50),
            ..ServerConfig::default()
        }
    }

    struct TestConn {
        id: ConnectionId,
        rx: mpsc::Receiver<ServerMessage>,
        binding: watch::Receiver<Option<RoomHandle>>,
    }

    async fn register(hub: &HubHandle, id: &str) -> Option<TestConn> {
        let (tx, rx) = mpsc::channel(64);
        let conn_id = ConnectionId::from(id);
        let (binding_tx, binding_rx) = watch::channel(None);
        let accepted = hub
            .register(conn_id.clone(), Outbound::new(conn_id.clone(), tx), binding_tx)
            .await;
        accepted.then_some(TestConn {
            id: conn_id,
            rx,
            binding: binding_rx,
        })
    }

    async fn recv(conn: &mut TestConn) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(1), conn.rx.recv())
            .await
            .expect("no message within timeout")
            .expect("outbound channel closed")
    }

    async fn create_room(hub: &HubHandle, conn: &mut TestConn) -> RoomId {
        hub.create_room(conn.id.clone()).await;
        match recv(conn).await {
            ServerMessage::RoomCreated { room_id, symbol, .. } => {
                assert_eq!(symbol, Mark::X);
                room_id
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn admission_respects_connection_capacity() {
        let hub = Hub::spawn(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        });
        assert!(register(&hub, "alice").await.is_some());
        assert!(register(&hub, "bob").await.is_none());
    }

    #[tokio::test]
    async fn creator_gets_room_and_binding() {
        let hub = Hub::spawn(small_config());
        let mut alice = register(&hub, "alice").await.unwrap();
        let room_id = create_room(&hub, &mut alice).await;
        assert_eq!(
            alice.binding.borrow().as_ref().map(|room| room.id.clone()),
            Some(room_id)
        );
    }

    #[tokio::test]
    async fn room_capacity_reports_internal_error() {
        let hub = Hub::spawn(ServerConfig {
            max_rooms: 1,
            ..ServerConfig::default()
        });
        let mut alice = register(&hub, "alice").await.unwrap();
        let mut bob = register(&hub, "bob").await.unwrap();
        create_room(&hub, &mut alice).await;

        hub.create_room(bob.id.clone()).await;
        match recv(&mut bob).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::Internal),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn joining_a_missing_room_fails_cleanly() {
        let hub = Hub::spawn(small_config());
        let mut alice = register(&hub, "alice").await.unwrap();
        hub.join_room(alice.id.clone(), RoomId::from("nope")).await;
        match recv(&mut alice).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::RoomNotFound),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_flow_seats_and_binds_the_second_player() {
        let hub = Hub::spawn(small_config());
        let mut alice = register(&hub, "alice").await.unwrap();
        let mut bob = register(&hub, "bob").await.unwrap();
        let room_id = create_room(&hub, &mut alice).await;

        hub.join_room(bob.id.clone(), room_id.clone()).await;
        match recv(&mut bob).await {
            ServerMessage::RoomJoined { symbol, .. } => assert_eq!(symbol, Mark::O),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(recv(&mut bob).await, ServerMessage::GameStart { .. }));
        assert!(matches!(recv(&mut alice).await, ServerMessage::PlayerJoined { .. }));
        assert!(matches!(recv(&mut alice).await, ServerMessage::GameStart { .. }));

        // The binding lands once the room has confirmed the seat.
        tokio::time::timeout(Duration::from_secs(1), bob.binding.wait_for(Option::is_some))
            .await
            .expect("binding not confirmed")
            .unwrap();
    }

    #[tokio::test]
    async fn listing_reports_rooms_and_occupancy() {
        let hub = Hub::spawn(small_config());
        let mut alice = register(&hub, "alice").await.unwrap();
        let mut bob = register(&hub, "bob").await.unwrap();
        let room_id = create_room(&hub, &mut alice).await;

        hub.join_room(bob.id.clone(), room_id.clone()).await;
        assert!(matches!(recv(&mut bob).await, ServerMessage::RoomJoined { .. }));
        assert!(matches!(recv(&mut bob).await, ServerMessage::GameStart { .. }));

        hub.list_rooms(bob.id.clone()).await;
        match recv(&mut bob).await {
            ServerMessage::RoomList { rooms } => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].room_id, room_id);
                assert!(rooms[0].is_full);
                assert!(rooms[0].players.contains(&alice.id));
                assert!(rooms[0].players.contains(&bob.id));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregister_forfeits_the_running_game() {
        let hub = Hub::spawn(small_config());
        let mut alice = register(&hub, "alice").await.unwrap();
        let mut bob = register(&hub, "bob").await.unwrap();
        let room_id = create_room(&hub, &mut alice).await;

        hub.join_room(bob.id.clone(), room_id).await;
        assert!(matches!(recv(&mut alice).await, ServerMessage::PlayerJoined { .. }));
        assert!(matches!(recv(&mut alice).await, ServerMessage::GameStart { .. }));

        hub.unregister(bob.id.clone()).await;
        assert!(matches!(recv(&mut alice).await, ServerMessage::PlayerLeft { .. }));
        match recv(&mut alice).await {
            ServerMessage::GameOver { winner, is_draw, .. } => {
                assert_eq!(winner, "alice");
                assert!(!is_draw);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn retirement_is_idempotent_and_clears_the_directory() {
        let hub = Hub::spawn(small_config());
        let mut alice = register(&hub, "alice").await.unwrap();
        let room_id = create_room(&hub, &mut alice).await;

        for _ in 0..2 {
            let _ = hub
                .tx
                .send(HubCommand::RetireRoom {
                    room_id: room_id.clone(),
                })
                .await;
        }

        // Binding is cleared and the room no longer resolves.
        tokio::time::timeout(Duration::from_secs(1), alice.binding.wait_for(Option::is_none))
            .await
            .expect("binding not cleared")
            .unwrap();
        hub.join_room(alice.id.clone(), room_id).await;
        match recv(&mut alice).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::RoomNotFound),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
