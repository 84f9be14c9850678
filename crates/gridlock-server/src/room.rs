//! Room task: one game between two connections.
//!
//! A room owns its seat assignments and game state outright. Everything
//! reaches it through its inbox; replies and broadcasts leave through the
//! members' outbound queues. The creator takes X and moves first; seats
//! survive disconnects so a returning id gets its old mark back.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gridlock_core::{GameState, MoveError, Outcome};
use gridlock_protocol::{ConnectionId, ErrorCode, Mark, MovePayload, RoomId, ServerMessage};

use crate::connection::Outbound;
use crate::hub::HubCommand;

const ROOM_QUEUE: usize = 64;

/// One connection as the room sees it.
#[derive(Clone, Debug)]
pub struct Member {
    pub id: ConnectionId,
    pub outbound: Outbound,
}

/// Commands a room accepts through its inbox.
#[derive(Debug)]
pub enum RoomCommand {
    Join { member: Member },
    Leave { conn_id: ConnectionId },
    Move { conn_id: ConnectionId, mov: MovePayload },
    /// The empty-room timer fired; occupancy is re-checked on receipt.
    GraceExpired,
    Shutdown,
}

/// Cloneable handle for addressing a room task.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    pub id: RoomId,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Enqueue without blocking. A full or closed inbox drops the command;
    /// a room that cannot keep up must not stall its callers.
    pub fn send(&self, command: RoomCommand) {
        if self.tx.try_send(command).is_err() {
            warn!(room = %self.id, "room inbox unavailable, dropping command");
        }
    }
}

/// State owned by one room task.
pub struct Room {
    id: RoomId,
    hub: mpsc::Sender<HubCommand>,
    /// Currently attached connections.
    members: HashMap<ConnectionId, Outbound>,
    /// Mark per connection id. Never shrinks while the room lives.
    seats: HashMap<ConnectionId, Mark>,
    game: GameState,
    grace: Duration,
    tx: mpsc::Sender<RoomCommand>,
    rx: mpsc::Receiver<RoomCommand>,
}

impl Room {
    /// Start a room task with the creator already seated as X. The creation
    /// acknowledgment is the hub's to send; the room stays quiet until the
    /// next command arrives.
    pub fn spawn(
        id: RoomId,
        creator: Member,
        hub: mpsc::Sender<HubCommand>,
        grace: Duration,
    ) -> RoomHandle {
        let (tx, rx) = mpsc::channel(ROOM_QUEUE);
        let mut members = HashMap::new();
        let mut seats = HashMap::new();
        seats.insert(creator.id.clone(), Mark::X);
        members.insert(creator.id, creator.outbound);

        let room = Room {
            id: id.clone(),
            hub,
            members,
            seats,
            game: GameState::new(),
            grace,
            tx: tx.clone(),
            rx,
        };
        tokio::spawn(room.run());
        RoomHandle { id, tx }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                RoomCommand::Join { member } => self.handle_join(member).await,
                RoomCommand::Leave { conn_id } => self.handle_leave(conn_id),
                RoomCommand::Move { conn_id, mov } => self.handle_move(conn_id, mov).await,
                RoomCommand::GraceExpired => self.handle_grace_expired().await,
                RoomCommand::Shutdown => break,
            }
        }
        debug!(room = %self.id, "room task stopped");
    }

    async fn handle_join(&mut self, member: Member) {
        let id = member.id.clone();

        if let Some(&mark) = self.seats.get(&id) {
            self.handle_rejoin(member, mark).await;
            return;
        }

        if self.seats.len() >= 2 {
            info!(room = %self.id, player = %id, "join refused, room is full");
            member.outbound.send_error(ErrorCode::RoomFull);
            return;
        }

        let mark = self
            .seats
            .values()
            .next()
            .map(|taken| taken.other())
            .unwrap_or(Mark::X);
        self.seats.insert(id.clone(), mark);
        self.members.insert(id.clone(), member.outbound.clone());
        info!(room = %self.id, player = %id, symbol = %mark, "player joined");
        self.confirm_binding(&id).await;

        self.broadcast_except(
            &id,
            ServerMessage::PlayerJoined {
                player_id: id.clone(),
            },
        );
        member.outbound.send(ServerMessage::RoomJoined {
            room_id: self.id.clone(),
            player_id: id,
            symbol: mark,
            game_state: None,
        });

        if self.seats.len() == 2 {
            self.broadcast(ServerMessage::GameStart {
                board: self.game.board().to_wire(),
                current_turn: self.game.current_turn(),
                players: self.players_by_seat(),
            });
        }
    }

    /// A known id came back. Same seat, current board, and if the game is
    /// on, the peer hears about the return.
    async fn handle_rejoin(&mut self, member: Member, mark: Mark) {
        let id = member.id.clone();
        self.members.insert(id.clone(), member.outbound.clone());
        info!(room = %self.id, player = %id, symbol = %mark, "player reconnected");
        self.confirm_binding(&id).await;

        let game_state = serde_json::to_string(&self.game.board().to_wire()).ok();
        member.outbound.send(ServerMessage::RoomJoined {
            room_id: self.id.clone(),
            player_id: id.clone(),
            symbol: mark,
            game_state,
        });

        if self.seats.len() == 2 {
            member.outbound.send(ServerMessage::GameStart {
                board: self.game.board().to_wire(),
                current_turn: self.game.current_turn(),
                players: self.players_by_seat(),
            });
            member.outbound.send(ServerMessage::GameUpdate {
                board: self.game.board().to_wire(),
                current_turn: self.game.current_turn(),
                last_move: None,
            });
            self.broadcast_except(&id, ServerMessage::PlayerReconnected { player_id: id.clone() });
        }
    }

    fn handle_leave(&mut self, conn_id: ConnectionId) {
        if self.members.remove(&conn_id).is_none() {
            return;
        }
        info!(room = %self.id, player = %conn_id, "player left");

        if self.members.is_empty() {
            self.schedule_grace_check();
            return;
        }

        self.broadcast(ServerMessage::PlayerLeft { player_id: conn_id });

        // Walking out of a live game forfeits it to whoever stayed.
        if self.seats.len() == 2 && !self.game.is_over() {
            let board = self.game.board().to_wire();
            for (id, outbound) in &self.members {
                outbound.send(ServerMessage::GameOver {
                    board: board.clone(),
                    winner: id.0.clone(),
                    is_draw: false,
                });
            }
        }
    }

    async fn handle_move(&mut self, conn_id: ConnectionId, mov: MovePayload) {
        let Some(outbound) = self.members.get(&conn_id).cloned() else {
            warn!(room = %self.id, player = %conn_id, "move from non-member ignored");
            return;
        };
        let Some(&mark) = self.seats.get(&conn_id) else {
            outbound.send_error(ErrorCode::NotInGame);
            return;
        };

        // Negative coordinates fall through as out of bounds.
        let row = usize::try_from(mov.row).unwrap_or(usize::MAX);
        let col = usize::try_from(mov.col).unwrap_or(usize::MAX);

        match self.game.apply_move(mark, row, col) {
            Ok(()) => {}
            Err(MoveError::WrongTurn) => {
                outbound.send_error(ErrorCode::NotYourTurn);
                return;
            }
            Err(err) => {
                outbound.send_error_with(ErrorCode::InvalidMove, err.to_string());
                return;
            }
        }

        self.broadcast(ServerMessage::GameUpdate {
            board: self.game.board().to_wire(),
            current_turn: self.game.current_turn(),
            last_move: Some(mov),
        });

        if self.game.is_over() {
            let winner = self
                .game
                .winner()
                .and_then(|mark| self.seat_holder(mark))
                .map(|id| id.0.clone())
                .unwrap_or_default();
            let is_draw = self.game.outcome() == Outcome::Draw;
            info!(room = %self.id, %winner, is_draw, "game over");
            self.broadcast(ServerMessage::GameOver {
                board: self.game.board().to_wire(),
                winner,
                is_draw,
            });
            let _ = self
                .hub
                .send(HubCommand::RetireRoom {
                    room_id: self.id.clone(),
                })
                .await;
        }
    }

    /// The hub only exposes a binding for a seat the room has confirmed.
    async fn confirm_binding(&self, conn_id: &ConnectionId) {
        let _ = self
            .hub
            .send(HubCommand::ConfirmBinding {
                conn_id: conn_id.clone(),
                room_id: self.id.clone(),
            })
            .await;
    }

    fn schedule_grace_check(&self) {
        debug!(room = %self.id, grace_secs = self.grace.as_secs(), "room empty, retirement pending");
        let tx = self.tx.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(RoomCommand::GraceExpired).await;
        });
    }

    async fn handle_grace_expired(&mut self) {
        if !self.members.is_empty() {
            return;
        }
        info!(room = %self.id, "still empty after grace period, retiring");
        let _ = self
            .hub
            .send(HubCommand::RetireRoom {
                room_id: self.id.clone(),
            })
            .await;
    }

    fn seat_holder(&self, mark: Mark) -> Option<&ConnectionId> {
        self.seats
            .iter()
            .find(|(_, &seat)| seat == mark)
            .map(|(id, _)| id)
    }

    fn players_by_seat(&self) -> BTreeMap<ConnectionId, Mark> {
        self.seats
            .iter()
            .map(|(id, &mark)| (id.clone(), mark))
            .collect()
    }

    fn broadcast(&self, message: ServerMessage) {
        for outbound in self.members.values() {
            outbound.send(message.clone());
        }
    }

    fn broadcast_except(&self, skip: &ConnectionId, message: ServerMessage) {
        for (id, outbound) in &self.members {
            if id != skip {
                outbound.send(message.clone());
            }
        }
    }
}
