use serde::{Deserialize, Serialize};
use thiserror::Error;

use gridlock_protocol::Mark;

use crate::board::Board;

/// Where the game stands. Once terminal it never changes again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    InProgress,
    Won(Mark),
    Draw,
}

/// Why a move was rejected. Checks run in this order, so a move that is
/// both out of turn and out of bounds reports the turn problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("the game is already over")]
    GameOver,
    #[error("it is not your turn")]
    WrongTurn,
    #[error("position is outside the board")]
    OutOfBounds,
    #[error("cell is already occupied")]
    CellOccupied,
}

/// Full game state: board, whose turn it is, and the outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    board: Board,
    current_turn: Mark,
    outcome: Outcome,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            board: Board::default(),
            current_turn: Mark::X,
            outcome: Outcome::InProgress,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_turn(&self) -> Mark {
        self.current_turn
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome != Outcome::InProgress
    }

    pub fn winner(&self) -> Option<Mark> {
        match self.outcome {
            Outcome::Won(mark) => Some(mark),
            _ => None,
        }
    }

    /// Validate and apply one move. A win is settled before a draw, so a
    /// line completed on the ninth move counts as a win.
    pub fn apply_move(&mut self, mark: Mark, row: usize, col: usize) -> Result<(), MoveError> {
        if self.is_over() {
            return Err(MoveError::GameOver);
        }
        if mark != self.current_turn {
            return Err(MoveError::WrongTurn);
        }
        if row >= Board::SIZE || col >= Board::SIZE {
            return Err(MoveError::OutOfBounds);
        }
        if self.board.get(row, col).is_some() {
            return Err(MoveError::CellOccupied);
        }

        self.board.set(row, col, mark);

        if let Some(winner) = self.board.winner() {
            self.outcome = Outcome::Won(winner);
        } else if self.board.is_full() {
            self.outcome = Outcome::Draw;
        } else {
            self.current_turn = self.current_turn.other();
        }
        Ok(())
    }
}
