//! Pure turn engine for a 3x3 two-player board game.
//!
//! No clocks, no I/O, no identities. Callers map their players onto
//! [`Mark`]s; the engine only validates and applies moves.

pub mod board;
pub mod engine;

pub use board::Board;
pub use engine::{GameState, MoveError, Outcome};
pub use gridlock_protocol::Mark;
