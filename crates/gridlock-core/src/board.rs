use serde::{Deserialize, Serialize};

use gridlock_protocol::{Mark, WireBoard};

/// The 3x3 grid. Cells are write-once: `set` is only reachable through
/// [`crate::GameState::apply_move`], which rejects occupied cells first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[Option<Mark>; 3]; 3],
}

impl Board {
    pub const SIZE: usize = 3;

    pub fn get(&self, row: usize, col: usize) -> Option<Mark> {
        self.cells[row][col]
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, mark: Mark) {
        self.cells[row][col] = Some(mark);
    }

    pub fn is_full(&self) -> bool {
        self.cells
            .iter()
            .all(|row| row.iter().all(|cell| cell.is_some()))
    }

    /// The mark holding a completed line, if any.
    pub fn winner(&self) -> Option<Mark> {
        let c = &self.cells;
        for i in 0..Self::SIZE {
            if c[i][0].is_some() && c[i][0] == c[i][1] && c[i][1] == c[i][2] {
                return c[i][0];
            }
            if c[0][i].is_some() && c[0][i] == c[1][i] && c[1][i] == c[2][i] {
                return c[0][i];
            }
        }
        if c[0][0].is_some() && c[0][0] == c[1][1] && c[1][1] == c[2][2] {
            return c[0][0];
        }
        if c[0][2].is_some() && c[0][2] == c[1][1] && c[1][1] == c[2][0] {
            return c[0][2];
        }
        None
    }

    /// Wire representation: "X", "O", or "" per cell.
    pub fn to_wire(&self) -> WireBoard {
        self.cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(Mark::as_str).unwrap_or("").to_string())
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_board_is_empty() {
        let board = Board::default();
        assert!(!board.is_full());
        assert_eq!(board.winner(), None);
        for row in 0..Board::SIZE {
            for col in 0..Board::SIZE {
                assert_eq!(board.get(row, col), None);
            }
        }
    }

    #[test]
    fn detects_column_win() {
        let mut board = Board::default();
        for row in 0..Board::SIZE {
            board.set(row, 1, Mark::O);
        }
        assert_eq!(board.winner(), Some(Mark::O));
    }

    #[test]
    fn detects_anti_diagonal_win() {
        let mut board = Board::default();
        board.set(0, 2, Mark::X);
        board.set(1, 1, Mark::X);
        board.set(2, 0, Mark::X);
        assert_eq!(board.winner(), Some(Mark::X));
    }

    #[test]
    fn empty_cells_render_as_empty_strings() {
        let mut board = Board::default();
        board.set(1, 2, Mark::X);
        let wire = board.to_wire();
        assert_eq!(wire[1][2], "X");
        assert_eq!(wire[0][0], "");
    }
}
