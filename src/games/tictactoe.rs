//! Tic-tac-toe variant: 3x3 board, eight win lines, strict alternation.

use serde::{Deserialize, Serialize};

use super::{AppliedMove, GameState, MoveError, Outcome, Seat};

/// The eight winning lines, row-major cell indices.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Tic-tac-toe board and move history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicTacToeState {
    /// Cells 0-8 in row-major order.
    board: [Option<Seat>; 9],
    /// Cells in the order they were claimed.
    history: Vec<usize>,
}

impl TicTacToeState {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self {
            board: [None; 9],
            history: Vec::new(),
        }
    }

    /// Returns the board cells.
    pub fn board(&self) -> &[Option<Seat>; 9] {
        &self.board
    }

    /// Returns the claim history.
    pub fn history(&self) -> &[usize] {
        &self.history
    }

    /// Number of moves played so far, per seat.
    pub fn moves(&self, seat: Seat) -> usize {
        // Player1 claims even history slots, Player2 odd ones.
        self.history
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == seat.index())
            .count()
    }

    pub(super) fn apply(&self, cell: usize, seat: Seat) -> Result<AppliedMove, MoveError> {
        if cell >= 9 {
            return Err(MoveError::CellOutOfRange(cell));
        }
        if self.board[cell].is_some() {
            return Err(MoveError::CellTaken(cell));
        }

        let mut next = self.clone();
        next.board[cell] = Some(seat);
        next.history.push(cell);

        let outcome = next.outcome();
        Ok(AppliedMove::new(
            GameState::TicTacToe(next),
            seat.other(),
            outcome,
            None,
        ))
    }

    /// Scans the eight lines for a winner, then checks for a full board.
    pub fn outcome(&self) -> Outcome {
        for [a, b, c] in LINES {
            if let Some(seat) = self.board[a] {
                if self.board[b] == Some(seat) && self.board[c] == Some(seat) {
                    return Outcome::Win(seat);
                }
            }
        }
        if self.board.iter().all(|cell| cell.is_some()) {
            Outcome::Draw
        } else {
            Outcome::Ongoing
        }
    }
}

impl Default for TicTacToeState {
    fn default() -> Self {
        Self::new()
    }
}
