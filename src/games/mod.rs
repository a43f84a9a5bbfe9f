//! Game variant logic: pure move validation and outcome detection.
//!
//! Each variant is a value type inside the closed [`GameState`] union.
//! Applying a move never mutates in place; it produces the next state
//! plus the turn owner and outcome, which the coordinator persists as
//! a single conditional write.

mod memory;
mod tictactoe;
mod wordguess;

pub use memory::{MatchTally, MemoryCard, MemoryState};
pub use tictactoe::TicTacToeState;
pub use wordguess::{GuessEntry, GuessTally, MAX_WRONG_GUESSES, WordGuessState};

use derive_getters::Getters;
use derive_new::new;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Supported game types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GameType {
    /// 3x3 tic-tac-toe.
    TicTacToe,
    /// Paired-card memory match.
    Memory,
    /// Shared-budget word guessing.
    WordGuess,
}

/// Seat of a participant within a session.
///
/// Seats are positional: `Player1` is always the inviter and moves first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Seat {
    /// First seat (inviter).
    Player1,
    /// Second seat (invitee).
    Player2,
}

impl Seat {
    /// Returns the opposite seat.
    pub fn other(self) -> Self {
        match self {
            Seat::Player1 => Seat::Player2,
            Seat::Player2 => Seat::Player1,
        }
    }

    /// Index into per-seat arrays (0 for player1, 1 for player2).
    pub fn index(self) -> usize {
        match self {
            Seat::Player1 => 0,
            Seat::Player2 => 1,
        }
    }
}

/// Outcome of a game as derived from its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Game continues.
    Ongoing,
    /// The given seat has won.
    Win(Seat),
    /// Neither seat won.
    Draw,
}

impl Outcome {
    /// Whether the outcome ends the game.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }
}

/// A move submitted by a participant, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameMove {
    /// Tic-tac-toe: claim a cell (0-8, row-major).
    Place {
        /// Target cell.
        cell: usize,
    },
    /// Memory: flip a card face up.
    Reveal {
        /// Card index into the deck.
        card: usize,
    },
    /// Word-guess: guess a single letter.
    Guess {
        /// The guessed letter (case-insensitive).
        letter: char,
    },
}

/// Error rejecting a proposed move. No side effects ever accompany one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// The game has already reached a terminal outcome.
    #[display("game is already over")]
    GameOver,

    /// The session has not been activated yet.
    #[display("game has not started")]
    NotStarted,

    /// Another seat holds the turn.
    #[display("it is not your turn")]
    NotYourTurn,

    /// Tic-tac-toe cell index outside 0-8.
    #[display("cell {_0} is out of range")]
    CellOutOfRange(usize),

    /// Tic-tac-toe cell already claimed.
    #[display("cell {_0} is already taken")]
    CellTaken(usize),

    /// Memory card index outside the deck.
    #[display("card {_0} is out of range")]
    CardOutOfRange(usize),

    /// Memory card already face up or matched.
    #[display("card {_0} is not available")]
    CardUnavailable(usize),

    /// A mismatched pair is still face up awaiting its hide.
    #[display("a mismatched pair is still being shown")]
    HidePending,

    /// Word-guess input was not a single ASCII letter.
    #[display("'{_0}' is not a letter")]
    NotALetter(char),

    /// Letter was guessed earlier in this game.
    #[display("letter '{_0}' was already guessed")]
    LetterRepeated(char),

    /// The move kind does not belong to this game type.
    #[display("move does not apply to this game")]
    WrongMoveKind,
}

impl std::error::Error for MoveError {}

/// Follow-up action the coordinator must schedule after an accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    /// Hide the current mismatched memory pair after the reveal delay.
    HideMismatch,
}

/// Result of applying a validated move: the successor state plus
/// everything the session record needs to persist alongside it.
#[derive(Debug, Clone, Getters, new)]
pub struct AppliedMove {
    /// The next game state.
    state: GameState,
    /// Seat holding the turn after this move.
    next_turn: Seat,
    /// Outcome derived from the next state.
    outcome: Outcome,
    /// Deferred follow-up, if the variant requires one.
    deferred: Option<DeferredAction>,
}

/// Closed union of per-variant game states.
///
/// One variant per [`GameType`]; each carries its own board/progress
/// fields and per-player statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameState {
    /// Tic-tac-toe board.
    TicTacToe(TicTacToeState),
    /// Memory match deck.
    Memory(MemoryState),
    /// Word guessing progress.
    WordGuess(WordGuessState),
}

impl GameState {
    /// Returns the game type of this state.
    pub fn game_type(&self) -> GameType {
        match self {
            GameState::TicTacToe(_) => GameType::TicTacToe,
            GameState::Memory(_) => GameType::Memory,
            GameState::WordGuess(_) => GameType::WordGuess,
        }
    }

    /// Validates and applies a move for `seat`, given the current turn owner.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError`] if the game is over, the seat is out of turn,
    /// the move kind does not match the variant, or the variant rejects it.
    #[instrument(skip(self), fields(game = %self.game_type()))]
    pub fn apply(
        &self,
        mv: &GameMove,
        seat: Seat,
        to_move: Seat,
    ) -> Result<AppliedMove, MoveError> {
        if self.outcome().is_terminal() {
            return Err(MoveError::GameOver);
        }
        if seat != to_move {
            return Err(MoveError::NotYourTurn);
        }
        match (self, mv) {
            (GameState::TicTacToe(state), GameMove::Place { cell }) => state.apply(*cell, seat),
            (GameState::Memory(state), GameMove::Reveal { card }) => state.apply(*card, seat),
            (GameState::WordGuess(state), GameMove::Guess { letter }) => {
                state.apply(*letter, seat)
            }
            _ => Err(MoveError::WrongMoveKind),
        }
    }

    /// Derives the outcome from the current state.
    pub fn outcome(&self) -> Outcome {
        match self {
            GameState::TicTacToe(state) => state.outcome(),
            GameState::Memory(state) => state.outcome(),
            GameState::WordGuess(state) => state.outcome(),
        }
    }

    /// Resolves a pending deferred action, if one is outstanding.
    ///
    /// Returns the successor state and the seat holding the turn afterwards.
    /// `None` when nothing is pending (the timer lost its race).
    pub fn resolve_deferred(&self, to_move: Seat) -> Option<(GameState, Seat)> {
        match self {
            GameState::Memory(state) => state
                .resolve_mismatch(to_move)
                .map(|(next, turn)| (GameState::Memory(next), turn)),
            _ => None,
        }
    }
}

/// Supplies freshly dealt initial states.
///
/// The default implementation shuffles decks and picks hidden words with
/// [`rand`]; tests inject deterministic setups instead.
pub trait GameSetup: Send + Sync {
    /// Deals the initial state for a new session of `game_type`.
    fn deal(&self, game_type: GameType) -> GameState;
}

/// Built-in word pool for word-guess sessions.
const WORDS: &[&str] = &[
    "GAMING", "PUZZLE", "MEMORY", "LETTER", "COUPLE", "BRIDGE", "PLANET", "GARDEN", "SILVER",
    "WINDOW", "CASTLE", "ORANGE", "GUITAR", "ROCKET", "ISLAND", "SHADOW",
];

/// Standard dealer backed by [`rand::thread_rng`].
#[derive(Debug, Clone)]
pub struct StandardSetup {
    memory_pairs: usize,
}

impl StandardSetup {
    /// Creates a dealer producing memory decks of `memory_pairs` pairs.
    #[instrument]
    pub fn new(memory_pairs: usize) -> Self {
        Self { memory_pairs }
    }
}

impl GameSetup for StandardSetup {
    #[instrument(skip(self))]
    fn deal(&self, game_type: GameType) -> GameState {
        let mut rng = rand::thread_rng();
        match game_type {
            GameType::TicTacToe => GameState::TicTacToe(TicTacToeState::new()),
            GameType::Memory => {
                let mut values: Vec<u8> = (0..self.memory_pairs as u8)
                    .flat_map(|v| [v, v])
                    .collect();
                values.shuffle(&mut rng);
                GameState::Memory(MemoryState::new(values))
            }
            GameType::WordGuess => {
                let word = WORDS
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or("GAMING");
                GameState::WordGuess(WordGuessState::new(word))
            }
        }
    }
}
