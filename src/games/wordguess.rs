//! Word-guess variant: a hidden word and a shared wrong-guess budget.
//!
//! A correct guess keeps the turn; a wrong one passes it. When the budget
//! runs out, the seat that did *not* exhaust it wins.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use super::{AppliedMove, GameState, MoveError, Outcome, Seat};

/// Wrong guesses allowed across both seats before the game ends.
pub const MAX_WRONG_GUESSES: u32 = 6;

/// One recorded guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct GuessEntry {
    /// Uppercase guessed letter.
    letter: char,
    /// Seat that guessed.
    seat: Seat,
    /// Whether the letter occurs in the word.
    correct: bool,
}

/// Per-seat guess statistics, derived from the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct GuessTally {
    /// Letters guessed by this seat.
    moves: u32,
    /// Correct guesses by this seat.
    hits: u32,
}

/// Word-guess progress: the hidden word and the full guess history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordGuessState {
    /// The hidden word, uppercase A-Z.
    word: String,
    guesses: Vec<GuessEntry>,
}

impl WordGuessState {
    /// Creates a new game around `word` (stored uppercase).
    pub fn new(word: &str) -> Self {
        Self {
            word: word.to_ascii_uppercase(),
            guesses: Vec::new(),
        }
    }

    /// The guess history, oldest first.
    pub fn guesses(&self) -> &[GuessEntry] {
        &self.guesses
    }

    /// Count of wrong guesses so far (shared across both seats).
    pub fn wrong_guesses(&self) -> u32 {
        self.guesses.iter().filter(|g| !g.correct).count() as u32
    }

    /// Guess statistics for a seat.
    pub fn tally(&self, seat: Seat) -> GuessTally {
        let mine = self.guesses.iter().filter(|g| g.seat == seat);
        GuessTally {
            moves: mine.clone().count() as u32,
            hits: mine.filter(|g| g.correct).count() as u32,
        }
    }

    fn is_guessed(&self, letter: char) -> bool {
        self.guesses.iter().any(|g| g.letter == letter)
    }

    fn is_revealed(&self, letter: char) -> bool {
        self.guesses.iter().any(|g| g.correct && g.letter == letter)
    }

    /// The word with unguessed letters masked as '_'.
    pub fn revealed_word(&self) -> String {
        self.word
            .chars()
            .map(|c| if self.is_revealed(c) { c } else { '_' })
            .collect()
    }

    fn fully_revealed(&self) -> bool {
        self.word.chars().all(|c| self.is_revealed(c))
    }

    pub(super) fn apply(&self, letter: char, seat: Seat) -> Result<AppliedMove, MoveError> {
        if !letter.is_ascii_alphabetic() {
            return Err(MoveError::NotALetter(letter));
        }
        let letter = letter.to_ascii_uppercase();
        if self.is_guessed(letter) {
            return Err(MoveError::LetterRepeated(letter));
        }

        let correct = self.word.contains(letter);
        let mut next = self.clone();
        next.guesses.push(GuessEntry {
            letter,
            seat,
            correct,
        });

        // Correct guesses keep the turn; wrong ones pass it.
        let next_turn = if correct { seat } else { seat.other() };
        let outcome = next.outcome();
        Ok(AppliedMove::new(
            GameState::WordGuess(next),
            next_turn,
            outcome,
            None,
        ))
    }

    /// Terminal when the word is fully revealed (last correct guesser wins)
    /// or the wrong-guess budget is spent (the other seat wins).
    pub fn outcome(&self) -> Outcome {
        if self.fully_revealed() {
            if let Some(last_hit) = self.guesses.iter().rev().find(|g| g.correct) {
                return Outcome::Win(last_hit.seat);
            }
        }
        if self.wrong_guesses() >= MAX_WRONG_GUESSES {
            if let Some(last) = self.guesses.last() {
                return Outcome::Win(last.seat.other());
            }
        }
        Outcome::Ongoing
    }
}
