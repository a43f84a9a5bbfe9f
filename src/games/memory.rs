//! Memory-match variant: paired cards, two reveals per turn-cycle.
//!
//! A mismatch leaves both cards face up under a pending-hide marker; the
//! coordinator resolves it after the reveal delay with
//! [`MemoryState::resolve_mismatch`], which is when the turn passes.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use super::{AppliedMove, DeferredAction, GameState, MoveError, Outcome, Seat};

/// A single card in the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct MemoryCard {
    /// Pair value; two cards share each value.
    value: u8,
    /// Permanently matched, never hidden again.
    matched: bool,
}

/// Per-seat reveal statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct MatchTally {
    /// Cards revealed by this seat.
    moves: u32,
    /// Pairs matched by this seat.
    matches: u32,
}

/// Memory-match deck and turn-cycle progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    cards: Vec<MemoryCard>,
    /// First card of the current turn-cycle, face up awaiting a second reveal.
    face_up: Option<usize>,
    /// Mismatched pair still shown, awaiting the deferred hide.
    pending_hide: Option<(usize, usize)>,
    /// Tallies indexed by [`Seat::index`].
    tallies: [MatchTally; 2],
}

impl MemoryState {
    /// Creates a deck from pre-shuffled pair values.
    pub fn new(values: Vec<u8>) -> Self {
        Self {
            cards: values
                .into_iter()
                .map(|value| MemoryCard {
                    value,
                    matched: false,
                })
                .collect(),
            face_up: None,
            pending_hide: None,
            tallies: [MatchTally::default(); 2],
        }
    }

    /// Returns the deck.
    pub fn cards(&self) -> &[MemoryCard] {
        &self.cards
    }

    /// First card of the in-progress turn-cycle, if one is face up.
    pub fn face_up(&self) -> Option<usize> {
        self.face_up
    }

    /// The mismatched pair awaiting its hide, if any.
    pub fn pending_hide(&self) -> Option<(usize, usize)> {
        self.pending_hide
    }

    /// Reveal statistics for a seat.
    pub fn tally(&self, seat: Seat) -> &MatchTally {
        &self.tallies[seat.index()]
    }

    fn available(&self, card: usize) -> bool {
        !self.cards[card].matched && self.face_up != Some(card)
    }

    pub(super) fn apply(&self, card: usize, seat: Seat) -> Result<AppliedMove, MoveError> {
        if self.pending_hide.is_some() {
            return Err(MoveError::HidePending);
        }
        if card >= self.cards.len() {
            return Err(MoveError::CardOutOfRange(card));
        }
        if !self.available(card) {
            return Err(MoveError::CardUnavailable(card));
        }

        let mut next = self.clone();
        next.tallies[seat.index()].moves += 1;

        match self.face_up {
            None => {
                // First reveal of the cycle: show the card, same seat continues.
                next.face_up = Some(card);
                Ok(AppliedMove::new(
                    GameState::Memory(next),
                    seat,
                    Outcome::Ongoing,
                    None,
                ))
            }
            Some(first) if self.cards[first].value == self.cards[card].value => {
                // Match: both cards lock in and the seat keeps the turn.
                next.cards[first].matched = true;
                next.cards[card].matched = true;
                next.face_up = None;
                next.tallies[seat.index()].matches += 1;
                let outcome = next.outcome();
                Ok(AppliedMove::new(
                    GameState::Memory(next),
                    seat,
                    outcome,
                    None,
                ))
            }
            Some(first) => {
                // Mismatch: keep both shown until the deferred hide fires.
                next.face_up = None;
                next.pending_hide = Some((first, card));
                Ok(AppliedMove::new(
                    GameState::Memory(next),
                    seat,
                    Outcome::Ongoing,
                    Some(DeferredAction::HideMismatch),
                ))
            }
        }
    }

    /// Hides the pending mismatched pair and passes the turn.
    ///
    /// Returns `None` when no hide is pending.
    pub(super) fn resolve_mismatch(&self, to_move: Seat) -> Option<(MemoryState, Seat)> {
        self.pending_hide?;
        let mut next = self.clone();
        next.pending_hide = None;
        Some((next, to_move.other()))
    }

    /// Terminal once every card is matched; the seat with strictly more
    /// matches wins, equal tallies draw.
    pub fn outcome(&self) -> Outcome {
        if !self.cards.iter().all(|card| card.matched) {
            return Outcome::Ongoing;
        }
        let p1 = self.tallies[0].matches;
        let p2 = self.tallies[1].matches;
        if p1 > p2 {
            Outcome::Win(Seat::Player1)
        } else if p2 > p1 {
            Outcome::Win(Seat::Player2)
        } else {
            Outcome::Draw
        }
    }
}
