//! Session records: the shared document both participants mutate.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::games::{GameState, GameType, Outcome, Seat};

/// Unique identifier for a user (issued by the account directory).
pub type UserId = String;

/// Unique identifier for a game session.
pub type SessionId = String;

/// Unique identifier for an invite.
pub type InviteId = String;

/// Lifecycle status shared by invites and sessions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleStatus {
    /// Created, not yet active.
    Waiting,
    /// Live and accepting mutations.
    Active,
    /// Reached a terminal outcome.
    Completed,
    /// Abandoned, declined, or reclaimed.
    Cancelled,
}

impl LifecycleStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleStatus::Completed | LifecycleStatus::Cancelled)
    }
}

/// Final result of a completed session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Winner {
    /// Player 1 won.
    Player1,
    /// Player 2 won.
    Player2,
    /// Neither player won.
    Draw,
}

impl Winner {
    /// Converts a terminal [`Outcome`] into a winner. `None` while ongoing.
    pub fn from_outcome(outcome: Outcome) -> Option<Self> {
        match outcome {
            Outcome::Ongoing => None,
            Outcome::Win(Seat::Player1) => Some(Winner::Player1),
            Outcome::Win(Seat::Player2) => Some(Winner::Player2),
            Outcome::Draw => Some(Winner::Draw),
        }
    }

    /// The seat that won, if any.
    pub fn seat(&self) -> Option<Seat> {
        match self {
            Winner::Player1 => Some(Seat::Player1),
            Winner::Player2 => Some(Seat::Player2),
            Winner::Draw => None,
        }
    }
}

/// The live, shared record of one game instance.
///
/// Every accepted mutation bumps `revision` by one; writers must present
/// the revision they read for their write to be accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session ID (UUID v4 string).
    pub id: SessionId,
    /// Which game is being played.
    pub game_type: GameType,
    /// Seat 1 participant (the inviter).
    pub player1_id: UserId,
    /// Seat 2 participant (the invitee).
    pub player2_id: UserId,
    /// Lifecycle status.
    pub status: LifecycleStatus,
    /// Seat holding the turn while active.
    pub current_player: Seat,
    /// Variant state; dealt on activation, `None` while waiting.
    pub state: Option<GameState>,
    /// Final result once completed.
    pub winner: Option<Winner>,
    /// Optimistic-concurrency revision, strictly increasing.
    pub revision: i64,
    /// When player 1 last opened the session.
    pub player1_seen_at: Option<NaiveDateTime>,
    /// When player 2 last opened the session.
    pub player2_seen_at: Option<NaiveDateTime>,
    /// Creation time.
    pub created_at: NaiveDateTime,
    /// Terminal timestamp (set for completed and cancelled sessions).
    pub completed_at: Option<NaiveDateTime>,
}

impl SessionRecord {
    /// Creates a fresh waiting session between two players.
    #[instrument(skip_all, fields(game_type = %game_type, player1 = %player1_id, player2 = %player2_id))]
    pub fn create(
        game_type: GameType,
        player1_id: UserId,
        player2_id: UserId,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            game_type,
            player1_id,
            player2_id,
            status: LifecycleStatus::Waiting,
            current_player: Seat::Player1,
            state: None,
            winner: None,
            revision: 0,
            player1_seen_at: None,
            player2_seen_at: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// The seat occupied by `user`, if they participate in this session.
    pub fn seat_of(&self, user: &str) -> Option<Seat> {
        if self.player1_id == user {
            Some(Seat::Player1)
        } else if self.player2_id == user {
            Some(Seat::Player2)
        } else {
            None
        }
    }

    /// The user occupying `seat`.
    pub fn participant(&self, seat: Seat) -> &UserId {
        match seat {
            Seat::Player1 => &self.player1_id,
            Seat::Player2 => &self.player2_id,
        }
    }

    /// Whether the session has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stamps a seat's presence timestamp.
    pub fn touch_presence(&mut self, seat: Seat, now: NaiveDateTime) {
        match seat {
            Seat::Player1 => self.player1_seen_at = Some(now),
            Seat::Player2 => self.player2_seen_at = Some(now),
        }
    }

    /// Whether both participants have opened the session at least once.
    pub fn both_seen(&self) -> bool {
        self.player1_seen_at.is_some() && self.player2_seen_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> SessionRecord {
        SessionRecord::create(
            GameType::TicTacToe,
            "u1".to_string(),
            "u2".to_string(),
            Utc::now().naive_utc(),
        )
    }

    #[test]
    fn new_sessions_wait_with_player1_to_move() {
        let rec = record();
        assert_eq!(rec.status, LifecycleStatus::Waiting);
        assert_eq!(rec.current_player, Seat::Player1);
        assert_eq!(rec.revision, 0);
        assert!(rec.state.is_none());
    }

    #[test]
    fn seat_lookup_covers_both_players_only() {
        let rec = record();
        assert_eq!(rec.seat_of("u1"), Some(Seat::Player1));
        assert_eq!(rec.seat_of("u2"), Some(Seat::Player2));
        assert_eq!(rec.seat_of("stranger"), None);
    }

    #[test]
    fn presence_tracks_both_seats() {
        let mut rec = record();
        assert!(!rec.both_seen());
        let now = Utc::now().naive_utc();
        rec.touch_presence(Seat::Player2, now);
        assert!(!rec.both_seen());
        rec.touch_presence(Seat::Player1, now);
        assert!(rec.both_seen());
    }

    #[test]
    fn winner_from_outcome_maps_terminals() {
        use crate::games::Outcome;
        assert_eq!(Winner::from_outcome(Outcome::Ongoing), None);
        assert_eq!(
            Winner::from_outcome(Outcome::Win(Seat::Player1)),
            Some(Winner::Player1)
        );
        assert_eq!(Winner::from_outcome(Outcome::Draw), Some(Winner::Draw));
    }
}
