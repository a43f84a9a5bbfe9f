//! Reward ledger: one-time credit grants per completed session.
//!
//! Grants are gated twice: the caller must have won the session's
//! `Active → Completed` conditional write, and the ledger itself refuses
//! to append when records for the session already exist.

use chrono::NaiveDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{DbError, GameStore};
use crate::games::{GameType, Seat};
use crate::session::{SessionId, SessionRecord, UserId, Winner};

/// Why a grant was made.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RewardReason {
    /// Won the game.
    Win,
    /// Game ended in a draw.
    Draw,
    /// Played and lost.
    Participation,
}

/// Append-only audit record of one credit grant.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RewardRecord {
    /// Record ID (UUID v4 string).
    pub id: String,
    /// Recipient.
    pub user_id: UserId,
    /// Credits granted.
    pub amount: i32,
    /// Grant tier.
    pub reason: RewardReason,
    /// The completed session this grant belongs to.
    pub session_id: SessionId,
    /// When the grant was made.
    pub granted_at: NaiveDateTime,
}

/// Fixed per-variant credit schedule.
#[derive(Debug, Clone, Copy)]
pub struct RewardSchedule {
    /// Credits for the winner.
    pub win: i32,
    /// Credits for each player in a draw.
    pub draw: i32,
    /// Credits for the loser.
    pub participation: i32,
}

impl RewardSchedule {
    /// The schedule for a game type.
    pub fn for_game(game_type: GameType) -> Self {
        match game_type {
            GameType::TicTacToe => Self {
                win: 50,
                draw: 20,
                participation: 10,
            },
            GameType::Memory => Self {
                win: 40,
                draw: 25,
                participation: 15,
            },
            GameType::WordGuess => Self {
                win: 60,
                draw: 25,
                participation: 10,
            },
        }
    }
}

/// Ledger over the backing store.
#[derive(Debug, Clone)]
pub struct RewardLedger {
    store: GameStore,
}

impl RewardLedger {
    /// Creates a ledger over `store`.
    pub fn new(store: GameStore) -> Self {
        Self { store }
    }

    /// Grants rewards for a completed session, exactly once.
    ///
    /// Returns the freshly appended records, or an empty vector when the
    /// session was already granted (duplicate completion observation).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn grant(
        &self,
        session: &SessionRecord,
        now: NaiveDateTime,
    ) -> Result<Vec<RewardRecord>, DbError> {
        let Some(winner) = session.winner else {
            return Err(DbError::new(format!(
                "Session '{}' has no winner to grant for",
                session.id
            )));
        };

        let schedule = RewardSchedule::for_game(session.game_type);
        let records: Vec<RewardRecord> = [Seat::Player1, Seat::Player2]
            .into_iter()
            .map(|seat| {
                let (amount, reason) = match winner {
                    Winner::Draw => (schedule.draw, RewardReason::Draw),
                    w if w.seat() == Some(seat) => (schedule.win, RewardReason::Win),
                    _ => (schedule.participation, RewardReason::Participation),
                };
                RewardRecord {
                    id: Uuid::new_v4().to_string(),
                    user_id: session.participant(seat).clone(),
                    amount,
                    reason,
                    session_id: session.id.clone(),
                    granted_at: now,
                }
            })
            .collect();

        if self.store.insert_rewards_once(&session.id, &records)? {
            info!(
                session_id = %session.id,
                winner = %winner,
                "Rewards granted to both participants"
            );
            Ok(records)
        } else {
            Ok(Vec::new())
        }
    }

    /// Reward history for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self))]
    pub fn rewards_for(&self, user: &str) -> Result<Vec<RewardRecord>, DbError> {
        self.store.rewards_for_user(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_matches_per_variant_amounts() {
        let ttt = RewardSchedule::for_game(GameType::TicTacToe);
        assert_eq!((ttt.win, ttt.draw, ttt.participation), (50, 20, 10));
        let mem = RewardSchedule::for_game(GameType::Memory);
        assert_eq!((mem.win, mem.draw, mem.participation), (40, 25, 15));
        let wg = RewardSchedule::for_game(GameType::WordGuess);
        assert_eq!((wg.win, wg.draw, wg.participation), (60, 25, 10));
    }

    #[test]
    fn reason_round_trips_through_strings() {
        use std::str::FromStr;
        for reason in [
            RewardReason::Win,
            RewardReason::Draw,
            RewardReason::Participation,
        ] {
            assert_eq!(
                RewardReason::from_str(&reason.to_string()).unwrap(),
                reason
            );
        }
    }
}
