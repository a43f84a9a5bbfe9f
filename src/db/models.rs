//! Database row models and conversions to domain records.
//!
//! Rows store enums as strings and the game state as JSON; conversions
//! surface corruption as [`DbError`] rather than panicking.

use std::str::FromStr;

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;

use crate::db::{DbError, schema};
use crate::games::{GameState, GameType, Seat};
use crate::invites::InviteRecord;
use crate::rewards::{RewardReason, RewardRecord};
use crate::session::{LifecycleStatus, SessionRecord, Winner};

/// Invite database row.
#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Selectable, Getters, new)]
#[diesel(table_name = schema::invites)]
pub struct InviteRow {
    id: String,
    game_type: String,
    inviter_id: String,
    invitee_id: String,
    status: String,
    created_at: NaiveDateTime,
    expires_at: NaiveDateTime,
    session_id: Option<String>,
    resolved_at: Option<NaiveDateTime>,
}

impl InviteRow {
    /// Converts a domain record into a row.
    pub fn from_record(record: &InviteRecord) -> Self {
        Self {
            id: record.id.clone(),
            game_type: record.game_type.to_string(),
            inviter_id: record.inviter_id.clone(),
            invitee_id: record.invitee_id.clone(),
            status: record.status.to_string(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            session_id: record.session_id.clone(),
            resolved_at: record.resolved_at,
        }
    }

    /// Parses the row back into a domain record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a stored enum value does not parse.
    pub fn into_record(self) -> Result<InviteRecord, DbError> {
        Ok(InviteRecord {
            id: self.id,
            game_type: GameType::from_str(&self.game_type)?,
            inviter_id: self.inviter_id,
            invitee_id: self.invitee_id,
            status: LifecycleStatus::from_str(&self.status)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
            session_id: self.session_id,
            resolved_at: self.resolved_at,
        })
    }
}

/// Session database row.
#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Selectable, Getters, new)]
#[diesel(table_name = schema::sessions)]
pub struct SessionRow {
    id: String,
    game_type: String,
    player1_id: String,
    player2_id: String,
    status: String,
    current_player: String,
    state: Option<String>,
    winner: Option<String>,
    revision: i64,
    player1_seen_at: Option<NaiveDateTime>,
    player2_seen_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    completed_at: Option<NaiveDateTime>,
}

impl SessionRow {
    /// Converts a domain record into a row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the game state fails to serialize.
    pub fn from_record(record: &SessionRecord) -> Result<Self, DbError> {
        let state = record
            .state
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(Self {
            id: record.id.clone(),
            game_type: record.game_type.to_string(),
            player1_id: record.player1_id.clone(),
            player2_id: record.player2_id.clone(),
            status: record.status.to_string(),
            current_player: record.current_player.to_string(),
            state,
            winner: record.winner.map(|w| w.to_string()),
            revision: record.revision,
            player1_seen_at: record.player1_seen_at,
            player2_seen_at: record.player2_seen_at,
            created_at: record.created_at,
            completed_at: record.completed_at,
        })
    }

    /// Parses the row back into a domain record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a stored enum or the state JSON is corrupt.
    pub fn into_record(self) -> Result<SessionRecord, DbError> {
        let state: Option<GameState> = self
            .state
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(SessionRecord {
            id: self.id,
            game_type: GameType::from_str(&self.game_type)?,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            status: LifecycleStatus::from_str(&self.status)?,
            current_player: Seat::from_str(&self.current_player)?,
            state,
            winner: self.winner.as_deref().map(Winner::from_str).transpose()?,
            revision: self.revision,
            player1_seen_at: self.player1_seen_at,
            player2_seen_at: self.player2_seen_at,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

/// Reward record database row. Append-only.
#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Selectable, Getters, new)]
#[diesel(table_name = schema::reward_records)]
pub struct RewardRow {
    id: String,
    user_id: String,
    amount: i32,
    reason: String,
    session_id: String,
    granted_at: NaiveDateTime,
}

impl RewardRow {
    /// Converts a domain record into a row.
    pub fn from_record(record: &RewardRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            amount: record.amount,
            reason: record.reason.to_string(),
            session_id: record.session_id.clone(),
            granted_at: record.granted_at,
        }
    }

    /// Parses the row back into a domain record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the stored reason does not parse.
    pub fn into_record(self) -> Result<RewardRecord, DbError> {
        Ok(RewardRecord {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            reason: RewardReason::from_str(&self.reason)?,
            session_id: self.session_id,
            granted_at: self.granted_at,
        })
    }
}
