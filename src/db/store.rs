//! SQLite store for invites, sessions, and reward records.
//!
//! Sessions carry a `revision` column; every mutation of a live session
//! goes through [`GameStore::cas_update_session`], which only writes when
//! the stored revision matches what the writer read. The file lock never
//! substitutes for that predicate.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument, warn};

use crate::db::models::{InviteRow, RewardRow, SessionRow};
use crate::db::{DbError, schema};
use crate::invites::InviteRecord;
use crate::rewards::RewardRecord;
use crate::session::{LifecycleStatus, SessionRecord};

/// Embedded schema migrations, applied at boot and in tests.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Store handle. Cheap to clone; each operation opens its own connection.
#[derive(Debug, Clone)]
pub struct GameStore {
    db_path: String,
}

impl GameStore {
    /// Creates a store for the database at `db_path`.
    ///
    /// Use `":memory:"` only for single-connection experiments; tests use
    /// a temp file so every operation sees the same database.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Self {
        info!(path = %db_path, "Creating GameStore");
        Self { db_path }
    }

    /// Applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migration failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Establishes a connection with WAL mode and a busy timeout so two
    /// writers interleave instead of erroring out.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)?;
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| DbError::new(format!("Pragma setup failed: {}", e)))?;
        Ok(conn)
    }

    // ── Invites ──────────────────────────────────────────────────────

    /// Inserts a freshly created invite.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self, record), fields(invite_id = %record.id))]
    pub fn insert_invite(&self, record: &InviteRecord) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        diesel::insert_into(schema::invites::table)
            .values(InviteRow::from_record(record))
            .execute(&mut conn)?;
        info!(invite_id = %record.id, invitee = %record.invitee_id, "Invite stored");
        Ok(())
    }

    /// Loads an invite by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn get_invite(&self, id: &str) -> Result<Option<InviteRecord>, DbError> {
        let mut conn = self.connection()?;
        schema::invites::table
            .find(id)
            .first::<InviteRow>(&mut conn)
            .optional()?
            .map(InviteRow::into_record)
            .transpose()
    }

    /// Finds a `waiting` invite between two users, in either direction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn open_invite_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<InviteRecord>, DbError> {
        use schema::invites::dsl;
        let mut conn = self.connection()?;
        let waiting = LifecycleStatus::Waiting.to_string();
        dsl::invites
            .filter(dsl::status.eq(&waiting))
            .filter(
                dsl::inviter_id
                    .eq(a)
                    .and(dsl::invitee_id.eq(b))
                    .or(dsl::inviter_id.eq(b).and(dsl::invitee_id.eq(a))),
            )
            .first::<InviteRow>(&mut conn)
            .optional()?
            .map(InviteRow::into_record)
            .transpose()
    }

    /// Lists `waiting` invites involving a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn open_invites_for(&self, user: &str) -> Result<Vec<InviteRecord>, DbError> {
        use schema::invites::dsl;
        let mut conn = self.connection()?;
        let waiting = LifecycleStatus::Waiting.to_string();
        let rows = dsl::invites
            .filter(dsl::status.eq(&waiting))
            .filter(dsl::inviter_id.eq(user).or(dsl::invitee_id.eq(user)))
            .order(dsl::created_at.desc())
            .load::<InviteRow>(&mut conn)?;
        rows.into_iter().map(InviteRow::into_record).collect()
    }

    /// Moves a `waiting` invite to a terminal status, stamping when it was
    /// resolved. Returns `false` when the invite was no longer waiting
    /// (someone else resolved it first).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self))]
    pub fn close_invite(
        &self,
        id: &str,
        status: LifecycleStatus,
        now: chrono::NaiveDateTime,
    ) -> Result<bool, DbError> {
        use schema::invites::dsl;
        let mut conn = self.connection()?;
        let updated = diesel::update(
            dsl::invites
                .find(id)
                .filter(dsl::status.eq(LifecycleStatus::Waiting.to_string())),
        )
        .set((
            dsl::status.eq(status.to_string()),
            dsl::resolved_at.eq(Some(now)),
        ))
        .execute(&mut conn)?;
        debug!(invite_id = %id, new_status = %status, accepted = updated == 1, "Invite close attempted");
        Ok(updated == 1)
    }

    /// Accepts an invite and creates its session as one transaction.
    ///
    /// The invite moves `waiting → active` with `session_id` set, and the
    /// session row is inserted; both happen or neither does. Returns
    /// `false` when the invite lost the race and was no longer waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self, session), fields(invite_id = %invite_id, session_id = %session.id))]
    pub fn accept_invite_txn(
        &self,
        invite_id: &str,
        session: &SessionRecord,
    ) -> Result<bool, DbError> {
        use schema::invites::dsl;
        let mut conn = self.connection()?;
        let row = SessionRow::from_record(session)?;

        let accepted = conn.transaction::<bool, diesel::result::Error, _>(|conn| {
            let updated = diesel::update(
                dsl::invites
                    .find(invite_id)
                    .filter(dsl::status.eq(LifecycleStatus::Waiting.to_string())),
            )
            .set((
                dsl::status.eq(LifecycleStatus::Active.to_string()),
                dsl::session_id.eq(Some(session.id.as_str())),
                dsl::resolved_at.eq(Some(session.created_at)),
            ))
            .execute(conn)?;

            if updated != 1 {
                return Ok(false);
            }

            diesel::insert_into(schema::sessions::table)
                .values(&row)
                .execute(conn)?;
            Ok(true)
        })?;

        if accepted {
            info!(invite_id = %invite_id, session_id = %session.id, "Invite accepted, session created");
        } else {
            warn!(invite_id = %invite_id, "Invite was no longer waiting");
        }
        Ok(accepted)
    }

    /// Lists `waiting` invites whose expiry has passed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn expired_open_invites(
        &self,
        now: chrono::NaiveDateTime,
    ) -> Result<Vec<InviteRecord>, DbError> {
        use schema::invites::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::invites
            .filter(dsl::status.eq(LifecycleStatus::Waiting.to_string()))
            .filter(dsl::expires_at.le(now))
            .load::<InviteRow>(&mut conn)?;
        rows.into_iter().map(InviteRow::into_record).collect()
    }

    /// Lists `cancelled` invites resolved before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn cancelled_invites_before(
        &self,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<Vec<InviteRecord>, DbError> {
        use schema::invites::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::invites
            .filter(dsl::status.eq(LifecycleStatus::Cancelled.to_string()))
            .filter(dsl::resolved_at.le(Some(cutoff)))
            .load::<InviteRow>(&mut conn)?;
        rows.into_iter().map(InviteRow::into_record).collect()
    }

    /// Finds the resolved invite pointing at a session, if it still exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn invite_for_session(&self, session_id: &str) -> Result<Option<InviteRecord>, DbError> {
        use schema::invites::dsl;
        let mut conn = self.connection()?;
        dsl::invites
            .filter(dsl::session_id.eq(Some(session_id)))
            .first::<InviteRow>(&mut conn)
            .optional()?
            .map(InviteRow::into_record)
            .transpose()
    }

    /// Deletes an invite row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self))]
    pub fn delete_invite(&self, id: &str) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        diesel::delete(schema::invites::table.find(id)).execute(&mut conn)?;
        debug!(invite_id = %id, "Invite deleted");
        Ok(())
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Loads a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, DbError> {
        let mut conn = self.connection()?;
        schema::sessions::table
            .find(id)
            .first::<SessionRow>(&mut conn)
            .optional()?
            .map(SessionRow::into_record)
            .transpose()
    }

    /// Compare-and-swap write of a session.
    ///
    /// Writes every mutable column from `record` (whose `revision` must be
    /// the successor value) but only where the stored revision still equals
    /// `expected`. Returns `false` when the write lost the race; the caller
    /// re-reads and re-validates.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self, record), fields(session_id = %record.id, expected))]
    pub fn cas_update_session(
        &self,
        record: &SessionRecord,
        expected: i64,
    ) -> Result<bool, DbError> {
        use schema::sessions::dsl;
        let mut conn = self.connection()?;
        let row = SessionRow::from_record(record)?;

        let updated = diesel::update(
            dsl::sessions
                .find(&record.id)
                .filter(dsl::revision.eq(expected)),
        )
        .set((
            dsl::status.eq(row.status().clone()),
            dsl::current_player.eq(row.current_player().clone()),
            dsl::state.eq(row.state().clone()),
            dsl::winner.eq(row.winner().clone()),
            dsl::revision.eq(*row.revision()),
            dsl::player1_seen_at.eq(*row.player1_seen_at()),
            dsl::player2_seen_at.eq(*row.player2_seen_at()),
            dsl::completed_at.eq(*row.completed_at()),
        ))
        .execute(&mut conn)?;

        if updated == 1 {
            debug!(session_id = %record.id, revision = record.revision, "Session write accepted");
        } else {
            debug!(session_id = %record.id, expected, "Session write rejected (revision moved)");
        }
        Ok(updated == 1)
    }

    /// Lists sessions involving a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn sessions_for(&self, user: &str) -> Result<Vec<SessionRecord>, DbError> {
        use schema::sessions::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::sessions
            .filter(dsl::player1_id.eq(user).or(dsl::player2_id.eq(user)))
            .order(dsl::created_at.desc())
            .load::<SessionRow>(&mut conn)?;
        rows.into_iter().map(SessionRow::into_record).collect()
    }

    /// Lists non-terminal sessions created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn stale_pending_sessions(
        &self,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<Vec<SessionRecord>, DbError> {
        use schema::sessions::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::sessions
            .filter(
                dsl::status
                    .eq(LifecycleStatus::Waiting.to_string())
                    .or(dsl::status.eq(LifecycleStatus::Active.to_string())),
            )
            .filter(dsl::created_at.lt(cutoff))
            .load::<SessionRow>(&mut conn)?;
        rows.into_iter().map(SessionRow::into_record).collect()
    }

    /// Lists terminal sessions whose terminal timestamp is before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn terminal_sessions_before(
        &self,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<Vec<SessionRecord>, DbError> {
        use schema::sessions::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::sessions
            .filter(
                dsl::status
                    .eq(LifecycleStatus::Completed.to_string())
                    .or(dsl::status.eq(LifecycleStatus::Cancelled.to_string())),
            )
            .filter(dsl::completed_at.le(Some(cutoff)))
            .load::<SessionRow>(&mut conn)?;
        rows.into_iter().map(SessionRow::into_record).collect()
    }

    /// Force-cancels a non-terminal session, bumping its revision so any
    /// in-flight conditional write loses. Returns `false` if the session
    /// was already terminal or gone.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self))]
    pub fn force_cancel_session(
        &self,
        id: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<bool, DbError> {
        use schema::sessions::dsl;
        let mut conn = self.connection()?;
        let updated = diesel::update(
            dsl::sessions.find(id).filter(
                dsl::status
                    .eq(LifecycleStatus::Waiting.to_string())
                    .or(dsl::status.eq(LifecycleStatus::Active.to_string())),
            ),
        )
        .set((
            dsl::status.eq(LifecycleStatus::Cancelled.to_string()),
            dsl::completed_at.eq(Some(now)),
            dsl::revision.eq(dsl::revision + 1),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    /// Deletes a session row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self))]
    pub fn delete_session(&self, id: &str) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        diesel::delete(schema::sessions::table.find(id)).execute(&mut conn)?;
        debug!(session_id = %id, "Session deleted");
        Ok(())
    }

    // ── Rewards ──────────────────────────────────────────────────────

    /// Appends reward records for a session, unless any already exist.
    ///
    /// The existence check and the inserts share a transaction, so a
    /// duplicated grant attempt appends nothing. Returns `false` when
    /// records were already present.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure.
    #[instrument(skip(self, records), fields(session_id = %session_id, count = records.len()))]
    pub fn insert_rewards_once(
        &self,
        session_id: &str,
        records: &[RewardRecord],
    ) -> Result<bool, DbError> {
        use schema::reward_records::dsl;
        let mut conn = self.connection()?;
        let rows: Vec<RewardRow> = records.iter().map(RewardRow::from_record).collect();

        let inserted = conn.transaction::<bool, diesel::result::Error, _>(|conn| {
            let existing: i64 = dsl::reward_records
                .filter(dsl::session_id.eq(session_id))
                .count()
                .get_result(conn)?;
            if existing > 0 {
                return Ok(false);
            }
            diesel::insert_into(schema::reward_records::table)
                .values(&rows)
                .execute(conn)?;
            Ok(true)
        })?;

        if inserted {
            info!(session_id = %session_id, count = records.len(), "Rewards granted");
        } else {
            warn!(session_id = %session_id, "Rewards already granted, skipping");
        }
        Ok(inserted)
    }

    /// Lists reward records for a session.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn rewards_for_session(&self, session_id: &str) -> Result<Vec<RewardRecord>, DbError> {
        use schema::reward_records::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::reward_records
            .filter(dsl::session_id.eq(session_id))
            .load::<RewardRow>(&mut conn)?;
        rows.into_iter().map(RewardRow::into_record).collect()
    }

    /// Lists reward records for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on a database failure or corrupt row.
    #[instrument(skip(self))]
    pub fn rewards_for_user(&self, user: &str) -> Result<Vec<RewardRecord>, DbError> {
        use schema::reward_records::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::reward_records
            .filter(dsl::user_id.eq(user))
            .order(dsl::granted_at.desc())
            .load::<RewardRow>(&mut conn)?;
        rows.into_iter().map(RewardRow::into_record).collect()
    }
}
