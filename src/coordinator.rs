//! Session state machine and the compare-and-swap write protocol.
//!
//! Each participant's client holds its own [`SessionCoordinator`] over the
//! shared store; there is no lock service and no leader. Every
//! read-validate-write sequence is keyed on the session revision, and the
//! writer that wins the `Active → Completed` write is the one that grants
//! rewards.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use dashmap::DashMap;
use derive_more::{Display, Error};
use futures::Stream;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::db::{DbError, GameStore};
use crate::events::{EventBus, SessionEvent};
use crate::games::{GameMove, GameSetup, MoveError, Seat};
use crate::invites::InviteError;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::rewards::RewardLedger;
use crate::session::{LifecycleStatus, SessionId, SessionRecord, Winner};

/// What kind of record could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    /// An invite record.
    Invite,
    /// A session record.
    Session,
}

/// Error taxonomy for the interactive path.
#[derive(Debug, Display, Error)]
pub enum CoordinatorError {
    /// Move rejected before any write; surfaced to the submitter, no retry.
    #[display("invalid move: {_0}")]
    Move(MoveError),

    /// Invite operation rejected; surfaced to the caller.
    #[display("invite rejected: {_0}")]
    Invite(InviteError),

    /// The record no longer exists (likely reclaimed). Terminal for the
    /// caller; the presentation layer offers only a return action.
    #[display("{_0} no longer exists")]
    NotFound(#[error(not(source))] ResourceKind),

    /// An optimistic write lost its race and the retried move was still
    /// conflicting.
    #[display("concurrent update conflict")]
    Conflict,

    /// Backing store failure.
    #[display("storage failure: {_0}")]
    Db(DbError),
}

impl From<MoveError> for CoordinatorError {
    fn from(err: MoveError) -> Self {
        Self::Move(err)
    }
}

impl From<InviteError> for CoordinatorError {
    fn from(err: InviteError) -> Self {
        Self::Invite(err)
    }
}

impl From<DbError> for CoordinatorError {
    fn from(err: DbError) -> Self {
        Self::Db(err)
    }
}

/// Coordinates one store's worth of game sessions.
///
/// Cheap to clone; clones share the timer registry, so any handle can
/// cancel the deferred transitions another scheduled.
#[derive(Clone)]
pub struct SessionCoordinator {
    store: GameStore,
    bus: EventBus,
    sink: Arc<dyn NotificationSink>,
    setup: Arc<dyn GameSetup>,
    ledger: RewardLedger,
    timers: Arc<DashMap<SessionId, JoinHandle<()>>>,
    hide_delay: Duration,
}

impl SessionCoordinator {
    /// Creates a coordinator over the given collaborators.
    pub fn new(
        store: GameStore,
        bus: EventBus,
        sink: Arc<dyn NotificationSink>,
        setup: Arc<dyn GameSetup>,
        hide_delay: Duration,
    ) -> Self {
        let ledger = RewardLedger::new(store.clone());
        Self {
            store,
            bus,
            sink,
            setup,
            ledger,
            timers: Arc::new(DashMap::new()),
            hide_delay,
        }
    }

    /// The reward ledger backing this coordinator.
    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    fn load(&self, session_id: &str) -> Result<SessionRecord, CoordinatorError> {
        self.store
            .get_session(session_id)?
            .ok_or(CoordinatorError::NotFound(ResourceKind::Session))
    }

    /// Loads a session for a participant.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] if the session is gone.
    #[instrument(skip(self))]
    pub fn get_session(&self, session_id: &str) -> Result<SessionRecord, CoordinatorError> {
        self.load(session_id)
    }

    /// Lists sessions involving a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Db`] on a store failure.
    #[instrument(skip(self))]
    pub fn sessions_for(&self, user: &str) -> Result<Vec<SessionRecord>, CoordinatorError> {
        Ok(self.store.sessions_for(user)?)
    }

    /// Subscribes to a session's change feed.
    pub fn watch_session(
        &self,
        session_id: &str,
    ) -> impl Stream<Item = SessionEvent> + Send + use<> {
        self.bus.watch_session(session_id)
    }

    /// Marks a participant's arrival, activating the session once both
    /// have arrived. Idempotent; doubles as the re-subscription path.
    ///
    /// The second arrival's conditional write deals the variant state and
    /// fixes `current_player` to player 1 (the inviter).
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] for missing sessions or
    /// non-participants, [`CoordinatorError::Conflict`] if the write kept
    /// losing races.
    #[instrument(skip(self), fields(session_id = %session_id, user = %user))]
    pub async fn open_session(
        &self,
        session_id: &str,
        user: &str,
    ) -> Result<SessionRecord, CoordinatorError> {
        let mut record = self.load(session_id)?;
        let seat = record
            .seat_of(user)
            .ok_or(CoordinatorError::NotFound(ResourceKind::Session))?;

        for _ in 0..2 {
            if record.is_terminal() {
                // Nothing to stamp; the final state is what they came for.
                return Ok(record);
            }

            let mut next = record.clone();
            next.touch_presence(seat, Self::now());
            if next.status == LifecycleStatus::Waiting && next.both_seen() {
                next.state = Some(self.setup.deal(next.game_type));
                next.current_player = Seat::Player1;
                next.status = LifecycleStatus::Active;
                info!(session_id = %next.id, game_type = %next.game_type, "Session activated");
            }
            next.revision = record.revision + 1;

            if self.store.cas_update_session(&next, record.revision)? {
                self.bus
                    .publish_session(&next.id, SessionEvent::Updated(next.clone()));
                return Ok(next);
            }
            record = self.load(session_id)?;
        }
        Err(CoordinatorError::Conflict)
    }

    /// Handles a participant leaving. Cancels the session while it is
    /// still `waiting`; once active, leaving has no protocol effect (the
    /// janitor reclaims a stalled session).
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] for missing sessions or
    /// non-participants.
    #[instrument(skip(self), fields(session_id = %session_id, user = %user))]
    pub async fn leave_session(
        &self,
        session_id: &str,
        user: &str,
    ) -> Result<(), CoordinatorError> {
        let mut record = self.load(session_id)?;
        record
            .seat_of(user)
            .ok_or(CoordinatorError::NotFound(ResourceKind::Session))?;

        for _ in 0..2 {
            if record.status != LifecycleStatus::Waiting {
                debug!(status = %record.status, "Leave has no effect outside waiting");
                return Ok(());
            }

            let mut next = record.clone();
            next.status = LifecycleStatus::Cancelled;
            next.completed_at = Some(Self::now());
            next.revision = record.revision + 1;

            if self.store.cas_update_session(&next, record.revision)? {
                info!(session_id = %next.id, "Waiting session cancelled by participant");
                let id = next.id.clone();
                self.bus.publish_session(&id, SessionEvent::Updated(next));
                return Ok(());
            }
            record = self.load(session_id)?;
        }
        Err(CoordinatorError::Conflict)
    }

    /// Validates and applies a move as one conditional write.
    ///
    /// A rejected optimistic write is recovered automatically: the state
    /// is re-read and the move re-validated, with at most one retry. The
    /// writer that wins a terminal write grants rewards and notifies both
    /// participants; no other observer of the completion does.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::Move`] for invalid moves (no side effects),
    /// [`CoordinatorError::Conflict`] when both write attempts lost,
    /// [`CoordinatorError::NotFound`] if the session vanished.
    #[instrument(skip(self, mv), fields(session_id = %session_id, user = %user))]
    pub async fn submit_move(
        &self,
        session_id: &str,
        user: &str,
        mv: GameMove,
    ) -> Result<SessionRecord, CoordinatorError> {
        let mut record = self.load(session_id)?;

        for attempt in 0..2 {
            let seat = record
                .seat_of(user)
                .ok_or(CoordinatorError::NotFound(ResourceKind::Session))?;

            match record.status {
                LifecycleStatus::Waiting => return Err(MoveError::NotStarted.into()),
                LifecycleStatus::Completed | LifecycleStatus::Cancelled => {
                    return Err(MoveError::GameOver.into());
                }
                LifecycleStatus::Active => {}
            }
            let state = record.state.as_ref().ok_or_else(|| {
                CoordinatorError::Db(DbError::new(format!(
                    "Active session '{}' has no game state",
                    record.id
                )))
            })?;

            // Local validation: failures have no side effects.
            let applied = state.apply(&mv, seat, record.current_player)?;

            let now = Self::now();
            let mut next = record.clone();
            next.state = Some(applied.state().clone());
            next.current_player = *applied.next_turn();
            next.revision = record.revision + 1;

            let terminal = applied.outcome().is_terminal();
            if terminal {
                next.status = LifecycleStatus::Completed;
                next.winner = Winner::from_outcome(*applied.outcome());
                next.completed_at = Some(now);
            }

            if self.store.cas_update_session(&next, record.revision)? {
                if terminal {
                    // We won the completing write: the grant happens here
                    // and nowhere else. A failed grant does not undo the
                    // completion; the janitor backfills it.
                    self.cancel_timer(&next.id);
                    if let Err(e) = self.ledger.grant(&next, now) {
                        warn!(session_id = %next.id, error = %e, "Reward grant failed, janitor will backfill");
                    }
                    self.notify_game_ended(&next).await;
                    info!(session_id = %next.id, winner = ?next.winner, "Session completed");
                } else {
                    if next.current_player != seat {
                        self.notify_turn(&next, user).await;
                    }
                    if applied.deferred().is_some() {
                        self.schedule_hide(next.id.clone());
                    }
                }
                self.bus
                    .publish_session(&next.id, SessionEvent::Updated(next.clone()));
                return Ok(next);
            }

            debug!(attempt, session_id = %session_id, "Move write lost its race, re-reading");
            record = self.load(session_id)?;
        }
        Err(CoordinatorError::Conflict)
    }

    /// Schedules the deferred hide for a mismatched memory pair.
    ///
    /// The timer resolves whatever hide is still pending when it fires.
    /// Presence stamps and re-subscriptions in the interim bump the
    /// revision but leave the pending marker in place, so they must not
    /// cancel it; only terminal states and reclamation do.
    fn schedule_hide(&self, session_id: SessionId) {
        let coordinator = self.clone();
        let key = session_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(coordinator.hide_delay).await;
            if let Err(e) = coordinator.apply_hide(&session_id).await {
                warn!(session_id = %session_id, error = %e, "Deferred hide failed");
            }
        });
        if let Some(previous) = self.timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// Applies the deferred hide transition, if one is still pending.
    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn apply_hide(&self, session_id: &str) -> Result<(), CoordinatorError> {
        self.timers.remove(session_id);

        for attempt in 0..2 {
            let Some(record) = self.store.get_session(session_id)? else {
                return Ok(());
            };
            if record.is_terminal() {
                debug!("Session ended, hide is a no-op");
                return Ok(());
            }
            let Some(state) = record.state.as_ref() else {
                return Ok(());
            };
            let Some((next_state, next_turn)) = state.resolve_deferred(record.current_player)
            else {
                debug!("No hide pending, timer is a no-op");
                return Ok(());
            };

            let mut next = record.clone();
            next.state = Some(next_state);
            next.current_player = next_turn;
            next.revision = record.revision + 1;

            if self.store.cas_update_session(&next, record.revision)? {
                debug!(session_id = %next.id, now_on_turn = %next.current_player, "Mismatched pair hidden");
                let moved_by = record.participant(record.current_player).clone();
                self.notify_turn(&next, &moved_by).await;
                let id = next.id.clone();
                self.bus.publish_session(&id, SessionEvent::Updated(next));
                return Ok(());
            }
            debug!(attempt, session_id = %session_id, "Hide write lost its race, re-reading");
        }
        Err(CoordinatorError::Conflict)
    }

    fn cancel_timer(&self, session_id: &str) {
        if let Some((_, handle)) = self.timers.remove(session_id) {
            handle.abort();
        }
    }

    async fn notify_turn(&self, record: &SessionRecord, moved_by: &str) {
        let to = record.participant(record.current_player).clone();
        self.sink
            .deliver(Notification {
                to_user_id: to,
                kind: NotificationKind::MoveMade,
                payload: serde_json::json!({
                    "session_id": record.id,
                    "game_type": record.game_type,
                    "by": moved_by,
                }),
            })
            .await;
    }

    async fn notify_game_ended(&self, record: &SessionRecord) {
        for user in [&record.player1_id, &record.player2_id] {
            self.sink
                .deliver(Notification {
                    to_user_id: user.clone(),
                    kind: NotificationKind::GameEnded,
                    payload: serde_json::json!({
                        "session_id": record.id,
                        "game_type": record.game_type,
                        "winner": record.winner,
                    }),
                })
                .await;
        }
    }
}
