//! Janitor: periodic reclamation of stale invites and sessions.
//!
//! Housekeeping is best-effort. A failed sweep is logged and retried on
//! the next interval; it never corrupts live state, because every
//! force-cancellation bumps the session revision and so invalidates any
//! in-flight conditional write.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use derive_getters::Getters;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::db::{DbError, GameStore};
use crate::events::{EventBus, InviteEvent, SessionEvent};
use crate::rewards::RewardLedger;
use crate::session::LifecycleStatus;

/// Counts of what one sweep reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Getters)]
pub struct SweepReport {
    /// Non-terminal sessions past the fatal age, force-cancelled and deleted.
    stale_sessions: usize,
    /// Waiting invites past their expiry, cancelled (retained until the
    /// grace window passes).
    expired_invites: usize,
    /// Terminal sessions past the grace window, deleted.
    reclaimed_sessions: usize,
}

/// Periodic sweeper over the backing store.
#[derive(Clone)]
pub struct Janitor {
    store: GameStore,
    bus: EventBus,
    ledger: RewardLedger,
    sweep_interval: std::time::Duration,
    session_max_age: ChronoDuration,
    cleanup_grace: ChronoDuration,
}

impl Janitor {
    /// Creates a janitor with the given time budgets.
    pub fn new(
        store: GameStore,
        bus: EventBus,
        sweep_interval: std::time::Duration,
        session_max_age: ChronoDuration,
        cleanup_grace: ChronoDuration,
    ) -> Self {
        let ledger = RewardLedger::new(store.clone());
        Self {
            store,
            bus,
            ledger,
            sweep_interval,
            session_max_age,
            cleanup_grace,
        }
    }

    /// Spawns the interval loop. Runs until the handle is aborted.
    #[instrument(skip(self))]
    pub fn run(self) -> JoinHandle<()> {
        info!(interval = ?self.sweep_interval, "Janitor starting");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep(Utc::now().naive_utc()) {
                    Ok(report) => debug!(?report, "Sweep finished"),
                    // Never fatal: the next interval retries.
                    Err(e) => warn!(error = %e, "Sweep failed, will retry next interval"),
                }
            }
        })
    }

    /// Runs one sweep at the given instant.
    ///
    /// Reclaims, in order: non-terminal sessions past the fatal age,
    /// waiting invites past expiry (cancelled, not yet deleted: a late
    /// accept must find the cancellation, not a hole), terminal sessions
    /// past the grace window (together with their resolved invites), and
    /// cancelled invites past the grace window. Per-record failures are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] only when a scan itself fails.
    #[instrument(skip(self))]
    pub fn sweep(&self, now: NaiveDateTime) -> Result<SweepReport, DbError> {
        let mut report = SweepReport::default();

        // (a) Sessions stuck in waiting/active past the fatal age.
        let cutoff = now - self.session_max_age;
        for session in self.store.stale_pending_sessions(cutoff)? {
            // The cancel bumps the revision, so a concurrent move loses.
            if let Err(e) = self
                .store
                .force_cancel_session(&session.id, now)
                .and_then(|_| self.store.delete_session(&session.id))
            {
                warn!(session_id = %session.id, error = %e, "Failed to reclaim stale session");
                continue;
            }
            self.bus.publish_session(&session.id, SessionEvent::Removed);
            self.bus.retire_session(&session.id);
            self.delete_session_invite(&session.id);
            info!(session_id = %session.id, created_at = %session.created_at, "Stale session reclaimed");
            report.stale_sessions += 1;
        }

        // (b) Waiting invites past their expiry deadline. Cancelled here,
        // deleted in (d) once the grace window passes.
        for invite in self.store.expired_open_invites(now)? {
            match self
                .store
                .close_invite(&invite.id, LifecycleStatus::Cancelled, now)
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(invite_id = %invite.id, error = %e, "Failed to expire invite");
                    continue;
                }
            }
            let mut cancelled = invite;
            cancelled.status = LifecycleStatus::Cancelled;
            cancelled.resolved_at = Some(now);
            for user in [&cancelled.inviter_id, &cancelled.invitee_id] {
                self.bus
                    .publish_invite(user, InviteEvent::Updated(cancelled.clone()));
            }
            info!(invite_id = %cancelled.id, expired_at = %cancelled.expires_at, "Expired invite cancelled");
            report.expired_invites += 1;
        }

        // (c) Terminal sessions past the grace window, plus their invites.
        // Reward records survive; they are the audit trail.
        let grace_cutoff = now - self.cleanup_grace;
        for session in self.store.terminal_sessions_before(grace_cutoff)? {
            if session.status == LifecycleStatus::Completed && session.winner.is_some() {
                // A grant that failed at completion time is repaired here
                // before the session row disappears.
                match self.ledger.grant(&session, now) {
                    Ok(granted) if !granted.is_empty() => {
                        info!(session_id = %session.id, "Backfilled missing reward grant");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "Failed to backfill rewards, retaining session");
                        continue;
                    }
                }
            }
            if let Err(e) = self.store.delete_session(&session.id) {
                warn!(session_id = %session.id, error = %e, "Failed to delete finished session");
                continue;
            }
            self.bus.publish_session(&session.id, SessionEvent::Removed);
            self.bus.retire_session(&session.id);
            self.delete_session_invite(&session.id);
            debug!(session_id = %session.id, "Finished session reclaimed after grace window");
            report.reclaimed_sessions += 1;
        }

        // (d) Cancelled invites past the grace window.
        for invite in self.store.cancelled_invites_before(grace_cutoff)? {
            if let Err(e) = self.store.delete_invite(&invite.id) {
                warn!(invite_id = %invite.id, error = %e, "Failed to delete cancelled invite");
                continue;
            }
            for user in [&invite.inviter_id, &invite.invitee_id] {
                self.bus
                    .publish_invite(user, InviteEvent::Removed(invite.id.clone()));
            }
            debug!(invite_id = %invite.id, "Cancelled invite reclaimed after grace window");
        }

        info!(
            stale_sessions = report.stale_sessions,
            expired_invites = report.expired_invites,
            reclaimed_sessions = report.reclaimed_sessions,
            "Sweep complete"
        );
        Ok(report)
    }

    /// Deletes the resolved invite pointing at a reclaimed session, if any.
    fn delete_session_invite(&self, session_id: &str) {
        let invite = match self.store.invite_for_session(session_id) {
            Ok(Some(invite)) => invite,
            Ok(None) => return,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to look up resolved invite");
                return;
            }
        };
        if let Err(e) = self.store.delete_invite(&invite.id) {
            warn!(invite_id = %invite.id, error = %e, "Failed to delete resolved invite");
            return;
        }
        for user in [&invite.inviter_id, &invite.invitee_id] {
            self.bus
                .publish_invite(user, InviteEvent::Removed(invite.id.clone()));
        }
    }
}
