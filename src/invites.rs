//! Invite broker: creates, resolves, and expires invites between paired
//! accounts. Acceptance is the sole creation path for sessions, and it is
//! transactional with the invite-status update.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::coordinator::{CoordinatorError, ResourceKind};
use crate::db::GameStore;
use crate::events::{EventBus, InviteEvent, SessionEvent};
use crate::games::{GameType, Seat};
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::pairing::PairingDirectory;
use crate::session::{InviteId, LifecycleStatus, SessionId, SessionRecord, UserId};

/// A proposal from one paired user to another to start a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteRecord {
    /// Invite ID (UUID v4 string).
    pub id: InviteId,
    /// Proposed game type.
    pub game_type: GameType,
    /// Who sent the invite.
    pub inviter_id: UserId,
    /// Who may accept or decline it.
    pub invitee_id: UserId,
    /// Lifecycle status; `active` iff a session was created from it.
    pub status: LifecycleStatus,
    /// Creation time.
    pub created_at: NaiveDateTime,
    /// Expiry deadline; always after `created_at`.
    pub expires_at: NaiveDateTime,
    /// The session created on acceptance, set iff `status` is active.
    pub session_id: Option<SessionId>,
    /// When the invite left the waiting state; `None` while waiting.
    pub resolved_at: Option<NaiveDateTime>,
}

impl InviteRecord {
    /// Creates a fresh waiting invite with the given time-to-live.
    pub fn create(
        game_type: GameType,
        inviter_id: UserId,
        invitee_id: UserId,
        now: NaiveDateTime,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            game_type,
            inviter_id,
            invitee_id,
            status: LifecycleStatus::Waiting,
            created_at: now,
            expires_at: now + ttl,
            session_id: None,
            resolved_at: None,
        }
    }

    /// Whether the invite's expiry deadline has passed.
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Why an invite operation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum InviteError {
    /// Inviter and invitee are not each other's registered partner.
    #[display("inviter and invitee are not registered partners")]
    NotPartners,

    /// A user cannot invite themselves.
    #[display("cannot invite yourself")]
    SelfInvite,

    /// An unresolved invite already exists between the pair.
    #[display("an invite between this pair is already pending")]
    AlreadyPending,

    /// The invite's expiry deadline has passed.
    #[display("invite has expired")]
    Expired,

    /// The invite already left the waiting state.
    #[display("invite is no longer open")]
    NotWaiting,

    /// Only the invitee may accept or decline.
    #[display("only the invitee may respond to this invite")]
    NotInvitee,
}

impl std::error::Error for InviteError {}

/// Broker for invite lifecycle operations.
#[derive(Clone)]
pub struct InviteBroker {
    store: GameStore,
    pairing: Arc<dyn PairingDirectory>,
    sink: Arc<dyn NotificationSink>,
    bus: EventBus,
    invite_ttl: chrono::Duration,
}

impl InviteBroker {
    /// Creates a broker over the given collaborators.
    pub fn new(
        store: GameStore,
        pairing: Arc<dyn PairingDirectory>,
        sink: Arc<dyn NotificationSink>,
        bus: EventBus,
        invite_ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            pairing,
            sink,
            bus,
            invite_ttl,
        }
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    fn publish_to_parties(&self, record: &InviteRecord) {
        for user in [&record.inviter_id, &record.invitee_id] {
            self.bus
                .publish_invite(user, InviteEvent::Updated(record.clone()));
        }
    }

    /// Creates an invite from `inviter` to their registered partner.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Invite`] when the target is not the
    /// inviter's partner, the inviter targets themselves, or an
    /// unresolved invite already exists between the pair.
    #[instrument(skip(self), fields(inviter = %inviter, invitee = %invitee, game_type = %game_type))]
    pub async fn create_invite(
        &self,
        inviter: &str,
        invitee: &str,
        game_type: GameType,
    ) -> Result<InviteRecord, CoordinatorError> {
        if inviter == invitee {
            return Err(InviteError::SelfInvite.into());
        }
        let partner = self.pairing.partner_of(inviter).await;
        if partner.as_deref() != Some(invitee) {
            return Err(InviteError::NotPartners.into());
        }

        let now = Self::now();
        if let Some(existing) = self.store.open_invite_between(inviter, invitee)? {
            if existing.is_expired(now) {
                // A stale invite the janitor has not reached yet; retire it
                // here instead of blocking the pair.
                debug!(invite_id = %existing.id, "Retiring expired invite on observation");
                self.store
                    .close_invite(&existing.id, LifecycleStatus::Cancelled, now)?;
                let mut cancelled = existing;
                cancelled.status = LifecycleStatus::Cancelled;
                cancelled.resolved_at = Some(now);
                self.publish_to_parties(&cancelled);
            } else {
                return Err(InviteError::AlreadyPending.into());
            }
        }

        let record = InviteRecord::create(
            game_type,
            inviter.to_string(),
            invitee.to_string(),
            now,
            self.invite_ttl,
        );
        self.store.insert_invite(&record)?;
        info!(invite_id = %record.id, "Invite created");

        self.sink
            .deliver(Notification {
                to_user_id: record.invitee_id.clone(),
                kind: NotificationKind::InviteReceived,
                payload: serde_json::json!({
                    "invite_id": record.id,
                    "game_type": record.game_type,
                    "from": record.inviter_id,
                }),
            })
            .await;
        self.publish_to_parties(&record);
        Ok(record)
    }

    /// Accepts an invite, creating its session in the same transaction.
    ///
    /// The accepter's presence is stamped on the new session; activation
    /// itself waits for the inviter's arrival.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] for missing invites and
    /// [`CoordinatorError::Invite`] for expired, resolved, or
    /// wrong-responder invites.
    #[instrument(skip(self), fields(invite_id = %invite_id, accepter = %accepter))]
    pub async fn accept_invite(
        &self,
        invite_id: &str,
        accepter: &str,
    ) -> Result<SessionId, CoordinatorError> {
        let invite = self
            .store
            .get_invite(invite_id)?
            .ok_or(CoordinatorError::NotFound(ResourceKind::Invite))?;

        if invite.status != LifecycleStatus::Waiting {
            return Err(InviteError::NotWaiting.into());
        }
        if invite.invitee_id != accepter {
            return Err(InviteError::NotInvitee.into());
        }

        let now = Self::now();
        if invite.is_expired(now) {
            // Expiry is observed lazily; mark it cancelled so it is never
            // promoted later.
            if self
                .store
                .close_invite(invite_id, LifecycleStatus::Cancelled, now)?
            {
                let mut cancelled = invite;
                cancelled.status = LifecycleStatus::Cancelled;
                cancelled.resolved_at = Some(now);
                self.publish_to_parties(&cancelled);
            }
            return Err(InviteError::Expired.into());
        }

        let mut session = SessionRecord::create(
            invite.game_type,
            invite.inviter_id.clone(),
            accepter.to_string(),
            now,
        );
        session.touch_presence(Seat::Player2, now);

        if !self.store.accept_invite_txn(invite_id, &session)? {
            // Lost a race with a decline or the janitor.
            return Err(InviteError::NotWaiting.into());
        }

        let mut accepted = invite;
        accepted.status = LifecycleStatus::Active;
        accepted.session_id = Some(session.id.clone());
        accepted.resolved_at = Some(session.created_at);
        self.publish_to_parties(&accepted);
        self.bus
            .publish_session(&session.id, SessionEvent::Updated(session.clone()));

        info!(invite_id = %invite_id, session_id = %session.id, "Invite accepted");
        Ok(session.id)
    }

    /// Declines a waiting invite.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] for missing invites,
    /// [`CoordinatorError::Invite`] when the decliner is not the invitee
    /// or the invite already resolved.
    #[instrument(skip(self), fields(invite_id = %invite_id, decliner = %decliner))]
    pub async fn decline_invite(
        &self,
        invite_id: &str,
        decliner: &str,
    ) -> Result<(), CoordinatorError> {
        let invite = self
            .store
            .get_invite(invite_id)?
            .ok_or(CoordinatorError::NotFound(ResourceKind::Invite))?;

        if invite.invitee_id != decliner {
            return Err(InviteError::NotInvitee.into());
        }
        let now = Self::now();
        if !self
            .store
            .close_invite(invite_id, LifecycleStatus::Cancelled, now)?
        {
            return Err(InviteError::NotWaiting.into());
        }

        let mut declined = invite;
        declined.status = LifecycleStatus::Cancelled;
        declined.resolved_at = Some(now);
        self.publish_to_parties(&declined);
        info!(invite_id = %invite_id, "Invite declined");
        Ok(())
    }

    /// Loads an invite by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] if the invite is gone.
    #[instrument(skip(self))]
    pub fn get_invite(&self, invite_id: &str) -> Result<InviteRecord, CoordinatorError> {
        self.store
            .get_invite(invite_id)?
            .ok_or(CoordinatorError::NotFound(ResourceKind::Invite))
    }

    /// Lists open invites involving a user.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Db`] on a store failure.
    #[instrument(skip(self))]
    pub fn open_invites_for(&self, user: &str) -> Result<Vec<InviteRecord>, CoordinatorError> {
        Ok(self.store.open_invites_for(user)?)
    }

    /// Subscribes to a user's invite feed.
    pub fn watch_invites(
        &self,
        user: &str,
    ) -> impl futures::Stream<Item = InviteEvent> + Send + use<> {
        self.bus.watch_invites(user)
    }
}
