//! Change feeds: push-based broadcast of accepted mutations.
//!
//! One broadcast channel per session document and one per user's invite
//! view. Publishing never blocks; a lagging subscriber drops to the
//! freshest snapshot and should re-read.

use dashmap::DashMap;
use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, instrument};

use crate::invites::InviteRecord;
use crate::session::{InviteId, SessionId, SessionRecord, UserId};

const CHANNEL_CAPACITY: usize = 64;

/// Push update for one session document.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session was mutated; here is the accepted snapshot.
    Updated(SessionRecord),
    /// The session no longer exists (reclaimed). Terminal for watchers.
    Removed,
}

/// Push update for a user's invite view.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InviteEvent {
    /// An invite involving the user was created or changed status.
    Updated(InviteRecord),
    /// The invite no longer exists (reclaimed).
    Removed(InviteId),
}

/// In-process event bus over tokio broadcast channels.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    sessions: Arc<DashMap<SessionId, broadcast::Sender<SessionEvent>>>,
    invites: Arc<DashMap<UserId, broadcast::Sender<InviteEvent>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn session_channel(&self, id: &str) -> broadcast::Sender<SessionEvent> {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn invite_channel(&self, user: &str) -> broadcast::Sender<InviteEvent> {
        self.invites
            .entry(user.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publishes a session event to all watchers of that session.
    #[instrument(skip(self, event), fields(session_id = %id))]
    pub fn publish_session(&self, id: &str, event: SessionEvent) {
        // No watchers is fine.
        let _ = self.session_channel(id).send(event);
        debug!("Session event published");
    }

    /// Publishes an invite event to one user's invite feed.
    #[instrument(skip(self, event), fields(user = %user))]
    pub fn publish_invite(&self, user: &str, event: InviteEvent) {
        let _ = self.invite_channel(user).send(event);
        debug!("Invite event published");
    }

    /// Subscribes to a session's change feed. Lagged events are dropped.
    pub fn watch_session(&self, id: &str) -> impl Stream<Item = SessionEvent> + Send + use<> {
        BroadcastStream::new(self.session_channel(id).subscribe())
            .filter_map(|result| result.ok())
    }

    /// Subscribes to a user's invite feed. Lagged events are dropped.
    pub fn watch_invites(&self, user: &str) -> impl Stream<Item = InviteEvent> + Send + use<> {
        BroadcastStream::new(self.invite_channel(user).subscribe())
            .filter_map(|result| result.ok())
    }

    /// Drops the channel for a reclaimed session so the map does not grow
    /// without bound. Existing subscribers see end-of-stream.
    #[instrument(skip(self))]
    pub fn retire_session(&self, id: &str) {
        self.sessions.remove(id);
    }
}
