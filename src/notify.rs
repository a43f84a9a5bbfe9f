//! Notification sink: fire-and-forget message delivery to a user's inbox.
//!
//! The coordinator never depends on delivery succeeding; sinks swallow
//! their own failures.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, instrument};

use crate::session::UserId;

const INBOX_CAPACITY: usize = 64;

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    /// A partner sent a game invite.
    InviteReceived,
    /// A move was accepted and it is now the recipient's turn.
    MoveMade,
    /// A session the recipient participates in reached a terminal state.
    GameEnded,
}

/// A message bound for one user's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Recipient.
    pub to_user_id: UserId,
    /// Message kind.
    pub kind: NotificationKind,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
}

/// Fire-and-forget delivery to a user's inbox.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers a notification. Must not fail the caller.
    async fn deliver(&self, notification: Notification);
}

/// Sink that only logs deliveries. Useful as a default and in tests.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    #[instrument(skip(self, notification), fields(to = %notification.to_user_id, kind = %notification.kind))]
    async fn deliver(&self, notification: Notification) {
        debug!(payload = %notification.payload, "Notification delivered to log");
    }
}

/// In-process sink backed by per-user broadcast channels.
///
/// The HTTP surface taps a user's channel to stream their inbox; anything
/// delivered with no subscriber is dropped, matching fire-and-forget.
#[derive(Debug, Clone, Default)]
pub struct ChannelSink {
    inboxes: Arc<DashMap<UserId, broadcast::Sender<Notification>>>,
}

impl ChannelSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn inbox(&self, user: &str) -> broadcast::Sender<Notification> {
        self.inboxes
            .entry(user.to_string())
            .or_insert_with(|| broadcast::channel(INBOX_CAPACITY).0)
            .clone()
    }

    /// Subscribes to a user's inbox. Lagged messages are dropped.
    pub fn subscribe(
        &self,
        user: &str,
    ) -> impl futures::Stream<Item = Notification> + Send + use<> {
        BroadcastStream::new(self.inbox(user).subscribe()).filter_map(|result| result.ok())
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    #[instrument(skip(self, notification), fields(to = %notification.to_user_id, kind = %notification.kind))]
    async fn deliver(&self, notification: Notification) {
        // No receivers is fine: fire-and-forget.
        let _ = self.inbox(&notification.to_user_id).send(notification);
    }
}
