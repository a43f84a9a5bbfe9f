//! Tests for the invite broker: pairing checks, expiry handling, and the
//! transactional accept path.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::StreamExt;
use tempfile::NamedTempFile;

use duet_games::{
    ChannelSink, CoordinatorError, EventBus, GameStore, GameType, InviteBroker, InviteError,
    InviteRecord, LifecycleStatus, NotificationKind, PairingDirectory, StaticPairingDirectory,
    TracingSink,
};

fn setup_test_db() -> (NamedTempFile, GameStore) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let store = GameStore::new(db_path);
    store.run_migrations().expect("Migrations failed");
    (db_file, store)
}

/// A broker over a fresh database with the pair ("u1", "u2") registered.
fn setup_broker() -> (NamedTempFile, GameStore, InviteBroker) {
    let (db_file, store) = setup_test_db();
    let pairing: Arc<dyn PairingDirectory> = Arc::new(StaticPairingDirectory::from_pairs([(
        "u1".to_string(),
        "u2".to_string(),
    )]));
    let broker = InviteBroker::new(
        store.clone(),
        pairing,
        Arc::new(TracingSink),
        EventBus::new(),
        Duration::seconds(300),
    );
    (db_file, store, broker)
}

/// Writes an already-expired waiting invite straight into the store.
fn forge_expired_invite(store: &GameStore) -> InviteRecord {
    let past = Utc::now().naive_utc() - Duration::seconds(600);
    let invite = InviteRecord::create(
        GameType::Memory,
        "u1".to_string(),
        "u2".to_string(),
        past,
        Duration::seconds(300),
    );
    store.insert_invite(&invite).expect("Insert failed");
    invite
}

#[tokio::test]
async fn test_create_invite_between_partners() {
    let (_db, store, broker) = setup_broker();
    let record = broker
        .create_invite("u1", "u2", GameType::TicTacToe)
        .await
        .expect("Create failed");

    assert_eq!(record.status, LifecycleStatus::Waiting);
    assert_eq!(record.inviter_id, "u1");
    assert_eq!(record.invitee_id, "u2");
    assert!(record.expires_at > record.created_at);

    let stored = store.get_invite(&record.id).expect("Query failed");
    assert_eq!(stored, Some(record));
}

#[tokio::test]
async fn test_invitee_may_invite_back_symmetrically() {
    let (_db, _store, broker) = setup_broker();
    let record = broker
        .create_invite("u2", "u1", GameType::WordGuess)
        .await
        .expect("Create failed");
    assert_eq!(record.inviter_id, "u2");
    assert_eq!(record.invitee_id, "u1");
}

#[tokio::test]
async fn test_self_invite_rejected() {
    let (_db, _store, broker) = setup_broker();
    let err = broker
        .create_invite("u1", "u1", GameType::TicTacToe)
        .await
        .expect_err("Self invite must fail");
    assert!(matches!(
        err,
        CoordinatorError::Invite(InviteError::SelfInvite)
    ));
}

#[tokio::test]
async fn test_unpaired_target_rejected() {
    let (_db, _store, broker) = setup_broker();
    let err = broker
        .create_invite("u1", "u3", GameType::TicTacToe)
        .await
        .expect_err("Unpaired invite must fail");
    assert!(matches!(
        err,
        CoordinatorError::Invite(InviteError::NotPartners)
    ));
}

#[tokio::test]
async fn test_pending_invite_blocks_both_directions() {
    let (_db, _store, broker) = setup_broker();
    broker
        .create_invite("u1", "u2", GameType::TicTacToe)
        .await
        .expect("Create failed");

    let same = broker
        .create_invite("u1", "u2", GameType::Memory)
        .await
        .expect_err("Duplicate must fail");
    assert!(matches!(
        same,
        CoordinatorError::Invite(InviteError::AlreadyPending)
    ));

    let reverse = broker
        .create_invite("u2", "u1", GameType::Memory)
        .await
        .expect_err("Reverse duplicate must fail");
    assert!(matches!(
        reverse,
        CoordinatorError::Invite(InviteError::AlreadyPending)
    ));
}

#[tokio::test]
async fn test_expired_pending_invite_is_retired_on_create() {
    let (_db, store, broker) = setup_broker();
    let stale = forge_expired_invite(&store);

    // The stale invite must not block the pair.
    let fresh = broker
        .create_invite("u1", "u2", GameType::TicTacToe)
        .await
        .expect("Create over expired invite failed");
    assert_ne!(fresh.id, stale.id);

    let retired = store.get_invite(&stale.id).expect("Query failed").unwrap();
    assert_eq!(retired.status, LifecycleStatus::Cancelled);
}

#[tokio::test]
async fn test_accept_creates_waiting_session_with_invitee_seen() {
    let (_db, store, broker) = setup_broker();
    let invite = broker
        .create_invite("u1", "u2", GameType::TicTacToe)
        .await
        .expect("Create failed");

    let session_id = broker
        .accept_invite(&invite.id, "u2")
        .await
        .expect("Accept failed");

    let session = store
        .get_session(&session_id)
        .expect("Query failed")
        .expect("Session missing");
    assert_eq!(session.status, LifecycleStatus::Waiting);
    assert_eq!(session.player1_id, "u1", "inviter takes seat 1");
    assert_eq!(session.player2_id, "u2");
    assert!(session.player2_seen_at.is_some(), "accept stamps the accepter");
    assert!(session.player1_seen_at.is_none());
    assert!(session.state.is_none(), "state is dealt on activation");

    let accepted = store.get_invite(&invite.id).expect("Query failed").unwrap();
    assert_eq!(accepted.status, LifecycleStatus::Active);
    assert_eq!(accepted.session_id, Some(session_id));
}

#[tokio::test]
async fn test_accept_requires_the_invitee() {
    let (_db, _store, broker) = setup_broker();
    let invite = broker
        .create_invite("u1", "u2", GameType::TicTacToe)
        .await
        .expect("Create failed");

    let err = broker
        .accept_invite(&invite.id, "u1")
        .await
        .expect_err("Inviter must not accept");
    assert!(matches!(
        err,
        CoordinatorError::Invite(InviteError::NotInvitee)
    ));
}

#[tokio::test]
async fn test_accept_expired_invite_cancels_it() {
    let (_db, store, broker) = setup_broker();
    let invite = forge_expired_invite(&store);

    let err = broker
        .accept_invite(&invite.id, "u2")
        .await
        .expect_err("Expired accept must fail");
    assert!(matches!(
        err,
        CoordinatorError::Invite(InviteError::Expired)
    ));

    // Lazily observed expiry is persisted so the invite is never promoted.
    let stored = store.get_invite(&invite.id).expect("Query failed").unwrap();
    assert_eq!(stored.status, LifecycleStatus::Cancelled);
}

#[tokio::test]
async fn test_decline_resolves_the_invite() {
    let (_db, store, broker) = setup_broker();
    let invite = broker
        .create_invite("u1", "u2", GameType::Memory)
        .await
        .expect("Create failed");

    broker
        .decline_invite(&invite.id, "u2")
        .await
        .expect("Decline failed");
    let stored = store.get_invite(&invite.id).expect("Query failed").unwrap();
    assert_eq!(stored.status, LifecycleStatus::Cancelled);

    let err = broker
        .accept_invite(&invite.id, "u2")
        .await
        .expect_err("Accept after decline must fail");
    assert!(matches!(
        err,
        CoordinatorError::Invite(InviteError::NotWaiting)
    ));
}

#[tokio::test]
async fn test_decline_requires_the_invitee() {
    let (_db, _store, broker) = setup_broker();
    let invite = broker
        .create_invite("u1", "u2", GameType::Memory)
        .await
        .expect("Create failed");

    let err = broker
        .decline_invite(&invite.id, "u1")
        .await
        .expect_err("Inviter must not decline");
    assert!(matches!(
        err,
        CoordinatorError::Invite(InviteError::NotInvitee)
    ));
}

#[tokio::test]
async fn test_missing_invite_is_not_found() {
    let (_db, _store, broker) = setup_broker();
    let err = broker
        .accept_invite("no-such-id", "u2")
        .await
        .expect_err("Missing invite must fail");
    assert!(matches!(err, CoordinatorError::NotFound(_)));
}

#[tokio::test]
async fn test_invitee_is_notified_on_create() {
    let (_db, store) = setup_test_db();
    let pairing: Arc<dyn PairingDirectory> = Arc::new(StaticPairingDirectory::from_pairs([(
        "u1".to_string(),
        "u2".to_string(),
    )]));
    let sink = ChannelSink::new();
    let broker = InviteBroker::new(
        store,
        pairing,
        Arc::new(sink.clone()),
        EventBus::new(),
        Duration::seconds(300),
    );

    let mut inbox = Box::pin(sink.subscribe("u2"));
    let invite = broker
        .create_invite("u1", "u2", GameType::WordGuess)
        .await
        .expect("Create failed");

    let notification =
        tokio::time::timeout(std::time::Duration::from_secs(1), inbox.next())
            .await
            .expect("Notification timed out")
            .expect("Inbox closed");
    assert_eq!(notification.to_user_id, "u2");
    assert_eq!(notification.kind, NotificationKind::InviteReceived);
    assert_eq!(
        notification.payload["invite_id"],
        serde_json::Value::String(invite.id)
    );
}

#[tokio::test]
async fn test_open_invites_for_lists_waiting_only() {
    let (_db, _store, broker) = setup_broker();
    let invite = broker
        .create_invite("u1", "u2", GameType::TicTacToe)
        .await
        .expect("Create failed");

    assert_eq!(broker.open_invites_for("u1").expect("List failed").len(), 1);
    assert_eq!(broker.open_invites_for("u2").expect("List failed").len(), 1);

    broker
        .decline_invite(&invite.id, "u2")
        .await
        .expect("Decline failed");
    assert!(broker.open_invites_for("u1").expect("List failed").is_empty());
}
