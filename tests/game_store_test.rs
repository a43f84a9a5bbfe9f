//! Tests for the SQLite game store: invite/session/reward operations and
//! the revision-keyed conditional write.

use chrono::{Duration, NaiveDateTime, Utc};
use tempfile::NamedTempFile;
use uuid::Uuid;

use duet_games::{
    GameStore, GameType, InviteRecord, LifecycleStatus, RewardReason, RewardRecord, Seat,
    SessionRecord,
};

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready store.
fn setup_test_db() -> (NamedTempFile, GameStore) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let store = GameStore::new(db_path);
    store.run_migrations().expect("Migrations failed");
    (db_file, store)
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn waiting_invite(at: NaiveDateTime) -> InviteRecord {
    InviteRecord::create(
        GameType::TicTacToe,
        "u1".to_string(),
        "u2".to_string(),
        at,
        Duration::seconds(300),
    )
}

/// Inserts an accepted invite plus its session, the only creation path.
fn seed_session(store: &GameStore, created: NaiveDateTime) -> SessionRecord {
    let invite = waiting_invite(created);
    store.insert_invite(&invite).expect("Insert invite failed");
    let mut session = SessionRecord::create(
        GameType::TicTacToe,
        "u1".to_string(),
        "u2".to_string(),
        created,
    );
    session.touch_presence(Seat::Player2, created);
    let accepted = store
        .accept_invite_txn(&invite.id, &session)
        .expect("Accept txn failed");
    assert!(accepted, "seeding accept must win");
    session
}

fn reward(user: &str, amount: i32, reason: RewardReason, session_id: &str) -> RewardRecord {
    RewardRecord {
        id: Uuid::new_v4().to_string(),
        user_id: user.to_string(),
        amount,
        reason,
        session_id: session_id.to_string(),
        granted_at: now(),
    }
}

#[test]
fn test_insert_and_get_invite() {
    let (_db, store) = setup_test_db();
    let invite = waiting_invite(now());
    store.insert_invite(&invite).expect("Insert failed");

    let found = store.get_invite(&invite.id).expect("Query failed");
    assert_eq!(found, Some(invite));
}

#[test]
fn test_get_invite_not_found() {
    let (_db, store) = setup_test_db();
    let found = store.get_invite("no-such-id").expect("Query failed");
    assert!(found.is_none());
}

#[test]
fn test_open_invite_between_matches_either_direction() {
    let (_db, store) = setup_test_db();
    let invite = waiting_invite(now());
    store.insert_invite(&invite).expect("Insert failed");

    let forward = store.open_invite_between("u1", "u2").expect("Query failed");
    let reverse = store.open_invite_between("u2", "u1").expect("Query failed");
    assert_eq!(forward.as_ref().map(|i| i.id.as_str()), Some(invite.id.as_str()));
    assert_eq!(reverse.as_ref().map(|i| i.id.as_str()), Some(invite.id.as_str()));

    let unrelated = store.open_invite_between("u1", "u3").expect("Query failed");
    assert!(unrelated.is_none());
}

#[test]
fn test_close_invite_succeeds_only_once() {
    let (_db, store) = setup_test_db();
    let invite = waiting_invite(now());
    store.insert_invite(&invite).expect("Insert failed");

    let first = store
        .close_invite(&invite.id, LifecycleStatus::Cancelled, now())
        .expect("Close failed");
    let second = store
        .close_invite(&invite.id, LifecycleStatus::Cancelled, now())
        .expect("Close failed");
    assert!(first, "first close resolves the invite");
    assert!(!second, "second close must be rejected");

    let stored = store.get_invite(&invite.id).expect("Query failed").unwrap();
    assert_eq!(stored.status, LifecycleStatus::Cancelled);
    assert!(stored.resolved_at.is_some(), "close stamps the resolution time");
}

#[test]
fn test_cancelled_invites_before_scan() {
    let (_db, store) = setup_test_db();
    let old = waiting_invite(now());
    let recent = waiting_invite(now());
    store.insert_invite(&old).expect("Insert failed");
    store.insert_invite(&recent).expect("Insert failed");

    store
        .close_invite(&old.id, LifecycleStatus::Cancelled, now() - Duration::seconds(60))
        .expect("Close failed");
    store
        .close_invite(&recent.id, LifecycleStatus::Cancelled, now())
        .expect("Close failed");

    let reclaimed = store
        .cancelled_invites_before(now() - Duration::seconds(30))
        .expect("Scan failed");
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, old.id);
}

#[test]
fn test_accept_invite_txn_creates_session_and_links_invite() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now());

    let stored_session = store
        .get_session(&session.id)
        .expect("Query failed")
        .expect("Session missing");
    assert_eq!(stored_session.status, LifecycleStatus::Waiting);
    assert_eq!(stored_session.revision, 0);
    assert!(stored_session.player2_seen_at.is_some());
    assert!(stored_session.player1_seen_at.is_none());

    let invite = store
        .invite_for_session(&session.id)
        .expect("Query failed")
        .expect("Invite missing");
    assert_eq!(invite.status, LifecycleStatus::Active);
    assert_eq!(invite.session_id.as_deref(), Some(session.id.as_str()));
}

#[test]
fn test_accept_invite_txn_rejects_resolved_invite() {
    let (_db, store) = setup_test_db();
    let invite = waiting_invite(now());
    store.insert_invite(&invite).expect("Insert failed");
    store
        .close_invite(&invite.id, LifecycleStatus::Cancelled, now())
        .expect("Close failed");

    let session = SessionRecord::create(
        GameType::TicTacToe,
        "u1".to_string(),
        "u2".to_string(),
        now(),
    );
    let accepted = store
        .accept_invite_txn(&invite.id, &session)
        .expect("Txn failed");
    assert!(!accepted, "resolved invite must not be promoted");
    assert!(
        store.get_session(&session.id).expect("Query failed").is_none(),
        "losing txn must not leave a session behind"
    );
}

#[test]
fn test_conditional_write_accepts_matching_revision() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now());

    let mut next = session.clone();
    next.status = LifecycleStatus::Active;
    next.revision = session.revision + 1;

    let accepted = store
        .cas_update_session(&next, session.revision)
        .expect("Write failed");
    assert!(accepted);

    let stored = store
        .get_session(&session.id)
        .expect("Query failed")
        .unwrap();
    assert_eq!(stored.status, LifecycleStatus::Active);
    assert_eq!(stored.revision, 1);
}

#[test]
fn test_concurrent_writes_with_same_revision_admit_exactly_one() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now());

    // Both writers read revision 0 and race their writes.
    let mut a = session.clone();
    a.status = LifecycleStatus::Active;
    a.revision = session.revision + 1;
    let mut b = session.clone();
    b.current_player = Seat::Player2;
    b.revision = session.revision + 1;

    let first = store
        .cas_update_session(&a, session.revision)
        .expect("Write failed");
    let second = store
        .cas_update_session(&b, session.revision)
        .expect("Write failed");
    assert!(first, "first writer wins");
    assert!(!second, "second writer must be rejected");

    let stored = store
        .get_session(&session.id)
        .expect("Query failed")
        .unwrap();
    assert_eq!(stored.revision, 1);
    assert_eq!(stored.status, LifecycleStatus::Active);
    assert_eq!(stored.current_player, Seat::Player1, "losing write left no trace");
}

#[test]
fn test_force_cancel_invalidates_in_flight_writes() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now());

    let cancelled = store
        .force_cancel_session(&session.id, now())
        .expect("Cancel failed");
    assert!(cancelled);

    // A writer that read revision 0 before the cancel now loses.
    let mut stale = session.clone();
    stale.status = LifecycleStatus::Active;
    stale.revision = session.revision + 1;
    let accepted = store
        .cas_update_session(&stale, session.revision)
        .expect("Write failed");
    assert!(!accepted);

    let stored = store
        .get_session(&session.id)
        .expect("Query failed")
        .unwrap();
    assert_eq!(stored.status, LifecycleStatus::Cancelled);
    assert!(stored.completed_at.is_some());
}

#[test]
fn test_force_cancel_skips_terminal_sessions() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now());
    store
        .force_cancel_session(&session.id, now())
        .expect("Cancel failed");

    let again = store
        .force_cancel_session(&session.id, now())
        .expect("Cancel failed");
    assert!(!again, "terminal session must not be cancelled twice");
}

#[test]
fn test_expired_open_invites_scan() {
    let (_db, store) = setup_test_db();
    let old = waiting_invite(now() - Duration::seconds(600));
    let fresh = waiting_invite(now());
    store.insert_invite(&old).expect("Insert failed");
    store.insert_invite(&fresh).expect("Insert failed");

    let expired = store.expired_open_invites(now()).expect("Scan failed");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, old.id);
}

#[test]
fn test_stale_pending_sessions_scan() {
    let (_db, store) = setup_test_db();
    let old = seed_session(&store, now() - Duration::hours(2));
    let _fresh = seed_session(&store, now());

    let cutoff = now() - Duration::hours(1);
    let stale = store.stale_pending_sessions(cutoff).expect("Scan failed");
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, old.id);
}

#[test]
fn test_terminal_sessions_before_scan() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now() - Duration::minutes(5));

    let mut done = session.clone();
    done.status = LifecycleStatus::Completed;
    done.completed_at = Some(now() - Duration::minutes(1));
    done.revision = session.revision + 1;
    assert!(store
        .cas_update_session(&done, session.revision)
        .expect("Write failed"));

    let none_yet = store
        .terminal_sessions_before(now() - Duration::minutes(2))
        .expect("Scan failed");
    assert!(none_yet.is_empty(), "still inside the grace window");

    let past_grace = store
        .terminal_sessions_before(now())
        .expect("Scan failed");
    assert_eq!(past_grace.len(), 1);
    assert_eq!(past_grace[0].id, session.id);
}

#[test]
fn test_insert_rewards_once_refuses_duplicates() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now());

    let records = vec![
        reward("u1", 50, RewardReason::Win, &session.id),
        reward("u2", 10, RewardReason::Participation, &session.id),
    ];
    let first = store
        .insert_rewards_once(&session.id, &records)
        .expect("Insert failed");
    assert!(first);

    let replay = vec![
        reward("u1", 50, RewardReason::Win, &session.id),
        reward("u2", 10, RewardReason::Participation, &session.id),
    ];
    let second = store
        .insert_rewards_once(&session.id, &replay)
        .expect("Insert failed");
    assert!(!second, "duplicate grant must append nothing");

    let stored = store
        .rewards_for_session(&session.id)
        .expect("Query failed");
    assert_eq!(stored.len(), 2);
}

#[test]
fn test_rewards_for_user_filters_recipient() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now());
    let records = vec![
        reward("u1", 20, RewardReason::Draw, &session.id),
        reward("u2", 20, RewardReason::Draw, &session.id),
    ];
    store
        .insert_rewards_once(&session.id, &records)
        .expect("Insert failed");

    let mine = store.rewards_for_user("u1").expect("Query failed");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id, "u1");
    assert_eq!(mine[0].amount, 20);
}

#[test]
fn test_sessions_for_lists_both_seats() {
    let (_db, store) = setup_test_db();
    let session = seed_session(&store, now());

    for user in ["u1", "u2"] {
        let sessions = store.sessions_for(user).expect("Query failed");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session.id);
    }
    assert!(store.sessions_for("u3").expect("Query failed").is_empty());
}
