use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::clock::ManualClock;
use crate::types::{PresenceRecord, PresenceState, Timestamp};

fn store_at(start: i64) -> (Arc<ManualClock>, MemoryStore) {
    let clock = Arc::new(ManualClock::new(Timestamp(start)));
    let store = MemoryStore::with_clock(clock.clone());
    (clock, store)
}

async fn presence(store: &MemoryStore, user: &str) -> PresenceRecord {
    let doc = store.read_presence(user).await.unwrap().unwrap();
    PresenceRecord::from_document(&doc).unwrap()
}

#[tokio::test]
async fn presence_last_seen_never_moves_backwards() {
    let (clock, store) = store_at(10_000);
    store.write_presence("alice", PresenceState::Online).await.unwrap();

    clock.set(Timestamp(4_000));
    let record = store
        .write_presence("alice", PresenceState::Online)
        .await
        .unwrap();
    assert_eq!(record.last_seen, Some(Timestamp(10_000)));

    clock.set(Timestamp(12_000));
    store.write_presence("alice", PresenceState::Offline).await.unwrap();
    let record = presence(&store, "alice").await;
    assert_eq!(record.state, Some(PresenceState::Offline));
    assert_eq!(record.last_seen, Some(Timestamp(12_000)));
    assert_eq!(store.presence_write_count().await, 3);
}

#[tokio::test]
async fn last_offline_write_wins_for_a_user() {
    let (clock, store) = store_at(1_000);
    store.write_presence("bob", PresenceState::Online).await.unwrap();
    clock.advance(Duration::from_secs(1));
    store.write_presence("bob", PresenceState::Online).await.unwrap();
    clock.advance(Duration::from_secs(1));
    store.write_presence("bob", PresenceState::Offline).await.unwrap();

    let record = presence(&store, "bob").await;
    assert_eq!(record.state, Some(PresenceState::Offline));
    assert_eq!(record.last_seen, Some(Timestamp(3_000)));
    assert_eq!(store.presence_record_count().await, 1);
}

#[tokio::test]
async fn failed_presence_write_leaves_record_untouched() {
    let (_, store) = store_at(1_000);
    store.write_presence("bob", PresenceState::Online).await.unwrap();
    store.fail_presence_writes(true);
    let err = store
        .write_presence("bob", PresenceState::Offline)
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(presence(&store, "bob").await.state, Some(PresenceState::Online));
}

#[tokio::test]
async fn presence_watch_sees_writes() {
    let (_, store) = store_at(1_000);
    let mut rx = store.watch_presence("carol").await.unwrap();
    assert!(rx.borrow_and_update().is_none());

    store.write_presence("carol", PresenceState::Online).await.unwrap();
    rx.changed().await.unwrap();
    let doc = rx.borrow_and_update().clone().unwrap();
    assert_eq!(doc.key, "carol");
}

#[tokio::test]
async fn create_conversation_is_idempotent_and_order_free() {
    let (clock, store) = store_at(500);
    let first = store.create_conversation("bob", "alice").await.unwrap();
    clock.advance(Duration::from_secs(5));
    let second = store.create_conversation("alice", "bob").await.unwrap();

    assert_eq!(first.id, "alice_bob");
    assert_eq!(first, second);
    assert_eq!(first.members, ["alice", "bob"]);
    assert_eq!(first.last_read_by("bob"), Some(Timestamp(500)));

    let err = store.create_conversation("alice", "alice").await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidParticipants(_)));
}

#[tokio::test]
async fn read_cursor_is_monotonic_and_idempotent() {
    let (clock, store) = store_at(100);
    let c = store.create_conversation("alice", "bob").await.unwrap();
    clock.set(Timestamp(1_000));

    assert_eq!(
        store.set_last_read(&c.id, "bob", Timestamp(900)).await.unwrap(),
        Timestamp(900)
    );
    assert_eq!(
        store.set_last_read(&c.id, "bob", Timestamp(900)).await.unwrap(),
        Timestamp(900)
    );
    assert_eq!(
        store.set_last_read(&c.id, "bob", Timestamp(200)).await.unwrap(),
        Timestamp(900)
    );

    let err = store
        .set_last_read(&c.id, "mallory", Timestamp(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotAMember { .. }));

    let err = store
        .set_last_read("nobody_here", "bob", Timestamp(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::ConversationNotFound(_)));
}

#[tokio::test]
async fn read_cursor_is_capped_at_store_time() {
    let (clock, store) = store_at(1_000);
    let c = store.create_conversation("alice", "bob").await.unwrap();

    let cursor = store
        .set_last_read(&c.id, "bob", Timestamp(i64::MAX))
        .await
        .unwrap();
    assert_eq!(cursor, Timestamp(1_000));

    let first = store.append_message(&c.id, "alice", "hi").await.unwrap();
    assert_eq!(first.sent_at, Timestamp(1_001));
    let doc = store.read_conversation(&c.id).await.unwrap().unwrap();
    let updated = Conversation::from_document(&doc).unwrap();
    assert_eq!(updated.last_read_by("bob"), Some(Timestamp(1_000)));

    // The newest message may sit ahead of the clock; the cursor may reach it.
    let cursor = store
        .set_last_read(&c.id, "bob", Timestamp(i64::MAX))
        .await
        .unwrap();
    assert_eq!(cursor, first.sent_at);

    clock.advance(Duration::from_millis(5));
    let second = store.append_message(&c.id, "alice", "again").await.unwrap();
    assert_eq!(second.sent_at, Timestamp(1_005));
}

#[tokio::test]
async fn appends_get_strictly_increasing_timestamps() {
    let (_, store) = store_at(1_000);
    let c = store.create_conversation("alice", "bob").await.unwrap();

    let a = store.append_message(&c.id, "alice", "one").await.unwrap();
    let b = store.append_message(&c.id, "bob", "two").await.unwrap();
    let d = store.append_message(&c.id, "alice", "three").await.unwrap();
    assert!(a.sent_at < b.sent_at && b.sent_at < d.sent_at);

    let doc = store.read_conversation(&c.id).await.unwrap().unwrap();
    let updated = Conversation::from_document(&doc).unwrap();
    assert_eq!(updated.last_message.as_deref(), Some("three"));
    assert_eq!(updated.last_message_timestamp, Some(d.sent_at));
    assert_eq!(updated.last_read_by("alice"), Some(d.sent_at));
    assert_eq!(updated.last_read_by("bob"), Some(b.sent_at));

    let err = store
        .append_message(&c.id, "mallory", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotAMember { .. }));
}

#[tokio::test]
async fn range_queries_respect_bounds_and_limit() {
    let (clock, store) = store_at(1_000);
    let c = store.create_conversation("alice", "bob").await.unwrap();
    let mut sent = Vec::new();
    for i in 0..5 {
        clock.advance(Duration::from_millis(10));
        sent.push(
            store
                .append_message(&c.id, "alice", &format!("m{i}"))
                .await
                .unwrap(),
        );
    }

    let all = store.messages(&c.id, MessageRange::all()).await.unwrap();
    assert_eq!(all, sent);

    let latest = store.messages(&c.id, MessageRange::latest(2)).await.unwrap();
    assert_eq!(latest, sent[3..]);

    let window = MessageRange {
        after: Some(sent[0].sent_at),
        before: Some(sent[4].sent_at),
        limit: None,
    };
    let middle = store.messages(&c.id, window).await.unwrap();
    assert_eq!(middle, sent[1..4]);

    assert!(matches!(
        store.messages("missing", MessageRange::all()).await,
        Err(ChatError::ConversationNotFound(_))
    ));
}

#[tokio::test]
async fn membership_query_follows_updates() {
    let (_, store) = store_at(1_000);
    let mut rx = store.watch_conversations("alice").await.unwrap();
    assert!(rx.borrow_and_update().is_empty());

    let c = store.create_conversation("alice", "bob").await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update()[0].key, c.id);

    store.create_conversation("bob", "carol").await.unwrap();
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn message_watch_receives_appends() {
    let (_, store) = store_at(1_000);
    let c = store.create_conversation("alice", "bob").await.unwrap();
    let mut rx = store.watch_messages(&c.id).await.unwrap();
    let sent = store.append_message(&c.id, "bob", "hello").await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), sent);
}
