use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::*;
use crate::store::{MemoryStore, RealtimeStore, SharedStore};
use crate::types::{ConversationViewModel, UserProfile};

const WAIT: Duration = Duration::from_secs(2);

fn profile(name: &str) -> UserProfile {
    UserProfile::new(name, format!("/images/{name}.png"))
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for user in ["alice", "bob", "carol", "dave"] {
        store.put_profile(user, &profile(user)).await;
    }
    store
}

fn index_over(store: &Arc<MemoryStore>) -> ConversationIndex {
    index_with(store, IndexConfig::default())
}

fn index_with(store: &Arc<MemoryStore>, config: IndexConfig) -> ConversationIndex {
    let shared: SharedStore = store.clone();
    ConversationIndex::new(shared, config)
}

fn collector() -> (
    impl Fn(Vec<ConversationViewModel>) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Vec<ConversationViewModel>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |list: Vec<ConversationViewModel>| {
        let _ = tx.send(list);
    };
    (callback, rx)
}

/// Wait for the first emitted list satisfying `pred`.
async fn wait_for<P>(
    rx: &mut mpsc::UnboundedReceiver<Vec<ConversationViewModel>>,
    pred: P,
) -> Vec<ConversationViewModel>
where
    P: Fn(&[ConversationViewModel]) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let list = rx.recv().await.expect("list subscription ended");
            if pred(&list) {
                return list;
            }
        }
    })
    .await
    .expect("expected list was never emitted")
}

fn ids(list: &[ConversationViewModel]) -> Vec<&str> {
    list.iter().map(|row| row.conversation_id.as_str()).collect()
}

fn all_resolved(list: &[ConversationViewModel]) -> bool {
    list.iter().all(|row| row.profile_resolved)
}

#[tokio::test]
async fn lists_newest_first_with_resolved_counterparts() {
    let store = seeded_store().await;
    let ab = store.create_conversation("alice", "bob").await.unwrap();
    let ac = store.create_conversation("alice", "carol").await.unwrap();
    store.create_conversation("alice", "dave").await.unwrap();
    store.create_conversation("bob", "carol").await.unwrap();
    store.append_message(&ab.id, "bob", "first").await.unwrap();
    store.append_message(&ac.id, "carol", "second").await.unwrap();

    let index = index_over(&store);
    let (callback, mut rx) = collector();
    let sub = index.subscribe("alice", callback);

    let list = wait_for(&mut rx, |l| l.len() == 3 && all_resolved(l)).await;
    assert_eq!(ids(&list), ["alice_carol", "alice_bob", "alice_dave"]);
    assert_eq!(list[0].counterpart_id, "carol");
    assert_eq!(list[0].counterpart, profile("carol"));
    assert_eq!(list[0].last_message.as_deref(), Some("second"));
    assert!(list[0].is_unread);
    assert!(list[1].is_unread);
    assert!(!list[2].is_unread);

    sub.unsubscribe().await;
}

#[tokio::test]
async fn new_message_and_read_cursor_update_the_list() {
    let store = seeded_store().await;
    let ab = store.create_conversation("alice", "bob").await.unwrap();
    let index = index_over(&store);
    let (callback, mut rx) = collector();
    let sub = index.subscribe("alice", callback);

    wait_for(&mut rx, |l| l.len() == 1 && !l[0].is_unread && all_resolved(l)).await;

    let sent = store.append_message(&ab.id, "bob", "ping").await.unwrap();
    let list = wait_for(&mut rx, |l| l[0].is_unread).await;
    assert_eq!(list[0].last_message.as_deref(), Some("ping"));
    assert_eq!(list[0].last_message_timestamp, Some(sent.sent_at));

    store.set_last_read(&ab.id, "alice", sent.sent_at).await.unwrap();
    wait_for(&mut rx, |l| !l[0].is_unread).await;

    sub.unsubscribe().await;
}

#[tokio::test]
async fn missing_profile_keeps_placeholder() {
    let store = seeded_store().await;
    store.remove_profile("bob").await;
    store.create_conversation("alice", "bob").await.unwrap();
    store.create_conversation("alice", "carol").await.unwrap();

    let index = index_over(&store);
    let (callback, mut rx) = collector();
    let sub = index.subscribe("alice", callback);

    let list = wait_for(&mut rx, |l| {
        l.iter().any(|row| row.counterpart_id == "carol" && row.profile_resolved)
    })
    .await;
    let bob = list.iter().find(|row| row.counterpart_id == "bob").unwrap();
    assert!(!bob.profile_resolved);
    assert_eq!(bob.counterpart, IndexConfig::default().placeholder);
    assert_eq!(list.len(), 2);

    sub.unsubscribe().await;
}

#[tokio::test]
async fn failed_fetch_is_retried_on_next_change() {
    let store = seeded_store().await;
    let ab = store.create_conversation("alice", "bob").await.unwrap();
    store.fail_profile_fetches(true);

    let index = index_over(&store);
    let (callback, mut rx) = collector();
    let sub = index.subscribe("alice", callback);

    let first = wait_for(&mut rx, |l| l.len() == 1).await;
    assert!(!first[0].profile_resolved);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(index.profiles().get("bob").await.is_none());

    store.fail_profile_fetches(false);
    store.append_message(&ab.id, "bob", "again").await.unwrap();
    let list = wait_for(&mut rx, |l| all_resolved(l)).await;
    assert_eq!(list[0].counterpart, profile("bob"));

    sub.unsubscribe().await;
}

#[tokio::test]
async fn malformed_records_are_skipped() {
    let store = seeded_store().await;
    store.create_conversation("alice", "bob").await.unwrap();
    store
        .put_raw_conversation("broken", json!({"members": ["alice"], "lastMessage": 3}))
        .await;

    let index = index_over(&store);
    let (callback, mut rx) = collector();
    let sub = index.subscribe("alice", callback);

    let list = wait_for(&mut rx, all_resolved).await;
    assert_eq!(ids(&list), ["alice_bob"]);

    sub.unsubscribe().await;
}

#[tokio::test]
async fn no_callback_after_unsubscribe() {
    let store = seeded_store().await;
    store.create_conversation("alice", "bob").await.unwrap();
    store.set_profile_latency(Duration::from_millis(200));

    let index = index_over(&store);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let sub = index.subscribe("alice", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::timeout(WAIT, async {
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    sub.unsubscribe().await;
    let seen = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(calls.load(Ordering::SeqCst), seen);
    assert!(index.profiles().get("bob").await.is_none());
}

#[tokio::test]
async fn profiles_are_cached_across_subscriptions() {
    let store = seeded_store().await;
    store.create_conversation("alice", "bob").await.unwrap();
    store.create_conversation("carol", "bob").await.unwrap();

    let index = index_over(&store);
    let (callback, mut rx) = collector();
    let alice = index.subscribe("alice", callback);
    wait_for(&mut rx, all_resolved).await;
    assert_eq!(index.profiles().len().await, 1);

    store.fail_profile_fetches(true);
    let (callback, mut rx) = collector();
    let carol = index.subscribe("carol", callback);
    let list = wait_for(&mut rx, |l| l.len() == 1).await;
    assert!(list[0].profile_resolved);
    assert_eq!(list[0].counterpart, profile("bob"));

    alice.unsubscribe().await;
    carol.unsubscribe().await;
}

#[tokio::test(start_paused = true)]
async fn failed_query_is_retried_with_capped_backoff() {
    let store = seeded_store().await;
    store.create_conversation("alice", "bob").await.unwrap();
    store.fail_conversation_queries(true);

    let index = index_with(
        &store,
        IndexConfig {
            retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(400),
            ..IndexConfig::default()
        },
    );
    let (callback, mut rx) = collector();
    let sub = index.subscribe("alice", callback);

    // Attempts at 0, 100, 300, 700, then every 400ms.
    tokio::time::sleep(Duration::from_millis(3_150)).await;
    assert!(rx.try_recv().is_err());

    store.fail_conversation_queries(false);
    let recovered = Instant::now();
    let list = wait_for(&mut rx, |l| l.len() == 1 && all_resolved(l)).await;
    assert_eq!(ids(&list), ["alice_bob"]);
    assert!(recovered.elapsed() <= Duration::from_millis(400));

    sub.unsubscribe().await;
}

#[tokio::test(start_paused = true)]
async fn slow_profile_fetch_times_out_to_placeholder() {
    let store = seeded_store().await;
    store.create_conversation("alice", "bob").await.unwrap();
    store.set_profile_latency(Duration::from_secs(10));

    let index = index_with(
        &store,
        IndexConfig {
            profile_fetch_timeout: Duration::from_millis(200),
            ..IndexConfig::default()
        },
    );
    let (callback, mut rx) = collector();
    let sub = index.subscribe("alice", callback);

    let first = wait_for(&mut rx, |l| l.len() == 1).await;
    assert!(!first[0].profile_resolved);
    assert_eq!(first[0].counterpart, IndexConfig::default().placeholder);

    // Well past the store latency: a fetch that had not timed out would
    // have landed by now.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(index.profiles().get("bob").await.is_none());
    while let Ok(list) = rx.try_recv() {
        assert!(!all_resolved(&list));
    }

    sub.unsubscribe().await;
}
