//! Ordered message logs and the live message stream of an open conversation.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::{MessageRange, SharedStore};
use crate::types::Message;

/// Messages of one conversation ordered by `sent_at`, whatever order they
/// were received in. Duplicate ids are ignored.
///
/// A bounded log evicts its oldest messages first.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    max_len: Option<usize>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(max_len: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_len: Some(max_len),
        }
    }

    /// Insert a message in `sent_at` order. Returns `false` for a duplicate.
    pub fn insert(&mut self, message: Message) -> bool {
        let key = (message.sent_at, message.id.as_str());
        let at = self
            .messages
            .partition_point(|m| (m.sent_at, m.id.as_str()) < key);
        if self.messages.get(at).is_some_and(|m| m.id == message.id) {
            return false;
        }
        self.messages.insert(at, message);
        if let Some(max_len) = self.max_len {
            let excess = self.messages.len().saturating_sub(max_len);
            self.messages.drain(..excess);
        }
        true
    }

    /// Insert several messages. Returns how many were new.
    pub fn extend<I: IntoIterator<Item = Message>>(&mut self, messages: I) -> usize {
        messages.into_iter().filter(|m| self.insert(m.clone())).count()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Feed a conversation's ordered message log into `tx` until cancelled.
///
/// Subscribes to appends before loading history so nothing sent in between
/// is missed. `on_new` sees each message the first time it is added.
pub(crate) async fn run_message_stream<F>(
    store: SharedStore,
    conversation_id: String,
    history_limit: usize,
    tx: watch::Sender<Option<Vec<Message>>>,
    cancel: CancellationToken,
    on_new: F,
) where
    F: Fn(&Message) + Send + Sync,
{
    let mut appends = match store.watch_messages(&conversation_id).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(conversation_id = %conversation_id, error = %e, "Cannot open message stream");
            return;
        }
    };

    let mut log = MessageLog::bounded(history_limit);
    match store
        .messages(&conversation_id, MessageRange::latest(history_limit))
        .await
    {
        Ok(history) => {
            log.extend(history);
        }
        Err(e) => {
            warn!(conversation_id = %conversation_id, error = %e, "Message history unavailable");
        }
    }
    tx.send_replace(Some(log.messages().to_vec()));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = appends.recv() => match received {
                Ok(message) => {
                    if log.insert(message.clone()) {
                        on_new(&message);
                        tx.send_replace(Some(log.messages().to_vec()));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        conversation_id = %conversation_id,
                        skipped,
                        "Message stream lagged, reloading"
                    );
                    let since = MessageRange {
                        after: log.latest().map(|m| m.sent_at),
                        ..MessageRange::default()
                    };
                    if let Ok(missed) = store.messages(&conversation_id, since).await {
                        for message in missed {
                            if log.insert(message.clone()) {
                                on_new(&message);
                            }
                        }
                        tx.send_replace(Some(log.messages().to_vec()));
                    }
                }
                Err(RecvError::Closed) => {
                    debug!(conversation_id = %conversation_id, "Message stream closed by store");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::store::{MemoryStore, RealtimeStore};
    use crate::types::Timestamp;

    const WAIT: Duration = Duration::from_secs(5);

    fn message(id: &str, sent_at: i64) -> Message {
        Message {
            id: id.into(),
            conversation_id: "a_b".into(),
            sender_id: "a".into(),
            body: format!("body {id}"),
            sent_at: Timestamp(sent_at),
        }
    }

    fn sent_at(log: &MessageLog) -> Vec<i64> {
        log.messages().iter().map(|m| m.sent_at.as_millis()).collect()
    }

    #[test]
    fn orders_by_sent_at_regardless_of_arrival() {
        let mut log = MessageLog::new();
        log.insert(message("m5", 5));
        log.insert(message("m1", 1));
        log.insert(message("m3", 3));
        assert_eq!(sent_at(&log), [1, 3, 5]);
    }

    #[test]
    fn ignores_duplicates() {
        let mut log = MessageLog::new();
        assert!(log.insert(message("m1", 1)));
        assert!(!log.insert(message("m1", 1)));
        assert_eq!(log.extend([message("m1", 1), message("m2", 2)]), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn bounded_log_evicts_oldest() {
        let mut log = MessageLog::bounded(2);
        log.extend([message("m3", 3), message("m1", 1), message("m2", 2)]);
        assert_eq!(sent_at(&log), [2, 3]);
        assert_eq!(log.latest().map(|m| m.id.as_str()), Some("m3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lagged_stream_reloads_missed_messages_in_order() {
        let store = Arc::new(MemoryStore::new());
        let c = store.create_conversation("alice", "bob").await.unwrap();
        let shared: SharedStore = store.clone();

        let open = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(AtomicUsize::new(0));
        let on_new = {
            let open = Arc::clone(&open);
            let seen = Arc::clone(&seen);
            move |_: &Message| {
                // Hold the stream so appends pile up past the channel capacity.
                while !open.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                seen.fetch_add(1, Ordering::SeqCst);
            }
        };

        let (tx, mut rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_message_stream(
            shared,
            c.id.clone(),
            1_000,
            tx,
            cancel.clone(),
            on_new,
        ));
        tokio::time::timeout(WAIT, rx.wait_for(|log| log.is_some()))
            .await
            .unwrap()
            .unwrap();

        let total = 300;
        for n in 0..total {
            store
                .append_message(&c.id, "alice", &format!("m{n}"))
                .await
                .unwrap();
        }
        open.store(true, Ordering::SeqCst);

        let log = tokio::time::timeout(
            WAIT,
            rx.wait_for(|log| log.as_ref().is_some_and(|l| l.len() == total)),
        )
        .await
        .unwrap()
        .unwrap()
        .clone()
        .unwrap();

        let stored = store.messages(&c.id, MessageRange::all()).await.unwrap();
        assert_eq!(log, stored);
        assert!(log.windows(2).all(|w| w[0].sent_at < w[1].sent_at));
        assert_eq!(seen.load(Ordering::SeqCst), total);

        cancel.cancel();
        task.await.unwrap();
    }
}
