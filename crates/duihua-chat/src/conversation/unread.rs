//! Unread state derived from read cursors.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::types::{Conversation, ConversationViewModel};

/// Whether `viewer_id` has an unseen message in `conversation`.
///
/// Missing timestamps count as read, so a half-written record never shows
/// a badge.
pub fn is_unread(conversation: &Conversation, viewer_id: &str) -> bool {
    match (
        conversation.last_message_timestamp,
        conversation.last_read_by(viewer_id),
    ) {
        (Some(last_message), Some(last_read)) => last_message > last_read,
        _ => false,
    }
}

/// Number of unread rows in a materialized list.
pub fn unread_count(list: &[ConversationViewModel]) -> usize {
    list.iter().filter(|row| row.is_unread).count()
}

/// Owner of the per-viewer unread totals.
///
/// Totals are recomputed from each emitted conversation list; observers
/// read them through a `watch` receiver.
#[derive(Clone)]
pub struct UnreadAggregator {
    totals: Arc<watch::Sender<BTreeMap<String, usize>>>,
}

impl UnreadAggregator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(BTreeMap::new());
        Self {
            totals: Arc::new(tx),
        }
    }

    /// Recompute `viewer_id`'s total from `list`. Returns the new total.
    pub fn record(&self, viewer_id: &str, list: &[ConversationViewModel]) -> usize {
        let total = unread_count(list);
        self.totals.send_if_modified(|totals| {
            let previous = totals.insert(viewer_id.to_string(), total);
            previous != Some(total)
        });
        total
    }

    pub fn forget(&self, viewer_id: &str) {
        self.totals
            .send_if_modified(|totals| totals.remove(viewer_id).is_some());
    }

    pub fn total(&self, viewer_id: &str) -> usize {
        self.totals.borrow().get(viewer_id).copied().unwrap_or(0)
    }

    pub fn watch(&self) -> watch::Receiver<BTreeMap<String, usize>> {
        self.totals.subscribe()
    }
}

impl Default for UnreadAggregator {
    fn default() -> Self {
        Self::new()
    }
}
