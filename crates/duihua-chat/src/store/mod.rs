//! Abstraction over the realtime document store.
//!
//! The store is push-based: snapshot feeds (presence records, membership
//! queries) arrive through `watch` receivers, the append-only message log
//! through a `broadcast` receiver. Timestamps are assigned by the store.

mod memory;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::errors::ChatError;
use crate::types::{
    Conversation, Document, Message, PresenceRecord, PresenceState, Timestamp, UserProfile,
};

pub use memory::MemoryStore;

pub type SharedStore = Arc<dyn RealtimeStore>;

/// Range query over a conversation's message log.
///
/// Bounds are exclusive. With a `limit`, the latest matching messages are
/// kept. Results are always ordered by `sent_at` ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageRange {
    pub after: Option<Timestamp>,
    pub before: Option<Timestamp>,
    pub limit: Option<usize>,
}

impl MessageRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        self.after.map_or(true, |after| at > after)
            && self.before.map_or(true, |before| at < before)
    }
}

#[async_trait]
pub trait RealtimeStore: Send + Sync + 'static {
    // -- presence ----------------------------------------------------------

    /// Write the caller's presence. The store sets `lastSeen` to its own
    /// clock, never moving it backwards.
    async fn write_presence(
        &self,
        user_id: &str,
        state: PresenceState,
    ) -> Result<PresenceRecord, ChatError>;

    async fn read_presence(&self, user_id: &str) -> Result<Option<Document>, ChatError>;

    async fn watch_presence(
        &self,
        user_id: &str,
    ) -> Result<watch::Receiver<Option<Document>>, ChatError>;

    // -- conversations -----------------------------------------------------

    /// Create the conversation between two users, or return the existing one.
    async fn create_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation, ChatError>;

    async fn read_conversation(&self, conversation_id: &str)
        -> Result<Option<Document>, ChatError>;

    /// Live query of every conversation document listing `member`, most
    /// recent first.
    async fn watch_conversations(
        &self,
        member: &str,
    ) -> Result<watch::Receiver<Vec<Document>>, ChatError>;

    /// Advance `user_id`'s read cursor to `at`. The cursor never moves
    /// backwards; the effective value is returned.
    async fn set_last_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        at: Timestamp,
    ) -> Result<Timestamp, ChatError>;

    // -- profiles ----------------------------------------------------------

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>, ChatError>;

    // -- messages ----------------------------------------------------------

    /// Append a message and update the conversation's last-message fields
    /// and the sender's read cursor in one atomic write.
    async fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<Message, ChatError>;

    async fn messages(
        &self,
        conversation_id: &str,
        range: MessageRange,
    ) -> Result<Vec<Message>, ChatError>;

    async fn watch_messages(
        &self,
        conversation_id: &str,
    ) -> Result<broadcast::Receiver<Message>, ChatError>;
}
