//! Typed access to per-user presence records.

use tokio::sync::watch;

use crate::errors::ChatError;
use crate::store::SharedStore;
use crate::types::{Document, PresenceRecord, PresenceState};

/// Presence records in the realtime store. Only a user's own session
/// writes their record.
#[derive(Clone)]
pub struct PresenceStore {
    store: SharedStore,
}

impl PresenceStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Mark `user_id` online as of the store's clock.
    pub async fn heartbeat(&self, user_id: &str) -> Result<PresenceRecord, ChatError> {
        self.store.write_presence(user_id, PresenceState::Online).await
    }

    pub async fn mark_offline(&self, user_id: &str) -> Result<PresenceRecord, ChatError> {
        self.store.write_presence(user_id, PresenceState::Offline).await
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<PresenceRecord>, ChatError> {
        self.store
            .read_presence(user_id)
            .await?
            .map(|doc| PresenceRecord::from_document(&doc))
            .transpose()
    }

    /// Live raw document for `user_id`; `None` until the first write.
    pub async fn watch(
        &self,
        user_id: &str,
    ) -> Result<watch::Receiver<Option<Document>>, ChatError> {
        self.store.watch_presence(user_id).await
    }
}
