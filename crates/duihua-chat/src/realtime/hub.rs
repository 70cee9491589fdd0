//! Reference-counted registry of shared subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::feed::Teardown;
use super::key::SubscriptionKey;

struct HubEntry<T> {
    handle: Arc<T>,
    refs: usize,
}

/// Shares one underlying subscription per key among all interested callers.
///
/// The factory passed to [`acquire`](Self::acquire) runs only for the first
/// caller of a key; the subscription is torn down when the last caller
/// releases it.
pub struct RealtimeSubscriptionHub<T> {
    entries: Mutex<HashMap<SubscriptionKey, HubEntry<T>>>,
}

impl<T: Teardown + 'static> RealtimeSubscriptionHub<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Join the subscription for `key`, creating it with `factory` if no one
    /// holds it yet.
    pub async fn acquire<F>(&self, key: SubscriptionKey, factory: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&key) {
            entry.refs += 1;
            debug!(key = %key, refs = entry.refs, "Sharing subscription");
            return Arc::clone(&entry.handle);
        }

        let handle = Arc::new(factory());
        debug!(key = %key, "Opened subscription");
        entries.insert(
            key,
            HubEntry {
                handle: Arc::clone(&handle),
                refs: 1,
            },
        );
        handle
    }

    /// Drop one reference to `key`. Returns `true` if this tore the
    /// underlying subscription down.
    pub async fn release(&self, key: &SubscriptionKey) -> bool {
        let removed = {
            let mut entries = self.entries.lock().await;
            match entries.get_mut(key) {
                None => {
                    warn!(key = %key, "Release of unknown subscription");
                    return false;
                }
                Some(entry) if entry.refs > 1 => {
                    entry.refs -= 1;
                    return false;
                }
                Some(_) => entries.remove(key),
            }
        };

        match removed {
            Some(entry) => {
                entry.handle.teardown().await;
                debug!(key = %key, "Closed subscription");
                true
            }
            None => false,
        }
    }

    pub async fn ref_count(&self, key: &SubscriptionKey) -> usize {
        self.entries
            .lock()
            .await
            .get(key)
            .map_or(0, |entry| entry.refs)
    }

    /// Number of live underlying subscriptions.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Tear down every subscription regardless of reference counts.
    pub async fn shutdown(&self) {
        let drained: Vec<HubEntry<T>> = {
            let mut entries = self.entries.lock().await;
            entries.drain().map(|(_, entry)| entry).collect()
        };
        join_all(drained.iter().map(|entry| entry.handle.teardown())).await;
    }
}

impl<T: Teardown + 'static> Default for RealtimeSubscriptionHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased release, so caller handles need not know the feed type.
#[async_trait]
pub(crate) trait Release: Send + Sync {
    async fn release_key(&self, key: &SubscriptionKey) -> bool;
}

#[async_trait]
impl<T: Teardown + 'static> Release for RealtimeSubscriptionHub<T> {
    async fn release_key(&self, key: &SubscriptionKey) -> bool {
        self.release(key).await
    }
}
