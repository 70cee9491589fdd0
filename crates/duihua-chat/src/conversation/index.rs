//! Live, per-viewer conversation lists.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::materialize::materialize;
use super::profiles::ProfileCache;
use crate::errors::ChatError;
use crate::realtime::{CallbackSlot, Teardown};
use crate::store::SharedStore;
use crate::types::{Conversation, ConversationViewModel, Document, UserProfile};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Shown for counterparts whose profile cannot be resolved.
    pub placeholder: UserProfile,
    pub profile_fetch_timeout: Duration,
    /// Base delay before re-opening a failed membership query.
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            placeholder: UserProfile::new("unknown user", "/images/default-avatar.png"),
            profile_fetch_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Materializes each viewer's conversation list from the store's
/// membership query, joined with counterpart profiles.
pub struct ConversationIndex {
    store: SharedStore,
    profiles: ProfileCache,
    config: IndexConfig,
}

impl ConversationIndex {
    pub fn new(store: SharedStore, config: IndexConfig) -> Self {
        Self {
            store,
            profiles: ProfileCache::new(),
            config,
        }
    }

    pub fn profiles(&self) -> &ProfileCache {
        &self.profiles
    }

    /// Start delivering `viewer_id`'s conversation list to `on_update`.
    ///
    /// The full sorted list is delivered on every change to a conversation
    /// document or when a counterpart profile arrives.
    pub fn subscribe<F>(&self, viewer_id: &str, on_update: F) -> ConversationListSubscription
    where
        F: Fn(Vec<ConversationViewModel>) + Send + Sync + 'static,
    {
        let slot = CallbackSlot::new(on_update);
        let cancel = CancellationToken::new();

        let task = ListTask {
            viewer_id: viewer_id.to_string(),
            store: Arc::clone(&self.store),
            profiles: self.profiles.clone(),
            config: self.config.clone(),
            slot: slot.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        ConversationListSubscription {
            viewer_id: viewer_id.to_string(),
            slot,
            cancel,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription handle
// ---------------------------------------------------------------------------

pub struct ConversationListSubscription {
    viewer_id: String,
    slot: CallbackSlot<Vec<ConversationViewModel>>,
    cancel: CancellationToken,
}

impl ConversationListSubscription {
    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    /// Stop updates and abandon in-flight profile fetches. The callback is
    /// never invoked after this returns.
    pub async fn unsubscribe(&self) {
        self.slot.close().await;
        self.cancel.cancel();
        debug!(viewer_id = %self.viewer_id, "Conversation list unsubscribed");
    }
}

#[async_trait]
impl Teardown for ConversationListSubscription {
    async fn teardown(&self) {
        self.unsubscribe().await;
    }
}

impl Drop for ConversationListSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

struct ProfileOutcome {
    user_id: String,
    result: Result<UserProfile, ChatError>,
}

struct ListTask {
    viewer_id: String,
    store: SharedStore,
    profiles: ProfileCache,
    config: IndexConfig,
    slot: CallbackSlot<Vec<ConversationViewModel>>,
    cancel: CancellationToken,
}

impl ListTask {
    async fn run(self) {
        let Some(mut rx) = self.open_query().await else {
            return;
        };
        let (resolved_tx, mut resolved_rx) = mpsc::channel::<ProfileOutcome>(64);
        let mut pending: HashSet<String> = HashSet::new();

        let docs = rx.borrow_and_update().clone();
        let mut conversations = self.parse(&docs);
        self.request_profiles(&conversations, &mut pending, &resolved_tx)
            .await;

        loop {
            if !self.emit(&conversations).await {
                break;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        debug!(viewer_id = %self.viewer_id, "Membership query closed by store");
                        break;
                    }
                    let docs = rx.borrow_and_update().clone();
                    conversations = self.parse(&docs);
                    self.request_profiles(&conversations, &mut pending, &resolved_tx)
                        .await;
                }
                Some(outcome) = resolved_rx.recv() => {
                    pending.remove(&outcome.user_id);
                    match outcome.result {
                        Ok(profile) => self.profiles.insert(&outcome.user_id, profile).await,
                        Err(e) => {
                            warn!(
                                viewer_id = %self.viewer_id,
                                user_id = %outcome.user_id,
                                error = %e,
                                "Counterpart profile unavailable, showing placeholder"
                            );
                            continue;
                        }
                    }
                }
            }
        }
    }

    /// Open the membership query, retrying with backoff until it succeeds
    /// or the subscription is cancelled.
    async fn open_query(&self) -> Option<watch::Receiver<Vec<Document>>> {
        let mut delay = self.config.retry_delay;
        loop {
            match self.store.watch_conversations(&self.viewer_id).await {
                Ok(rx) => return Some(rx),
                Err(e) => {
                    warn!(
                        viewer_id = %self.viewer_id,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Conversation query failed"
                    );
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(self.config.max_retry_delay);
        }
    }

    /// Parse membership documents, skipping malformed ones.
    fn parse(&self, docs: &[Document]) -> Vec<Conversation> {
        docs.iter()
            .filter_map(|doc| match Conversation::from_document(doc) {
                Ok(conversation) if conversation.has_member(&self.viewer_id) => Some(conversation),
                Ok(_) => None,
                Err(e) => {
                    warn!(key = %doc.key, error = %e, "Skipping malformed conversation record");
                    None
                }
            })
            .collect()
    }

    /// Start a fetch for every counterpart that is neither cached nor
    /// already being fetched.
    async fn request_profiles(
        &self,
        conversations: &[Conversation],
        pending: &mut HashSet<String>,
        resolved_tx: &mpsc::Sender<ProfileOutcome>,
    ) {
        for conversation in conversations {
            let Some(counterpart) = conversation.counterpart_of(&self.viewer_id) else {
                continue;
            };
            if pending.contains(counterpart) || self.profiles.get(counterpart).await.is_some() {
                continue;
            }
            pending.insert(counterpart.to_string());
            self.spawn_fetch(counterpart.to_string(), resolved_tx.clone());
        }
    }

    fn spawn_fetch(&self, user_id: String, resolved_tx: mpsc::Sender<ProfileOutcome>) {
        let store = Arc::clone(&self.store);
        let token = self.cancel.child_token();
        let timeout = self.config.profile_fetch_timeout;

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                fetched = tokio::time::timeout(timeout, store.fetch_profile(&user_id)) => {
                    match fetched {
                        Ok(Ok(Some(profile))) => Ok(profile),
                        Ok(Ok(None)) => Err(ChatError::MissingCounterpart {
                            user_id: user_id.clone(),
                        }),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(ChatError::Transient(format!(
                            "profile fetch for {user_id} timed out"
                        ))),
                    }
                }
            };
            if token.is_cancelled() {
                return;
            }
            let _ = resolved_tx.send(ProfileOutcome { user_id, result }).await;
        });
    }

    /// Deliver the current list. Returns `false` once the subscriber is gone.
    async fn emit(&self, conversations: &[Conversation]) -> bool {
        let counterparts = conversations
            .iter()
            .filter_map(|c| c.counterpart_of(&self.viewer_id));
        let profiles = self.profiles.get_many(counterparts).await;
        let rows = materialize(
            &self.viewer_id,
            conversations,
            &profiles,
            &self.config.placeholder,
        );
        self.slot.deliver(rows).await
    }
}
