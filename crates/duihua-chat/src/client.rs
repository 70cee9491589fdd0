//! Client facade tying presence, conversation lists, unread totals, and
//! message streams to one store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use duihua_common::{Event, EventBus};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::conversation::{
    run_message_stream, ConversationIndex, ConversationListSubscription, IndexConfig,
    UnreadAggregator,
};
use crate::errors::ChatError;
use crate::presence::{
    derive_status_with_timeout, run_presence_watch, PresenceStatus, PresenceStore,
    PresenceTracker, PresenceView, TrackerConfig, WatchConfig,
};
use crate::realtime::{
    spawn_forwarder, Feed, RealtimeSubscriptionHub, Release, Subscription, SubscriptionKey,
    TaskGuard, Teardown,
};
use crate::store::{MessageRange, SharedStore};
use crate::types::{Conversation, ConversationViewModel, Message, Timestamp};

type PresenceHub = RealtimeSubscriptionHub<Feed<PresenceView>>;
type ListHub = RealtimeSubscriptionHub<Feed<Vec<ConversationViewModel>>>;
type MessageHub = RealtimeSubscriptionHub<Feed<Vec<Message>>>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub tracker: TrackerConfig,
    pub index: IndexConfig,
    pub presence_watch: WatchConfig,
    /// Messages loaded when a message stream opens.
    pub history_limit: usize,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            index: IndexConfig::default(),
            presence_watch: WatchConfig::default(),
            history_limit: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One signed-in session's view of the chat store.
///
/// Live subscriptions are shared per key: any number of callers watching
/// the same user, conversation list, or conversation share one underlying
/// store subscription.
pub struct ChatClient {
    store: SharedStore,
    clock: SharedClock,
    config: ChatClientConfig,
    presence: PresenceStore,
    tracker: Mutex<PresenceTracker>,
    index: ConversationIndex,
    presence_hub: Arc<PresenceHub>,
    list_hub: Arc<ListHub>,
    message_hub: Arc<MessageHub>,
    unread: UnreadAggregator,
    events: Option<Arc<EventBus>>,
}

impl ChatClient {
    pub fn new(store: SharedStore, clock: SharedClock, config: ChatClientConfig) -> Self {
        let presence = PresenceStore::new(Arc::clone(&store));
        let tracker = PresenceTracker::new(presence.clone(), config.tracker.clone());
        let index = ConversationIndex::new(Arc::clone(&store), config.index.clone());
        Self {
            store,
            clock,
            config,
            presence,
            tracker: Mutex::new(tracker),
            index,
            presence_hub: Arc::new(PresenceHub::new()),
            list_hub: Arc::new(ListHub::new()),
            message_hub: Arc::new(MessageHub::new()),
            unread: UnreadAggregator::new(),
            events: None,
        }
    }

    /// Publish coarse notifications to `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    // -- presence ----------------------------------------------------------

    /// Deliver `user_id`'s presence view to `on_update` whenever the
    /// derived status changes.
    pub async fn subscribe_presence<F>(&self, user_id: &str, on_update: F) -> Subscription
    where
        F: Fn(PresenceView) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::Presence(user_id.to_string());
        let feed = self
            .presence_hub
            .acquire(key.clone(), || {
                let (tx, rx) = watch::channel(None);
                let cancel = CancellationToken::new();
                let events = self.events.clone();
                tokio::spawn(run_presence_watch(
                    self.presence.clone(),
                    user_id.to_string(),
                    Arc::clone(&self.clock),
                    self.config.presence_watch.clone(),
                    tx,
                    cancel.clone(),
                    move |view: &PresenceView| {
                        if let Some(bus) = &events {
                            bus.publish(Event::PresenceChanged {
                                user_id: view.user_id.clone(),
                                status: view.status.to_string(),
                            });
                        }
                    },
                ));
                Feed::new(rx, Box::new(TaskGuard::new(cancel)))
            })
            .await;

        let forwarder = spawn_forwarder(feed.receiver(), on_update);
        let hub: Arc<dyn Release> = self.presence_hub.clone();
        Subscription::new(key, hub, forwarder)
    }

    /// One-shot status of `user_id` at the client's clock.
    pub async fn presence_status(&self, user_id: &str) -> Result<PresenceStatus, ChatError> {
        let record = self.presence.get(user_id).await?;
        Ok(derive_status_with_timeout(
            record.as_ref(),
            self.clock.now(),
            self.config.presence_watch.stale_after,
        ))
    }

    /// Keep `user_id` marked online from this session.
    pub async fn start_heartbeat(&self, user_id: &str) {
        self.tracker.lock().await.start_tracking(user_id).await;
    }

    /// Stop heartbeats and mark the tracked user offline.
    pub async fn stop_heartbeat(&self) {
        self.tracker.lock().await.stop_tracking().await;
    }

    // -- conversation lists ------------------------------------------------

    /// Deliver `viewer_id`'s sorted conversation list to `on_update` on every
    /// change. Also keeps the viewer's unread total current.
    pub async fn subscribe_conversation_list<F>(
        &self,
        viewer_id: &str,
        on_update: F,
    ) -> Subscription
    where
        F: Fn(Vec<ConversationViewModel>) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::ConversationList(viewer_id.to_string());
        let feed = self
            .list_hub
            .acquire(key.clone(), || {
                let (tx, rx) = watch::channel(None);
                let unread = self.unread.clone();
                let events = self.events.clone();
                let viewer = viewer_id.to_string();
                let subscription = self.index.subscribe(viewer_id, move |list| {
                    let previous = unread.total(&viewer);
                    let total = unread.record(&viewer, &list);
                    if let Some(bus) = &events {
                        bus.publish(Event::ConversationListUpdated {
                            viewer_id: viewer.clone(),
                            conversations: list.len(),
                        });
                        if total != previous {
                            bus.publish(Event::UnreadTotalChanged {
                                viewer_id: viewer.clone(),
                                total,
                            });
                        }
                    }
                    tx.send_replace(Some(list));
                });
                let stop = ListFeedStop {
                    subscription,
                    unread: self.unread.clone(),
                };
                Feed::new(rx, Box::new(stop))
            })
            .await;

        let forwarder = spawn_forwarder(feed.receiver(), on_update);
        let hub: Arc<dyn Release> = self.list_hub.clone();
        Subscription::new(key, hub, forwarder)
    }

    /// Number of unread conversations of `viewer_id`, as of the last list
    /// emission. Zero without an open list subscription.
    pub fn unread_total(&self, viewer_id: &str) -> usize {
        self.unread.total(viewer_id)
    }

    pub fn watch_unread_totals(&self) -> watch::Receiver<BTreeMap<String, usize>> {
        self.unread.watch()
    }

    // -- conversations -----------------------------------------------------

    /// Create the conversation between two users, or return the existing one.
    pub async fn open_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation, ChatError> {
        self.store.create_conversation(user_a, user_b).await
    }

    /// Advance `user_id`'s read cursor. Stale timestamps are ignored and
    /// future ones are capped at the store's time; the effective cursor is
    /// returned.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        at: Timestamp,
    ) -> Result<Timestamp, ChatError> {
        let effective = self.store.set_last_read(conversation_id, user_id, at).await?;
        debug!(conversation_id, user_id, at = %effective, "Marked read");
        Ok(effective)
    }

    /// Whether `user_id` has an unseen message, read fresh from the store.
    pub async fn is_unread(&self, conversation_id: &str, user_id: &str) -> Result<bool, ChatError> {
        let conversation = self.conversation(conversation_id).await?;
        if !conversation.has_member(user_id) {
            return Err(ChatError::NotAMember {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(crate::conversation::is_unread(&conversation, user_id))
    }

    async fn conversation(&self, conversation_id: &str) -> Result<Conversation, ChatError> {
        let doc = self
            .store
            .read_conversation(conversation_id)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
        Conversation::from_document(&doc)
    }

    // -- messages ----------------------------------------------------------

    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<Message, ChatError> {
        let message = self
            .store
            .append_message(conversation_id, sender_id, body)
            .await?;
        debug!(conversation_id, message_id = %message.id, "Message sent");
        Ok(message)
    }

    /// Deliver the conversation's ordered message log to `on_update`: the
    /// latest `history_limit` messages, then again after every append.
    pub async fn subscribe_messages<F>(&self, conversation_id: &str, on_update: F) -> Subscription
    where
        F: Fn(Vec<Message>) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::MessageStream(conversation_id.to_string());
        let feed = self
            .message_hub
            .acquire(key.clone(), || {
                let (tx, rx) = watch::channel(None);
                let cancel = CancellationToken::new();
                let events = self.events.clone();
                tokio::spawn(run_message_stream(
                    Arc::clone(&self.store),
                    conversation_id.to_string(),
                    self.config.history_limit,
                    tx,
                    cancel.clone(),
                    move |message: &Message| {
                        if let Some(bus) = &events {
                            bus.publish(Event::MessageReceived {
                                conversation_id: message.conversation_id.clone(),
                                message_id: message.id.clone(),
                            });
                        }
                    },
                ));
                Feed::new(rx, Box::new(TaskGuard::new(cancel)))
            })
            .await;

        let forwarder = spawn_forwarder(feed.receiver(), on_update);
        let hub: Arc<dyn Release> = self.message_hub.clone();
        Subscription::new(key, hub, forwarder)
    }

    /// Up to `limit` messages sent strictly before `before`, oldest first.
    pub async fn history(
        &self,
        conversation_id: &str,
        before: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let range = MessageRange {
            after: None,
            before,
            limit: Some(limit),
        };
        self.store.messages(conversation_id, range).await
    }

    // -- lifecycle ---------------------------------------------------------

    /// Number of live shared subscriptions across all kinds.
    pub async fn live_feeds(&self) -> usize {
        self.presence_hub.len().await + self.list_hub.len().await + self.message_hub.len().await
    }

    /// Stop heartbeats and tear down every live subscription.
    pub async fn shutdown(&self) {
        self.stop_heartbeat().await;
        tokio::join!(
            self.presence_hub.shutdown(),
            self.list_hub.shutdown(),
            self.message_hub.shutdown(),
        );
        if let Some(bus) = &self.events {
            bus.publish(Event::Shutdown);
        }
        info!("Chat client shut down");
    }
}

/// Stops a conversation-list feed and drops the viewer's unread total.
struct ListFeedStop {
    subscription: ConversationListSubscription,
    unread: UnreadAggregator,
}

#[async_trait]
impl Teardown for ListFeedStop {
    async fn teardown(&self) {
        self.subscription.unsubscribe().await;
        self.unread.forget(self.subscription.viewer_id());
    }
}
