//! In-process realtime store.
//!
//! Behaves like the hosted document store the client talks to in
//! production: server-assigned timestamps, monotonic presence and read
//! cursors, atomic message appends, and push notifications to every open
//! query. Also offers seeding and fault-injection hooks for tests and the
//! simulator.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use duihua_common::new_id;
use serde_json::Value;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::debug;

use super::{MessageRange, RealtimeStore};
use crate::clock::{SharedClock, SystemClock};
use crate::conversation::conversation_id;
use crate::errors::ChatError;
use crate::types::{
    Conversation, Document, Message, PresenceRecord, PresenceState, Timestamp, UserProfile,
};

const MESSAGE_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct MessageLogState {
    messages: Vec<Message>,
    tx: broadcast::Sender<Message>,
}

impl MessageLogState {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            messages: Vec::new(),
            tx,
        }
    }
}

#[derive(Default)]
struct StoreState {
    presence: HashMap<String, watch::Sender<Option<Document>>>,
    presence_writes: u64,
    conversations: BTreeMap<String, Value>,
    membership: HashMap<String, watch::Sender<Vec<Document>>>,
    profiles: HashMap<String, Value>,
    logs: HashMap<String, MessageLogState>,
}

impl StoreState {
    fn presence_sender(&mut self, user_id: &str) -> &watch::Sender<Option<Document>> {
        self.presence
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
    }

    /// Every conversation document listing `member`, most recent first.
    fn membership_snapshot(&self, member: &str) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .conversations
            .iter()
            .filter(|(_, value)| members_of(value).iter().any(|m| m == member))
            .map(|(key, value)| Document::new(key.clone(), value.clone()))
            .collect();
        docs.sort_by(|a, b| {
            last_message_millis(&b.data)
                .cmp(&last_message_millis(&a.data))
                .then_with(|| a.key.cmp(&b.key))
        });
        docs
    }

    fn notify_members(&mut self, members: &[String]) {
        for member in members {
            if self.membership.contains_key(member) {
                let snapshot = self.membership_snapshot(member);
                if let Some(tx) = self.membership.get(member) {
                    tx.send_replace(snapshot);
                }
            }
        }
    }

    fn conversation(&self, conversation_id: &str) -> Result<Conversation, ChatError> {
        let value = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
        Conversation::from_document(&Document::new(conversation_id, value.clone()))
    }

    fn put_conversation(&mut self, conversation: &Conversation) {
        let doc = conversation.to_document();
        self.conversations.insert(doc.key, doc.data);
        self.notify_members(&conversation.members);
    }
}

fn members_of(value: &Value) -> Vec<String> {
    value
        .get("members")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn last_message_millis(value: &Value) -> Option<i64> {
    value.get("lastMessageTimestamp").and_then(Value::as_i64)
}

fn require_member(conversation: &Conversation, user_id: &str) -> Result<(), ChatError> {
    if conversation.has_member(user_id) {
        Ok(())
    } else {
        Err(ChatError::NotAMember {
            conversation_id: conversation.id.clone(),
            user_id: user_id.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    clock: SharedClock,
    state: RwLock<StoreState>,
    fail_presence_writes: AtomicBool,
    fail_profile_fetches: AtomicBool,
    fail_conversation_queries: AtomicBool,
    profile_latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            clock,
            state: RwLock::new(StoreState::default()),
            fail_presence_writes: AtomicBool::new(false),
            fail_profile_fetches: AtomicBool::new(false),
            fail_conversation_queries: AtomicBool::new(false),
            profile_latency_ms: AtomicU64::new(0),
        }
    }

    // -- seeding -----------------------------------------------------------

    pub async fn put_profile(&self, user_id: &str, profile: &UserProfile) {
        let value = serde_json::to_value(profile).unwrap_or(Value::Null);
        self.put_raw_profile(user_id, value).await;
    }

    pub async fn put_raw_profile(&self, user_id: &str, value: Value) {
        self.state
            .write()
            .await
            .profiles
            .insert(user_id.to_string(), value);
    }

    pub async fn remove_profile(&self, user_id: &str) {
        self.state.write().await.profiles.remove(user_id);
    }

    /// Insert a conversation document verbatim, bypassing validation.
    pub async fn put_raw_conversation(&self, key: &str, value: Value) {
        let mut state = self.state.write().await;
        let members = members_of(&value);
        state.conversations.insert(key.to_string(), value);
        state.notify_members(&members);
    }

    /// Insert a presence document verbatim, bypassing validation.
    pub async fn put_raw_presence(&self, user_id: &str, value: Value) {
        let mut state = self.state.write().await;
        state
            .presence_sender(user_id)
            .send_replace(Some(Document::new(user_id, value)));
    }

    // -- fault injection ---------------------------------------------------

    pub fn fail_presence_writes(&self, fail: bool) {
        self.fail_presence_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profile_fetches(&self, fail: bool) {
        self.fail_profile_fetches.store(fail, Ordering::SeqCst);
    }

    /// Make `watch_conversations` fail until cleared.
    pub fn fail_conversation_queries(&self, fail: bool) {
        self.fail_conversation_queries.store(fail, Ordering::SeqCst);
    }

    /// Delay every profile fetch by `latency`.
    pub fn set_profile_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.profile_latency_ms.store(millis, Ordering::SeqCst);
    }

    // -- inspection --------------------------------------------------------

    /// Number of successful presence writes so far.
    pub async fn presence_write_count(&self) -> u64 {
        self.state.read().await.presence_writes
    }

    /// Number of users that have a presence record.
    pub async fn presence_record_count(&self) -> usize {
        self.state
            .read()
            .await
            .presence
            .values()
            .filter(|tx| tx.borrow().is_some())
            .count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn write_presence(
        &self,
        user_id: &str,
        state: PresenceState,
    ) -> Result<PresenceRecord, ChatError> {
        if self.fail_presence_writes.load(Ordering::SeqCst) {
            return Err(ChatError::Transient(format!(
                "presence write for {user_id} rejected"
            )));
        }

        let now = self.clock.now();
        let mut store = self.state.write().await;
        let tx = store.presence_sender(user_id);
        let previous = tx
            .borrow()
            .as_ref()
            .and_then(|doc| PresenceRecord::from_document(doc).ok())
            .and_then(|record| record.last_seen);
        let record = PresenceRecord {
            state: Some(state),
            last_seen: Some(previous.map_or(now, |prev| prev.max(now))),
        };
        let data = serde_json::to_value(&record).unwrap_or(Value::Null);
        tx.send_replace(Some(Document::new(user_id, data)));
        store.presence_writes += 1;
        Ok(record)
    }

    async fn read_presence(&self, user_id: &str) -> Result<Option<Document>, ChatError> {
        let store = self.state.read().await;
        Ok(store
            .presence
            .get(user_id)
            .and_then(|tx| tx.borrow().clone()))
    }

    async fn watch_presence(
        &self,
        user_id: &str,
    ) -> Result<watch::Receiver<Option<Document>>, ChatError> {
        let mut store = self.state.write().await;
        Ok(store.presence_sender(user_id).subscribe())
    }

    async fn create_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation, ChatError> {
        let id = conversation_id(user_a, user_b)?;
        let mut store = self.state.write().await;
        if store.conversations.contains_key(&id) {
            return store.conversation(&id);
        }

        let now = self.clock.now();
        let mut members = vec![user_a.to_string(), user_b.to_string()];
        members.sort();
        let conversation = Conversation {
            id: id.clone(),
            last_read: members.iter().map(|m| (m.clone(), now)).collect(),
            members,
            last_message: None,
            last_message_timestamp: None,
        };
        store.put_conversation(&conversation);
        debug!(conversation_id = %id, "Created conversation");
        Ok(conversation)
    }

    async fn read_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Document>, ChatError> {
        let store = self.state.read().await;
        Ok(store
            .conversations
            .get(conversation_id)
            .map(|value| Document::new(conversation_id, value.clone())))
    }

    async fn watch_conversations(
        &self,
        member: &str,
    ) -> Result<watch::Receiver<Vec<Document>>, ChatError> {
        if self.fail_conversation_queries.load(Ordering::SeqCst) {
            return Err(ChatError::Transient(format!(
                "conversation query for {member} failed"
            )));
        }
        let mut store = self.state.write().await;
        let snapshot = store.membership_snapshot(member);
        let tx = store
            .membership
            .entry(member.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        tx.send_replace(snapshot);
        Ok(tx.subscribe())
    }

    async fn set_last_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        at: Timestamp,
    ) -> Result<Timestamp, ChatError> {
        let now = self.clock.now();
        let mut store = self.state.write().await;
        let mut conversation = store.conversation(conversation_id)?;
        require_member(&conversation, user_id)?;

        // A cursor never runs ahead of the store clock or the newest message.
        let ceiling = conversation
            .last_message_timestamp
            .map_or(now, |last| last.max(now));
        let current = conversation.last_read_by(user_id);
        let requested = at.min(ceiling);
        let effective = current.map_or(requested, |cur| cur.max(requested));
        if current != Some(effective) {
            conversation.last_read.insert(user_id.to_string(), effective);
            store.put_conversation(&conversation);
        }
        Ok(effective)
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>, ChatError> {
        let latency = self.profile_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_profile_fetches.load(Ordering::SeqCst) {
            return Err(ChatError::Transient(format!(
                "profile fetch for {user_id} failed"
            )));
        }

        let store = self.state.read().await;
        store
            .profiles
            .get(user_id)
            .map(|value| UserProfile::from_document(&Document::new(user_id, value.clone())))
            .transpose()
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<Message, ChatError> {
        let now = self.clock.now();
        let mut store = self.state.write().await;
        let mut conversation = store.conversation(conversation_id)?;
        require_member(&conversation, sender_id)?;

        let log = store
            .logs
            .entry(conversation_id.to_string())
            .or_insert_with(MessageLogState::new);
        // New messages sort after every prior message and read cursor.
        let floor = log
            .messages
            .last()
            .map(|m| m.sent_at)
            .into_iter()
            .chain(conversation.last_message_timestamp)
            .chain(conversation.last_read.values().copied())
            .max();
        let sent_at = match floor {
            Some(last) if now <= last => last
                .as_millis()
                .checked_add(1)
                .map(Timestamp)
                .ok_or_else(|| {
                    ChatError::Transient(format!(
                        "no timestamp after {last} in {conversation_id}"
                    ))
                })?,
            _ => now,
        };

        let message = Message {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            sent_at,
        };
        log.messages.push(message.clone());
        let _ = log.tx.send(message.clone());

        conversation.last_message = Some(body.to_string());
        conversation.last_message_timestamp = Some(sent_at);
        let read = conversation
            .last_read_by(sender_id)
            .map_or(sent_at, |prev| prev.max(sent_at));
        conversation.last_read.insert(sender_id.to_string(), read);
        store.put_conversation(&conversation);

        Ok(message)
    }

    async fn messages(
        &self,
        conversation_id: &str,
        range: MessageRange,
    ) -> Result<Vec<Message>, ChatError> {
        let store = self.state.read().await;
        if !store.conversations.contains_key(conversation_id) {
            return Err(ChatError::ConversationNotFound(conversation_id.to_string()));
        }
        let mut messages: Vec<Message> = store
            .logs
            .get(conversation_id)
            .map(|log| {
                log.messages
                    .iter()
                    .filter(|m| range.contains(m.sent_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        messages.sort_by_key(|m| m.sent_at);
        if let Some(limit) = range.limit {
            let skip = messages.len().saturating_sub(limit);
            messages.drain(..skip);
        }
        Ok(messages)
    }

    async fn watch_messages(
        &self,
        conversation_id: &str,
    ) -> Result<broadcast::Receiver<Message>, ChatError> {
        let mut store = self.state.write().await;
        if !store.conversations.contains_key(conversation_id) {
            return Err(ChatError::ConversationNotFound(conversation_id.to_string()));
        }
        let log = store
            .logs
            .entry(conversation_id.to_string())
            .or_insert_with(MessageLogState::new);
        Ok(log.tx.subscribe())
    }
}
