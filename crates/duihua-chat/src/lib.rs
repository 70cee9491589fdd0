//! Core of the duihua private-messaging subsystem.
//!
//! Presence tracking, per-viewer conversation lists joined with profiles,
//! unread state from read cursors, and message streams, all driven by push
//! notifications from a [`RealtimeStore`].

pub mod client;
pub mod clock;
pub mod conversation;
pub mod errors;
pub mod presence;
pub mod realtime;
pub mod store;
pub mod types;

pub use client::{ChatClient, ChatClientConfig};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use conversation::{
    conversation_id, is_unread, materialize, ConversationIndex, ConversationListSubscription,
    IndexConfig, MessageLog, ProfileCache, UnreadAggregator,
};
pub use errors::ChatError;
pub use presence::{
    derive_status, derive_status_with_timeout, PresenceStatus, PresenceStore, PresenceTracker,
    PresenceView, TrackerConfig, WatchConfig,
};
pub use realtime::{RealtimeSubscriptionHub, Subscription, SubscriptionKey};
pub use store::{MemoryStore, MessageRange, RealtimeStore, SharedStore};
pub use types::{
    Conversation, ConversationViewModel, Document, Message, PresenceRecord, PresenceState,
    Timestamp, UserProfile,
};
