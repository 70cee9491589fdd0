use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Application-level notifications published by the chat core.
///
/// These are coarse signals for UI glue (badges, toasts); the detailed
/// state travels through the subscription callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    PresenceChanged { user_id: String, status: String },
    ConversationListUpdated { viewer_id: String, conversations: usize },
    UnreadTotalChanged { viewer_id: String, total: usize },
    MessageReceived { conversation_id: String, message_id: String },
    Shutdown,
    #[serde(other)]
    Unknown,
}

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
