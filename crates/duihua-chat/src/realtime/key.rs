use std::fmt;

/// Identity of a shared subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionKey {
    /// Presence record of one user.
    Presence(String),
    /// Materialized conversation list of one viewer.
    ConversationList(String),
    /// Message log of one conversation.
    MessageStream(String),
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::Presence(id) => write!(f, "presence:{id}"),
            SubscriptionKey::ConversationList(id) => write!(f, "conversations:{id}"),
            SubscriptionKey::MessageStream(id) => write!(f, "messages:{id}"),
        }
    }
}
