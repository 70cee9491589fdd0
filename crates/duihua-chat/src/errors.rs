use duihua_common::DuihuaError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The store is unreachable or refused the operation; retrying later may succeed.
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("no profile found for counterpart {user_id}")]
    MissingCounterpart { user_id: String },

    #[error("malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("user {user_id} is not a member of conversation {conversation_id}")]
    NotAMember {
        conversation_id: String,
        user_id: String,
    },

    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error("invalid participants: {0}")]
    InvalidParticipants(String),
}

impl ChatError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }
}

impl From<ChatError> for DuihuaError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Transient(msg) => DuihuaError::Store(msg),
            other => DuihuaError::Chat(other.to_string()),
        }
    }
}
