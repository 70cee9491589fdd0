//! Record types shared by the store, presence, and conversation modules.
//!
//! Store documents use camelCase field names; these types parse them with
//! serde and reject documents that are missing required fields.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ChatError;

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Server timestamp in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, clamped at zero.
    pub fn since(self, earlier: Timestamp) -> Duration {
        let millis = self.0.saturating_sub(earlier.0).max(0);
        Duration::from_millis(millis as u64)
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// A raw keyed document as delivered by the realtime store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub data: serde_json::Value,
}

impl Document {
    pub fn new(key: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            data,
        }
    }

    fn parse<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ChatError> {
        serde_json::from_value(self.data.clone()).map_err(|e| ChatError::MalformedRecord {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Presence state as written by the owning user's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Per-user presence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PresenceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Timestamp>,
}

impl PresenceRecord {
    pub fn from_document(doc: &Document) -> Result<Self, ChatError> {
        doc.parse()
    }
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// A two-party conversation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(skip)]
    pub id: String,
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_timestamp: Option<Timestamp>,
    #[serde(default)]
    pub last_read: BTreeMap<String, Timestamp>,
}

impl Conversation {
    /// Parse a conversation document, enforcing exactly two distinct members.
    pub fn from_document(doc: &Document) -> Result<Self, ChatError> {
        let mut conversation: Conversation = doc.parse()?;
        match conversation.members.as_slice() {
            [a, b] if a != b && !a.is_empty() && !b.is_empty() => {}
            members => {
                return Err(ChatError::MalformedRecord {
                    key: doc.key.clone(),
                    reason: format!("expected two distinct members, got {members:?}"),
                })
            }
        }
        conversation.id = doc.key.clone();
        Ok(conversation)
    }

    pub fn to_document(&self) -> Document {
        let data = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        Document::new(self.id.clone(), data)
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    /// The other participant, if `user_id` is a member.
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if !self.has_member(user_id) {
            return None;
        }
        self.members
            .iter()
            .find(|m| m.as_str() != user_id)
            .map(String::as_str)
    }

    pub fn last_read_by(&self, user_id: &str) -> Option<Timestamp> {
        self.last_read.get(user_id).copied()
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single message in a conversation's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub sent_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Public profile of a user, owned by the profile service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: String,
    #[serde(default)]
    pub bio: String,
}

impl UserProfile {
    pub fn new(display_name: impl Into<String>, photo_url: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            photo_url: photo_url.into(),
            bio: String::new(),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self, ChatError> {
        doc.parse()
    }
}

// ---------------------------------------------------------------------------
// View models
// ---------------------------------------------------------------------------

/// One row of a viewer's conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationViewModel {
    pub conversation_id: String,
    pub counterpart_id: String,
    pub counterpart: UserProfile,
    /// `false` while the profile is loading or after it failed to resolve.
    pub profile_resolved: bool,
    pub last_message: Option<String>,
    pub last_message_timestamp: Option<Timestamp>,
    pub is_unread: bool,
}
