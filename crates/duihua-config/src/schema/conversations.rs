//! Conversation list and message history configuration types.

use serde::{Deserialize, Serialize};

/// Conversation list materialization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationsConfig {
    /// Display name shown when a counterpart profile cannot be resolved.
    pub placeholder_display_name: String,
    /// Avatar shown when a counterpart profile cannot be resolved.
    pub placeholder_photo_url: String,
    /// Profile fetch timeout in milliseconds (valid range: 100-60000).
    pub profile_fetch_timeout_ms: u32,
    /// Base delay before re-opening a failed store query, in milliseconds.
    pub retry_delay_ms: u32,
    /// Upper bound for the exponential retry delay, in milliseconds.
    pub max_retry_delay_ms: u32,
}

impl Default for ConversationsConfig {
    fn default() -> Self {
        Self {
            placeholder_display_name: "unknown user".into(),
            placeholder_photo_url: "/images/default-avatar.png".into(),
            profile_fetch_timeout_ms: 5000,
            retry_delay_ms: 500,
            max_retry_delay_ms: 30_000,
        }
    }
}

/// Message stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Messages loaded when a conversation is opened (valid range: 1-5000).
    pub history_limit: u32,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self { history_limit: 200 }
    }
}
