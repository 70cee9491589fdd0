//! Validation for the presence, conversations, and messages sections.

use crate::schema::DuihuaConfig;

use super::helpers::validate_range;

/// Validate presence constraints.
pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &DuihuaConfig) {
    let presence = &config.presence;
    validate_range(
        errors,
        "presence.heartbeat_interval",
        presence.heartbeat_interval,
        5,
        3600,
    );
    validate_range(
        errors,
        "presence.status_refresh_interval",
        presence.status_refresh_interval,
        1,
        3600,
    );
    if presence.stale_after != 0 && presence.stale_after < presence.heartbeat_interval {
        errors.push(format!(
            "presence.stale_after = {} must be 0 or at least presence.heartbeat_interval ({})",
            presence.stale_after, presence.heartbeat_interval
        ));
    }
}

/// Validate conversation list constraints.
pub(crate) fn validate_conversations(errors: &mut Vec<String>, config: &DuihuaConfig) {
    let conversations = &config.conversations;
    if conversations.placeholder_display_name.trim().is_empty() {
        errors.push("conversations.placeholder_display_name must not be empty".into());
    }
    validate_range(
        errors,
        "conversations.profile_fetch_timeout_ms",
        conversations.profile_fetch_timeout_ms,
        100,
        60_000,
    );
    validate_range(
        errors,
        "conversations.retry_delay_ms",
        conversations.retry_delay_ms,
        10,
        60_000,
    );
    if conversations.max_retry_delay_ms < conversations.retry_delay_ms {
        errors.push(format!(
            "conversations.max_retry_delay_ms = {} is below conversations.retry_delay_ms ({})",
            conversations.max_retry_delay_ms, conversations.retry_delay_ms
        ));
    }
}

/// Validate message history constraints.
pub(crate) fn validate_messages(errors: &mut Vec<String>, config: &DuihuaConfig) {
    validate_range(
        errors,
        "messages.history_limit",
        config.messages.history_limit,
        1,
        5000,
    );
}
