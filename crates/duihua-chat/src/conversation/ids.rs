//! Canonical conversation ids.

use crate::errors::ChatError;

const SEPARATOR: char = '_';

/// Derive the id of the conversation between two users.
///
/// The pair is unordered: both participants resolve to the same id. User
/// ids containing the separator are rejected so distinct pairs never share
/// an id.
pub fn conversation_id(user_a: &str, user_b: &str) -> Result<String, ChatError> {
    if user_a.is_empty() || user_b.is_empty() {
        return Err(ChatError::InvalidParticipants(
            "user ids must not be empty".into(),
        ));
    }
    if let Some(user) = [user_a, user_b].into_iter().find(|u| u.contains(SEPARATOR)) {
        return Err(ChatError::InvalidParticipants(format!(
            "user id {user:?} must not contain {SEPARATOR:?}"
        )));
    }
    if user_a == user_b {
        return Err(ChatError::InvalidParticipants(format!(
            "{user_a} cannot open a conversation with themselves"
        )));
    }
    let (first, second) = if user_a < user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    Ok(format!("{first}{SEPARATOR}{second}"))
}
