//! Pure join of conversations, profiles, and read cursors into list rows.

use std::cmp::Reverse;
use std::collections::HashMap;

use super::unread::is_unread;
use crate::types::{Conversation, ConversationViewModel, UserProfile};

/// Build the viewer's conversation list.
///
/// Rows are ordered by last message time (newest first, conversations
/// without messages last), then by conversation id. Counterparts missing
/// from `profiles` get `placeholder`. Conversations the viewer is not a
/// member of are left out.
pub fn materialize(
    viewer_id: &str,
    conversations: &[Conversation],
    profiles: &HashMap<String, UserProfile>,
    placeholder: &UserProfile,
) -> Vec<ConversationViewModel> {
    let mut rows: Vec<ConversationViewModel> = conversations
        .iter()
        .filter_map(|conversation| {
            let counterpart_id = conversation.counterpart_of(viewer_id)?;
            let (counterpart, profile_resolved) = match profiles.get(counterpart_id) {
                Some(profile) => (profile.clone(), true),
                None => (placeholder.clone(), false),
            };
            Some(ConversationViewModel {
                conversation_id: conversation.id.clone(),
                counterpart_id: counterpart_id.to_string(),
                counterpart,
                profile_resolved,
                last_message: conversation.last_message.clone(),
                last_message_timestamp: conversation.last_message_timestamp,
                is_unread: is_unread(conversation, viewer_id),
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        Reverse(a.last_message_timestamp)
            .cmp(&Reverse(b.last_message_timestamp))
            .then_with(|| a.conversation_id.cmp(&b.conversation_id))
    });
    rows
}
