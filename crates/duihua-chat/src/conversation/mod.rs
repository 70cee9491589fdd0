//! Conversations: identity, per-viewer lists, unread state, and message logs.

mod ids;
mod index;
mod materialize;
mod messages;
mod profiles;
mod unread;

#[cfg(test)]
mod tests;

pub use ids::conversation_id;
pub use index::{ConversationIndex, ConversationListSubscription, IndexConfig};
pub use materialize::materialize;
pub use messages::MessageLog;
pub use profiles::ProfileCache;
pub use unread::{is_unread, unread_count, UnreadAggregator};

pub(crate) use messages::run_message_stream;
