//! Scripted two-user session against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use duihua_chat::{
    ChatClient, ChatClientConfig, MemoryStore, SystemClock, Timestamp, UserProfile,
};
use duihua_common::{DuihuaError, Event, EventBus};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const SETTLE: Duration = Duration::from_millis(200);

pub struct Script {
    pub messages: usize,
}

impl Script {
    /// Run the session and return a summary of what each side observed.
    pub async fn run(&self, config: ChatClientConfig) -> Result<Value, DuihuaError> {
        let store = Arc::new(MemoryStore::new());
        store
            .put_profile("alice", &UserProfile::new("Alice", "/images/alice.png"))
            .await;
        store
            .put_profile("bob", &UserProfile::new("Bob", "/images/bob.png"))
            .await;

        let bus = Arc::new(EventBus::new(256));
        let mut events = bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    Event::Shutdown => break,
                    other => debug!(event = ?other, "Event"),
                }
            }
        });

        let client = ChatClient::new(store, Arc::new(SystemClock), config).with_events(bus);

        let alice_presence = client
            .subscribe_presence("alice", |view| {
                info!(user_id = %view.user_id, status = %view.status, "Presence");
            })
            .await;
        let bob_list = client
            .subscribe_conversation_list("bob", |rows| {
                for row in &rows {
                    info!(
                        viewer = "bob",
                        with = %row.counterpart.display_name,
                        last = row.last_message.as_deref().unwrap_or(""),
                        unread = row.is_unread,
                        "Conversation row"
                    );
                }
            })
            .await;

        client.start_heartbeat("alice").await;
        let conversation = client.open_conversation("alice", "bob").await?;
        let stream = client
            .subscribe_messages(&conversation.id, |log| {
                debug!(messages = log.len(), "Message log updated");
            })
            .await;

        let mut last_sent = Timestamp::default();
        for n in 0..self.messages {
            let (sender, body) = if n % 2 == 0 {
                ("alice", format!("你好 #{n}"))
            } else {
                ("bob", format!("reply #{n}"))
            };
            let message = client.send_message(&conversation.id, sender, &body).await?;
            last_sent = message.sent_at;
        }
        tokio::time::sleep(SETTLE).await;

        let unread_before = client.unread_total("bob");
        let bob_unread = client.is_unread(&conversation.id, "bob").await?;
        client.mark_read(&conversation.id, "bob", last_sent).await?;
        tokio::time::sleep(SETTLE).await;
        let unread_after = client.unread_total("bob");
        if unread_after != 0 {
            warn!(unread_after, "Unread total did not clear after mark_read");
        }

        let online = client.presence_status("alice").await?;
        client.stop_heartbeat().await;
        let offline = client.presence_status("alice").await?;

        let history = client.history(&conversation.id, None, self.messages).await?;

        stream.unsubscribe().await;
        bob_list.unsubscribe().await;
        alice_presence.unsubscribe().await;
        client.shutdown().await;

        Ok(json!({
            "conversation": conversation.id,
            "messagesSent": history.len(),
            "bobUnread": bob_unread,
            "unreadTotalBefore": unread_before,
            "unreadTotalAfter": unread_after,
            "aliceWhileTracking": online.to_string(),
            "aliceAfterStop": offline.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_session_reports_unread_then_read() {
        let summary = Script { messages: 3 }
            .run(ChatClientConfig::default())
            .await
            .unwrap();
        assert_eq!(summary["conversation"], "alice_bob");
        assert_eq!(summary["messagesSent"], 3);
        assert_eq!(summary["bobUnread"], true);
        assert_eq!(summary["unreadTotalBefore"], 1);
        assert_eq!(summary["unreadTotalAfter"], 0);
        assert_eq!(summary["aliceWhileTracking"], "online");
        assert_eq!(summary["aliceAfterStop"], "just now");
    }
}
