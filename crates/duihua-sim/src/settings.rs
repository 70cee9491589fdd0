//! Mapping from the file configuration to chat client settings.

use std::time::Duration;

use duihua_chat::{ChatClientConfig, IndexConfig, TrackerConfig, UserProfile, WatchConfig};
use duihua_config::DuihuaConfig;

pub fn client_config(config: &DuihuaConfig) -> ChatClientConfig {
    let presence = &config.presence;
    let conversations = &config.conversations;

    let stale_after = match presence.stale_after {
        0 => None,
        secs => Some(Duration::from_secs(u64::from(secs))),
    };

    ChatClientConfig {
        tracker: TrackerConfig {
            heartbeat_interval: Duration::from_secs(u64::from(presence.heartbeat_interval)),
        },
        index: IndexConfig {
            placeholder: UserProfile::new(
                conversations.placeholder_display_name.clone(),
                conversations.placeholder_photo_url.clone(),
            ),
            profile_fetch_timeout: Duration::from_millis(u64::from(
                conversations.profile_fetch_timeout_ms,
            )),
            retry_delay: Duration::from_millis(u64::from(conversations.retry_delay_ms)),
            max_retry_delay: Duration::from_millis(u64::from(conversations.max_retry_delay_ms)),
        },
        presence_watch: WatchConfig {
            refresh_interval: Duration::from_secs(u64::from(presence.status_refresh_interval)),
            stale_after,
        },
        history_limit: config.messages.history_limit as usize,
    }
}
