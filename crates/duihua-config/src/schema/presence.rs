//! Presence and heartbeat configuration types.

use serde::{Deserialize, Serialize};

/// Presence tracking configuration. All durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Interval between heartbeat writes (valid range: 5-3600).
    pub heartbeat_interval: u32,
    /// How often subscribers re-derive "N minutes ago" labels (valid range: 1-3600).
    pub status_refresh_interval: u32,
    /// Treat an `online` record older than this as offline. 0 disables the
    /// check; otherwise it must be at least `heartbeat_interval`.
    pub stale_after: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: 60,
            status_refresh_interval: 30,
            stale_after: 0,
        }
    }
}
