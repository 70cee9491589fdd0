//! Pure presence-to-status derivation.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::types::{PresenceRecord, PresenceState, Timestamp};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// What a viewer is shown for another user's presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum PresenceStatus {
    Online,
    Offline,
    JustNow,
    MinutesAgo(u64),
    HoursAgo(u64),
    DaysAgo(u64),
}

impl PresenceStatus {
    pub fn is_online(self) -> bool {
        self == PresenceStatus::Online
    }

    /// Bucket the time since last activity, flooring at each step.
    pub fn from_elapsed(elapsed: Duration) -> Self {
        let secs = elapsed.as_secs();
        if secs < MINUTE {
            PresenceStatus::JustNow
        } else if secs < HOUR {
            PresenceStatus::MinutesAgo(secs / MINUTE)
        } else if secs < DAY {
            PresenceStatus::HoursAgo(secs / HOUR)
        } else {
            PresenceStatus::DaysAgo(secs / DAY)
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceStatus::Online => f.write_str("online"),
            PresenceStatus::Offline => f.write_str("offline"),
            PresenceStatus::JustNow => f.write_str("just now"),
            PresenceStatus::MinutesAgo(n) => write!(f, "{n} minutes ago"),
            PresenceStatus::HoursAgo(n) => write!(f, "{n} hours ago"),
            PresenceStatus::DaysAgo(n) => write!(f, "{n} days ago"),
        }
    }
}

/// Derive the displayed status of a presence record at `now`.
///
/// An `online` record is trusted as-is, however old its `lastSeen`.
pub fn derive_status(record: Option<&PresenceRecord>, now: Timestamp) -> PresenceStatus {
    derive_status_with_timeout(record, now, None)
}

/// Like [`derive_status`], but an `online` record whose `lastSeen` is older
/// than `stale_after` decays to a last-seen bucket.
pub fn derive_status_with_timeout(
    record: Option<&PresenceRecord>,
    now: Timestamp,
    stale_after: Option<Duration>,
) -> PresenceStatus {
    let Some(record) = record else {
        return PresenceStatus::Offline;
    };

    if record.state == Some(PresenceState::Online) {
        let stale = match (stale_after, record.last_seen) {
            (Some(limit), Some(last_seen)) => now.since(last_seen) > limit,
            _ => false,
        };
        if !stale {
            return PresenceStatus::Online;
        }
    }

    match record.last_seen {
        Some(last_seen) => PresenceStatus::from_elapsed(now.since(last_seen)),
        None => PresenceStatus::Offline,
    }
}
