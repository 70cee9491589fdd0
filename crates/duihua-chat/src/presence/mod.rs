//! User presence: heartbeats, stored records, and derived status.
//!
//! A [`PresenceTracker`] keeps the signed-in user's record fresh; viewers
//! read other users' records through [`PresenceStore`] and render them with
//! [`derive_status`].

mod status;
mod store;
mod tracker;
mod watcher;

pub use status::{derive_status, derive_status_with_timeout, PresenceStatus};
pub use store::PresenceStore;
pub use tracker::{PresenceTracker, TrackerConfig};
pub use watcher::{PresenceView, WatchConfig};

pub(crate) use watcher::run_presence_watch;
