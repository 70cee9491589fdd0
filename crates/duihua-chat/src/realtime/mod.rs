//! Live subscription plumbing shared by presence, conversation lists, and
//! message streams.
//!
//! A [`RealtimeSubscriptionHub`] owns one underlying feed per
//! [`SubscriptionKey`] and reference-counts the callers sharing it. Each
//! caller holds a [`Subscription`] that forwards the feed's latest value to
//! its own callback until it unsubscribes.

mod callback;
mod feed;
mod hub;
mod key;
mod subscription;

pub use callback::CallbackSlot;
pub use feed::{Feed, TaskGuard, Teardown};
pub use hub::RealtimeSubscriptionHub;
pub use key::SubscriptionKey;
pub use subscription::Subscription;

pub(crate) use hub::Release;
pub(crate) use subscription::spawn_forwarder;
