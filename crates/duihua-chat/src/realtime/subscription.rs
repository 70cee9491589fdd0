//! Caller-side handles onto shared feeds.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::callback::CallbackSlot;
use super::feed::Teardown;
use super::hub::Release;
use super::key::SubscriptionKey;

// ---------------------------------------------------------------------------
// Forwarder
// ---------------------------------------------------------------------------

/// Pushes every new value of a feed into one caller's callback.
pub(crate) struct Forwarder<T> {
    slot: CallbackSlot<T>,
    cancel: CancellationToken,
}

#[async_trait]
impl<T: Send + 'static> Teardown for Forwarder<T> {
    async fn teardown(&self) {
        self.slot.close().await;
        self.cancel.cancel();
    }
}

pub(crate) fn spawn_forwarder<T, F>(
    mut rx: watch::Receiver<Option<T>>,
    callback: F,
) -> Arc<Forwarder<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let slot = CallbackSlot::new(callback);
    let cancel = CancellationToken::new();

    let task_slot = slot.clone();
    let token = cancel.clone();
    tokio::spawn(async move {
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                if !task_slot.deliver(value).await {
                    break;
                }
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    });

    Arc::new(Forwarder { slot, cancel })
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A caller's interest in a shared subscription.
///
/// Call [`unsubscribe`](Self::unsubscribe) to stop the callback and release
/// the shared feed. Dropping the handle does the same in the background.
pub struct Subscription {
    key: SubscriptionKey,
    hub: Arc<dyn Release>,
    forwarder: Arc<dyn Teardown>,
    closed: bool,
}

impl Subscription {
    pub(crate) fn new(
        key: SubscriptionKey,
        hub: Arc<dyn Release>,
        forwarder: Arc<dyn Teardown>,
    ) -> Self {
        Self {
            key,
            hub,
            forwarder,
            closed: false,
        }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Stop the callback and release the shared feed. No callback runs
    /// after this returns.
    pub async fn unsubscribe(mut self) {
        self.closed = true;
        self.forwarder.teardown().await;
        self.hub.release_key(&self.key).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let key = self.key.clone();
        let hub = Arc::clone(&self.hub);
        let forwarder = Arc::clone(&self.forwarder);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            debug!(key = %key, "Subscription dropped without unsubscribe");
            handle.spawn(async move {
                forwarder.teardown().await;
                hub.release_key(&key).await;
            });
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("closed", &self.closed)
            .finish()
    }
}
