//! Shared feeds: the underlying subscriptions owned by the hub.

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Something that can be shut down asynchronously.
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn teardown(&self);
}

/// Stops a background task by cancelling its token.
pub struct TaskGuard {
    cancel: CancellationToken,
}

impl TaskGuard {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl Teardown for TaskGuard {
    async fn teardown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The latest value of an underlying subscription, readable by any number
/// of callers, plus the handle that stops it.
pub struct Feed<T> {
    rx: watch::Receiver<Option<T>>,
    stop: Box<dyn Teardown>,
}

impl<T> Feed<T> {
    pub fn new(rx: watch::Receiver<Option<T>>, stop: Box<dyn Teardown>) -> Self {
        Self { rx, stop }
    }

    pub fn receiver(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }
}

#[async_trait]
impl<T: Send + Sync> Teardown for Feed<T> {
    async fn teardown(&self) {
        self.stop.teardown().await;
    }
}
