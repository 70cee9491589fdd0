//! A callback that can be switched off from another task.

use std::sync::Arc;

use tokio::sync::Mutex;

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Holds a subscriber callback until [`close`](Self::close) is called.
///
/// Delivery and closing take the same lock, so once `close` returns no
/// invocation is running and none will start.
pub struct CallbackSlot<T> {
    inner: Arc<Mutex<Option<Callback<T>>>>,
}

impl<T> Clone for CallbackSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> CallbackSlot<T> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// Invoke the callback. Returns `false` if the slot is closed.
    pub async fn deliver(&self, value: T) -> bool {
        let guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    pub async fn close(&self) {
        self.inner.lock().await.take();
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}
