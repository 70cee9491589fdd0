//! Heartbeat emitter for the signed-in user's own presence record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use duihua_common::SessionId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::store::PresenceStore;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub heartbeat_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

struct ActiveTracking {
    user_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps one session's user marked online while tracking is active.
///
/// Several sessions of the same user may track at once; the store keeps
/// the latest `lastSeen` of any of them.
pub struct PresenceTracker {
    presence: PresenceStore,
    config: TrackerConfig,
    session: SessionId,
    active: Option<ActiveTracking>,
    heartbeats: Arc<AtomicU64>,
}

impl PresenceTracker {
    pub fn new(presence: PresenceStore, config: TrackerConfig) -> Self {
        Self {
            presence,
            config,
            session: SessionId::new(),
            active: None,
            heartbeats: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Session this tracker writes heartbeats for. Stable across
    /// start/stop and user switches.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Heartbeat for `user_id` now and every interval after. A no-op if
    /// already tracking that user; tracking another user stops the
    /// previous one first.
    pub async fn start_tracking(&mut self, user_id: &str) {
        if let Some(active) = &self.active {
            if active.user_id == user_id {
                return;
            }
            self.stop_tracking().await;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(heartbeat_loop(
            self.presence.clone(),
            user_id.to_string(),
            self.session.clone(),
            self.config.heartbeat_interval,
            Arc::clone(&self.heartbeats),
            cancel.clone(),
        ));
        debug!(user_id, session = %self.session, "Presence tracking started");

        self.active = Some(ActiveTracking {
            user_id: user_id.to_string(),
            cancel,
            task,
        });
    }

    /// Stop heartbeats and mark the user offline.
    pub async fn stop_tracking(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        let _ = active.task.await;
        if let Err(e) = self.presence.mark_offline(&active.user_id).await {
            warn!(
                user_id = %active.user_id,
                session = %self.session,
                error = %e,
                "Failed to mark user offline"
            );
        }
        debug!(user_id = %active.user_id, session = %self.session, "Presence tracking stopped");
    }

    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    pub fn tracked_user(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.user_id.as_str())
    }

    /// Successful heartbeat writes by this tracker.
    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        let presence = self.presence.clone();
        let session = self.session.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = active.task.await;
                if let Err(e) = presence.mark_offline(&active.user_id).await {
                    warn!(
                        user_id = %active.user_id,
                        session = %session,
                        error = %e,
                        "Failed to mark user offline"
                    );
                }
            });
        }
    }
}

async fn heartbeat_loop(
    presence: PresenceStore,
    user_id: String,
    session: SessionId,
    every: Duration,
    sent: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match presence.heartbeat(&user_id).await {
                Ok(_) => {
                    sent.fetch_add(1, Ordering::Relaxed);
                    trace!(user_id = %user_id, session = %session, "Heartbeat");
                }
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        session = %session,
                        error = %e,
                        "Heartbeat failed, retrying next tick"
                    );
                }
            },
        }
    }
}
