//! Live derived status of one user's presence.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::status::{derive_status_with_timeout, PresenceStatus};
use super::store::PresenceStore;
use crate::clock::SharedClock;
use crate::types::{Document, PresenceRecord};

/// What presence subscribers receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub user_id: String,
    pub record: Option<PresenceRecord>,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// How often "N minutes ago" is re-derived without a store change.
    pub refresh_interval: Duration,
    pub stale_after: Option<Duration>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            stale_after: None,
        }
    }
}

/// Feed `user_id`'s presence view into `tx` until cancelled.
///
/// Re-derives on every record change and on each refresh tick; `tx` only
/// changes when the derived status does.
pub(crate) async fn run_presence_watch<F>(
    presence: PresenceStore,
    user_id: String,
    clock: SharedClock,
    config: WatchConfig,
    tx: watch::Sender<Option<PresenceView>>,
    cancel: CancellationToken,
    on_change: F,
) where
    F: Fn(&PresenceView) + Send + Sync,
{
    let mut rx = match presence.watch(&user_id).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Cannot watch presence");
            return;
        }
    };

    let mut ticker = tokio::time::interval(config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut record = parse_record(&rx.borrow_and_update());

    loop {
        let view = PresenceView {
            user_id: user_id.clone(),
            status: derive_status_with_timeout(record.as_ref(), clock.now(), config.stale_after),
            record: record.clone(),
        };
        let changed = tx.send_if_modified(|current| match current {
            Some(previous) if previous.status == view.status => {
                previous.record = view.record.clone();
                false
            }
            _ => {
                *current = Some(view.clone());
                true
            }
        });
        if changed {
            debug!(user_id = %user_id, status = %view.status, "Presence status changed");
            on_change(&view);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = rx.changed() => {
                if result.is_err() {
                    break;
                }
                record = parse_record(&rx.borrow_and_update());
            }
            _ = ticker.tick() => {}
        }
    }
}

fn parse_record(doc: &Option<Document>) -> Option<PresenceRecord> {
    let doc = doc.as_ref()?;
    match PresenceRecord::from_document(doc) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(key = %doc.key, error = %e, "Malformed presence record, treating as offline");
            None
        }
    }
}
