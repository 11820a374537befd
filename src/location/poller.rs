//! Periodic peer snapshots.
//!
//! The substrate offers no change notification, so peers are presented by
//! polling: every interval the store is listed, the local user is filtered
//! out and the result is handed to a callback.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::error::{LocationError, Result};
use super::store::LocationStore;
use super::types::PeerLocation;

type SnapshotCallback = Box<dyn FnMut(Vec<PeerLocation>) + Send>;

/// Removes every entry whose email equals `self_email`.
#[must_use]
pub fn filter_peers(records: Vec<PeerLocation>, self_email: &str) -> Vec<PeerLocation> {
    records
        .into_iter()
        .filter(|record| record.email != self_email)
        .collect()
}

/// Publishes filtered snapshots of a [`LocationStore`] on a fixed interval.
#[derive(Debug, Clone)]
pub struct PeerSnapshotPoller {
    store: Arc<LocationStore>,
    interval: Duration,
}

impl PeerSnapshotPoller {
    /// Creates a poller over `store` ticking every `interval`.
    #[must_use]
    pub const fn new(store: Arc<LocationStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Interval between snapshots.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Delivers one snapshot now, then one every interval until stopped.
    ///
    /// The first snapshot is delivered before this returns. Later ones come
    /// from a tokio task. `on_snapshot` must not call [`PollerHandle::stop`]
    /// on the handle it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidInterval`] for a zero interval and
    /// [`LocationError::NoRuntime`] outside a tokio runtime.
    pub fn start<F>(&self, self_email: impl Into<String>, on_snapshot: F) -> Result<PollerHandle>
    where
        F: FnMut(Vec<PeerLocation>) + Send + 'static,
    {
        if self.interval.is_zero() {
            return Err(LocationError::InvalidInterval);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| LocationError::NoRuntime)?;

        let self_email = self_email.into();
        let on_snapshot: SnapshotCallback = Box::new(on_snapshot);
        let callback = Arc::new(Mutex::new(Some(on_snapshot)));

        deliver(&self.store, &self_email, &callback);

        let store = Arc::clone(&self.store);
        let interval = self.interval;
        let task_callback = Arc::clone(&callback);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !deliver(&store, &self_email, &task_callback) {
                    break;
                }
            }
        });

        info!(interval = ?interval, "Peer snapshot poller started");

        Ok(PollerHandle { callback, task })
    }
}

/// Computes and delivers one snapshot. Returns `false` once stopped.
fn deliver(
    store: &LocationStore,
    self_email: &str,
    callback: &Mutex<Option<SnapshotCallback>>,
) -> bool {
    let mut guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(on_snapshot) = guard.as_mut() else {
        return false;
    };

    let snapshot = filter_peers(store.list_all(), self_email);
    debug!(peers = snapshot.len(), "Delivering peer snapshot");
    on_snapshot(snapshot);
    true
}

/// Cancellation handle for a running poller.
///
/// Dropping the handle stops the poller.
pub struct PollerHandle {
    callback: Arc<Mutex<Option<SnapshotCallback>>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops the poller. Idempotent.
    ///
    /// Waits for an in-flight delivery to finish; no callback runs after this
    /// returns.
    pub fn stop(&self) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.task.abort();

        if callback.is_some() {
            info!("Peer snapshot poller stopped");
        }
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PollerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerHandle")
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
