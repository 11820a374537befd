//! Device position feed and its forwarding into the store.
//!
//! The crate does not own the location sensor. A [`PositionFeed`] wraps it
//! and yields an infinite, non-restartable stream of samples; a
//! [`FeedForwarder`] subscribes and writes every sample into the
//! [`LocationStore`] under the local user's identity.
//!
//! ```text
//! platform sensor ──► PositionSender ──► PushPositionFeed
//!                                            │ subscribe()
//!                                            ▼
//!                                      FeedForwarder ──► LocationStore
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{FeedError, LocationError, Result};
use super::store::LocationStore;
use super::types::{LocalUser, Position};

/// Accuracy tier requested from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Accuracy {
    /// Roughly 3 km
    Lowest,
    /// Roughly 1 km
    Low,
    /// Roughly 100 m
    Balanced,
    /// Roughly 10 m
    High,
    /// Best the device can do
    #[default]
    Highest,
}

/// Subscription options for the position feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedOptions {
    /// Requested accuracy tier
    pub accuracy: Accuracy,

    /// Minimum time between samples, in milliseconds
    pub time_interval_ms: u64,

    /// Minimum distance moved between samples, in meters
    pub distance_interval_m: f64,
}

impl FeedOptions {
    /// Minimum time between samples.
    #[must_use]
    pub const fn time_interval(&self) -> Duration {
        Duration::from_millis(self.time_interval_ms)
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Highest,
            time_interval_ms: 2000,
            distance_interval_m: 1.0,
        }
    }
}

/// One reading from the location sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Reported coordinates
    pub position: Position,

    /// When the sensor produced the reading (ms since epoch)
    pub timestamp_ms: i64,

    /// Horizontal accuracy radius in meters, if known
    pub accuracy_m: Option<f64>,
}

impl PositionSample {
    /// Creates a sample stamped with the current time.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            position: Position::new(latitude, longitude),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            accuracy_m: None,
        }
    }

    /// Sets the accuracy radius.
    #[must_use]
    pub const fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

/// Stream of samples produced by a subscription.
///
/// Never ends on success. Ends when the subscription is cancelled and yields
/// one terminal `Err` when permission is revoked or the sensor fails.
pub type PositionStream = BoxStream<'static, std::result::Result<PositionSample, FeedError>>;

/// Source of device positions.
pub trait PositionFeed: Send + Sync {
    /// Subscribes to the sensor with the given options.
    ///
    /// # Errors
    ///
    /// Returns an error if permission is denied, the environment has no
    /// usable sensor, or the feed cannot be subscribed again.
    fn subscribe(&self, options: &FeedOptions) -> std::result::Result<PositionStream, FeedError>;
}

type FeedItem = std::result::Result<PositionSample, FeedError>;

/// Sending half of a [`PushPositionFeed`].
///
/// Held by the platform layer and called from its sensor callback.
#[derive(Debug, Clone)]
pub struct PositionSender {
    tx: mpsc::UnboundedSender<FeedItem>,
}

impl PositionSender {
    /// Pushes a sample. Returns `false` once the subscriber has gone away.
    pub fn send(&self, sample: PositionSample) -> bool {
        self.tx.send(Ok(sample)).is_ok()
    }

    /// Reports a terminal failure. No further samples will be read.
    pub fn fail(&self, error: FeedError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Returns true once the subscriber has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A [`PositionFeed`] the platform layer pushes samples into.
///
/// It can be subscribed once; the options of that subscription are kept so
/// the platform can configure its sensor accordingly.
#[derive(Debug)]
pub struct PushPositionFeed {
    rx: Mutex<Option<mpsc::UnboundedReceiver<FeedItem>>>,
    requested: Mutex<Option<FeedOptions>>,
}

impl PushPositionFeed {
    /// Creates a feed and the sender that drives it.
    #[must_use]
    pub fn channel() -> (PositionSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = Self {
            rx: Mutex::new(Some(rx)),
            requested: Mutex::new(None),
        };
        (PositionSender { tx }, feed)
    }

    /// Options passed to [`subscribe`](PositionFeed::subscribe), once subscribed.
    #[must_use]
    pub fn requested_options(&self) -> Option<FeedOptions> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PositionFeed for PushPositionFeed {
    fn subscribe(&self, options: &FeedOptions) -> std::result::Result<PositionStream, FeedError> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(FeedError::AlreadySubscribed)?;

        *self.requested.lock().unwrap_or_else(PoisonError::into_inner) = Some(options.clone());

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

/// State of a forwarded feed as seen by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// Samples are being forwarded.
    Active,
    /// The feed ended without error (its source was cancelled).
    Ended,
    /// [`FeedHandle::stop`] was called.
    Stopped,
    /// The feed failed; no further samples will arrive.
    Failed(FeedError),
}

/// Subscribes a [`PositionFeed`] and forwards its samples into a store.
pub struct FeedForwarder;

impl FeedForwarder {
    /// Subscribes to `feed` and starts forwarding.
    ///
    /// Samples that arrive while `identity` holds no user are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::NoRuntime`] outside a tokio runtime and
    /// [`LocationError::Feed`] if the subscription is refused.
    pub fn start(
        feed: &dyn PositionFeed,
        options: &FeedOptions,
        store: Arc<LocationStore>,
        identity: watch::Receiver<Option<LocalUser>>,
    ) -> Result<FeedHandle> {
        tokio::runtime::Handle::try_current().map_err(|_| LocationError::NoRuntime)?;

        let stream = feed.subscribe(options).map_err(|e| {
            warn!(error = %e, "Position feed subscription refused");
            e
        })?;

        Self::spawn(stream, store, identity)
    }

    /// Forwards an already subscribed stream.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::NoRuntime`] outside a tokio runtime.
    pub fn spawn(
        stream: PositionStream,
        store: Arc<LocationStore>,
        identity: watch::Receiver<Option<LocalUser>>,
    ) -> Result<FeedHandle> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| LocationError::NoRuntime)?;

        let status = Arc::new(watch::Sender::new(FeedStatus::Active));
        let last_position = Arc::new(watch::Sender::new(None));
        let stopped = Arc::new(AtomicBool::new(false));

        let task = runtime.spawn(forward_samples(
            stream,
            store,
            identity,
            Arc::clone(&status),
            Arc::clone(&last_position),
            Arc::clone(&stopped),
        ));

        info!("Position feed forwarding started");

        Ok(FeedHandle {
            task,
            status,
            last_position,
            stopped,
        })
    }
}

async fn forward_samples(
    mut stream: PositionStream,
    store: Arc<LocationStore>,
    identity: watch::Receiver<Option<LocalUser>>,
    status: Arc<watch::Sender<FeedStatus>>,
    last_position: Arc<watch::Sender<Option<PositionSample>>>,
    stopped: Arc<AtomicBool>,
) {
    while let Some(item) = stream.next().await {
        if stopped.load(Ordering::SeqCst) {
            return;
        }

        match item {
            Ok(sample) => {
                last_position.send_replace(Some(sample));

                let user = identity.borrow().clone();
                match user {
                    Some(user) => {
                        // Substrate writes block; keep them off the async workers.
                        let store = Arc::clone(&store);
                        let write = tokio::task::spawn_blocking(move || {
                            store.update_user_location(&user.user_id, &user.email, sample.position);
                        });
                        if let Err(e) = write.await {
                            warn!(error = %e, "Location write task failed");
                        }
                    }
                    None => debug!("Dropping position sample: no local user"),
                }
            }
            Err(error) => {
                warn!(error = %error, "Position feed failed");
                status.send_replace(FeedStatus::Failed(error));
                return;
            }
        }
    }

    status.send_if_modified(|current| {
        if *current == FeedStatus::Active {
            *current = FeedStatus::Ended;
            true
        } else {
            false
        }
    });
}

/// Cancellation handle for a forwarded feed.
///
/// Dropping the handle stops forwarding.
pub struct FeedHandle {
    task: JoinHandle<()>,
    status: Arc<watch::Sender<FeedStatus>>,
    last_position: Arc<watch::Sender<Option<PositionSample>>>,
    stopped: Arc<AtomicBool>,
}

impl FeedHandle {
    /// Stops forwarding and releases the subscription. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.task.abort();
        self.status.send_if_modified(|current| {
            if *current == FeedStatus::Active {
                *current = FeedStatus::Stopped;
                true
            } else {
                false
            }
        });
        info!("Position feed forwarding stopped");
    }

    /// Current state of the feed.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn status_changes(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    /// Most recent sample seen, whether or not it was written to the store.
    #[must_use]
    pub fn last_position(&self) -> Option<PositionSample> {
        *self.last_position.borrow()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("status", &*self.status.borrow())
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
