//! Application-facing entry point.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::location::{
    FeedForwarder, FeedHandle, LocalUser, LocationError, LocationStore, PeerLocation,
    PeerSnapshotPoller, PollerHandle, PositionFeed, Result, SyncSettings,
};
use crate::storage::KeyValueStore;

/// Core interface for PeerMap functionality.
///
/// Owns the location store and the local identity, and starts the two
/// background activities of the map view: forwarding the device's position
/// feed into the store and polling peer snapshots out of it. Pass it (or its
/// [`store`](Self::store)) to whatever needs it; there is no global instance.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use peermap_core::PeerMapCore;
/// use peermap_core::storage::MemoryKeyValueStore;
///
/// let core = PeerMapCore::with_defaults(Arc::new(MemoryKeyValueStore::new()));
/// core.sign_in_with_email("me@x.com");
/// assert_eq!(core.local_user().unwrap().email, "me@x.com");
/// ```
pub struct PeerMapCore {
    settings: SyncSettings,
    store: Arc<LocationStore>,
    identity: watch::Sender<Option<LocalUser>>,
}

impl PeerMapCore {
    /// Creates the core and hydrates the store from `substrate`.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidSettings`] if `settings` fail validation.
    pub fn new(substrate: Arc<dyn KeyValueStore>, settings: SyncSettings) -> Result<Self> {
        settings.validate()?;

        let store = Arc::new(LocationStore::from_settings(substrate, &settings));
        let outcome = store.hydrate();
        info!(?outcome, key = %settings.storage_key, "PeerMap core initialized");

        Ok(Self {
            settings,
            store,
            identity: watch::Sender::new(None),
        })
    }

    /// Creates the core with default settings.
    #[must_use]
    pub fn with_defaults(substrate: Arc<dyn KeyValueStore>) -> Self {
        match Self::new(Arc::clone(&substrate), SyncSettings::default()) {
            Ok(core) => core,
            Err(e) => {
                warn!(error = %e, "Default settings rejected, using an unhydrated store");
                Self {
                    store: Arc::new(LocationStore::new(substrate)),
                    settings: SyncSettings::default(),
                    identity: watch::Sender::new(None),
                }
            }
        }
    }

    /// The shared location store.
    #[must_use]
    pub const fn store(&self) -> &Arc<LocationStore> {
        &self.store
    }

    /// Settings the core was created with.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Sets the local user. Later position samples are written under them.
    pub fn sign_in(&self, user: LocalUser) {
        info!(user_id = %user.user_id, "Local user signed in");
        self.identity.send_replace(Some(user));
    }

    /// Sets a local user identified by email.
    pub fn sign_in_with_email(&self, email: &str) {
        self.sign_in(LocalUser::from_email(email));
    }

    /// Clears the local user, returning who was signed in.
    ///
    /// The user's stored location is kept; see
    /// [`remove_own_location`](Self::remove_own_location).
    pub fn sign_out(&self) -> Option<LocalUser> {
        let previous = self.identity.send_replace(None);
        if previous.is_some() {
            info!("Local user signed out");
        }
        previous
    }

    /// The current local user, if any.
    #[must_use]
    pub fn local_user(&self) -> Option<LocalUser> {
        self.identity.borrow().clone()
    }

    /// Subscribes to `feed` and forwards its samples into the store.
    ///
    /// Samples received while nobody is signed in are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error outside a tokio runtime or if the feed refuses the
    /// subscription (e.g. permission denied).
    pub fn start_location_feed(&self, feed: &dyn PositionFeed) -> Result<FeedHandle> {
        FeedForwarder::start(
            feed,
            &self.settings.feed,
            Arc::clone(&self.store),
            self.identity.subscribe(),
        )
    }

    /// Starts delivering snapshots of every peer except the local user.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::NotSignedIn`] without a local user, or an
    /// error from [`PeerSnapshotPoller::start`].
    pub fn start_peer_poller<F>(&self, on_snapshot: F) -> Result<PollerHandle>
    where
        F: FnMut(Vec<PeerLocation>) + Send + 'static,
    {
        let user = self.local_user().ok_or(LocationError::NotSignedIn)?;
        PeerSnapshotPoller::new(Arc::clone(&self.store), self.settings.poll_interval())
            .start(user.email, on_snapshot)
    }

    /// Removes the local user's record, e.g. on logout.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::NotSignedIn`] without a local user.
    pub fn remove_own_location(&self) -> Result<bool> {
        let user = self.local_user().ok_or(LocationError::NotSignedIn)?;
        Ok(self.store.remove_user_location(&user.user_id))
    }
}

impl std::fmt::Debug for PeerMapCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerMapCore")
            .field("settings", &self.settings)
            .field("store", &self.store)
            .field("local_user", &*self.identity.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Position, PositionSample, PushPositionFeed, DEFAULT_STORAGE_KEY};
    use crate::storage::MemoryKeyValueStore;

    fn core() -> PeerMapCore {
        PeerMapCore::with_defaults(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn new_hydrates_store() {
        let substrate = Arc::new(MemoryKeyValueStore::with_entry(
            DEFAULT_STORAGE_KEY,
            r#"{"a@x.com": {"email": "a@x.com", "latitude": 1.0, "longitude": 2.0, "updatedAt": 3}}"#,
        ));
        let core = PeerMapCore::new(substrate, SyncSettings::default()).unwrap();
        assert_eq!(core.store().len(), 1);
    }

    #[test]
    fn with_defaults_matches_new_with_default_settings() {
        let substrate = Arc::new(MemoryKeyValueStore::with_entry(
            DEFAULT_STORAGE_KEY,
            r#"{"a@x.com": {"email": "a@x.com", "latitude": 1.0, "longitude": 2.0, "updatedAt": 3}}"#,
        ));
        let core = PeerMapCore::with_defaults(substrate);

        assert_eq!(core.store().len(), 1);
        assert_eq!(core.store().storage_key(), DEFAULT_STORAGE_KEY);
        assert_eq!(core.settings(), &SyncSettings::default());
        assert_eq!(
            core.store().hydrate(),
            crate::location::HydrateOutcome::AlreadyHydrated
        );
    }

    #[test]
    fn new_rejects_invalid_settings() {
        let settings = SyncSettings {
            poll_interval_ms: 0,
            ..SyncSettings::default()
        };
        let result = PeerMapCore::new(Arc::new(MemoryKeyValueStore::new()), settings);
        assert!(matches!(result, Err(LocationError::InvalidSettings(_))));
    }

    #[test]
    fn sign_in_and_out() {
        let core = core();
        assert!(core.local_user().is_none());

        core.sign_in(LocalUser::new("id-1", "me@x.com"));
        assert_eq!(core.local_user().unwrap().user_id, "id-1");

        let previous = core.sign_out().unwrap();
        assert_eq!(previous.email, "me@x.com");
        assert!(core.local_user().is_none());
        assert!(core.sign_out().is_none());
    }

    #[test]
    fn remove_own_location_requires_sign_in() {
        let core = core();
        assert!(matches!(
            core.remove_own_location(),
            Err(LocationError::NotSignedIn)
        ));
    }

    #[test]
    fn remove_own_location_removes_record() {
        let core = core();
        core.sign_in_with_email("me@x.com");
        core.store()
            .update_user_location("me@x.com", "me@x.com", Position::new(1.0, 1.0));

        assert!(core.remove_own_location().unwrap());
        assert!(core.store().is_empty());
        assert!(!core.remove_own_location().unwrap());
    }

    #[tokio::test]
    async fn poller_requires_sign_in() {
        let core = core();
        assert!(matches!(
            core.start_peer_poller(|_| {}),
            Err(LocationError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn feed_writes_under_signed_in_user() {
        let core = core();
        core.sign_in_with_email("me@x.com");

        let (sender, feed) = PushPositionFeed::channel();
        let handle = core.start_location_feed(&feed).unwrap();
        assert_eq!(feed.requested_options(), Some(core.settings().feed.clone()));

        let mut changes = core.store().subscribe_changes();
        sender.send(PositionSample::new(10.0, 20.0));
        changes.changed().await.unwrap();

        assert_eq!(
            core.store().get("me@x.com").unwrap().position(),
            Position::new(10.0, 20.0)
        );
        handle.stop();
    }

    #[test]
    fn debug_includes_local_user() {
        let core = core();
        core.sign_in_with_email("me@x.com");
        let debug_str = format!("{core:?}");
        assert!(debug_str.contains("PeerMapCore"));
        assert!(debug_str.contains("me@x.com"));
    }
}
