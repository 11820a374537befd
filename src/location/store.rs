//! Location record store.
//!
//! Owns the [`LocationTable`] and its durable mirror in a
//! [`KeyValueStore`]. Memory is authoritative: every write lands in memory
//! first and is then mirrored to the substrate. Substrate failures are logged
//! and swallowed, so no operation here fails because of persistence.
//!
//! # Concurrency
//!
//! The table sits behind a `RwLock` so readers never wait on the substrate.
//! Writers additionally hold a writer mutex across mutate-then-persist, which
//! keeps the mirrored documents in the same order as the in-memory writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::settings::SyncSettings;
use super::types::{LocationRecord, LocationTable, PeerLocation, Position};
use crate::storage::KeyValueStore;

/// Substrate key the table is mirrored under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "@firstproject_users_locations";

/// How a write older than the stored record is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WritePolicy {
    /// Every write replaces the stored record, whatever its timestamp.
    #[default]
    AcceptAll,
    /// Writes with an `updated_at` older than the stored record are dropped.
    RejectStale,
}

/// Result of a write to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No record existed for the user.
    Inserted,
    /// An existing record was overwritten.
    Replaced,
    /// The write was older than the stored record and was dropped.
    RejectedStale,
}

/// Result of [`LocationStore::hydrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    /// Nothing was stored under the key.
    Missing,
    /// A document with this many valid entries was loaded.
    Loaded(usize),
    /// The stored document was not a JSON object; the table was left as is.
    Corrupt,
    /// The substrate could not be read; the table was left as is.
    Unreadable,
    /// Hydration already ran for this store.
    AlreadyHydrated,
}

/// Store of every known user's last position.
pub struct LocationStore {
    substrate: Arc<dyn KeyValueStore>,
    storage_key: String,
    policy: WritePolicy,
    table: RwLock<LocationTable>,
    writer: Mutex<()>,
    hydrated: AtomicBool,
    revision: watch::Sender<u64>,
}

impl LocationStore {
    /// Creates an empty store mirrored under [`DEFAULT_STORAGE_KEY`].
    ///
    /// The store starts empty; call [`hydrate`](Self::hydrate) to load the
    /// persisted document.
    #[must_use]
    pub fn new(substrate: Arc<dyn KeyValueStore>) -> Self {
        Self {
            substrate,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            policy: WritePolicy::default(),
            table: RwLock::new(LocationTable::new()),
            writer: Mutex::new(()),
            hydrated: AtomicBool::new(false),
            revision: watch::Sender::new(0),
        }
    }

    /// Creates an empty store configured from `settings`.
    #[must_use]
    pub fn from_settings(substrate: Arc<dyn KeyValueStore>, settings: &SyncSettings) -> Self {
        Self::new(substrate)
            .with_storage_key(settings.storage_key.clone())
            .with_write_policy(settings.write_policy)
    }

    /// Mirrors the table under `key` instead of the default key.
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Sets the policy for out-of-order writes.
    #[must_use]
    pub const fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Substrate key the table is mirrored under.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Policy applied to out-of-order writes.
    #[must_use]
    pub const fn write_policy(&self) -> WritePolicy {
        self.policy
    }

    /// Loads the persisted document into memory. Runs at most once.
    ///
    /// A missing key, an unreadable substrate or a document that is not a
    /// JSON object leave the table as it is; the latter two log a warning.
    /// Malformed entries inside an object are skipped one by one and the rest
    /// are loaded. Records already written in memory take precedence over
    /// persisted ones.
    pub fn hydrate(&self) -> HydrateOutcome {
        if self.hydrated.swap(true, Ordering::SeqCst) {
            return HydrateOutcome::AlreadyHydrated;
        }

        let _writer = self.lock_writer();

        let stored = match self.substrate.get(&self.storage_key) {
            Ok(Some(stored)) if !stored.trim().is_empty() => stored,
            Ok(_) => {
                debug!(key = %self.storage_key, "No persisted users locations");
                return HydrateOutcome::Missing;
            }
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "Failed to load users locations");
                return HydrateOutcome::Unreadable;
            }
        };

        let loaded = match LocationTable::from_json_lenient(&stored) {
            Ok((loaded, skipped)) => {
                for user_id in &skipped {
                    warn!(key = %self.storage_key, user_id = %user_id, "Skipping malformed location entry");
                }
                loaded
            }
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "Failed to parse users locations, starting empty");
                return HydrateOutcome::Corrupt;
            }
        };

        let total = loaded.len();
        let copied = self.write_table().fill_from(loaded);
        if copied > 0 {
            self.bump_revision();
        }

        info!(entries = total, copied, "Hydrated users locations");
        HydrateOutcome::Loaded(total)
    }

    /// Records `position` for `user_id`, stamped with the current time.
    ///
    /// Memory is updated before the table is persisted. Persistence failures
    /// are logged and otherwise ignored.
    pub fn update_user_location(&self, user_id: &str, email: &str, position: Position) -> WriteOutcome {
        let now = chrono::Utc::now().timestamp_millis();
        self.update_user_location_at(user_id, email, position, now)
    }

    /// Records `position` for `user_id` with an explicit `updated_at`.
    ///
    /// Under [`WritePolicy::RejectStale`] a write older than the stored
    /// record is dropped and nothing is persisted.
    pub fn update_user_location_at(
        &self,
        user_id: &str,
        email: &str,
        position: Position,
        updated_at: i64,
    ) -> WriteOutcome {
        let _writer = self.lock_writer();

        let (outcome, document) = {
            let mut table = self.write_table();

            if self.policy == WritePolicy::RejectStale {
                if let Some(existing) = table.get(user_id) {
                    if updated_at < existing.updated_at {
                        debug!(
                            user_id,
                            stored = existing.updated_at,
                            incoming = updated_at,
                            "Rejecting stale location write"
                        );
                        return WriteOutcome::RejectedStale;
                    }
                }
            }

            let previous = table.upsert(user_id, LocationRecord::new(email, position, updated_at));
            let outcome = if previous.is_some() {
                WriteOutcome::Replaced
            } else {
                WriteOutcome::Inserted
            };
            (outcome, table.to_json())
        };

        self.bump_revision();
        self.persist(document);
        outcome
    }

    /// Removes the record for `user_id`. Returns whether one existed.
    ///
    /// Removing an unknown user is a no-op and persists nothing.
    pub fn remove_user_location(&self, user_id: &str) -> bool {
        let _writer = self.lock_writer();

        let document = {
            let mut table = self.write_table();
            if table.remove(user_id).is_none() {
                return false;
            }
            table.to_json()
        };

        self.bump_revision();
        self.persist(document);
        true
    }

    /// Snapshot of every known record, tagged with its user identifier.
    ///
    /// The list is materialized at call time and sorted by identifier; later
    /// writes do not affect it.
    #[must_use]
    pub fn list_all(&self) -> Vec<PeerLocation> {
        let mut peers = self.read_table().to_peer_locations();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    /// Returns a copy of the record stored for `user_id`.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<LocationRecord> {
        self.read_table().get(user_id).cloned()
    }

    /// Number of users with a known location.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    /// Returns true if no user has a known location.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }

    /// Revision counter, bumped on every change to the table.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver notified whenever the table changes.
    ///
    /// Lets consumers react to writes instead of polling.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn persist(&self, document: Result<String, serde_json::Error>) {
        let document = match document {
            Ok(document) => document,
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "Failed to serialize users locations");
                return;
            }
        };

        if let Err(e) = self.substrate.set(&self.storage_key, &document) {
            warn!(key = %self.storage_key, error = %e, "Failed to save users locations");
        }
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_table(&self) -> RwLockReadGuard<'_, LocationTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, LocationTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationStore")
            .field("storage_key", &self.storage_key)
            .field("policy", &self.policy)
            .field("entries", &self.len())
            .field("hydrated", &self.hydrated.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
