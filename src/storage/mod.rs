//! Durable key-value substrate.
//!
//! The location store mirrors its table into a generic string-keyed,
//! string-valued store. This module defines the [`KeyValueStore`] trait for
//! that substrate plus two implementations:
//!
//! - [`MemoryKeyValueStore`]: process-local map, for tests and hosts without
//!   durable storage
//! - [`SqliteKeyValueStore`]: single-table `SQLite` database on disk
//!
//! Platform layers (e.g. a mobile app's async storage) can provide their own
//! implementation.

mod error;
mod memory;
mod sqlite;

pub use error::{Result, StorageError};
pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

/// Trait for a durable string key-value store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a single substrate can be shared
/// between the location store and other components (e.g. credential storage).
///
/// # Blocking
///
/// Methods are synchronous and may block on I/O. Async callers should run
/// them on the blocking pool (`tokio::task::spawn_blocking`), as the
/// position feed forwarder does.
///
/// # Example
///
/// ```
/// use peermap_core::storage::{KeyValueStore, MemoryKeyValueStore};
///
/// let store = MemoryKeyValueStore::new();
/// store.set("greeting", "hello").unwrap();
/// assert_eq!(store.get("greeting").unwrap().as_deref(), Some("hello"));
/// ```
pub trait KeyValueStore: Send + Sync {
    /// Retrieves the value stored under `key`.
    ///
    /// # Returns
    ///
    /// `Ok(Some(value))` if found, `Ok(None)` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes the value stored under `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn remove(&self, key: &str) -> Result<()>;
}
