//! Reusable test helpers for store integration tests.
//!
//! Provides unique on-disk locations for `SQLite` substrates and a substrate
//! whose writes can be switched off to simulate a failing medium.

#![allow(dead_code)]

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use peermap_core::storage::{KeyValueStore, MemoryKeyValueStore, StorageError};

/// Atomic counter for unique test directory names.
static HELPER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a unique temporary directory path for test isolation.
///
/// Each call produces a distinct path by combining the prefix, process ID,
/// and an atomic counter. The directory itself is created.
pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let id = HELPER_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = env::temp_dir().join(format!(
        "peermap_test_{}_{}_{}",
        prefix,
        std::process::id(),
        id
    ));
    std::fs::create_dir_all(&dir).expect("should create temp dir");
    dir
}

/// Removes a temporary test directory. Ignores errors silently.
pub fn cleanup_dir(dir: &PathBuf) {
    let _ = std::fs::remove_dir_all(dir);
}

/// Builds one persisted record as it appears in the stored document.
pub fn record_json(email: &str, latitude: f64, longitude: f64, updated_at: i64) -> String {
    format!(
        r#"{{"email":"{email}","latitude":{latitude},"longitude":{longitude},"updatedAt":{updated_at}}}"#
    )
}

/// In-memory substrate whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakySubstrate {
    inner: MemoryKeyValueStore,
    failing: AtomicBool,
    failed_writes: AtomicU64,
}

impl FlakySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `set`/`remove` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of writes that were refused.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::SeqCst)
    }

    fn refuse(&self, key: &str) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::WriteRejected {
                key: key.to_string(),
                reason: "medium unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for FlakySubstrate {
    fn get(&self, key: &str) -> peermap_core::storage::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> peermap_core::storage::Result<()> {
        self.refuse(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> peermap_core::storage::Result<()> {
        self.refuse(key)?;
        self.inner.remove(key)
    }
}
