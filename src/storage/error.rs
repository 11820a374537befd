//! Error types for key-value substrate operations.
//!
//! These errors never escape the location store: it recovers from them
//! locally and logs a warning. They are surfaced to callers that use a
//! [`KeyValueStore`](super::KeyValueStore) directly.

use thiserror::Error;

/// Error type for substrate operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Backend(String),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A lock guarding the backend was poisoned by a panicking writer.
    #[error("Storage lock poisoned: {0}")]
    LockPoisoned(String),

    /// The backend refused the write (read-only or full medium).
    #[error("Write rejected for key {key}: {reason}")]
    WriteRejected {
        /// The key that could not be written.
        key: String,
        /// The reason given by the backend.
        reason: String,
    },
}

/// Result type alias for substrate operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_display() {
        let err = StorageError::Backend("disk unavailable".to_string());
        assert_eq!(err.to_string(), "Storage error: disk unavailable");
    }

    #[test]
    fn lock_poisoned_error_display() {
        let err = StorageError::LockPoisoned("kv".to_string());
        assert_eq!(err.to_string(), "Storage lock poisoned: kv");
    }

    #[test]
    fn write_rejected_error_display() {
        let err = StorageError::WriteRejected {
            key: "@firstproject_users_locations".to_string(),
            reason: "quota exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Write rejected for key @firstproject_users_locations: quota exceeded"
        );
    }

    #[test]
    fn database_error_converts() {
        let err: StorageError = rusqlite::Error::InvalidQuery.into();
        assert!(err.to_string().starts_with("Database error:"));
    }
}
