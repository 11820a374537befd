//! Runtime settings for location synchronization.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{LocationError, Result};
use super::feed::FeedOptions;
use super::store::{WritePolicy, DEFAULT_STORAGE_KEY};

/// Settings for the store, the snapshot poller and the position feed.
///
/// Every field has a default, so partial JSON documents are accepted.
///
/// # Example
///
/// ```
/// use peermap_core::location::SyncSettings;
///
/// let settings = SyncSettings::from_json(r#"{"poll_interval_ms": 5000}"#).unwrap();
/// assert_eq!(settings.poll_interval_ms, 5000);
/// assert_eq!(settings.storage_key, "@firstproject_users_locations");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Substrate key the location table is mirrored under
    pub storage_key: String,

    /// Interval between peer snapshots, in milliseconds
    pub poll_interval_ms: u64,

    /// How writes older than the stored record are treated
    pub write_policy: WritePolicy,

    /// Options for the device position feed
    pub feed: FeedOptions,
}

impl SyncSettings {
    /// Interval between peer snapshots.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Checks that the settings can drive a store and poller.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidSettings`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(LocationError::InvalidSettings(
                "storage_key must not be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(LocationError::InvalidSettings(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        let distance = self.feed.distance_interval_m;
        if !distance.is_finite() || distance < 0.0 {
            return Err(LocationError::InvalidSettings(format!(
                "feed.distance_interval_m must be a non-negative number, got {distance}"
            )));
        }
        Ok(())
    }

    /// Parses and validates settings from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidSettings`] if the JSON is malformed or
    /// the values fail [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| LocationError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            poll_interval_ms: 3000,
            write_policy: WritePolicy::default(),
            feed: FeedOptions::default(),
        }
    }
}
