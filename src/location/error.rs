//! Error types for location synchronization.

use thiserror::Error;

/// Terminal failures of the device position feed.
///
/// A feed that reports one of these produces no further samples and is not
/// retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The user denied (or revoked) location permission.
    #[error("Permission to access location was denied")]
    PermissionDenied,

    /// The environment cannot provide positions (e.g. an emulator).
    #[error("Location is not supported here: {0}")]
    Unsupported(String),

    /// The sensor failed for another reason.
    #[error("Failed to get location: {0}")]
    Sensor(String),

    /// The feed was already subscribed; subscriptions cannot be restarted.
    #[error("Position feed already subscribed")]
    AlreadySubscribed,
}

/// Error type for store-level orchestration (poller, feed, settings).
#[derive(Error, Debug)]
pub enum LocationError {
    /// A background task was requested outside a tokio runtime.
    #[error("No tokio runtime available to spawn background task")]
    NoRuntime,

    /// A timer interval of zero was requested.
    #[error("Interval must be greater than zero")]
    InvalidInterval,

    /// Settings failed validation or could not be parsed.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// An operation needs a local identity but nobody is signed in.
    #[error("No local user signed in")]
    NotSignedIn,

    /// The position feed could not be subscribed.
    #[error("Position feed error: {0}")]
    Feed(#[from] FeedError),
}

/// Result type alias for location operations.
pub type Result<T> = std::result::Result<T, LocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_display() {
        assert_eq!(
            FeedError::PermissionDenied.to_string(),
            "Permission to access location was denied"
        );
    }

    #[test]
    fn unsupported_display() {
        let err = FeedError::Unsupported("Android emulator".to_string());
        assert_eq!(err.to_string(), "Location is not supported here: Android emulator");
    }

    #[test]
    fn feed_error_converts_into_location_error() {
        let err: LocationError = FeedError::AlreadySubscribed.into();
        assert_eq!(
            err.to_string(),
            "Position feed error: Position feed already subscribed"
        );
    }

    #[test]
    fn invalid_interval_display() {
        assert_eq!(
            LocationError::InvalidInterval.to_string(),
            "Interval must be greater than zero"
        );
    }

    #[test]
    fn not_signed_in_debug_format() {
        let debug_str = format!("{:?}", LocationError::NotSignedIn);
        assert!(debug_str.contains("NotSignedIn"));
    }
}
