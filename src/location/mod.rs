//! Location module for PeerMap.
//!
//! Keeps every user's last known position and presents other users' positions
//! to the map:
//! - [`LocationStore`]: user id → last position, mirrored into a key-value
//!   substrate
//! - [`FeedForwarder`]: writes the device's own position samples into the store
//! - [`PeerSnapshotPoller`]: periodic, self-filtered snapshots for rendering
//! - [`marker_color`]: deterministic per-peer marker colors
//!
//! # Data Flow
//!
//! ```text
//! PositionFeed ──► FeedForwarder ──► LocationStore ──► PeerSnapshotPoller ──► UI
//!                                        │
//!                                        ▼
//!                                  KeyValueStore
//! ```
//!
//! # Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use peermap_core::location::{filter_peers, LocationStore, Position};
//! use peermap_core::storage::MemoryKeyValueStore;
//!
//! let store = LocationStore::new(Arc::new(MemoryKeyValueStore::new()));
//! store.hydrate();
//!
//! store.update_user_location("a@x.com", "a@x.com", Position::new(37.7749, -122.4194));
//! store.update_user_location("me@x.com", "me@x.com", Position::new(48.8566, 2.3522));
//!
//! let peers = filter_peers(store.list_all(), "me@x.com");
//! assert_eq!(peers.len(), 1);
//! assert_eq!(peers[0].email, "a@x.com");
//! ```

mod error;
pub mod feed;
pub mod marker;
pub mod poller;
pub mod settings;
pub mod store;
pub mod types;

pub use error::{FeedError, LocationError, Result};
pub use feed::{
    Accuracy, FeedForwarder, FeedHandle, FeedOptions, FeedStatus, PositionFeed, PositionSample,
    PositionSender, PositionStream, PushPositionFeed,
};
pub use marker::{marker_color, marker_color_in, peer_markers, MapMarker, MARKER_PALETTE, SELF_MARKER_COLOR};
pub use poller::{filter_peers, PeerSnapshotPoller, PollerHandle};
pub use settings::SyncSettings;
pub use store::{HydrateOutcome, LocationStore, WriteOutcome, WritePolicy, DEFAULT_STORAGE_KEY};
pub use types::{LocalUser, LocationRecord, LocationTable, PeerLocation, Position};
