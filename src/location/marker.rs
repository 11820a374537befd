//! Deterministic marker colors and map marker view models.
//!
//! Each peer gets a stable color derived from its identifier, so markers keep
//! their color across refreshes without storing anything per user.
//!
//! # Algorithm
//!
//! Sum the UTF-16 code units of the identifier, reduce modulo the palette
//! size, index into the palette. Characters outside the Basic Multilingual
//! Plane contribute both halves of their surrogate pair, which keeps colors
//! identical to clients that hash JavaScript strings. Collisions are expected; the color is a
//! visual aid, not an identity. Changing the palette reassigns every color.

use chrono::DateTime;

use super::types::{PeerLocation, Position};

/// Colors assigned to peer markers.
pub const MARKER_PALETTE: [&str; 6] = [
    "#ef4444", "#3b82f6", "#10b981", "#f59e0b", "#8b5cf6", "#ec4899",
];

/// Color of the local user's own marker.
pub const SELF_MARKER_COLOR: &str = "#22c55e";

/// Returns the palette color for `identifier`.
///
/// # Examples
///
/// ```
/// use peermap_core::location::marker_color;
///
/// assert_eq!(marker_color("a@x.com"), "#8b5cf6");
/// assert_eq!(marker_color("a@x.com"), marker_color("a@x.com"));
/// ```
#[must_use]
pub fn marker_color(identifier: &str) -> &'static str {
    marker_color_in(identifier, &MARKER_PALETTE).unwrap_or(SELF_MARKER_COLOR)
}

/// Returns the color for `identifier` from a custom palette.
///
/// Returns `None` for an empty palette.
#[must_use]
pub fn marker_color_in<'a>(identifier: &str, palette: &[&'a str]) -> Option<&'a str> {
    let size = u64::try_from(palette.len()).ok().filter(|size| *size > 0)?;
    let hash = identifier
        .encode_utf16()
        .fold(0_u64, |acc, unit| acc.wrapping_add(u64::from(unit)));
    let index = usize::try_from(hash % size).ok()?;
    palette.get(index).copied()
}

/// A marker as the rendering layer draws it.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    /// Stable key for the marker
    pub key: String,
    /// Marker coordinates
    pub coordinate: Position,
    /// Title line
    pub title: String,
    /// Secondary line
    pub description: String,
    /// Pin color as a hex string
    pub color: &'static str,
}

impl MapMarker {
    /// Marker for a peer, colored by its email.
    ///
    /// The description reads `Last updated: HH:MM:SS` (UTC).
    #[must_use]
    pub fn for_peer(peer: &PeerLocation) -> Self {
        let updated = DateTime::from_timestamp_millis(peer.updated_at).map_or_else(
            || "unknown".to_string(),
            |at| at.format("%H:%M:%S").to_string(),
        );

        Self {
            key: peer.id.clone(),
            coordinate: peer.position(),
            title: peer.email.clone(),
            description: format!("Last updated: {updated}"),
            color: marker_color(&peer.email),
        }
    }

    /// Marker for the local user's own position.
    #[must_use]
    pub fn for_self(email: Option<&str>, position: Position) -> Self {
        Self {
            key: "self".to_string(),
            coordinate: position,
            title: "You are here".to_string(),
            description: email.unwrap_or("Current user").to_string(),
            color: SELF_MARKER_COLOR,
        }
    }
}

/// Builds one marker per peer in `snapshot`, keeping its order.
#[must_use]
pub fn peer_markers(snapshot: &[PeerLocation]) -> Vec<MapMarker> {
    snapshot.iter().map(MapMarker::for_peer).collect()
}
