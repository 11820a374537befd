//! Location data types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A coordinate pair as reported by the position feed.
///
/// No bounds validation is performed; values are stored as received.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<(f64, f64)> for Position {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

/// Last known position of one user.
///
/// Serialized with the field names of the persisted document:
/// `email`, `latitude`, `longitude`, `updatedAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Copy of the owning user's identifier, used for display and filtering
    pub email: String,

    /// Most recent observed latitude
    #[serde(deserialize_with = "nullable_coordinate")]
    pub latitude: f64,

    /// Most recent observed longitude
    #[serde(deserialize_with = "nullable_coordinate")]
    pub longitude: f64,

    /// Milliseconds since epoch at the time of the last write
    pub updated_at: i64,
}

impl LocationRecord {
    /// Creates a record for `email` at `position`, written at `updated_at`.
    #[must_use]
    pub fn new(email: impl Into<String>, position: Position, updated_at: i64) -> Self {
        Self {
            email: email.into(),
            latitude: position.latitude,
            longitude: position.longitude,
            updated_at,
        }
    }

    /// Returns the coordinates of this record.
    #[must_use]
    pub const fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// Non-finite coordinates are written as `null`; read them back as NaN.
fn nullable_coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// A location record tagged with its owning user identifier.
///
/// This is the shape handed to the rendering layer:
/// `{id, email, latitude, longitude, updatedAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLocation {
    /// User identifier the record is stored under
    pub id: String,
    /// Email of the user
    pub email: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Milliseconds since epoch of the last write
    pub updated_at: i64,
}

impl PeerLocation {
    /// Builds a peer entry from a stored record.
    #[must_use]
    pub fn from_record(id: impl Into<String>, record: &LocationRecord) -> Self {
        Self {
            id: id.into(),
            email: record.email.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            updated_at: record.updated_at,
        }
    }

    /// Returns the coordinates of this peer.
    #[must_use]
    pub const fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// The device's authenticated identity.
///
/// Position samples are only written to the store while a local user is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalUser {
    /// Key the user's record is stored under
    pub user_id: String,
    /// Email shown to peers and used to filter the user out of snapshots
    pub email: String,
}

impl LocalUser {
    /// Creates a local user with an explicit identifier.
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }

    /// Creates a local user identified by their email address.
    #[must_use]
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            user_id: email.clone(),
            email,
        }
    }
}

/// Mapping from user identifier to that user's last known location.
///
/// Persisted as a single JSON object whose keys are user identifiers, never as
/// an array. Key order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationTable {
    entries: HashMap<String, LocationRecord>,
}

impl LocationTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a known location.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no user has a known location.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the record stored for `user_id`.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&LocationRecord> {
        self.entries.get(user_id)
    }

    /// Returns true if a record exists for `user_id`.
    #[must_use]
    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    /// Inserts or overwrites the record for `user_id`, returning the previous one.
    pub fn upsert(&mut self, user_id: impl Into<String>, record: LocationRecord) -> Option<LocationRecord> {
        self.entries.insert(user_id.into(), record)
    }

    /// Removes the record for `user_id`, returning it if it existed.
    pub fn remove(&mut self, user_id: &str) -> Option<LocationRecord> {
        self.entries.remove(user_id)
    }

    /// Iterates over `(user_id, record)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &LocationRecord)> {
        self.entries.iter()
    }

    /// Copies every entry that `self` does not already hold from `other`.
    ///
    /// Existing entries win; returns the number of entries copied.
    pub fn fill_from(&mut self, other: Self) -> usize {
        let mut copied = 0;
        for (user_id, record) in other.entries {
            if let std::collections::hash_map::Entry::Vacant(slot) = self.entries.entry(user_id) {
                slot.insert(record);
                copied += 1;
            }
        }
        copied
    }

    /// Materializes every entry as a [`PeerLocation`].
    #[must_use]
    pub fn to_peer_locations(&self) -> Vec<PeerLocation> {
        self.entries
            .iter()
            .map(|(user_id, record)| PeerLocation::from_record(user_id.as_str(), record))
            .collect()
    }

    /// Parses a table from its persisted JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a JSON object of records.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parses a persisted document entry by entry.
    ///
    /// The document must be a JSON object. Entries that are not valid
    /// records are skipped and their identifiers returned alongside the
    /// table.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a JSON object.
    pub fn from_json_lenient(json: &str) -> Result<(Self, Vec<String>), serde_json::Error> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut skipped = Vec::new();
        let mut entries = HashMap::with_capacity(raw.len());

        for (user_id, value) in raw {
            match serde_json::from_value::<LocationRecord>(value) {
                Ok(record) => {
                    entries.insert(user_id, record);
                }
                Err(_) => skipped.push(user_id),
            }
        }

        Ok((Self { entries }, skipped))
    }

    /// Serializes this table to its persisted JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails. Non-finite coordinates
    /// serialize as `null` and parse back as NaN.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl FromIterator<(String, LocationRecord)> for LocationTable {
    fn from_iter<I: IntoIterator<Item = (String, LocationRecord)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
