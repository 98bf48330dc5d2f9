use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying one contributor: the documented library a fragment
/// belongs to (e.g. `haybale`).
///
/// Deduplication is keyed on this value, so an empty id would collapse every
/// malformed contribution into one slot. Construction rejects the empty
/// string, including when deserializing; any other string is a valid id.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceId(String);

/// Marker a page aggregates implementors for (e.g. `core::marker::Unpin`).
///
/// Purely a label: the broker never compares contributions across markers,
/// one page owns one marker.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerKey(pub String);

/// Reason a raw string could not become a [`SourceId`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidSourceId;

impl SourceId {
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidSourceId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidSourceId);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SourceId {
    type Error = InvalidSourceId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SourceId::new(value)
    }
}

impl From<SourceId> for String {
    fn from(id: SourceId) -> Self {
        id.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InvalidSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("source id must be a non-empty string")
    }
}

impl std::error::Error for InvalidSourceId {}

impl MarkerKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_rejects_only_the_empty_string() {
        assert_eq!(SourceId::new(""), Err(InvalidSourceId));
        assert_eq!(SourceId::new("   \t").unwrap().as_str(), "   \t");
        assert_eq!(SourceId::new("haybale").unwrap().as_str(), "haybale");
    }

    #[test]
    fn source_id_deserialization_enforces_non_empty() {
        let parsed: SourceId = serde_json::from_str("\"haybale\"").unwrap();
        assert_eq!(parsed.as_str(), "haybale");
        assert!(serde_json::from_str::<SourceId>("\"\"").is_err());

        let serialized = serde_json::to_string(&parsed).unwrap();
        assert_eq!(serialized, "\"haybale\"");
    }

    #[test]
    fn marker_key_is_transparent() {
        let key = MarkerKey("core::marker::Unpin".to_string());
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            "\"core::marker::Unpin\""
        );
        assert_eq!(key.to_string(), "core::marker::Unpin");
    }
}
