//! Typed representation of implementor contributions.
//!
//! Field names on the wire follow the generator's fragment format (`text`,
//! `synthetic`, `types`); the Rust names describe what the renderer does with
//! them. Nothing here interprets the display fragment or the dependency
//! paths, they pass through untouched.

use crate::contribution::identity::SourceId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
/// One marker-satisfying type in one library.
pub struct ImplementorRecord {
    /// Pre-rendered markup for the `impl` line.
    #[serde(rename = "text")]
    pub display_fragment: String,
    /// Whether the implementation is derived automatically (auto traits).
    #[serde(rename = "synthetic", default)]
    pub is_synthetic: bool,
    /// Type paths the implementation's applicability depends on.
    #[serde(rename = "types", default)]
    pub constraint_dependencies: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
/// Everything one source delivers in a single event.
pub struct Contribution {
    pub source_id: SourceId,
    #[serde(default)]
    pub records: Vec<ImplementorRecord>,
}

/// Reasons a raw contribution is turned away at ingestion.
///
/// None of these are fatal to aggregation; the broker reports them and keeps
/// accepting other sources.
#[derive(Debug)]
pub enum ContributionError {
    MissingSourceId,
    /// The payload was not a library-to-records mapping at all.
    NotAMapping,
    Schema {
        source_id: String,
        details: Vec<String>,
    },
    Decode {
        source_id: String,
        error: serde_json::Error,
    },
}

impl ImplementorRecord {
    pub fn new(display_fragment: impl Into<String>) -> Self {
        Self {
            display_fragment: display_fragment.into(),
            is_synthetic: false,
            constraint_dependencies: Vec::new(),
        }
    }

    /// Mark the record as compiler-derived rather than hand-written.
    pub fn synthetic(mut self, is_synthetic: bool) -> Self {
        self.is_synthetic = is_synthetic;
        self
    }

    /// Append a type path the implementation's bounds depend on.
    pub fn with_dependency(mut self, path: impl Into<String>) -> Self {
        self.constraint_dependencies.push(path.into());
        self
    }
}

impl Contribution {
    pub fn new(source_id: SourceId, records: Vec<ImplementorRecord>) -> Self {
        Self { source_id, records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ContributionError {
    /// Source the rejected contribution claimed to come from, if any.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            ContributionError::MissingSourceId | ContributionError::NotAMapping => None,
            ContributionError::Schema { source_id, .. }
            | ContributionError::Decode { source_id, .. } => Some(source_id),
        }
    }
}

impl fmt::Display for ContributionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContributionError::MissingSourceId => {
                write!(f, "contribution rejected: missing or empty source id")
            }
            ContributionError::NotAMapping => {
                write!(f, "payload rejected: expected an object keyed by library name")
            }
            ContributionError::Schema { source_id, details } => write!(
                f,
                "contribution '{source_id}' failed structural validation:\n{}",
                details.join("\n")
            ),
            ContributionError::Decode { source_id, error } => {
                write!(f, "contribution '{source_id}' could not be decoded ({error})")
            }
        }
    }
}

impl std::error::Error for ContributionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContributionError::Decode { error, .. } => Some(error),
            _ => None,
        }
    }
}
