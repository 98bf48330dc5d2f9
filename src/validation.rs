//! Structural validation at the ingestion boundary.
//!
//! Raw payloads are checked against the contribution schema one library at a
//! time and only then decoded into typed [`Contribution`]s. Splitting per
//! library keeps failures isolated: a malformed entry produces its own error
//! and the remaining entries in the same payload go through unaffected.

use crate::contribution::{Contribution, ContributionError};
use crate::schema_loader::ContributionSchema;
use serde_json::{Value, json};

/// Validate and decode one `(source id, records)` pair.
pub fn validate_contribution(
    schema: &ContributionSchema,
    source_id: &str,
    records: &Value,
) -> Result<Contribution, ContributionError> {
    if source_id.is_empty() {
        return Err(ContributionError::MissingSourceId);
    }
    let instance = json!({
        "source_id": source_id,
        "records": records,
    });
    decode_checked(schema, source_id, instance)
}

/// Validate a standalone contribution object of the form
/// `{"source_id": .., "records": [..]}`.
pub fn validate_contribution_object(
    schema: &ContributionSchema,
    value: &Value,
) -> Result<Contribution, ContributionError> {
    let source_id = value
        .get("source_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(ContributionError::MissingSourceId)?;
    decode_checked(schema, source_id, value.clone())
}

/// Split a library-to-records payload into per-source results.
///
/// Entry order follows the payload's own key order. A payload that is not an
/// object yields a single [`ContributionError::NotAMapping`].
pub fn split_payload(
    schema: &ContributionSchema,
    payload: &Value,
) -> Vec<Result<Contribution, ContributionError>> {
    let Some(entries) = payload.as_object() else {
        return vec![Err(ContributionError::NotAMapping)];
    };
    entries
        .iter()
        .map(|(source_id, records)| validate_contribution(schema, source_id, records))
        .collect()
}

fn decode_checked(
    schema: &ContributionSchema,
    source_id: &str,
    instance: Value,
) -> Result<Contribution, ContributionError> {
    if let Err(details) = schema.validate(&instance) {
        return Err(ContributionError::Schema {
            source_id: source_id.to_string(),
            details,
        });
    }
    serde_json::from_value(instance).map_err(|error| ContributionError::Decode {
        source_id: source_id.to_string(),
        error,
    })
}
