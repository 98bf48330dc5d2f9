//! Order-independent aggregation of implementor fragments.
//!
//! Each documented library contributes one fragment per marker, and fragments
//! load whenever they load: before the marker page's bootstrap, after it, or
//! never. The crate merges those contributions so the page's consumer sees
//! each library exactly once, in arrival order, no matter who showed up first.
//!
//! Layout: `contribution` holds the data model, `validation` and
//! `schema_loader` guard the ingestion boundary, `broker` is the merge point,
//! `page` owns a broker for one page lifetime, and `fragment` reads the
//! generator's script files into payloads.

use anyhow::{Context, Result};
use std::path::Path;

pub mod broker;
pub mod consumer;
pub mod contribution;
pub mod fragment;
pub mod page;
mod schema_loader;
pub mod validation;

pub use broker::{Broker, BrokerOptions, BrokerStats, Delivery, IngestReport, RegistrationError};
pub use consumer::{Consumer, ImplementorList};
pub use contribution::{
    Contribution, ContributionError, ImplementorRecord, InvalidSourceId, MarkerKey, SourceId,
};
pub use fragment::{FragmentError, load_fragment, marker_from_path, parse_fragment};
pub use page::Page;
pub use schema_loader::{CONTRIBUTION_SCHEMA_VERSION, ContributionSchema, SCHEMA_PATH_ENV};
pub use validation::{split_payload, validate_contribution, validate_contribution_object};

/// Load a fragment from disk and contribute every library it carries.
///
/// File-level problems (unreadable, unparseable) are returned as errors;
/// per-library problems are recorded in the report and the page keeps going.
pub fn contribute_fragment(page: &mut Page, path: &Path) -> Result<IngestReport> {
    let payload = load_fragment(path)?;
    let report = page.contribute_payload(&payload);
    log::debug!(
        "{}: {} contributions, {} rejected",
        path.display(),
        report.outcomes.len(),
        report.rejected.len()
    );
    Ok(report)
}

/// Build broker options from an explicit schema path, falling back to
/// `IMPL_MERGE_SCHEMA` and then the embedded schema.
pub fn broker_options(schema_path: Option<&Path>) -> Result<BrokerOptions> {
    match schema_path {
        Some(path) => Ok(BrokerOptions {
            schema: ContributionSchema::load(path)
                .with_context(|| format!("loading contribution schema {}", path.display()))?,
        }),
        None => BrokerOptions::from_env(),
    }
}
