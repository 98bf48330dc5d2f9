//! Aggregation broker: the single merge point between contribution sources
//! and the page's consumer.
//!
//! Sources call [`Broker::contribute`] whenever their fragment finishes
//! loading; the consumer calls [`Broker::register_consumer`] whenever the
//! page bootstrap runs. Neither side knows or cares which came first. The
//! broker guarantees that the consumer sees every accepted contribution
//! exactly once, in the order the broker received them.
//!
//! Everything runs on one logical thread: each call completes before the
//! next begins, so the broker needs no locking.

use crate::consumer::Consumer;
use crate::contribution::{Contribution, ContributionError, SourceId};
use crate::schema_loader::ContributionSchema;
use crate::validation::{split_payload, validate_contribution, validate_contribution_object};
use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Broker configuration.
#[derive(Clone, Debug)]
pub struct BrokerOptions {
    /// Structural shape every raw contribution must satisfy.
    pub schema: ContributionSchema,
}

impl BrokerOptions {
    /// Options backed by the embedded schema, or `IMPL_MERGE_SCHEMA` if set.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            schema: ContributionSchema::from_env()?,
        })
    }
}

/// What happened to one accepted-or-suppressed contribution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// No consumer yet; held until registration.
    Buffered,
    /// Handed straight to the registered consumer.
    Delivered,
    /// Source id already seen; dropped.
    Duplicate,
}

/// Diagnostic counters. Suppressed and rejected input is never an error to
/// the caller, so these are the only place it shows up.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BrokerStats {
    pub accepted: usize,
    pub buffered: usize,
    pub delivered: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub rejected_registrations: usize,
}

/// Outcome of ingesting a whole library-to-records payload.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<(SourceId, Delivery)>,
    pub rejected: Vec<ContributionError>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RegistrationError {
    /// A consumer is already active for this page; the first one stays.
    AlreadyRegistered,
}

pub struct Broker {
    buffer: Vec<Contribution>,
    consumer: Option<Box<dyn Consumer>>,
    seen: HashSet<SourceId>,
    stats: BrokerStats,
    options: BrokerOptions,
}

impl Broker {
    pub fn new(options: BrokerOptions) -> Self {
        Self {
            buffer: Vec::new(),
            consumer: None,
            seen: HashSet::new(),
            stats: BrokerStats::default(),
            options,
        }
    }

    /// Accept a typed contribution.
    ///
    /// The first contribution for a source id wins; later ones with the same
    /// id are suppressed even if their records differ. An empty record list
    /// still claims the id.
    pub fn contribute(&mut self, contribution: Contribution) -> Delivery {
        if !self.seen.insert(contribution.source_id.clone()) {
            self.stats.duplicates += 1;
            debug!(
                "suppressed duplicate contribution from '{}'",
                contribution.source_id
            );
            return Delivery::Duplicate;
        }
        self.stats.accepted += 1;

        match self.consumer.as_mut() {
            Some(consumer) => {
                debug!(
                    "delivering '{}' ({} records) to consumer",
                    contribution.source_id,
                    contribution.records.len()
                );
                consumer.accept(vec![contribution]);
                self.stats.delivered += 1;
                Delivery::Delivered
            }
            None => {
                debug!("buffering '{}' until a consumer registers", contribution.source_id);
                self.buffer.push(contribution);
                self.stats.buffered += 1;
                Delivery::Buffered
            }
        }
    }

    /// Validate a raw `(source id, records)` pair, then contribute it.
    ///
    /// Rejected input never reaches the seen-set or the buffer, so a later
    /// well-formed contribution under the same id is still accepted.
    pub fn contribute_value(
        &mut self,
        source_id: &str,
        records: &Value,
    ) -> Result<Delivery, ContributionError> {
        let validated = validate_contribution(&self.options.schema, source_id, records);
        self.admit(validated)
    }

    /// Validate a raw `{"source_id": .., "records": [..]}` object, then
    /// contribute it.
    pub fn contribute_object(&mut self, value: &Value) -> Result<Delivery, ContributionError> {
        let validated = validate_contribution_object(&self.options.schema, value);
        self.admit(validated)
    }

    /// Ingest a library-to-records payload, one contribution per key in key
    /// order. Bad entries are reported and skipped.
    pub fn contribute_payload(&mut self, payload: &Value) -> IngestReport {
        let mut report = IngestReport::default();
        for result in split_payload(&self.options.schema, payload) {
            match result {
                Ok(contribution) => {
                    let source_id = contribution.source_id.clone();
                    let delivery = self.contribute(contribution);
                    report.outcomes.push((source_id, delivery));
                }
                Err(err) => {
                    self.reject(&err);
                    report.rejected.push(err);
                }
            }
        }
        report
    }

    /// Install the page's consumer and flush the buffer into it.
    ///
    /// The flush is a single batch holding every buffered contribution in
    /// arrival order; nothing is delivered when the buffer is empty. A second
    /// registration is refused and the first consumer stays active.
    pub fn register_consumer<C>(&mut self, consumer: C) -> Result<(), RegistrationError>
    where
        C: Consumer + 'static,
    {
        if self.consumer.is_some() {
            self.stats.rejected_registrations += 1;
            warn!("refusing second consumer registration; keeping the first");
            return Err(RegistrationError::AlreadyRegistered);
        }

        let mut consumer: Box<dyn Consumer> = Box::new(consumer);
        let pending = std::mem::take(&mut self.buffer);
        if !pending.is_empty() {
            debug!("flushing {} buffered contributions to consumer", pending.len());
            self.stats.delivered += pending.len();
            consumer.accept(pending);
        }
        self.consumer = Some(consumer);
        Ok(())
    }

    /// Contributions still waiting for a consumer.
    pub fn pending(&self) -> &[Contribution] {
        &self.buffer
    }

    pub fn has_consumer(&self) -> bool {
        self.consumer.is_some()
    }

    pub fn has_seen(&self, source_id: &SourceId) -> bool {
        self.seen.contains(source_id)
    }

    pub fn stats(&self) -> &BrokerStats {
        &self.stats
    }

    fn admit(
        &mut self,
        validated: Result<Contribution, ContributionError>,
    ) -> Result<Delivery, ContributionError> {
        match validated {
            Ok(contribution) => Ok(self.contribute(contribution)),
            Err(err) => {
                self.reject(&err);
                Err(err)
            }
        }
    }

    fn reject(&mut self, err: &ContributionError) {
        self.stats.rejected += 1;
        warn!("{err}");
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("buffer", &self.buffer)
            .field("has_consumer", &self.consumer.is_some())
            .field("seen", &self.seen.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::AlreadyRegistered => {
                write!(f, "a consumer is already registered for this page")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}
