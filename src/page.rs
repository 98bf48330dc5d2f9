//! Page-lifetime owner of the broker.
//!
//! A marker page does not know whether its bootstrap or one of its fragments
//! runs first, so the broker is created lazily by whichever side touches the
//! page first. Navigating away drops it; nothing survives into the next page.

use crate::broker::{Broker, BrokerOptions, BrokerStats, Delivery, IngestReport, RegistrationError};
use crate::consumer::Consumer;
use crate::contribution::{Contribution, MarkerKey};
use log::info;
use serde_json::Value;

#[derive(Debug)]
pub struct Page {
    marker: MarkerKey,
    options: BrokerOptions,
    broker: Option<Broker>,
}

impl Page {
    pub fn new(marker: MarkerKey, options: BrokerOptions) -> Self {
        Self {
            marker,
            options,
            broker: None,
        }
    }

    pub fn marker(&self) -> &MarkerKey {
        &self.marker
    }

    /// The page's broker, created on first access.
    pub fn broker(&mut self) -> &mut Broker {
        let options = &self.options;
        self.broker
            .get_or_insert_with(|| Broker::new(options.clone()))
    }

    /// Whether either side has touched the page yet.
    pub fn is_initialized(&self) -> bool {
        self.broker.is_some()
    }

    pub fn contribute(&mut self, contribution: Contribution) -> Delivery {
        self.broker().contribute(contribution)
    }

    pub fn contribute_payload(&mut self, payload: &Value) -> IngestReport {
        self.broker().contribute_payload(payload)
    }

    pub fn register_consumer<C>(&mut self, consumer: C) -> Result<(), RegistrationError>
    where
        C: Consumer + 'static,
    {
        self.broker().register_consumer(consumer)
    }

    /// Tear down the broker and return its final counters.
    ///
    /// Anything still buffered is discarded with it. Returns `None` when the
    /// page was never touched.
    pub fn navigate_away(&mut self) -> Option<BrokerStats> {
        let broker = self.broker.take()?;
        let stats = broker.stats().clone();
        info!(
            "page for {} unloading: {} accepted, {} duplicates, {} rejected, {} never consumed",
            self.marker,
            stats.accepted,
            stats.duplicates,
            stats.rejected,
            broker.pending().len()
        );
        Some(stats)
    }
}
