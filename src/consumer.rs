//! Consumer side of the broker.
//!
//! A consumer is whatever wants the merged set of contributions for one
//! marker page, typically the rendering bootstrap. The broker hands it
//! batches; the consumer never reaches back into broker state.

use crate::contribution::{Contribution, ImplementorRecord, SourceId};
use std::cell::{Ref, RefCell};
use std::rc::Rc;

/// Receives contributions from a [`Broker`](crate::broker::Broker).
///
/// The first batch after registration carries everything buffered so far;
/// later batches carry exactly one contribution each.
pub trait Consumer {
    fn accept(&mut self, batch: Vec<Contribution>);
}

impl<F> Consumer for F
where
    F: FnMut(Vec<Contribution>),
{
    fn accept(&mut self, batch: Vec<Contribution>) {
        self(batch)
    }
}

/// Shared, append-only view of everything a page has received.
///
/// Clones share the same storage, so one handle can be registered with the
/// broker while another stays with the renderer.
#[derive(Clone, Debug, Default)]
pub struct ImplementorList {
    batches: Rc<RefCell<Vec<Vec<Contribution>>>>,
}

impl ImplementorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch in the order it was delivered.
    pub fn batches(&self) -> Ref<'_, Vec<Vec<Contribution>>> {
        self.batches.borrow()
    }

    /// All contributions, flattened in delivery order.
    pub fn contributions(&self) -> Vec<Contribution> {
        self.batches.borrow().iter().flatten().cloned().collect()
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.batches
            .borrow()
            .iter()
            .flatten()
            .map(|c| c.source_id.clone())
            .collect()
    }

    /// Implementor records across all sources, in display order.
    pub fn records(&self) -> Vec<ImplementorRecord> {
        self.batches
            .borrow()
            .iter()
            .flatten()
            .flat_map(|c| c.records.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.batches.borrow().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Consumer for ImplementorList {
    fn accept(&mut self, batch: Vec<Contribution>) {
        self.batches.borrow_mut().push(batch);
    }
}
