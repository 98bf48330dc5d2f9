//! Contribution data model.
//!
//! A contribution is one library's implementor list for one marker. Types
//! here mirror the generator's fragment fields; structural checks live in
//! `validation`, delivery bookkeeping in `broker`.

pub mod identity;
pub mod model;

pub use identity::{InvalidSourceId, MarkerKey, SourceId};
pub use model::{Contribution, ContributionError, ImplementorRecord};
